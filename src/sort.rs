//! External sorter.

use std::cmp::Ordering;
use std::error::Error;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::algorithm::{ChunkSorter, MergeSorter};
use crate::chunk::ChunkProducer;
use crate::error::{ConfigError, Phase, PhaseContext, SortError};
use crate::format::{LineFormat, RunFormat};
use crate::merger::MergeEngine;
use crate::run::RunStore;

/// Default number of records held in memory per chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1_000_000;

/// Sort operation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortState {
    Idle,
    Chunking,
    Merging,
    /// Sorting finished, the final run is being moved to the destination.
    Done,
    /// Terminal failure state, the operation can't be resumed.
    Failed,
}

impl SortState {
    fn can_advance_to(self, next: SortState) -> bool {
        use SortState::*;

        match (self, next) {
            (Idle, Chunking) | (Chunking, Merging) | (Chunking, Done) | (Merging, Done) => true,
            (Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

struct Job {
    state: SortState,
}

impl Job {
    fn new() -> Self {
        Job {
            state: SortState::Idle,
        }
    }

    fn advance(&mut self, next: SortState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal sort state transition {:?} -> {:?}",
            self.state,
            next
        );
        log::debug!("sort state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Sort operation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSummary {
    /// Number of sorted records.
    pub records: u64,
    /// Number of runs created from input chunks.
    pub runs: usize,
    /// Number of merge passes.
    pub passes: usize,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
pub struct ExternalSorterBuilder<T = String, F = LineFormat, S = MergeSorter> {
    /// Maximum number of records held in memory.
    max_chunk_size: usize,
    /// Directory to be used to store temporary data.
    working_dir: Option<PathBuf>,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk sorting algorithm.
    sorter: S,

    /// Input item type.
    item_type: PhantomData<T>,
    /// Run format type.
    format_type: PhantomData<F>,
}

impl<T, F> ExternalSorterBuilder<T, F, MergeSorter> {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }
}

impl<T, F> Default for ExternalSorterBuilder<T, F, MergeSorter> {
    fn default() -> Self {
        ExternalSorterBuilder {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            working_dir: None,
            rw_buf_size: None,
            sorter: MergeSorter,
            item_type: PhantomData,
            format_type: PhantomData,
        }
    }
}

impl<T, F, S> ExternalSorterBuilder<T, F, S>
where
    F: RunFormat<T>,
    S: ChunkSorter<T>,
{
    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<T, F, S>, ConfigError> {
        ExternalSorter::new(
            self.max_chunk_size,
            self.working_dir.as_deref(),
            self.sorter,
            self.rw_buf_size,
        )
    }

    /// Sets maximum number of records to be held in memory.
    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> ExternalSorterBuilder<T, F, S> {
        self.max_chunk_size = max_chunk_size;
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_working_dir(mut self, path: &Path) -> ExternalSorterBuilder<T, F, S> {
        self.working_dir = Some(path.into());
        return self;
    }

    /// Sets run read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<T, F, S> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets chunk sorting algorithm.
    pub fn with_sorter<N: ChunkSorter<T>>(self, sorter: N) -> ExternalSorterBuilder<T, F, N> {
        ExternalSorterBuilder {
            max_chunk_size: self.max_chunk_size,
            working_dir: self.working_dir,
            rw_buf_size: self.rw_buf_size,
            sorter,
            item_type: PhantomData,
            format_type: PhantomData,
        }
    }
}

/// External sorter.
pub struct ExternalSorter<T = String, F = LineFormat, S = MergeSorter> {
    /// Input chunking configuration.
    producer: ChunkProducer,
    /// Directory to be used to store temporary data.
    working_dir: PathBuf,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Chunk sorting algorithm.
    sorter: S,

    /// Input item type.
    item_type: PhantomData<T>,
    /// Run format type.
    format_type: PhantomData<F>,
}

impl<T, F, S> ExternalSorter<T, F, S>
where
    F: RunFormat<T>,
    S: ChunkSorter<T>,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `max_chunk_size` - Maximum number of records held in memory, must be positive.
    /// * `working_dir` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used. The directory is created if it doesn't exist.
    /// * `sorter` - Chunk sorting algorithm.
    /// * `rw_buf_size` - Runs file read/write buffer size.
    pub fn new(
        max_chunk_size: usize,
        working_dir: Option<&Path>,
        sorter: S,
        rw_buf_size: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let producer = ChunkProducer::new(max_chunk_size)?;
        let working_dir = match working_dir {
            Some(working_dir) => working_dir.to_path_buf(),
            None => std::env::temp_dir(),
        };

        // the directory must accept a scratch directory
        RunStore::<T, F>::open(&working_dir, rw_buf_size)?
            .close()
            .map_err(|source| ConfigError::WorkingDir {
                path: working_dir.clone(),
                source,
            })?;

        return Ok(ExternalSorter {
            producer,
            working_dir,
            rw_buf_size,
            sorter,
            item_type: PhantomData,
            format_type: PhantomData,
        });
    }

    /// Sorts data from the input and saves the result to the destination.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `destination` - Result file path. It is replaced only if sorting succeeds.
    pub fn sort<I, E>(&self, input: I, destination: &Path) -> Result<SortSummary, SortError<E>>
    where
        T: Ord,
        E: Error + 'static,
        I: IntoIterator<Item = Result<T, E>>,
    {
        self.sort_by(input, destination, T::cmp)
    }

    /// Sorts data from the input using a custom compare function and saves the result to the destination.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `destination` - Result file path. It is replaced only if sorting succeeds.
    /// * `compare` - Function be be used to compare items
    pub fn sort_by<I, E, C>(&self, input: I, destination: &Path, compare: C) -> Result<SortSummary, SortError<E>>
    where
        E: Error + 'static,
        I: IntoIterator<Item = Result<T, E>>,
        C: Fn(&T, &T) -> Ordering + Sync,
    {
        let mut job = Job::new();

        let result = self.run(&mut job, input, destination, compare);
        if let Err(err) = &result {
            job.advance(SortState::Failed);
            log::debug!("external sort failed: {}", err);
        }

        return result;
    }

    fn run<I, E, C>(
        &self,
        job: &mut Job,
        input: I,
        destination: &Path,
        compare: C,
    ) -> Result<SortSummary, SortError<E>>
    where
        E: Error + 'static,
        I: IntoIterator<Item = Result<T, E>>,
        C: Fn(&T, &T) -> Ordering + Sync,
    {
        // dropping the store on any exit path removes all runs created so far
        let mut store = RunStore::<T, F>::open(&self.working_dir, self.rw_buf_size)?;

        job.advance(SortState::Chunking);
        let runs = self.producer.produce_runs(input, &mut store, &self.sorter, &compare)?;
        let records = runs.iter().filter_map(|&run| store.record_count(run)).sum();

        let mut summary = SortSummary {
            records,
            runs: runs.len(),
            passes: 0,
        };

        let final_run = if runs.len() > 1 {
            job.advance(SortState::Merging);
            let outcome = MergeEngine::new(&mut store).reduce_to_one(runs, &compare)?;
            summary.passes = outcome.passes;
            Some(outcome.run)
        } else {
            runs.first().copied()
        };

        job.advance(SortState::Done);
        match final_run {
            Some(run) => store.persist(run, destination),
            None => store.persist_empty(destination),
        }
        .during(Phase::Finalization)?;

        let scratch_dir = store.path().to_path_buf();
        if let Err(err) = store.close() {
            log::warn!("temporary directory {} not removed: {}", scratch_dir.display(), err);
        }

        log::info!(
            "external sort done ({} records, {} runs, {} merge passes)",
            summary.records,
            summary.runs,
            summary.passes
        );

        return Ok(summary);
    }
}
