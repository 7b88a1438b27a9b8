//! Chunk producer. Cuts the input into bounded chunks and saves every chunk as a sorted run.

use std::cmp::Ordering;
use std::error::Error;
use std::io;

use crate::algorithm::ChunkSorter;
use crate::buffer::LimitedBuffer;
use crate::error::{ConfigError, Phase, PhaseContext, SortError};
use crate::format::RunFormat;
use crate::run::{RunHandle, RunStore};

/// Chunk producer.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProducer {
    max_chunk_size: usize,
}

impl ChunkProducer {
    /// Creates a chunk producer holding at most `max_chunk_size` records in memory.
    pub fn new(max_chunk_size: usize) -> Result<Self, ConfigError> {
        if max_chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        return Ok(ChunkProducer { max_chunk_size });
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Reads the input to the end and returns the sorted runs in input order.
    /// An empty input produces no runs.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `store` - Store the runs are saved to
    /// * `sorter` - Chunk sorting algorithm
    /// * `compare` - Function be be used to compare items
    pub fn produce_runs<T, E, I, F, S, C>(
        &self,
        input: I,
        store: &mut RunStore<T, F>,
        sorter: &S,
        compare: &C,
    ) -> Result<Vec<RunHandle>, SortError<E>>
    where
        E: Error + 'static,
        I: IntoIterator<Item = Result<T, E>>,
        F: RunFormat<T>,
        S: ChunkSorter<T>,
        C: Fn(&T, &T) -> Ordering + Sync,
    {
        let mut chunk_buf = LimitedBuffer::new(self.max_chunk_size);
        let mut runs = Vec::new();

        for item in input.into_iter() {
            chunk_buf.push(item.map_err(SortError::Input)?);

            if chunk_buf.is_full() {
                let run = save_chunk(RunHandle::new(0, runs.len()), &mut chunk_buf, store, sorter, compare)
                    .during(Phase::Chunking)?;
                runs.push(run);
            }
        }

        if !chunk_buf.is_empty() {
            let run = save_chunk(RunHandle::new(0, runs.len()), &mut chunk_buf, store, sorter, compare)
                .during(Phase::Chunking)?;
            runs.push(run);
        }

        log::debug!("external sort preparation done ({} runs)", runs.len());

        return Ok(runs);
    }
}

fn save_chunk<T, F, S, C>(
    handle: RunHandle,
    chunk_buf: &mut LimitedBuffer<T>,
    store: &mut RunStore<T, F>,
    sorter: &S,
    compare: &C,
) -> io::Result<RunHandle>
where
    F: RunFormat<T>,
    S: ChunkSorter<T>,
    C: Fn(&T, &T) -> Ordering + Sync,
{
    log::debug!("sorting chunk data ({} records) ...", chunk_buf.len());
    sorter.sort_by(chunk_buf.items_mut(), compare);

    log::debug!("saving chunk data");
    return store.create_run(handle, chunk_buf.drain());
}
