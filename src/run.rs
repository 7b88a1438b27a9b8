//! Run store. Persists sorted runs in a private scratch directory and owns their lifecycle.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, prelude::*};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::format::RunFormat;

const SCRATCH_PREFIX: &str = ".ext-merge-sort-";
const STAGING_PREFIX: &str = ".ext-merge-sort-staged-";

/// Run identifier: the pass that produced the run and its sequence number within that pass.
/// Runs created from input chunks belong to pass `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunHandle {
    pub pass: usize,
    pub seq: usize,
}

impl RunHandle {
    pub fn new(pass: usize, seq: usize) -> Self {
        RunHandle { pass, seq }
    }

    fn file_name(&self) -> String {
        format!("pass-{:04}-run-{:06}.run", self.pass, self.seq)
    }
}

impl fmt::Display for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}.{}", self.pass, self.seq)
    }
}

/// Run store. The only component allowed to create or delete run files.
///
/// Every store works in its own uniquely named scratch directory created inside the working
/// directory, so handles never collide between stores. The scratch directory and everything
/// left in it is removed by [`RunStore::close`] or, best-effort, when the store is dropped.
pub struct RunStore<T, F> {
    /// Scratch directory, taken on close.
    dir: Option<tempfile::TempDir>,
    root: PathBuf,
    /// Run file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Committed runs and their record counts.
    live: BTreeMap<RunHandle, u64>,

    item_type: PhantomData<T>,
    format_type: PhantomData<F>,
}

impl<T, F> RunStore<T, F>
where
    F: RunFormat<T>,
{
    /// Creates a run store inside the working directory. The working directory is created if absent.
    ///
    /// # Arguments
    /// * `working_dir` - Directory the scratch directory is created in
    /// * `rw_buf_size` - Run file read/write buffer size
    pub fn open(working_dir: &Path, rw_buf_size: Option<usize>) -> Result<Self, ConfigError> {
        let dir = fs::create_dir_all(working_dir)
            .and_then(|_| tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir_in(working_dir))
            .map_err(|source| ConfigError::WorkingDir {
                path: working_dir.to_path_buf(),
                source,
            })?;

        log::info!("using {} as a temporary directory", dir.path().display());

        return Ok(RunStore {
            root: dir.path().to_path_buf(),
            dir: Some(dir),
            rw_buf_size,
            live: BTreeMap::new(),
            item_type: PhantomData,
            format_type: PhantomData,
        });
    }

    /// Scratch directory path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn run_path(&self, handle: RunHandle) -> PathBuf {
        self.root.join(handle.file_name())
    }

    /// Writes a sorted sequence of items as a new run.
    pub fn create_run(&mut self, handle: RunHandle, items: impl IntoIterator<Item = T>) -> io::Result<RunHandle> {
        let mut writer = self.create_writer(handle)?;
        for item in items.into_iter() {
            writer.push(&item)?;
        }

        return self.commit(writer);
    }

    /// Creates a writer for a new run. The run becomes live once the writer is committed.
    pub fn create_writer(&self, handle: RunHandle) -> io::Result<RunWriter<T, F>> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.run_path(handle))?;

        let writer = match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        return Ok(RunWriter {
            handle,
            writer,
            records: 0,
            item_type: PhantomData,
            format_type: PhantomData,
        });
    }

    /// Flushes the writer and registers its run.
    pub fn commit(&mut self, writer: RunWriter<T, F>) -> io::Result<RunHandle> {
        let RunWriter {
            handle,
            mut writer,
            records,
            ..
        } = writer;
        writer.flush()?;

        log::trace!("{} saved ({} records)", handle, records);
        self.live.insert(handle, records);

        return Ok(handle);
    }

    /// Opens a live run for sequential reading.
    pub fn open_run(&self, handle: RunHandle) -> io::Result<RunReader<T, F>> {
        let file = fs::File::open(self.run_path(handle))?;
        let reader = match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(RunReader {
            reader,
            done: false,
            item_type: PhantomData,
            format_type: PhantomData,
        });
    }

    /// Number of records in a live run.
    pub fn record_count(&self, handle: RunHandle) -> Option<u64> {
        self.live.get(&handle).copied()
    }

    /// Handles of all live runs in ascending order.
    pub fn live_runs(&self) -> Vec<RunHandle> {
        self.live.keys().copied().collect()
    }

    /// Deletes a run. Deleting an absent run is not an error.
    pub fn delete(&mut self, handle: RunHandle) -> io::Result<()> {
        self.live.remove(&handle);
        match fs::remove_file(self.run_path(handle)) {
            Ok(()) => {
                log::trace!("{} deleted", handle);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Moves a run to the destination. The destination is replaced atomically: it is either left
    /// untouched or holds the complete run.
    pub fn persist(&mut self, handle: RunHandle, destination: &Path) -> io::Result<()> {
        let path = self.run_path(handle);

        if let Err(err) = fs::rename(&path, destination) {
            log::debug!("{} can't be renamed to the destination ({}), copying", handle, err);

            copy_persist(&path, destination)?;
            fs::remove_file(&path)?;
        }

        self.live.remove(&handle);
        log::trace!("{} moved to {}", handle, destination.display());

        return Ok(());
    }

    /// Replaces the destination with an empty file. The file is committed as an empty run and then
    /// moved like any other run.
    pub fn persist_empty(&mut self, destination: &Path) -> io::Result<()> {
        let handle = match self.live.keys().next_back() {
            Some(last) => RunHandle::new(last.pass + 1, 0),
            None => RunHandle::new(0, 0),
        };
        let writer = self.create_writer(handle)?;
        let handle = self.commit(writer)?;

        return self.persist(handle, destination);
    }

    /// Removes the scratch directory with all leftover runs.
    pub fn close(mut self) -> io::Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close(),
            None => Ok(()),
        }
    }
}

impl<T, F> Drop for RunStore<T, F> {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if !self.live.is_empty() {
                log::debug!("removing {} leftover runs", self.live.len());
            }
            if let Err(err) = dir.close() {
                log::warn!("temporary directory {} not removed: {}", self.root.display(), err);
            }
        }
    }
}

/// Creates a temporary file next to the destination so it can be persisted with a rename.
fn stage(destination: &Path) -> io::Result<tempfile::NamedTempFile> {
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    tempfile::Builder::new().prefix(STAGING_PREFIX).tempfile_in(parent)
}

/// Copies a file to the destination through a staged file. The destination gets the permissions of
/// the source file and is replaced only when the copy is complete.
fn copy_persist(path: &Path, destination: &Path) -> io::Result<()> {
    let mut source = fs::File::open(path)?;
    let mut staged = stage(destination)?;
    io::copy(&mut source, staged.as_file_mut())?;
    staged.as_file().set_permissions(source.metadata()?.permissions())?;
    staged.persist(destination).map_err(|err| err.error)?;

    return Ok(());
}

/// Streaming run writer.
pub struct RunWriter<T, F> {
    handle: RunHandle,
    writer: io::BufWriter<fs::File>,
    records: u64,

    item_type: PhantomData<T>,
    format_type: PhantomData<F>,
}

impl<T, F> RunWriter<T, F>
where
    F: RunFormat<T>,
{
    /// Appends a record to the run.
    pub fn push(&mut self, item: &T) -> io::Result<()> {
        F::encode(&mut self.writer, item)?;
        self.records += 1;

        return Ok(());
    }

    pub fn handle(&self) -> RunHandle {
        self.handle
    }
}

/// Sequential run reader.
pub struct RunReader<T, F> {
    reader: io::BufReader<fs::File>,
    done: bool,

    item_type: PhantomData<T>,
    format_type: PhantomData<F>,
}

impl<T, F> Iterator for RunReader<T, F>
where
    F: RunFormat<T>,
{
    type Item = io::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = F::decode(&mut self.reader).transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }

        return item;
    }
}
