//! Sorting errors.

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Sorting phase an I/O failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading the input and saving sorted chunks.
    Chunking,
    /// Merge pass with the given (1-based) index.
    Merge { pass: usize },
    /// Moving the final run to the destination.
    Finalization,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Chunking => write!(f, "chunking"),
            Phase::Merge { pass } => write!(f, "merge pass {}", pass),
            Phase::Finalization => write!(f, "finalization"),
        }
    }
}

/// Invalid sorter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Chunk size must hold at least one record.
    #[error("maximum chunk size must be a positive number of records")]
    ZeroChunkSize,
    /// Working directory can not be created or is not writable.
    #[error("working directory {} is not usable: {source}", .path.display())]
    WorkingDir { path: PathBuf, source: io::Error },
}

/// I/O failure tagged with the phase it happened in.
#[derive(Debug, Error)]
#[error("I/O operation failed during {phase}: {source}")]
pub struct IoFailure {
    pub phase: Phase,
    #[source]
    pub source: io::Error,
}

/// Sorting error.
#[derive(Debug, Error)]
pub enum SortError<E: Error + 'static> {
    /// Configuration rejected before any data was processed.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Input data stream error.
    #[error("input data stream error: {0}")]
    Input(#[source] E),
    /// Run or destination I/O error.
    #[error(transparent)]
    Io(#[from] IoFailure),
}

impl<E: Error + 'static> SortError<E> {
    /// Returns the phase the error happened in, if it is not a configuration error.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            SortError::Config(_) => None,
            SortError::Input(_) => Some(Phase::Chunking),
            SortError::Io(failure) => Some(failure.phase),
        }
    }
}

/// Attaches a sorting phase to I/O results.
pub trait PhaseContext<T> {
    fn during(self, phase: Phase) -> Result<T, IoFailure>;
}

impl<T> PhaseContext<T> for io::Result<T> {
    fn during(self, phase: Phase) -> Result<T, IoFailure> {
        self.map_err(|source| IoFailure { phase, source })
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, ErrorKind};

    use super::{ConfigError, IoFailure, Phase, PhaseContext, SortError};

    #[test]
    fn test_error_display() {
        let failure = Err::<(), _>(io::Error::new(ErrorKind::Other, "disk full"))
            .during(Phase::Merge { pass: 3 })
            .unwrap_err();
        assert_eq!(failure.to_string(), "I/O operation failed during merge pass 3: disk full");

        let err: SortError<io::Error> = ConfigError::ZeroChunkSize.into();
        assert_eq!(
            err.to_string(),
            "invalid configuration: maximum chunk size must be a positive number of records"
        );
        assert_eq!(err.phase(), None);
    }

    #[test]
    fn test_error_phase() {
        let err: SortError<io::Error> = SortError::Io(IoFailure {
            phase: Phase::Finalization,
            source: io::Error::new(ErrorKind::NotFound, "missing"),
        });
        assert_eq!(err.phase(), Some(Phase::Finalization));

        let err: SortError<io::Error> = SortError::Input(io::Error::new(ErrorKind::Other, "broken pipe"));
        assert_eq!(err.phase(), Some(Phase::Chunking));
        assert_eq!(err.to_string(), "input data stream error: broken pipe");
    }
}
