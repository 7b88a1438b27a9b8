//! `ext-merge-sort` is a rust external merge sort implementation.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. The input is cut into chunks that fit in RAM,
//! every chunk is sorted and saved as a sorted run, then runs are merged pairwise, pass by pass, until a single
//! sorted run is left. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Bounded memory:**
//!   no more than one chunk of records is held in memory while chunking, and a merge keeps only one record
//!   per merged run.
//! * **Deterministic:**
//!   merges are left-biased, equal records keep their input order when the chunk sorter is stable.
//! * **Pluggable chunk sorting:**
//!   merge sort, quicksort, the standard library sort or a multi-threaded sort, or your own [`ChunkSorter`].
//! * **Format agnostic:**
//!   runs are newline delimited text by default, `MessagePack` is available for any `serde` type,
//!   or implement your own [`RunFormat`].
//! * **Clean:**
//!   temporary runs live in a private directory which is removed when sorting finishes or fails.
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io::{self, prelude::*};
//! use std::path;
//!
//! use log;
//!
//! use ext_merge_sort::{ExternalSorter, ExternalSorterBuilder};
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_working_dir(path::Path::new("./sorting_run"))
//!         .with_max_chunk_size(100_000)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter.sort(input_reader.lines(), path::Path::new("output.txt")).unwrap();
//!     log::info!("{} records sorted", summary.records);
//! }
//! ```

pub mod algorithm;
pub mod buffer;
pub mod chunk;
pub mod error;
pub mod format;
pub mod merger;
pub mod run;
pub mod sort;
pub mod source;

pub use algorithm::{ChunkSorter, MergeSorter, ParallelSorter, QuickSorter, StdSorter};
pub use buffer::LimitedBuffer;
pub use chunk::ChunkProducer;
pub use error::{ConfigError, IoFailure, Phase, SortError};
pub use format::{LineFormat, RmpFormat, RunFormat};
pub use merger::{MergeEngine, MergeOutcome, TwoWayMerger};
pub use run::{RunHandle, RunStore};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortState, SortSummary, DEFAULT_MAX_CHUNK_SIZE};
