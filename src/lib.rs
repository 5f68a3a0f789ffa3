//! This crate sorts text files that do not fit in memory using an external merge sort.
//!
//! The input is a text file of records, one per line, each terminated by a known separator.
//! Records are compared lexicographically. The sort runs in two phases:
//!
//! * the input is split into bulks of a configurable number of records, each bulk is sorted in
//!   memory and written to the temporary directory as a run
//! * runs are merged in adjacent pairs, level by level, until a single run remains. The pairs of a
//!   level are merged concurrently by a pool of worker threads, and a level completes before the
//!   next one starts
//!
//! Each merge streams both input runs one record at a time, so memory use during merging does not
//! depend on the size of the input. The last run is moved to the output path.
//!
//! # Examples
//! ```
//! use std::path::PathBuf;
//! use text_file_merge_sort::sort::Sort;
//!
//! fn sort_lines(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
//!     let mut text_file_sort = Sort::new(input, output);
//!
//!     // set the number of concurrent merge workers. The default is to use all available cores.
//!     // Each worker keeps three files open.
//!     text_file_sort.with_tasks(2);
//!
//!     // set the number of records in each initial run. A bulk is held in memory while it is
//!     // sorted.
//!     text_file_sort.with_bulk_size(1_000_000);
//!
//!     // set the directory for intermediate runs. It is cleared before sorting, so it must be
//!     // dedicated to a single sort. For large files it is recommended to place it on the same
//!     // file system as the output.
//!     text_file_sort.with_tmp_dir(tmp);
//!
//!     text_file_sort.sort()
//! }
//! ```
//!

pub(crate) mod bulk_iterator;
pub(crate) mod merge_command;
pub(crate) mod record;

pub mod config;
pub mod engine;
pub mod error;
pub mod generator;
pub mod merge;
pub mod run;
pub mod sort;
