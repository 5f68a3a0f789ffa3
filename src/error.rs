use std::path::PathBuf;

use thiserror::Error;

/// Failures a caller may want to tell apart from plain I/O errors.
///
/// Library operations return [anyhow::Error]; these variants can be recovered with
/// `error.downcast_ref::<SortError>()`. Any other error in the chain is an I/O failure of the
/// underlying storage, annotated with the path and action that failed.
#[derive(Error, Debug)]
pub enum SortError {
    /// The file to sort does not exist. Reported before any temporary state is created.
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    /// A run claims to hold more records than its storage contains.
    #[error("run {run} expected {remaining} more record(s) but its storage is exhausted")]
    StorageInvariantViolation { run: String, remaining: usize },

    /// A merge step received a group that is neither a pair nor a passthrough.
    #[error("expected 1 or 2 runs to merge but got {0}")]
    MergeArity(usize),

    /// A run was written or read outside of its lifecycle.
    #[error("run {run}: {reason}")]
    RunState { run: String, reason: &'static str },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A record that contains the line separator, or ends with a part of it that would merge
    /// with the separator written after it.
    #[error("record in {} cannot be terminated by the line separator", .path.display())]
    SeparatorInRecord { path: PathBuf },

    /// The file contains bytes that are not valid UTF-8.
    #[error("not a text file: {}", .path.display())]
    InvalidRecord { path: PathBuf },
}
