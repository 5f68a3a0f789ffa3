use std::thread;

use crate::config::Config;
use crate::error::SortError;
use crate::run::Run;

/// Merge a group of one or two runs into a single run.
///
/// A single run passes through untouched. Both inputs of a pair are discarded once merged.
pub fn merge_group(mut group: Vec<Run>, config: &Config) -> Result<Run, anyhow::Error> {
    match group.len() {
        1 => Ok(group.remove(0)),
        2 => {
            let right = group.remove(1);
            let left = group.remove(0);
            merge_pair(left, right, config)
        }
        n => Err(SortError::MergeArity(n).into()),
    }
}

/// Streaming two way merge. On equal records the left run goes first.
pub fn merge_pair(mut left: Run, mut right: Run, config: &Config) -> Result<Run, anyhow::Error> {
    log::debug!(
        "Merging runs {} ({} records) and {} ({} records), thread: {}",
        left.id(),
        left.len(),
        right.id(),
        right.len(),
        thread::current().name().unwrap_or("unnamed")
    );
    let mut merged = Run::create(config);

    loop {
        let take_left = match choose_left(left.peek()?, right.peek()?) {
            Some(take_left) => take_left,
            None => break,
        };
        let source = if take_left { &mut left } else { &mut right };
        if let Some(record) = source.advance()? {
            merged.append(&record)?;
        }
    }
    merged.seal()?;

    left.discard()?;
    right.discard()?;
    Ok(merged)
}

/// Which head goes next: `Some(true)` for the left one, `None` once both runs are exhausted.
fn choose_left(left: Option<&str>, right: Option<&str>) -> Option<bool> {
    match (left, right) {
        (Some(l), Some(r)) => Some(l <= r),
        (Some(_), None) => Some(true),
        (None, Some(_)) => Some(false),
        (None, None) => None,
    }
}
