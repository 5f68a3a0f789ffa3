//! The two phases of the external sort.
//!
//! [initial_sort] splits the input into sorted runs of at most `bulk_size` records.
//! [external_sort] merges adjacent pairs of runs level by level, in parallel within a level,
//! until a single run remains. [sort_file] chains both and moves the result into place.

use std::cmp::{max, min};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;

use crate::bulk_iterator::BulkIterator;
use crate::config::Config;
use crate::error::SortError;
use crate::merge::merge_group;
use crate::merge_command::{MergeCommand, MergeSlots};
use crate::run::Run;

/// Sort `input` into `output` using `config`. An empty input produces an empty output.
pub fn sort_file(input: &Path, output: &Path, config: &Config) -> Result<(), anyhow::Error> {
    log::info!("Start sorting {}", input.display());
    let runs = initial_sort(input, config)?;
    let sorted = external_sort(runs, config)?;
    sorted.finalize(output)?;
    log::info!("Finish sorting {} into {}", input.display(), output.display());
    Ok(())
}

/// Clear or create the temporary root so no state leaks from a previous sort.
pub fn prepare_tmp(config: &Config) -> Result<(), anyhow::Error> {
    let tmp = config.tmp();
    if tmp.exists() {
        let mut removed = 0;
        for entry in fs::read_dir(tmp).with_context(|| anyhow!("read dir: {}", tmp.display()))? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)
                    .with_context(|| anyhow!("remove stale dir: {}", path.display()))?;
            } else {
                fs::remove_file(&path)
                    .with_context(|| anyhow!("remove stale file: {}", path.display()))?;
            }
            removed += 1;
        }
        if removed > 0 {
            log::warn!("Removed {} stale entries from {}", removed, tmp.display());
        }
    } else {
        fs::create_dir_all(tmp)
            .with_context(|| anyhow!("create dir: {}", tmp.display()))?;
    }
    Ok(())
}

/// Split `input` into sorted runs of at most `bulk_size` records, in input order.
///
/// Fails with [SortError::InputNotFound] before touching the temporary root when the input is
/// missing.
pub fn initial_sort(input: &Path, config: &Config) -> Result<Vec<Run>, anyhow::Error> {
    config.validate()?;
    if !input.exists() {
        return Err(SortError::InputNotFound(input.to_path_buf()).into());
    }
    prepare_tmp(config)?;

    let mut runs = Vec::new();
    for bulk in BulkIterator::new(input, config.bulk_size(), config.line_separator())? {
        let mut run = Run::create(config);
        run.write_bulk(bulk?)?;
        runs.push(run);
    }
    log::info!(
        "Split {} into {} sorted runs of up to {} records",
        input.display(),
        runs.len(),
        config.bulk_size()
    );
    Ok(runs)
}

/// Merge `runs` until one is left. No runs yield an empty, unwritten run.
pub fn external_sort(mut runs: Vec<Run>, config: &Config) -> Result<Run, anyhow::Error> {
    config.validate()?;
    let mut level = 0;
    while runs.len() > 1 {
        let before = runs.len();
        runs = merge_level(runs, config)?;
        log::info!("Merge level {}: {} runs have been merged into {}", level, before, runs.len());
        level += 1;
    }
    log::info!("Finished merging after {} levels", level);
    Ok(runs.pop().unwrap_or_else(|| Run::create(config)))
}

/// Run one merge level.
///
/// Adjacent runs are paired in order and each pair is merged on the worker pool. A trailing
/// unpaired run is carried over as is. Returns after every merge of the level has finished,
/// with the output runs in pairing order. Any failed merge fails the level.
pub fn merge_level(runs: Vec<Run>, config: &Config) -> Result<Vec<Run>, anyhow::Error> {
    let groups = pair_runs(runs);
    let pairs = groups.iter().filter(|group| group.len() == 2).count();
    let slots: MergeSlots = Arc::new(Mutex::new((0..groups.len()).map(|_| None).collect()));

    let mut thread_pool_builder = ThreadPoolBuilder::new();
    let mut merging_pool = thread_pool_builder
        .with_name("merging".to_string())
        .with_tasks(max(1, min(config.tasks(), pairs)))
        .with_queue_size(config.queue_size())
        .with_shutdown_mode(ShutdownMode::CompletePending)
        .build()?;

    for (index, group) in groups.into_iter().enumerate() {
        if group.len() == 2 {
            let merge_command = Box::new(MergeCommand::new(index, group, config.clone(), slots.clone()));
            merging_pool.submit(merge_command);
        } else {
            let passthrough = merge_group(group, config);
            let mut guard = slots.lock().map_err(|_| anyhow!("merge results lock poisoned"))?;
            guard[index] = Some(passthrough);
        }
    }

    merging_pool.shutdown();
    let joined = merging_pool.join();

    let results = {
        let mut guard = slots.lock().map_err(|_| anyhow!("merge results lock poisoned"))?;
        std::mem::take(&mut *guard)
    };
    let mut merged = Vec::with_capacity(results.len());
    let mut failure = None;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Some(Ok(run)) => merged.push(run),
            Some(Err(e)) => {
                failure.get_or_insert(e);
            }
            None => {
                failure.get_or_insert(anyhow!("merge of group {} did not complete", index));
            }
        }
    }
    if let Some(e) = failure {
        // dropping the surviving runs removes their files
        return Err(e);
    }
    joined?;
    Ok(merged)
}

fn pair_runs(runs: Vec<Run>) -> Vec<Vec<Run>> {
    let mut groups = Vec::with_capacity((runs.len() + 1) / 2);
    let mut runs = runs.into_iter();
    while let Some(left) = runs.next() {
        match runs.next() {
            Some(right) => groups.push(vec![left, right]),
            None => groups.push(vec![left]),
        }
    }
    groups
}
