use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::anyhow;
use command_executor::command::Command;

use crate::config::Config;
use crate::merge::merge_group;
use crate::run::Run;

/// Per level results, indexed by the position of the group in the pairing order.
pub(crate) type MergeSlots = Arc<Mutex<Vec<Option<Result<Run, anyhow::Error>>>>>;

/// Merges one group of runs on a pool thread.
///
/// The command owns its input runs until it executes. Both the merged run and any failure are
/// delivered through the shared slot, never through the pool.
pub(crate) struct MergeCommand {
    index: usize,
    group: Mutex<Option<Vec<Run>>>,
    config: Config,
    slots: MergeSlots,
}

impl MergeCommand {
    pub(crate) fn new(index: usize, group: Vec<Run>, config: Config, slots: MergeSlots) -> MergeCommand {
        MergeCommand {
            index,
            group: Mutex::new(Some(group)),
            config,
            slots,
        }
    }

    fn take_group(&self) -> Result<Vec<Run>, anyhow::Error> {
        self.group
            .lock()
            .map_err(|_| anyhow!("merge group {} lock poisoned", self.index))?
            .take()
            .ok_or_else(|| anyhow!("merge group {} was already merged", self.index))
    }
}

impl Command for MergeCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        let result = self.take_group()
            .and_then(|group| merge_group(group, &self.config));
        if let Err(e) = &result {
            log::error!(
                "Failed to merge group {}, thread: {}, error: {:#}",
                self.index,
                thread::current().name().unwrap_or("unnamed"),
                e
            );
        }

        let mut slots = self.slots
            .lock()
            .map_err(|_| anyhow!("merge results lock poisoned"))?;
        slots[self.index] = Some(result);
        Ok(())
    }
}
