use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use command_executor::command::Command;
use command_executor::shutdown_mode::ShutdownMode;
use command_executor::thread_pool_builder::ThreadPoolBuilder;
use rand::Rng;

use crate::error::SortError;

const SYMBOLS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";
const MAX_BULK_SIZE: usize = 100_000;

type SharedWriter = Arc<Mutex<BufWriter<File>>>;
type FirstFailure = Arc<Mutex<Option<anyhow::Error>>>;

/// Generate a text file of random records, for example as input for a sort.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use text_file_merge_sort::generator::Generator;
///
/// fn generate(output: PathBuf) -> Result<(), anyhow::Error> {
///     let mut generator = Generator::new(output, 32);
///     generator.with_tasks(2);
///     generator.generate(10_000)
/// }
/// ```
pub struct Generator {
    path: PathBuf,
    max_record_len: usize,
    tasks: usize,
    line_separator: String,
}

impl Generator {
    /// Create a generator writing records of 1 to `max_record_len` characters into `path`
    pub fn new(path: PathBuf, max_record_len: usize) -> Generator {
        Generator {
            path,
            max_record_len,
            tasks: 0,
            line_separator: "\n".to_string(),
        }
    }

    /// Set the number of generating threads. The default is zero which will result in using all
    /// system cores
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Set the record separator. The default is "\n"
    pub fn with_line_separator(&mut self, line_separator: &str) {
        self.line_separator = line_separator.to_string();
    }

    /// Replace the file at the generator path with exactly `records` random records
    pub fn generate(&self, records: usize) -> Result<(), anyhow::Error> {
        if self.max_record_len == 0 {
            return Err(SortError::InvalidConfig("max record length must be at least 1".to_string()).into());
        }
        if self.line_separator.is_empty() {
            return Err(SortError::InvalidConfig("line separator must not be empty".to_string()).into());
        }
        let symbols: Vec<u8> = SYMBOLS
            .iter()
            .copied()
            .filter(|symbol| !self.line_separator.as_bytes().contains(symbol))
            .collect();

        let tasks = if self.tasks == 0 { num_cpus::get() } else { self.tasks };
        let bulk_size = (records / tasks + usize::from(records % tasks != 0)).clamp(1, MAX_BULK_SIZE);
        log::info!("Generating {} records into {}, {} tasks", records, self.path.display(), tasks);

        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| anyhow!("remove: {}", self.path.display()))?;
        }
        let file = File::create(&self.path)
            .with_context(|| anyhow!("create: {}", self.path.display()))?;
        let writer: SharedWriter = Arc::new(Mutex::new(BufWriter::new(file)));
        let failure: FirstFailure = Arc::new(Mutex::new(None));

        let mut thread_pool_builder = ThreadPoolBuilder::new();
        let mut generating_pool = thread_pool_builder
            .with_name("generating".to_string())
            .with_tasks(tasks)
            .with_queue_size(tasks * 2)
            .with_shutdown_mode(ShutdownMode::CompletePending)
            .build()?;

        let mut remaining = records;
        while remaining > 0 {
            let lines = remaining.min(bulk_size);
            let generate_command = Box::new(
                GenerateCommand {
                    path: self.path.clone(),
                    lines,
                    max_record_len: self.max_record_len,
                    symbols: symbols.clone(),
                    line_separator: self.line_separator.clone(),
                    writer: writer.clone(),
                    failure: failure.clone(),
                }
            );
            generating_pool.submit(generate_command);
            remaining -= lines;
        }
        generating_pool.shutdown();
        generating_pool.join()?;

        if let Some(e) = failure.lock().map_err(|_| anyhow!("failure lock poisoned"))?.take() {
            return Err(e);
        }
        writer
            .lock()
            .map_err(|_| anyhow!("writer lock poisoned"))?
            .flush()
            .with_context(|| anyhow!("flush: {}", self.path.display()))?;
        log::info!("Finished generating {}", self.path.display());
        Ok(())
    }
}

struct GenerateCommand {
    path: PathBuf,
    lines: usize,
    max_record_len: usize,
    symbols: Vec<u8>,
    line_separator: String,
    writer: SharedWriter,
    failure: FirstFailure,
}

impl GenerateCommand {
    fn generate_bulk(&self) -> String {
        let mut rng = rand::thread_rng();
        let mut bulk = String::with_capacity(self.lines * (self.max_record_len / 2 + 2));
        for _ in 0..self.lines {
            let len = rng.gen_range(1..=self.max_record_len);
            for _ in 0..len {
                bulk.push(self.symbols[rng.gen_range(0..self.symbols.len())] as char);
            }
            bulk.push_str(&self.line_separator);
        }
        bulk
    }

    fn write_bulk(&self, bulk: &str, path: &Path) -> Result<(), anyhow::Error> {
        self.writer
            .lock()
            .map_err(|_| anyhow!("writer lock poisoned"))?
            .write_all(bulk.as_bytes())
            .with_context(|| anyhow!("write: {}", path.display()))
    }
}

impl Command for GenerateCommand {
    fn execute(&self) -> Result<(), anyhow::Error> {
        let bulk = self.generate_bulk();
        if let Err(e) = self.write_bulk(&bulk, &self.path) {
            log::error!("Failed to write {} generated records: {:#}", self.lines, e);
            if let Ok(mut failure) = self.failure.lock() {
                failure.get_or_insert(e);
            }
        }
        Ok(())
    }
}
