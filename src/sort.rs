use std::cmp::{max, min};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::Context;
use rlimit::{getrlimit, Resource, setrlimit};

use crate::config::Config;
use crate::engine;
use crate::error::SortError;
use crate::record::read_record;

/// Sort a text file of separator terminated records
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use text_file_merge_sort::sort::Sort;
///
/// fn sort_lines(input: PathBuf, output: PathBuf, tmp: PathBuf) -> Result<(), anyhow::Error> {
///     let mut text_file_sort = Sort::new(input, output);
///     // number of concurrent merge workers. The default is to use all available cores.
///     text_file_sort.with_tasks(2);
///     // records held in memory while creating each initial run
///     text_file_sort.with_bulk_size(100_000);
///     // directory for intermediate runs, cleared before the sort starts. Preferably on the same
///     // file system as the output.
///     text_file_sort.with_tmp_dir(tmp);
///     text_file_sort.sort()
/// }
/// ```
pub struct Sort {
    input: PathBuf,
    output: PathBuf,
    tmp: PathBuf,
    tasks: usize,
    bulk_size: usize,
    line_separator: String,
}

impl Sort {
    /// Create a default Sort definition.
    ///
    /// * intermediate runs are kept in `text-file-merge-sort` under std::env::temp_dir()
    /// * all available cores are used for merging
    /// * each initial run holds up to 1,000,000 records
    /// * records are terminated by '\n'
    ///
    /// The Sort implementation will increase the file descriptor rlimit to accommodate the
    /// files opened by concurrent merges
    pub fn new(input: PathBuf, output: PathBuf) -> Sort {
        Sort {
            input,
            output,
            tmp: std::env::temp_dir().join("text-file-merge-sort"),
            tasks: 0,
            bulk_size: 1_000_000,
            line_separator: "\n".to_string(),
        }
    }

    /// Set directory for intermediate runs. Its content is removed before sorting, so it must not
    /// be shared with other sorts running at the same time.
    pub fn with_tmp_dir(&mut self, tmp: PathBuf) {
        self.tmp = tmp;
    }

    /// Set the number of merge workers. The default is zero which will result in using all
    /// system cores
    pub fn with_tasks(&mut self, tasks: usize) {
        self.tasks = tasks;
    }

    /// Set the number of records in each initial run
    pub fn with_bulk_size(&mut self, bulk_size: usize) {
        self.bulk_size = bulk_size;
    }

    /// Set the record separator. The default is "\n"
    pub fn with_line_separator(&mut self, line_separator: &str) {
        self.line_separator = line_separator.to_string();
    }

    /// Sort the input into the output
    pub fn sort(&self) -> Result<(), anyhow::Error> {
        let config = self.create_config();
        config.validate()?;
        let (current_soft, current_hard) = Self::get_rlimits()?;
        log::info!("Current rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        // two readers and one writer per merge worker
        let new_soft = min(max((config.tasks() * 3 + 256) as u64, current_soft), current_hard);
        log::info!("Set new rlimit NOFILE, soft: {}, hard: {}", new_soft, current_hard);
        Self::set_rlimits(new_soft, current_hard)?;
        let result = engine::sort_file(&self.input, &self.output, &config);
        log::info!("Restore rlimit NOFILE, soft: {}, hard: {}", current_soft, current_hard);
        let restored = Self::set_rlimits(current_soft, current_hard);
        Self::first_error(result, restored)
    }

    /// Check that the input is sorted in ascending order
    pub fn check(&self) -> Result<bool, anyhow::Error> {
        let config = self.create_config();
        config.validate()?;
        if !self.input.exists() {
            return Err(SortError::InputNotFound(self.input.clone()).into());
        }

        let file = File::open(&self.input)
            .with_context(|| format!("path: {}", self.input.display()))?;
        let mut reader = BufReader::new(file);
        let mut previous: Option<String> = None;
        while let Some(current) = read_record(&mut reader, config.line_separator(), &self.input)? {
            if let Some(previous) = &previous {
                if previous > &current {
                    return Ok(false);
                }
            }
            previous = Some(current);
        }
        Ok(true)
    }

    fn get_rlimits() -> Result<(u64, u64), anyhow::Error> {
        getrlimit(Resource::NOFILE).with_context(|| "getrlimit")
    }

    fn set_rlimits(soft: u64, hard: u64) -> Result<(), anyhow::Error> {
        setrlimit(Resource::NOFILE, soft, hard)
            .with_context(|| format!("set rlimit NOFILE, soft: {}, hard: {}", soft, hard))?;
        Ok(())
    }

    /// The sort outcome wins over a failed rlimit restore, which is only logged in that case.
    fn first_error(result: Result<(), anyhow::Error>, restored: Result<(), anyhow::Error>) -> Result<(), anyhow::Error> {
        match (result, restored) {
            (Err(e), Err(restore_error)) => {
                log::error!("{:#}", restore_error);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), restored) => restored,
        }
    }

    fn create_config(&self) -> Config {
        let mut tasks = self.tasks;
        if self.tasks == 0 {
            tasks = num_cpus::get();
        }

        Config::new(
            self.tmp.clone(),
            tasks,
            self.bulk_size,
            self.line_separator.clone(),
        )
    }
}
