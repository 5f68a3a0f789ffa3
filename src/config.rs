use std::path::PathBuf;

use crate::error::SortError;

/// Resolved settings shared by the engine, its runs and its workers.
#[derive(Clone, Debug)]
pub struct Config {
    tmp: PathBuf,
    tasks: usize,
    queue_size: usize,
    bulk_size: usize,
    line_separator: String,
}

impl Config {
    /// Create a config.
    ///
    /// # Arguments
    /// * `tmp` - root directory for intermediate runs. It is cleared before every sort, so it
    ///   must be dedicated to a single sort at a time
    /// * `tasks` - number of concurrent merge workers
    /// * `bulk_size` - number of records in each initial run
    /// * `line_separator` - the string terminating every record
    pub fn new(tmp: PathBuf, tasks: usize, bulk_size: usize, line_separator: String) -> Config {
        let queue_size = 4096;
        Config {
            tmp,
            tasks,
            queue_size,
            bulk_size,
            line_separator,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), SortError> {
        if self.tasks == 0 {
            Err(SortError::InvalidConfig("tasks must be at least 1".to_string()))
        } else if self.bulk_size == 0 {
            Err(SortError::InvalidConfig("bulk size must be at least 1".to_string()))
        } else if self.line_separator.is_empty() {
            Err(SortError::InvalidConfig("line separator must not be empty".to_string()))
        } else {
            Ok(())
        }
    }

    pub fn tmp(&self) -> &PathBuf {
        &self.tmp
    }

    pub fn tasks(&self) -> usize {
        self.tasks
    }

    pub(crate) fn queue_size(&self) -> usize {
        self.queue_size
    }

    pub fn bulk_size(&self) -> usize {
        self.bulk_size
    }

    pub fn line_separator(&self) -> &str {
        &self.line_separator
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::config::Config;
    use crate::error::SortError;

    #[test]
    fn test_validate() {
        let valid = Config::new(PathBuf::from("tmp"), 2, 10, "\n".to_string());
        assert!(valid.validate().is_ok());

        let no_tasks = Config::new(PathBuf::from("tmp"), 0, 10, "\n".to_string());
        assert!(matches!(no_tasks.validate(), Err(SortError::InvalidConfig(_))));

        let no_bulk = Config::new(PathBuf::from("tmp"), 2, 0, "\n".to_string());
        assert!(matches!(no_bulk.validate(), Err(SortError::InvalidConfig(_))));

        let no_separator = Config::new(PathBuf::from("tmp"), 2, 10, String::new());
        assert!(matches!(no_separator.validate(), Err(SortError::InvalidConfig(_))));
    }
}
