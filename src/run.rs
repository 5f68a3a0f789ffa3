use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use data_encoding::HEXLOWER;

use crate::config::Config;
use crate::error::SortError;
use crate::record::{is_framed, read_record};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Phase {
    Fresh,
    Bulk,
    Append,
    Read,
}

#[derive(Debug)]
enum Head {
    Vacant,
    Cached(String),
}

/// A sorted sequence of records persisted as a single file under the temporary root.
///
/// A run is written once, either by [Run::write_bulk] or by repeated [Run::append], and is then
/// read front to back with [Run::peek] and [Run::advance]. It ends its life either with
/// [Run::discard] or with [Run::finalize]. A run dropped without either removes its file.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use text_file_merge_sort::config::Config;
/// use text_file_merge_sort::run::Run;
///
/// fn first(tmp: PathBuf) -> Result<Option<String>, anyhow::Error> {
///     std::fs::create_dir_all(&tmp)?;
///     let config = Config::new(tmp, 1, 16, "\n".to_string());
///     let mut run = Run::create(&config);
///     run.write_bulk(vec!["b".to_string(), "a".to_string()])?;
///     let first = run.peek()?.map(|record| record.to_string());
///     run.discard()?;
///     Ok(first)
/// }
/// ```
#[derive(Debug)]
pub struct Run {
    id: String,
    path: PathBuf,
    separator: String,
    phase: Phase,
    written: usize,
    consumed: usize,
    writer: Option<BufWriter<File>>,
    reader: Option<BufReader<File>>,
    head: Head,
}

impl Run {
    /// Create an empty run with a fresh random identifier. No file is created until the first
    /// write.
    pub fn create(config: &Config) -> Run {
        let id = HEXLOWER.encode(&rand::random::<[u8; 16]>());
        let path = config.tmp().join(format!("part-{}.run", id));
        Run {
            id,
            path,
            separator: config.line_separator().to_string(),
            phase: Phase::Fresh,
            written: 0,
            consumed: 0,
            writer: None,
            reader: None,
            head: Head::Vacant,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Number of records not consumed yet.
    pub fn len(&self) -> usize {
        self.written - self.consumed
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sort `records` and write them as the complete content of this run.
    pub fn write_bulk(&mut self, mut records: Vec<String>) -> Result<(), anyhow::Error> {
        if self.phase != Phase::Fresh {
            return Err(self.state_error("bulk write on a run that was already written"));
        }
        if records.iter().any(|record| !is_framed(record.as_bytes(), self.separator.as_bytes())) {
            return Err(self.separator_error());
        }
        records.sort_unstable();

        let file = File::create(&self.path)
            .with_context(|| format!("create run: {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);
        for record in &records {
            writer.write_all(record.as_bytes())?;
            writer.write_all(self.separator.as_bytes())?;
        }
        writer.flush()
            .with_context(|| format!("write run: {}", self.path.display()))?;

        self.phase = Phase::Bulk;
        self.written = records.len();
        log::debug!("Wrote run {} with {} records", self.id, self.written);
        Ok(())
    }

    /// Append a single record. Records must be appended in ascending order.
    pub fn append(&mut self, record: &str) -> Result<(), anyhow::Error> {
        match self.phase {
            Phase::Fresh | Phase::Append => {}
            Phase::Bulk => return Err(self.state_error("append on a bulk written run")),
            Phase::Read => return Err(self.state_error("append after reading started")),
        }
        if !is_framed(record.as_bytes(), self.separator.as_bytes()) {
            return Err(self.separator_error());
        }

        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("open run for append: {}", self.path.display()))?;
            self.writer = Some(BufWriter::new(file));
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(record.as_bytes())
                .and_then(|_| writer.write_all(self.separator.as_bytes()))
                .with_context(|| format!("append to run: {}", self.path.display()))?;
        }
        self.phase = Phase::Append;
        self.written += 1;
        Ok(())
    }

    /// Flush and close the append writer, if any.
    pub fn seal(&mut self) -> Result<(), anyhow::Error> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()
                .with_context(|| format!("flush run: {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Return the next unread record without consuming it, or `None` at the end of the run.
    ///
    /// Repeated calls return the cached record without touching storage until [Run::advance]
    /// consumes it.
    pub fn peek(&mut self) -> Result<Option<&str>, anyhow::Error> {
        if self.phase != Phase::Read {
            self.seal()?;
            self.phase = Phase::Read;
        }

        if let Head::Vacant = self.head {
            if self.is_empty() {
                self.reader = None;
                return Ok(None);
            }
            let record = self.read_next()?;
            self.head = Head::Cached(record);
        }

        match &self.head {
            Head::Cached(record) => Ok(Some(record.as_str())),
            Head::Vacant => Ok(None),
        }
    }

    /// Consume the record returned by [Run::peek] and hand it over.
    pub fn advance(&mut self) -> Result<Option<String>, anyhow::Error> {
        self.peek()?;
        match std::mem::replace(&mut self.head, Head::Vacant) {
            Head::Cached(record) => {
                self.consumed += 1;
                Ok(Some(record))
            }
            Head::Vacant => Ok(None),
        }
    }

    /// Move the run storage to `destination`. A run that was never written produces an empty
    /// file.
    pub fn finalize(mut self, destination: &Path) -> Result<(), anyhow::Error> {
        self.seal()?;
        self.reader = None;
        if self.path.exists() {
            std::fs::rename(&self.path, destination)
                .with_context(|| format!("Rename {} to {}", self.path.display(), destination.display()))?;
        } else {
            File::create(destination)
                .with_context(|| format!("create output: {}", destination.display()))?;
        }
        log::debug!("Finalized run {} as {}", self.id, destination.display());
        Ok(())
    }

    /// Remove the run storage.
    pub fn discard(mut self) -> Result<(), anyhow::Error> {
        self.writer = None;
        self.reader = None;
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("remove run: {}", self.path.display()))?;
        }
        log::debug!("Discarded run {}", self.id);
        Ok(())
    }

    fn read_next(&mut self) -> Result<String, anyhow::Error> {
        if self.reader.is_none() {
            let file = File::open(&self.path)
                .with_context(|| format!("open run: {}", self.path.display()))?;
            self.reader = Some(BufReader::new(file));
        }

        let record = match self.reader.as_mut() {
            Some(reader) => read_record(reader, &self.separator, &self.path)?,
            None => None,
        };
        record.ok_or_else(|| {
            SortError::StorageInvariantViolation {
                run: self.id.clone(),
                remaining: self.len(),
            }
                .into()
        })
    }

    fn separator_error(&self) -> anyhow::Error {
        SortError::SeparatorInRecord {
            path: self.path.clone(),
        }
            .into()
    }

    fn state_error(&self, reason: &'static str) -> anyhow::Error {
        SortError::RunState {
            run: self.id.clone(),
            reason,
        }
            .into()
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        self.writer = None;
        self.reader = None;
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("Failed to remove abandoned run {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::config::Config;
    use crate::error::SortError;
    use crate::run::Run;

    fn config(tmp: &tempfile::TempDir) -> Config {
        Config::new(tmp.path().to_path_buf(), 2, 16, "\n".to_string())
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn drain(run: &mut Run) -> Result<Vec<String>, anyhow::Error> {
        let mut records = Vec::new();
        while let Some(record) = run.advance()? {
            records.push(record);
        }
        Ok(records)
    }

    fn state_reason(error: &anyhow::Error) -> Option<&'static str> {
        match error.downcast_ref::<SortError>() {
            Some(SortError::RunState { reason, .. }) => Some(*reason),
            _ => None,
        }
    }

    #[test]
    fn test_create_has_no_storage() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(&tmp);
        let first = Run::create(&config);
        let second = Run::create(&config);
        assert_ne!(first.id(), second.id());
        assert!(!first.path().exists());
        assert!(first.is_empty());
        assert!(first.path().starts_with(tmp.path()));
    }

    #[test]
    fn test_write_bulk_sorts() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let mut run = Run::create(&config(&tmp));
        run.write_bulk(strings(&["cherry", "apple", "banana"]))?;
        assert_eq!(run.len(), 3);
        assert_eq!(fs::read_to_string(run.path())?, "apple\nbanana\ncherry\n");
        assert_eq!(drain(&mut run)?, strings(&["apple", "banana", "cherry"]));
        assert_eq!(run.len(), 0);
        Ok(())
    }

    #[test]
    fn test_peek_is_idempotent() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let mut run = Run::create(&config(&tmp));
        run.write_bulk(strings(&["b", "a"]))?;
        assert_eq!(run.peek()?, Some("a"));
        assert_eq!(run.peek()?, Some("a"));
        assert_eq!(run.len(), 2);
        assert_eq!(run.advance()?, Some("a".to_string()));
        assert_eq!(run.len(), 1);
        assert_eq!(run.peek()?, Some("b"));
        assert_eq!(run.advance()?, Some("b".to_string()));
        assert_eq!(run.peek()?, None);
        assert_eq!(run.advance()?, None);
        assert_eq!(run.len(), 0);
        Ok(())
    }

    #[test]
    fn test_empty_record_is_not_end_of_run() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let mut run = Run::create(&config(&tmp));
        run.write_bulk(strings(&["x", ""]))?;
        assert_eq!(run.peek()?, Some(""));
        run.advance()?;
        assert_eq!(run.peek()?, Some("x"));
        run.advance()?;
        assert_eq!(run.peek()?, None);
        Ok(())
    }

    #[test]
    fn test_append_then_read() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let mut run = Run::create(&config(&tmp));
        for record in ["a", "b", "b", "c"] {
            run.append(record)?;
        }
        assert_eq!(run.len(), 4);
        assert_eq!(drain(&mut run)?, strings(&["a", "b", "b", "c"]));
        Ok(())
    }

    #[test]
    fn test_custom_separator() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let config = Config::new(tmp.path().to_path_buf(), 1, 16, "\r\n".to_string());
        let mut run = Run::create(&config);
        run.append("a")?;
        run.append("b")?;
        run.seal()?;
        assert_eq!(fs::read_to_string(run.path())?, "a\r\nb\r\n");
        assert_eq!(drain(&mut run)?, strings(&["a", "b"]));
        Ok(())
    }

    #[test]
    fn test_record_overlapping_separator_rejected() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let config = Config::new(tmp.path().to_path_buf(), 1, 16, "||".to_string());

        let mut bulk = Run::create(&config);
        let error = bulk.write_bulk(strings(&["a", "|"])).unwrap_err();
        assert!(matches!(error.downcast_ref::<SortError>(), Some(SortError::SeparatorInRecord { .. })));
        assert!(!bulk.path().exists());

        let mut appended = Run::create(&config);
        appended.append("a|b")?;
        let error = appended.append("b||c").unwrap_err();
        assert!(matches!(error.downcast_ref::<SortError>(), Some(SortError::SeparatorInRecord { .. })));
        let error = appended.append("c|").unwrap_err();
        assert!(matches!(error.downcast_ref::<SortError>(), Some(SortError::SeparatorInRecord { .. })));
        assert_eq!(drain(&mut appended)?, strings(&["a|b"]));
        Ok(())
    }

    #[test]
    fn test_write_mode_violations() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let config = config(&tmp);

        let mut bulk = Run::create(&config);
        bulk.write_bulk(strings(&["a"]))?;
        let error = bulk.write_bulk(strings(&["b"])).unwrap_err();
        assert!(state_reason(&error).is_some());
        let error = bulk.append("b").unwrap_err();
        assert!(state_reason(&error).is_some());

        let mut appended = Run::create(&config);
        appended.append("a")?;
        let error = appended.write_bulk(strings(&["b"])).unwrap_err();
        assert!(state_reason(&error).is_some());
        appended.peek()?;
        let error = appended.append("b").unwrap_err();
        assert!(state_reason(&error).is_some());
        Ok(())
    }

    #[test]
    fn test_truncated_storage_fails_loudly() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let mut run = Run::create(&config(&tmp));
        run.write_bulk(strings(&["a", "b", "c"]))?;
        fs::write(run.path(), "a\n")?;
        assert_eq!(run.advance()?, Some("a".to_string()));
        let error = run.peek().unwrap_err();
        match error.downcast_ref::<SortError>() {
            Some(SortError::StorageInvariantViolation { remaining, .. }) => assert_eq!(*remaining, 2),
            other => panic!("unexpected error: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_finalize_moves_storage() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let mut run = Run::create(&config(&tmp));
        run.append("a")?;
        let source = run.path().clone();
        let destination = tmp.path().join("output.txt");
        run.finalize(&destination)?;
        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&destination)?, "a\n");
        Ok(())
    }

    #[test]
    fn test_finalize_unwritten_run() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let run = Run::create(&config(&tmp));
        let destination = tmp.path().join("empty.txt");
        run.finalize(&destination)?;
        assert_eq!(fs::read_to_string(&destination)?, "");
        Ok(())
    }

    #[test]
    fn test_discard_and_drop_remove_storage() -> Result<(), anyhow::Error> {
        let tmp = tempfile::tempdir()?;
        let config = config(&tmp);

        let mut discarded = Run::create(&config);
        discarded.write_bulk(strings(&["a"]))?;
        let path = discarded.path().clone();
        discarded.discard()?;
        assert!(!path.exists());

        Run::create(&config).discard()?;

        let mut dropped = Run::create(&config);
        dropped.append("a")?;
        let path = dropped.path().clone();
        drop(dropped);
        assert!(!path.exists());
        Ok(())
    }
}
