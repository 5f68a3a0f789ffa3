use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::record::read_record;

/// Reads the input in document order, at most `bulk_size` records at a time.
pub(crate) struct BulkIterator {
    path: PathBuf,
    reader: BufReader<File>,
    bulk_size: usize,
    separator: String,
    done: bool,
}

impl BulkIterator {
    pub(crate) fn new(path: &Path, bulk_size: usize, separator: &str) -> Result<BulkIterator, anyhow::Error> {
        let file = File::open(path)
            .with_context(|| anyhow!("path: {}", path.display()))?;

        Ok(
            BulkIterator {
                path: path.to_path_buf(),
                reader: BufReader::new(file),
                bulk_size,
                separator: separator.to_string(),
                done: false,
            }
        )
    }

    fn read_bulk(&mut self) -> Result<Vec<String>, anyhow::Error> {
        let mut bulk = Vec::with_capacity(self.bulk_size.min(65_536));
        while bulk.len() < self.bulk_size {
            match read_record(&mut self.reader, &self.separator, &self.path)? {
                Some(record) => bulk.push(record),
                None => break,
            }
        }
        Ok(bulk)
    }
}

impl Iterator for BulkIterator {
    type Item = Result<Vec<String>, anyhow::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_bulk() {
            Ok(bulk) if bulk.is_empty() => {
                self.done = true;
                None
            }
            Ok(bulk) => Some(Ok(bulk)),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
