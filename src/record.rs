use std::io::BufRead;
use std::path::Path;

use anyhow::Context;

use crate::error::SortError;

/// Read the next record terminated by `separator`.
///
/// The separator is stripped from the returned record. A trailing record without a separator is
/// returned as is, unless writing it back with a separator would not read back the same record.
/// Returns `None` at the end of the stream.
pub(crate) fn read_record<R: BufRead>(reader: &mut R, separator: &str, path: &Path) -> Result<Option<String>, anyhow::Error> {
    let separator = separator.as_bytes();
    let last = match separator.last() {
        Some(last) => *last,
        None => return Err(SortError::InvalidConfig("line separator must not be empty".to_string()).into()),
    };

    let mut bytes = Vec::new();
    loop {
        let read = reader.read_until(last, &mut bytes)
            .with_context(|| format!("read path: {}", path.display()))?;
        if read == 0 {
            break;
        }
        if bytes.ends_with(separator) {
            bytes.truncate(bytes.len() - separator.len());
            return decode(bytes, path).map(Some);
        }
        // partial match of a multi byte separator keeps reading, anything else is end of stream
        if bytes.last() != Some(&last) {
            break;
        }
    }

    if bytes.is_empty() {
        Ok(None)
    } else if !is_framed(&bytes, separator) {
        Err(SortError::SeparatorInRecord { path: path.to_path_buf() }.into())
    } else {
        decode(bytes, path).map(Some)
    }
}

/// True when `record` followed by `separator` reads back as `record`, that is the first
/// occurrence of the separator starts right after the record.
pub(crate) fn is_framed(record: &[u8], separator: &[u8]) -> bool {
    if separator.is_empty() {
        return true;
    }
    if separator.len() == 1 {
        return !record.contains(&separator[0]);
    }
    if record.windows(separator.len()).any(|window| window == separator) {
        return false;
    }
    // an occurrence straddling the record end: the record ends with a separator prefix of
    // length k that the separator itself repeats at offset k
    (1..separator.len()).all(|k| {
        !(record.ends_with(&separator[..k]) && separator[k..] == separator[..separator.len() - k])
    })
}

fn decode(bytes: Vec<u8>, path: &Path) -> Result<String, anyhow::Error> {
    String::from_utf8(bytes)
        .map_err(|_| SortError::InvalidRecord { path: path.to_path_buf() }.into())
}
