//! Binary index files.
//!
//! Frame containers keep one [`IndexRecord`] (three little-endian `i64`)
//! per frame after the first. Cluster logs and pixel logs keep one
//! little-endian `i64` log offset per frame.

use crate::fsutil;
use pixstore_core::{Error, Result};
use std::io::Read;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Byte offsets at which a frame starts in each file of a stream.
///
/// The record for frame 0 is implicit and all-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IndexRecord {
    /// Offset into the description file.
    pub description: u64,
    /// Offset into the data file.
    pub data: u64,
    /// Offset into the side file. Always zero; kept for format compatibility.
    pub side: u64,
}

impl IndexRecord {
    /// Encoded size in bytes.
    pub const SIZE: u64 = 24;

    fn to_bytes(self, path: &Path) -> Result<[u8; 24]> {
        let mut out = [0u8; 24];
        for (chunk, value) in out
            .chunks_exact_mut(8)
            .zip([self.description, self.data, self.side])
        {
            chunk.copy_from_slice(&encode_offset(value, path)?);
        }
        Ok(out)
    }

    fn from_bytes(bytes: &[u8; 24], path: &Path) -> Result<Self> {
        let field = |i: usize| decode_offset(&bytes[i * 8..i * 8 + 8], path);
        Ok(Self {
            description: field(0)?,
            data: field(1)?,
            side: field(2)?,
        })
    }
}

fn encode_offset(offset: u64, path: &Path) -> Result<[u8; 8]> {
    i64::try_from(offset)
        .map(i64::to_le_bytes)
        .map_err(|_| Error::bad_data(path, format!("offset {offset} does not fit an index entry")))
}

fn decode_offset(bytes: &[u8], path: &Path) -> Result<u64> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    let value = i64::from_le_bytes(raw);
    u64::try_from(value)
        .map_err(|_| Error::bad_data(path, format!("negative offset {value} in index")))
}

/// Number of records in a frame-container index, or `None` if the file
/// does not exist.
///
/// # Errors
/// Returns [`Error::BadData`] if the file size is not a whole number of
/// records.
pub fn record_count(path: &Path) -> Result<Option<u64>> {
    let Some(size) = fsutil::file_size(path) else {
        return Ok(None);
    };
    if size % IndexRecord::SIZE != 0 {
        return Err(Error::bad_data(
            path,
            format!("index size {size} is not a multiple of {}", IndexRecord::SIZE),
        ));
    }
    Ok(Some(size / IndexRecord::SIZE))
}

/// Reads record `n` (0-based) of a frame-container index.
///
/// # Errors
/// Returns an error if the file cannot be read or the record is missing.
pub fn read_record(path: &Path, n: u64) -> Result<IndexRecord> {
    let mut file = fsutil::open_read(path)?;
    fsutil::seek(&mut file, n * IndexRecord::SIZE, path)?;
    let mut raw = [0u8; 24];
    file.read_exact(&mut raw)
        .map_err(|source| Error::read(path, source))?;
    IndexRecord::from_bytes(&raw, path)
}

/// Appends a record to a frame-container index.
///
/// # Errors
/// Returns an error if the file cannot be opened or written.
pub fn append_record(path: &Path, record: IndexRecord) -> Result<()> {
    let bytes = record.to_bytes(path)?;
    let mut file = fsutil::open_append(path)?;
    fsutil::write_all(&mut file, &bytes, path)
}

/// Number of 8-byte offsets in a log index, or `None` if the file does not
/// exist. A trailing partial entry is ignored.
#[must_use]
pub fn offset_count(path: &Path) -> Option<u64> {
    fsutil::file_size(path).map(|size| size / 8)
}

/// Reads offset `n` (0-based) of a log index.
///
/// # Errors
/// Returns an error if the file cannot be read or the entry is missing.
pub fn read_offset(path: &Path, n: u64) -> Result<u64> {
    let mut file = fsutil::open_read(path)?;
    fsutil::seek(&mut file, n * 8, path)?;
    let mut raw = [0u8; 8];
    file.read_exact(&mut raw)
        .map_err(|source| Error::read(path, source))?;
    decode_offset(&raw, path)
}

/// Appends one offset to a log index.
///
/// # Errors
/// Returns an error if the file cannot be opened or written.
pub fn append_offset(path: &Path, offset: u64) -> Result<()> {
    let bytes = encode_offset(offset, path)?;
    let mut file = fsutil::open_append(path)?;
    fsutil::write_all(&mut file, &bytes, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixstore_core::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_records_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.idx");
        assert_eq!(record_count(&path).unwrap(), None);

        let first = IndexRecord {
            description: 120,
            data: 524_288,
            side: 0,
        };
        append_record(&path, first).unwrap();
        append_record(&path, IndexRecord { description: 240, data: 1_048_576, side: 0 }).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 48);
        assert_eq!(record_count(&path).unwrap(), Some(2));
        assert_eq!(read_record(&path, 0).unwrap(), first);
        assert_eq!(read_record(&path, 1).unwrap().data, 1_048_576);
        assert_eq!(read_record(&path, 2).unwrap_err().kind(), ErrorKind::BadData);
    }

    #[test]
    fn test_truncated_index_is_bad_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.idx");
        std::fs::write(&path, [0u8; 30]).unwrap();
        assert_eq!(record_count(&path).unwrap_err().kind(), ErrorKind::BadData);
    }

    #[test]
    fn test_offsets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.clog.idx");
        for offset in [0u64, 77, 1 << 40] {
            append_offset(&path, offset).unwrap();
        }
        assert_eq!(offset_count(&path), Some(3));
        assert_eq!(read_offset(&path, 2).unwrap(), 1 << 40);
        assert_eq!(&std::fs::read(&path).unwrap()[8..16], &77i64.to_le_bytes());
    }
}
