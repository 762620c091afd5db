//! Memory-mapped data file reader.

use pixstore_core::{Element, Error, Result};
use memmap2::Mmap;
use rayon::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Buffers at least this long are decoded on the rayon pool.
const PARALLEL_DECODE_BYTES: usize = 1 << 20;

/// A memory-mapped file reader.
///
/// Dense binary frames are sliced straight out of the mapping instead of
/// being copied through a read buffer.
pub struct MappedFileReader {
    mmap: Option<Mmap>,
    path: PathBuf,
}

impl MappedFileReader {
    /// Opens a file for memory-mapped reading.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let size = file
            .metadata()
            .map_err(|source| Error::read(path, source))?
            .len();
        // Zero-length files cannot be mapped on every platform.
        let mmap = if size == 0 {
            None
        } else {
            // SAFETY: The file is opened read-only and we assume it is not
            // modified concurrently. A stream being appended to only grows
            // past the mapped length.
            #[allow(unsafe_code)]
            let mmap = unsafe { Mmap::map(&file) }.map_err(|source| Error::read(path, source))?;
            Some(mmap)
        };
        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Returns the file contents as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or_default()
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes `[start, end)` of the file.
    ///
    /// # Errors
    /// Returns [`Error::BadData`] if the range runs past the end of the file.
    pub fn range(&self, start: u64, end: u64) -> Result<&[u8]> {
        let bytes = self.as_bytes();
        usize::try_from(start)
            .ok()
            .zip(usize::try_from(end).ok())
            .and_then(|(start, end)| bytes.get(start..end))
            .ok_or_else(|| {
                Error::bad_data(
                    &self.path,
                    format!("range {start}..{end} outside file of {} bytes", bytes.len()),
                )
            })
    }

    /// Decodes `[start, end)` as little-endian elements.
    ///
    /// # Errors
    /// Returns [`Error::BadData`] if the range is out of bounds or not a
    /// whole number of elements.
    pub fn read_elements<T: Element>(&self, start: u64, end: u64) -> Result<Vec<T>> {
        let bytes = self.range(start, end)?;
        if bytes.len() % T::SIZE != 0 {
            return Err(Error::bad_data(
                &self.path,
                format!("{} bytes is not a whole number of {} values", bytes.len(), T::DATA_TYPE),
            ));
        }
        if bytes.len() < PARALLEL_DECODE_BYTES {
            return Ok(bytes.chunks_exact(T::SIZE).map(T::read_le).collect());
        }
        Ok(bytes.par_chunks_exact(T::SIZE).map(T::read_le).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixstore_core::ErrorKind;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_elements() {
        let file = NamedTempFile::new().unwrap();
        let values: Vec<u32> = (0..1000).collect();
        std::fs::write(file.path(), pixstore_core::element::encode_le(&values)).unwrap();

        let reader = MappedFileReader::open(file.path()).unwrap();
        assert_eq!(reader.len(), 4000);
        assert_eq!(reader.read_elements::<u32>(40, 60).unwrap(), vec![10, 11, 12, 13, 14]);

        let err = reader.read_elements::<u32>(3996, 4004).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadData);
        let err = reader.read_elements::<u32>(0, 6).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadData);
    }

    #[test]
    fn test_large_buffer_decodes_in_order() {
        let file = NamedTempFile::new().unwrap();
        let values: Vec<f64> = (0..300_000).map(f64::from).collect();
        std::fs::write(file.path(), pixstore_core::element::encode_le(&values)).unwrap();

        let reader = MappedFileReader::open(file.path()).unwrap();
        let end = reader.len() as u64;
        assert_eq!(reader.read_elements::<f64>(0, end).unwrap(), values);
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        let reader = MappedFileReader::open(file.path()).unwrap();
        assert!(reader.is_empty());
        assert!(reader.read_elements::<i16>(0, 0).unwrap().is_empty());
    }
}
