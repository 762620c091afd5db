//! File helpers that attach the path to every I/O failure.

use pixstore_core::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub(crate) fn open_read(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn open_read_write(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })
}

/// Opens `path` for appending, creating it and its parent directories.
pub(crate) fn open_append(path: &Path) -> Result<File> {
    create_parent_dirs(path)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| Error::FileOpen {
            path: path.to_path_buf(),
            source,
        })
}

/// Creates or truncates `path`, creating parent directories.
pub(crate) fn create(path: &Path) -> Result<File> {
    create_parent_dirs(path)?;
    File::create(path).map_err(|source| Error::FileOpen {
        path: path.to_path_buf(),
        source,
    })
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| Error::FileOpen {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Size of `path` in bytes, or `None` if it does not exist.
pub(crate) fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(fs::Metadata::is_file)
        .map(|m| m.len())
}

pub(crate) fn seek<S: Seek>(stream: &mut S, position: u64, path: &Path) -> Result<()> {
    stream
        .seek(SeekFrom::Start(position))
        .map(|_| ())
        .map_err(|source| Error::FileSeek {
            path: path.to_path_buf(),
            position,
            source,
        })
}

pub(crate) fn write_all<W: Write>(writer: &mut W, bytes: &[u8], path: &Path) -> Result<()> {
    writer.write_all(bytes).map_err(|source| Error::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn flush<W: Write>(writer: &mut W, path: &Path) -> Result<()> {
    writer.flush().map_err(|source| Error::FileWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads `[start, end)` of `path`.
pub(crate) fn read_range(path: &Path, start: u64, end: u64) -> Result<Vec<u8>> {
    let len = end.checked_sub(start).ok_or_else(|| {
        Error::bad_data(path, format!("range {start}..{end} is reversed"))
    })?;
    let len = usize::try_from(len).map_err(|_| Error::MemoryAllocation(usize::MAX))?;
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| Error::MemoryAllocation(len))?;
    buffer.resize(len, 0);

    let mut file = open_read(path)?;
    seek(&mut file, start, path)?;
    file.read_exact(&mut buffer)
        .map_err(|source| Error::read(path, source))?;
    Ok(buffer)
}
