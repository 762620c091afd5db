//! Frame-header scanner for line-oriented text files.
//!
//! Description files, cluster logs and pixel logs are sequences of
//! variable-length text records, each opened by a header line carrying a
//! strictly increasing frame number. [`TextScanner`] locates headers by
//! linear scan, by binary search over byte offsets, or by scanning a fixed
//! window at the end of the file.

use crate::fsutil;
use pixstore_core::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Header line syntax of one text format.
pub trait HeaderSyntax {
    /// Frame number of `line` if it is a header line.
    fn frame_number(line: &str) -> Option<u64>;
}

/// `[F<n>]` blocks of a description file (0-based).
#[derive(Debug, Clone, Copy)]
pub struct DescriptionHeader;

impl HeaderSyntax for DescriptionHeader {
    fn frame_number(line: &str) -> Option<u64> {
        line.strip_prefix("[F")?.strip_suffix(']')?.parse().ok()
    }
}

/// `Frame <n> (<start>, <acq> s)` lines of a cluster log (1-based).
#[derive(Debug, Clone, Copy)]
pub struct ClusterLogHeader;

impl HeaderSyntax for ClusterLogHeader {
    fn frame_number(line: &str) -> Option<u64> {
        leading_number(line.strip_prefix("Frame ")?)
    }
}

/// `[Frame <n>, <start>, <acq> s]` lines of a pixel log (1-based).
#[derive(Debug, Clone, Copy)]
pub struct PixelLogHeader;

impl HeaderSyntax for PixelLogHeader {
    fn frame_number(line: &str) -> Option<u64> {
        leading_number(line.strip_prefix("[Frame ")?)
    }
}

fn leading_number(text: &str) -> Option<u64> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

/// Frame numbers closer than this to the target end the bisection; the rest
/// is covered by a linear scan.
const LINEAR_SCAN_DISTANCE: u64 = 2;

/// Bytes scanned at the end of a log when counting its frames.
pub const DEFAULT_TAIL_WINDOW: u64 = 900_000;

/// Line reader over one text file that tracks byte positions.
pub struct TextScanner<H> {
    reader: BufReader<File>,
    path: PathBuf,
    size: u64,
    position: u64,
    buffer: Vec<u8>,
    line: String,
    _syntax: PhantomData<H>,
}

impl<H: HeaderSyntax> TextScanner<H> {
    /// Opens a file for scanning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let file = fsutil::open_read(path)?;
        let size = file
            .metadata()
            .map_err(|source| Error::FileRead {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        Ok(Self {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            size,
            position: 0,
            buffer: Vec::new(),
            line: String::new(),
            _syntax: PhantomData,
        })
    }

    /// File size in bytes at open time.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Offset of the next line to be read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Positions the scanner at `position`.
    ///
    /// # Errors
    /// Returns an error if the seek fails.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        fsutil::seek(&mut self.reader, position, &self.path)?;
        self.position = position;
        Ok(())
    }

    /// Positions the scanner at the first line starting at or after
    /// `position`.
    ///
    /// # Errors
    /// Returns an error if the seek or read fails.
    pub fn seek_line(&mut self, position: u64) -> Result<()> {
        if position == 0 || position > self.size {
            return self.seek(position.min(self.size));
        }
        // Land one byte early: if that byte ends a line, `position` starts
        // one and reading the remainder consumes just the newline.
        self.seek(position - 1)?;
        self.next_line()?;
        Ok(())
    }

    /// Reads the next line without its terminator. Returns its start offset,
    /// or `None` at end of file. The text is available through
    /// [`Self::line`].
    ///
    /// # Errors
    /// Returns an error if the read fails.
    pub fn next_line(&mut self) -> Result<Option<u64>> {
        self.buffer.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buffer)
            .map_err(|source| Error::read(&self.path, source))?;
        if read == 0 {
            return Ok(None);
        }
        let start = self.position;
        self.position += read as u64;

        let mut end = self.buffer.len();
        while end > 0 && matches!(self.buffer[end - 1], b'\n' | b'\r') {
            end -= 1;
        }
        self.line.clear();
        self.line
            .push_str(&String::from_utf8_lossy(&self.buffer[..end]));
        Ok(Some(start))
    }

    /// Text of the last line read.
    #[must_use]
    pub fn line(&self) -> &str {
        &self.line
    }

    /// Scans forward to the next header line. Returns its offset and frame
    /// number.
    ///
    /// # Errors
    /// Returns an error if a read fails.
    pub fn next_header(&mut self) -> Result<Option<(u64, u64)>> {
        while let Some(start) = self.next_line()? {
            if let Some(number) = H::frame_number(&self.line) {
                return Ok(Some((start, number)));
            }
        }
        Ok(None)
    }

    /// First header at or after `position` (partial lines are skipped).
    ///
    /// # Errors
    /// Returns an error if a seek or read fails.
    pub fn next_header_from(&mut self, position: u64) -> Result<Option<(u64, u64)>> {
        self.seek_line(position)?;
        self.next_header()
    }

    /// Linear scan from `from` for the header of frame `target`.
    ///
    /// Stops early once a larger frame number is seen.
    ///
    /// # Errors
    /// Returns an error if a seek or read fails.
    pub fn find_frame_linear(&mut self, from: u64, target: u64) -> Result<Option<u64>> {
        self.seek_line(from)?;
        while let Some((position, number)) = self.next_header()? {
            if number == target {
                return Ok(Some(position));
            }
            if number > target {
                break;
            }
        }
        Ok(None)
    }

    /// Binary search over byte offsets for the header of frame `target`.
    ///
    /// `frame_count` is an optional estimate of the number of frames in the
    /// file; when given, the first probe is placed proportionally.
    ///
    /// # Errors
    /// Returns an error if a seek or read fails.
    pub fn find_frame(&mut self, target: u64, frame_count: Option<u64>) -> Result<Option<u64>> {
        let (mut low, mut high) = (0u64, self.size);
        let mut probe = frame_count
            .filter(|&count| count > 0)
            .map(|count| proportional_offset(self.size, target, count));

        while low < high {
            let mid = probe
                .take()
                .filter(|p| (low..high).contains(p))
                .unwrap_or(low + (high - low) / 2);

            let Some((position, number)) = self.next_header_from(mid)? else {
                // No header at or after `mid`: the target starts before it.
                high = mid;
                continue;
            };
            if number == target {
                return Ok(Some(position));
            }
            if number > target {
                high = mid;
            } else {
                low = position;
            }
            if number.abs_diff(target) <= LINEAR_SCAN_DISTANCE || high.saturating_sub(low) < 2 {
                break;
            }
        }

        log::debug!(
            "{}: linear scan for frame {target} from offset {low}",
            self.path.display()
        );
        self.find_frame_linear(low, target)
    }

    /// Frame number of the last header within the final `window` bytes of
    /// the file.
    ///
    /// This is a heuristic: if the last frame record is longer than
    /// `window`, its header lies outside the window and an earlier header
    /// (or none) is reported.
    ///
    /// # Errors
    /// Returns an error if a seek or read fails.
    pub fn last_header_in_tail(&mut self, window: u64) -> Result<Option<u64>> {
        self.seek_line(self.size.saturating_sub(window))?;
        let mut last = None;
        while let Some((_, number)) = self.next_header()? {
            last = Some(number);
        }
        Ok(last)
    }

    /// Frame number of the last header in the file, trying the final
    /// `window` bytes first and falling back to a full scan.
    ///
    /// # Errors
    /// Returns an error if a seek or read fails.
    pub fn last_header(&mut self, window: u64) -> Result<Option<u64>> {
        match self.last_header_in_tail(window)? {
            Some(number) => Ok(Some(number)),
            None if window < self.size => self.last_header_in_tail(self.size),
            None => Ok(None),
        }
    }

    /// Number of header lines in the whole file.
    ///
    /// # Errors
    /// Returns an error if a seek or read fails.
    pub fn count_headers(&mut self) -> Result<u64> {
        self.seek(0)?;
        let mut count = 0;
        while self.next_header()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Reads up to `len` raw bytes at `position`.
    ///
    /// # Errors
    /// Returns an error if the seek or read fails.
    pub fn read_bytes(&mut self, position: u64, len: usize) -> Result<Vec<u8>> {
        self.seek(position)?;
        let mut out = Vec::with_capacity(len);
        (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut out)
            .map_err(|source| Error::read(&self.path, source))?;
        self.position += out.len() as u64;
        Ok(out)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn proportional_offset(size: u64, target: u64, count: u64) -> u64 {
    let fraction = target as f64 / count as f64;
    ((size as f64 * fraction) as u64).min(size.saturating_sub(1))
}
