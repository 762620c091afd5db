//! Frame containers: a data file, a description file and an index file
//! that together hold a stream of frames.
//!
//! Frame `n` is located through the index in O(1). Without an index the
//! description is bisected by frame number, and the data offset is derived
//! for dense binary streams of uniform frame size.

use crate::codec::{self, Encoding, Layout};
use crate::description::{self, FrameDescription};
use crate::fsutil;
use crate::index::{self, IndexRecord};
use crate::reader::MappedFileReader;
use crate::scanner::{DescriptionHeader, TextScanner, DEFAULT_TAIL_WINDOW};
use pixstore_core::{
    pixel_count, ElementType, Error, Frame, FrameData, FrameElement, Result,
};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bytes inspected when deciding whether a data file is text.
const SAMPLE_BYTES: usize = 64 * 1024;

/// Detector tile size; guessed sparse frame sides are multiples of it.
const TILE: u32 = 256;

/// Options for [`FrameContainer::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SaveOptions {
    /// Payload layout of the saved frame.
    pub layout: Layout,
    /// Payload encoding; must match the existing stream when appending.
    pub encoding: Encoding,
    /// Append to the stream instead of replacing it.
    pub append: bool,
    /// Write the `.dsc` entry.
    pub write_description: bool,
    /// Write floating-point metadata so that it parses back bit-exactly.
    pub max_precision: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            layout: Layout::Matrix,
            encoding: Encoding::Binary,
            append: false,
            write_description: true,
            max_precision: true,
        }
    }
}

impl SaveOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    #[must_use]
    pub fn with_description(mut self, write_description: bool) -> Self {
        self.write_description = write_description;
        self
    }

    #[must_use]
    pub fn with_max_precision(mut self, max_precision: bool) -> Self {
        self.max_precision = max_precision;
        self
    }
}

/// The three files of one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPaths {
    pub data: PathBuf,
    pub description: PathBuf,
    pub index: PathBuf,
}

impl StreamPaths {
    /// Resolves a stream name. The name may be the data file itself or a
    /// path ending in `.dsc` or `.idx`.
    #[must_use]
    pub fn new(stream: impl AsRef<Path>) -> Self {
        let stream = stream.as_ref();
        let data = match stream.extension().and_then(|ext| ext.to_str()) {
            Some("dsc" | "idx") => stream.with_extension(""),
            _ => stream.to_path_buf(),
        };
        Self {
            description: with_suffix(&data, ".dsc"),
            index: with_suffix(&data, ".idx"),
            data,
        }
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Shape and layout inferred from a data file without description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GuessedFormat {
    pub element_type: ElementType,
    pub layout: Layout,
    pub encoding: Encoding,
    pub width: u32,
    pub height: u32,
}

/// Consistency report produced by [`FrameContainer::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamReport {
    pub data_size: Option<u64>,
    pub description_size: Option<u64>,
    pub index_size: Option<u64>,
    /// Frame count from the description header.
    pub header_count: Option<u64>,
    /// Number of `[F<n>]` blocks.
    pub description_blocks: Option<u64>,
    /// Number of the last `[F<n>]` block.
    pub last_block: Option<u64>,
    pub index_records: Option<u64>,
    /// Human-readable inconsistencies; empty for a healthy stream.
    pub problems: Vec<String>,
}

impl StreamReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Where one frame lives in the stream files.
struct FrameLocation {
    description: u64,
    data_start: u64,
    /// End of the data range, if it is known before parsing the description.
    data_end: Option<u64>,
}

/// A frame stream on disk.
#[derive(Debug, Clone)]
pub struct FrameContainer {
    paths: StreamPaths,
}

impl FrameContainer {
    /// Creates a handle for `stream`; no file is touched.
    #[must_use]
    pub fn new(stream: impl AsRef<Path>) -> Self {
        Self {
            paths: StreamPaths::new(stream),
        }
    }

    #[must_use]
    pub fn paths(&self) -> &StreamPaths {
        &self.paths
    }

    /// Writes one frame.
    ///
    /// When appending to an existing data file, an index record holding the
    /// file sizes before this frame is added. A non-append save replaces
    /// the data and description files and removes any stale index.
    ///
    /// Writes are not rolled back: a failure between the description and
    /// the data write leaves the stream inconsistent, which
    /// [`Self::validate`] reports.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for metadata that cannot be
    /// serialized or an encoding that differs from the existing stream, and
    /// I/O errors otherwise.
    pub fn save(&self, frame: &Frame, options: &SaveOptions) -> Result<()> {
        let paths = &self.paths;
        let existing_data = if options.append {
            fsutil::file_size(&paths.data)
        } else {
            None
        };

        let record = existing_data.map(|data| IndexRecord {
            description: fsutil::file_size(&paths.description).unwrap_or(0),
            data,
            side: 0,
        });

        if !options.append && fsutil::file_size(&paths.index).is_some() {
            log::debug!("removing stale index {}", paths.index.display());
            std::fs::remove_file(&paths.index).map_err(|source| Error::FileWrite {
                path: paths.index.clone(),
                source,
            })?;
        }

        if options.write_description {
            description::write(
                &paths.description,
                frame,
                options.layout,
                options.encoding,
                options.append,
                options.max_precision,
            )?;
        }

        let mut payload = Vec::new();
        if existing_data.is_some_and(|size| size > 0)
            && options.layout.is_sparse()
            && options.encoding == Encoding::Ascii
        {
            payload.extend_from_slice(b"#\n");
        }
        payload.extend(encode_frame(frame, options.layout, options.encoding));

        let mut file = if options.append {
            fsutil::open_append(&paths.data)?
        } else {
            fsutil::create(&paths.data)?
        };
        fsutil::write_all(&mut file, &payload, &paths.data)?;
        fsutil::flush(&mut file, &paths.data)?;

        if let Some(record) = record {
            index::append_record(&paths.index, record)?;
        }
        Ok(())
    }

    /// Number of frames in the stream.
    ///
    /// # Errors
    /// Returns an error if the stream has no readable description and its
    /// data file cannot be guessed.
    pub fn frame_count(&self) -> Result<u64> {
        if fsutil::file_size(&self.paths.description).is_some() {
            return Ok(description::read_header(&self.paths.description)?.frame_count);
        }
        self.guess_format().map(|_| 1)
    }

    /// True if the stream can be read.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.frame_count().is_ok()
    }

    /// Loads frame `index`.
    ///
    /// # Errors
    /// - [`Error::FileOpen`] if the data file is missing.
    /// - [`Error::InvalidArgument`] if `index` is out of range.
    /// - [`Error::MissingIndex`] if the frame cannot be located without an
    ///   index file.
    /// - [`Error::BadData`] if the three files disagree or a payload is
    ///   malformed.
    pub fn load(&self, index: u64) -> Result<Frame> {
        let paths = &self.paths;
        let data_size = fsutil::file_size(&paths.data).ok_or_else(|| Error::FileOpen {
            path: paths.data.clone(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;

        let Some(description_size) = fsutil::file_size(&paths.description) else {
            if fsutil::file_size(&paths.index).is_some() {
                return Err(Error::bad_data(&paths.index, "index file without description"));
            }
            if index > 0 {
                return Err(Error::MissingIndex {
                    path: paths.data.clone(),
                    index,
                });
            }
            let guessed = self.guess_format()?;
            log::debug!("{}: guessed {guessed:?}", paths.data.display());
            return self.load_guessed(&guessed, data_size);
        };

        let header = description::read_header(&paths.description)?;
        if index >= header.frame_count {
            return Err(Error::InvalidArgument(format!(
                "frame {index} out of range, \"{}\" holds {} frames",
                paths.description.display(),
                header.frame_count
            )));
        }

        let mut scanner = TextScanner::<DescriptionHeader>::open(&paths.description)?;
        let location = match index::record_count(&paths.index)? {
            Some(records) => {
                self.locate_indexed(index, header.frame_count, records, description_size, data_size)?
            }
            None => {
                log::debug!(
                    "{}: no index, searching description for frame {index}",
                    paths.description.display()
                );
                self.locate_unindexed(&mut scanner, index, header.frame_count)?
            }
        };

        let (frame_description, more_frames) =
            description::read_frame(&mut scanner, location.description, index)?;
        if more_frames && index + 1 == header.frame_count {
            log::warn!(
                "{}: blocks follow the last counted frame {index}",
                paths.description.display()
            );
            return Err(Error::bad_data(
                &paths.description,
                format!("header counts {} frames but more blocks follow", header.frame_count),
            ));
        }

        let frame_bytes = dense_bytes(&frame_description);
        let (data_start, data_end) = if let Some(end) = location.data_end {
            (location.data_start, end)
        } else {
            let uniform = frame_description.layout == Layout::Matrix
                && header.encoding == Encoding::Binary
                && frame_bytes.checked_mul(header.frame_count) == Some(data_size);
            if !uniform {
                return Err(Error::MissingIndex {
                    path: paths.index.clone(),
                    index,
                });
            }
            (frame_bytes * index, frame_bytes * (index + 1))
        };
        if data_end > data_size || data_end < data_start {
            return Err(Error::bad_data(
                &paths.data,
                format!("frame {index} spans {data_start}..{data_end}, file holds {data_size} bytes"),
            ));
        }
        self.read_payload(&frame_description, header.encoding, data_start, data_end)
    }

    fn locate_indexed(
        &self,
        index: u64,
        frame_count: u64,
        records: u64,
        description_size: u64,
        data_size: u64,
    ) -> Result<FrameLocation> {
        let paths = &self.paths;
        if records + 1 != frame_count {
            log::warn!(
                "{}: {records} index records for {frame_count} frames",
                paths.index.display()
            );
            return Err(Error::bad_data(
                &paths.index,
                format!("{records} index records do not match {frame_count} described frames"),
            ));
        }
        if records > 0 {
            let last = index::read_record(&paths.index, records - 1)?;
            if last.description >= description_size || last.data > data_size {
                log::warn!(
                    "{}: last record {last:?} points past the stream files",
                    paths.index.display()
                );
                return Err(Error::bad_data(
                    &paths.index,
                    "last index record points past the end of the stream",
                ));
            }
        }

        let start = if index == 0 {
            IndexRecord::default()
        } else {
            index::read_record(&paths.index, index - 1)?
        };
        let end = if index + 1 < frame_count {
            index::read_record(&paths.index, index)?.data
        } else {
            data_size
        };
        Ok(FrameLocation {
            description: start.description,
            data_start: start.data,
            data_end: Some(end),
        })
    }

    fn locate_unindexed(
        &self,
        scanner: &mut TextScanner<DescriptionHeader>,
        index: u64,
        frame_count: u64,
    ) -> Result<FrameLocation> {
        let path = &self.paths.description;
        let last = scanner.last_header(DEFAULT_TAIL_WINDOW)?;
        if last != frame_count.checked_sub(1) {
            log::warn!(
                "{}: header counts {frame_count} frames, last block is {last:?}",
                path.display()
            );
            return Err(Error::bad_data(
                path,
                format!("header counts {frame_count} frames but the last block is {last:?}"),
            ));
        }

        if frame_count == 1 {
            return Ok(FrameLocation {
                description: 0,
                data_start: 0,
                data_end: fsutil::file_size(&self.paths.data),
            });
        }

        let position = scanner
            .find_frame(index, Some(frame_count))?
            .ok_or_else(|| Error::bad_data(path, format!("frame {index} not found")))?;
        Ok(FrameLocation {
            description: position,
            data_start: 0,
            data_end: None,
        })
    }

    fn read_payload(
        &self,
        description: &FrameDescription,
        encoding: Encoding,
        start: u64,
        end: u64,
    ) -> Result<Frame> {
        let data = if description.layout == Layout::Matrix && encoding == Encoding::Binary {
            let expected = dense_bytes(description);
            if end - start != expected {
                return Err(Error::bad_data(
                    &self.paths.data,
                    format!("frame needs {expected} bytes, stream holds {}", end - start),
                ));
            }
            let reader = MappedFileReader::open(&self.paths.data)?;
            match description.element_type {
                ElementType::I16 => FrameData::I16(reader.read_elements(start, end)?),
                ElementType::U32 => FrameData::U32(reader.read_elements(start, end)?),
                ElementType::U64 => FrameData::U64(reader.read_elements(start, end)?),
                ElementType::Double => FrameData::Double(reader.read_elements(start, end)?),
            }
        } else {
            let bytes = fsutil::read_range(&self.paths.data, start, end)?;
            decode_frame(
                &bytes,
                description.element_type,
                description.width,
                description.height,
                description.layout,
                encoding,
                &self.paths.data,
            )?
        };
        Ok(Frame::new(description.width, description.height, data)?
            .with_metadata(description.metadata.clone()))
    }

    fn load_guessed(&self, guessed: &GuessedFormat, data_size: u64) -> Result<Frame> {
        let bytes = fsutil::read_range(&self.paths.data, 0, data_size)?;
        let data = decode_frame(
            &bytes,
            guessed.element_type,
            guessed.width,
            guessed.height,
            guessed.layout,
            guessed.encoding,
            &self.paths.data,
        )?;
        Frame::new(guessed.width, guessed.height, data)
    }

    /// Loads a headerless dense binary file of known shape. The element
    /// type is the one whose size matches the file.
    ///
    /// # Errors
    /// Returns [`Error::BadData`] if the file size fits no element type.
    pub fn load_raw(&self, width: u32, height: u32) -> Result<Frame> {
        let reader = MappedFileReader::open(&self.paths.data)?;
        let cells = pixel_count(width, height);
        let size = reader.len();
        let element_type = ElementType::ALL
            .into_iter()
            .find(|t| cells > 0 && cells.checked_mul(t.size()) == Some(size))
            .ok_or_else(|| {
                Error::bad_data(
                    &self.paths.data,
                    format!("unexpected format: {size} bytes match no {width}x{height} frame"),
                )
            })?;
        let end = size as u64;
        let data = match element_type {
            ElementType::I16 => FrameData::I16(reader.read_elements(0, end)?),
            ElementType::U32 => FrameData::U32(reader.read_elements(0, end)?),
            ElementType::U64 => FrameData::U64(reader.read_elements(0, end)?),
            ElementType::Double => FrameData::Double(reader.read_elements(0, end)?),
        };
        Frame::new(width, height, data)
    }

    /// Infers shape and layout of a data file that has no description.
    ///
    /// Only text files can be guessed: the first data line decides the
    /// layout (two items for `[X,C]`, three for `[X,Y,C]`, otherwise a
    /// matrix), and the values decide between `u32` and `double`.
    ///
    /// # Errors
    /// Returns [`Error::BadData`] for binary or empty files.
    pub fn guess_format(&self) -> Result<GuessedFormat> {
        let path = &self.paths.data;
        let reader = MappedFileReader::open(path)?;
        let bytes = reader.as_bytes();
        let sample = &bytes[..bytes.len().min(SAMPLE_BYTES)];
        if sample.iter().any(|&b| !is_numeric_text(b)) {
            return Err(Error::bad_data(path, "binary data without description"));
        }
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::bad_data(path, "binary data without description"))?;

        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && *line != "#");
        let first_items = lines
            .next()
            .map(|line| line.split_ascii_whitespace().count())
            .ok_or_else(|| Error::bad_data(path, "empty data file"))?;

        let element_type = if text.contains(|c| matches!(c, '.' | 'e' | 'E' | '-')) {
            ElementType::Double
        } else {
            ElementType::U32
        };

        let data_lines = || {
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && *line != "#")
        };
        let column_max = |column: usize| -> Result<u64> {
            data_lines().try_fold(0u64, |max, line| {
                let item = line
                    .split_ascii_whitespace()
                    .nth(column)
                    .and_then(|item| item.parse::<u64>().ok())
                    .ok_or_else(|| Error::bad_data(path, format!("malformed line \"{line}\"")))?;
                Ok(max.max(item))
            })
        };

        let (layout, width, height) = match first_items {
            2 => {
                let max = column_max(0)?;
                let side = round_up_to_tile(ceil_sqrt(max + 1), path)?;
                (Layout::SparseX, side, side)
            }
            3 => {
                let width = round_up_to_tile(column_max(0)? + 1, path)?;
                let height = round_up_to_tile(column_max(1)? + 1, path)?;
                (Layout::SparseXY, width, height)
            }
            items => {
                let width = u32::try_from(items)
                    .map_err(|_| Error::bad_data(path, "too many columns"))?;
                let height = u32::try_from(data_lines().count())
                    .map_err(|_| Error::bad_data(path, "too many rows"))?;
                (Layout::Matrix, width, height)
            }
        };

        Ok(GuessedFormat {
            element_type,
            layout,
            encoding: Encoding::Ascii,
            width,
            height,
        })
    }

    /// Compares the three files of the stream without modifying them.
    ///
    /// # Errors
    /// Returns an error only if an existing file cannot be read.
    pub fn validate(&self) -> Result<StreamReport> {
        let paths = &self.paths;
        let mut report = StreamReport {
            data_size: fsutil::file_size(&paths.data),
            description_size: fsutil::file_size(&paths.description),
            index_size: fsutil::file_size(&paths.index),
            ..StreamReport::default()
        };

        if report.data_size.is_none() {
            report.problems.push("data file is missing".to_string());
        }

        if report.description_size.is_some() {
            match description::read_header(&paths.description) {
                Ok(header) => report.header_count = Some(header.frame_count),
                Err(err) => report.problems.push(err.to_string()),
            }
            let mut scanner = TextScanner::<DescriptionHeader>::open(&paths.description)?;
            report.description_blocks = Some(scanner.count_headers()?);
            report.last_block = scanner.last_header(DEFAULT_TAIL_WINDOW)?;
        } else if report.index_size.is_some() {
            report.problems.push("index file without description".to_string());
        }

        if let (Some(count), Some(blocks)) = (report.header_count, report.description_blocks) {
            if count != blocks {
                report
                    .problems
                    .push(format!("header counts {count} frames, description holds {blocks} blocks"));
            }
            if report.last_block != count.checked_sub(1) {
                report.problems.push(format!(
                    "last description block is {:?}, expected {:?}",
                    report.last_block,
                    count.checked_sub(1)
                ));
            }
        }

        if report.index_size.is_some() {
            match index::record_count(&paths.index) {
                Ok(records) => report.index_records = records,
                Err(err) => report.problems.push(err.to_string()),
            }
        }

        if let (Some(records), Some(count)) = (report.index_records, report.header_count) {
            if records + 1 != count {
                report
                    .problems
                    .push(format!("{records} index records for {count} frames"));
            }
            if records > 0 {
                let last = index::read_record(&paths.index, records - 1)?;
                if last.description >= report.description_size.unwrap_or(0) {
                    report.problems.push(format!(
                        "last description offset {} is past the description file",
                        last.description
                    ));
                }
                if last.data > report.data_size.unwrap_or(0) {
                    report
                        .problems
                        .push(format!("last data offset {} is past the data file", last.data));
                }
            }
        } else if report.header_count.is_some_and(|count| count > 1) && report.index_size.is_none() {
            report
                .problems
                .push("multi-frame stream without index".to_string());
        }

        Ok(report)
    }
}

fn dense_bytes(description: &FrameDescription) -> u64 {
    pixel_count(description.width, description.height) as u64 * description.element_type.size() as u64
}

fn is_numeric_text(byte: u8) -> bool {
    byte.is_ascii_digit() || byte.is_ascii_whitespace() || matches!(byte, b'+' | b'-' | b'.' | b'e' | b'E' | b'#')
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn ceil_sqrt(value: u64) -> u64 {
    let mut root = (value as f64).sqrt() as u64;
    while root * root > value {
        root -= 1;
    }
    while root * root < value {
        root += 1;
    }
    root
}

fn round_up_to_tile(value: u64, path: &Path) -> Result<u32> {
    let tiles = value.div_ceil(u64::from(TILE)).max(1);
    u32::try_from(tiles * u64::from(TILE))
        .map_err(|_| Error::bad_data(path, format!("coordinate {value} is out of range")))
}

fn encode_frame(frame: &Frame, layout: Layout, encoding: Encoding) -> Vec<u8> {
    let width = frame.width();
    match frame.data() {
        FrameData::I16(v) => codec::encode(v, width, layout, encoding),
        FrameData::U32(v) => codec::encode(v, width, layout, encoding),
        FrameData::U64(v) => codec::encode(v, width, layout, encoding),
        FrameData::Double(v) => codec::encode(v, width, layout, encoding),
    }
}

fn decode_frame(
    bytes: &[u8],
    element_type: ElementType,
    width: u32,
    height: u32,
    layout: Layout,
    encoding: Encoding,
    path: &Path,
) -> Result<FrameData> {
    fn typed<T: FrameElement>(
        bytes: &[u8],
        width: u32,
        height: u32,
        layout: Layout,
        encoding: Encoding,
        path: &Path,
    ) -> Result<FrameData> {
        codec::decode::<T>(bytes, width, height, layout, encoding, path).map(T::into_frame_data)
    }

    match element_type {
        ElementType::I16 => typed::<i16>(bytes, width, height, layout, encoding, path),
        ElementType::U32 => typed::<u32>(bytes, width, height, layout, encoding, path),
        ElementType::U64 => typed::<u64>(bytes, width, height, layout, encoding, path),
        ElementType::Double => typed::<f64>(bytes, width, height, layout, encoding, path),
    }
}
