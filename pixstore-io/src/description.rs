//! Description (`.dsc`) files.
//!
//! ```text
//! B000000002
//! [F0]
//! Type=double matrix width=256 height=256
//! "Acq time" ("Acquisition time [s]"):
//! double[1]
//! 0.5
//!
//!
//! [F1]
//! ...
//! ```
//!
//! The ten-byte header holds the payload encoding and the frame count; it
//! is rewritten in place on every append.

use crate::codec::{Encoding, Layout};
use crate::fsutil;
use crate::scanner::{DescriptionHeader, HeaderSyntax, TextScanner};
use pixstore_core::{DataType, ElementType, Error, Frame, MetaData, MetaDataMap, Result};
use std::fmt::Write as _;
use std::io::Read;
use std::path::Path;

/// Length of the `A000000000` / `B000000000` header.
pub const HEADER_LEN: usize = 10;

/// Largest frame count the nine-digit header can carry.
const MAX_FRAME_COUNT: u64 = 999_999_999;

/// Parsed description header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptionFileHeader {
    pub encoding: Encoding,
    pub frame_count: u64,
}

impl DescriptionFileHeader {
    fn to_bytes(self) -> Vec<u8> {
        format!("{}{:09}", self.encoding.letter(), self.frame_count).into_bytes()
    }

    fn parse(bytes: &[u8], path: &Path) -> Result<Self> {
        let bad = || Error::bad_data(path, "malformed description header");
        if bytes.len() < HEADER_LEN {
            return Err(bad());
        }
        let encoding = Encoding::from_letter(bytes[0]).ok_or_else(bad)?;
        let frame_count = std::str::from_utf8(&bytes[1..HEADER_LEN])
            .ok()
            .and_then(|digits| digits.trim().parse().ok())
            .ok_or_else(bad)?;
        Ok(Self {
            encoding,
            frame_count,
        })
    }
}

/// Shape, type and metadata of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescription {
    /// Frame number from the `[F<n>]` line.
    pub number: u64,
    pub element_type: ElementType,
    pub layout: Layout,
    pub width: u32,
    pub height: u32,
    pub metadata: MetaDataMap,
}

/// Reads the header of a description file.
///
/// # Errors
/// Returns an error if the file cannot be read or the header is malformed.
pub fn read_header(path: &Path) -> Result<DescriptionFileHeader> {
    let mut file = fsutil::open_read(path)?;
    let mut raw = [0u8; HEADER_LEN];
    file.read_exact(&mut raw)
        .map_err(|source| Error::read(path, source))?;
    DescriptionFileHeader::parse(&raw, path)
}

/// Writes the description of `frame`. When `append` is set the frame is
/// added to the existing file and the header count incremented; otherwise
/// the file is replaced.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if the existing file uses a different
/// encoding or the metadata cannot be serialized, and I/O errors otherwise.
pub fn write(
    path: &Path,
    frame: &Frame,
    layout: Layout,
    encoding: Encoding,
    append: bool,
    max_precision: bool,
) -> Result<()> {
    let existing = if append && fsutil::file_size(path).is_some_and(|size| size > 0) {
        Some(read_header(path)?)
    } else {
        None
    };

    if let Some(header) = existing {
        if header.encoding != encoding {
            return Err(Error::InvalidArgument(format!(
                "cannot append {encoding:?} frame to {:?} stream \"{}\"",
                header.encoding,
                path.display()
            )));
        }
        if header.frame_count >= MAX_FRAME_COUNT {
            return Err(Error::InvalidArgument(format!(
                "description \"{}\" is full",
                path.display()
            )));
        }
    }

    let number = existing.map_or(0, |h| h.frame_count);
    let block = format_block(number, frame, layout, max_precision)?;
    let header = DescriptionFileHeader {
        encoding,
        frame_count: number + 1,
    };

    if existing.is_some() {
        let mut file = fsutil::open_read_write(path)?;
        fsutil::write_all(&mut file, &header.to_bytes(), path)?;
        let end = file
            .metadata()
            .map_err(|source| Error::FileRead {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        fsutil::seek(&mut file, end, path)?;
        fsutil::write_all(&mut file, block.as_bytes(), path)
    } else {
        let mut file = fsutil::create(path)?;
        fsutil::write_all(&mut file, &header.to_bytes(), path)?;
        fsutil::write_all(&mut file, block.as_bytes(), path)
    }
}

fn format_block(number: u64, frame: &Frame, layout: Layout, max_precision: bool) -> Result<String> {
    let mut block = String::new();
    let _ = write!(
        block,
        "\n[F{number}]\nType={} {} width={} height={}\n",
        frame.element_type(),
        layout,
        frame.width(),
        frame.height()
    );

    for entry in &frame.metadata {
        let values = entry.format_values(max_precision);
        if values.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "metadata \"{}\" has no value to write",
                entry.name()
            )));
        }
        if entry.name().contains('"') || entry.description().contains('"') {
            return Err(Error::InvalidArgument(format!(
                "metadata name or description of \"{}\" contains a quote",
                entry.name()
            )));
        }
        if values.contains('\n') {
            return Err(Error::InvalidArgument(format!(
                "metadata value of \"{}\" spans several lines",
                entry.name()
            )));
        }
        if DescriptionHeader::frame_number(&values).is_some() {
            return Err(Error::InvalidArgument(format!(
                "metadata value of \"{}\" reads as a frame header",
                entry.name()
            )));
        }
        let _ = write!(
            block,
            "\"{}\" (\"{}\"):\n{}[{}]\n{}\n\n",
            entry.name(),
            entry.description(),
            entry.data_type(),
            entry.count(),
            values
        );
    }
    Ok(block)
}

/// Parses the frame description starting at `position` and checks that it
/// is frame `expected`.
///
/// Returns the description and whether another `[F<n>]` block follows.
///
/// # Errors
/// Returns [`Error::BadData`] if the block is missing, numbered differently
/// or malformed.
pub fn read_frame(
    scanner: &mut TextScanner<DescriptionHeader>,
    position: u64,
    expected: u64,
) -> Result<(FrameDescription, bool)> {
    let path = scanner.path().to_path_buf();
    scanner.seek(position)?;
    if position == 0 {
        // The header has no line terminator of its own.
        scanner.next_line()?;
    }

    let number = loop {
        match scanner.next_line()? {
            None => {
                return Err(Error::bad_data(
                    &path,
                    format!("frame {expected} description missing"),
                ))
            }
            Some(_) if scanner.line().trim().is_empty() => {}
            Some(_) => {
                break DescriptionHeader::frame_number(
                    scanner.line(),
                )
                .ok_or_else(|| {
                    Error::bad_data(&path, format!("expected [F{expected}], found \"{}\"", scanner.line()))
                })?;
            }
        }
    };
    if number != expected {
        log::warn!(
            "{}: found frame [F{number}] where [F{expected}] was expected",
            path.display()
        );
        return Err(Error::bad_data(
            &path,
            format!("expected [F{expected}], found [F{number}]"),
        ));
    }

    if scanner.next_line()?.is_none() {
        return Err(Error::bad_data(&path, "frame type line missing"));
    }
    let (element_type, layout, width, height) = parse_type_line(scanner.line())
        .ok_or_else(|| Error::bad_data(&path, format!("malformed type line \"{}\"", scanner.line())))?;

    let mut metadata = MetaDataMap::new();
    let mut more_frames = false;
    while scanner.next_line()?.is_some() {
        let line = scanner.line().trim_end();
        if line.is_empty() {
            continue;
        }
        if DescriptionHeader::frame_number(line).is_some() {
            more_frames = true;
            break;
        }
        let (name, description) = parse_name_line(line)
            .ok_or_else(|| Error::bad_data(&path, format!("malformed metadata line \"{line}\"")))?;

        if scanner.next_line()?.is_none() {
            return Err(Error::bad_data(&path, format!("metadata \"{name}\" has no type")));
        }
        let (data_type, count) = parse_count_line(scanner.line()).ok_or_else(|| {
            Error::bad_data(&path, format!("malformed metadata type \"{}\"", scanner.line()))
        })?;

        if scanner.next_line()?.is_none() {
            return Err(Error::bad_data(&path, format!("metadata \"{name}\" has no values")));
        }
        let entry = MetaData::parse(name.clone(), description, data_type, count, scanner.line())
            .map_err(|err| Error::bad_data(&path, err.to_string()))?;
        metadata.insert(entry);
    }

    Ok((
        FrameDescription {
            number,
            element_type,
            layout,
            width,
            height,
            metadata,
        },
        more_frames,
    ))
}

fn parse_type_line(line: &str) -> Option<(ElementType, Layout, u32, u32)> {
    let mut items = line.trim().split_ascii_whitespace();
    let type_name = items.next()?.strip_prefix("Type=")?;
    let element_type = ElementType::from_data_type(DataType::from_name(type_name)?)?;
    let layout = Layout::from_name(items.next()?)?;
    let width = items.next()?.strip_prefix("width=")?.parse().ok()?;
    let height = items.next()?.strip_prefix("height=")?.parse().ok()?;
    Some((element_type, layout, width, height))
}

/// `"name" ("description"):`
fn parse_name_line(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix('"')?;
    let (name, rest) = rest.split_once('"')?;
    let description = rest.trim_start().strip_prefix("(\"")?.strip_suffix("\"):")?;
    Some((name.to_string(), description.to_string()))
}

/// `type[count]`
fn parse_count_line(line: &str) -> Option<(DataType, usize)> {
    let (type_name, rest) = line.trim().split_once('[')?;
    let count = rest.strip_suffix(']')?.parse().ok()?;
    Some((DataType::from_name(type_name)?, count))
}
