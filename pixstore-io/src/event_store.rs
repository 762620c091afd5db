//! In-memory pixel-event store and its text log.
//!
//! Events arrive as packed `(value, flat index)` pairs grouped into frames
//! by [`FrameInfo`] records. The store persists them to a pixel log:
//!
//! ```text
//! [File Meta Data]
//! HV:60
//! Width:256
//! Height:256
//!
//! [Frame 1, 1700000000.5, 0.01 s]
//! 4113	12
//! 4114	-3
//!
//! ```
//!
//! Frames without events are not written, so log frame numbers count
//! written frames (1-based) rather than store frames.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use crate::fsutil;
use crate::index;
use crate::scanner::{HeaderSyntax, PixelLogHeader, TextScanner, DEFAULT_TAIL_WINDOW};
use pixstore_core::{
    pixel_count, DataType, Error, Frame, FrameData, MetaData, MetaDataMap, PixelEventBatch,
    Result, ACQ_TIME, START_TIME,
};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const FILE_METADATA_HEADER: &str = "[File Meta Data]";

/// Flat indices are 16-bit; no other size is supported.
const MATRIX_INDEX_SIZE: usize = 2;

/// Configuration for [`EventPixelStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventStoreConfig {
    /// Maximum number of buffered events. The buffer never grows on append.
    pub capacity: usize,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Initial length of the frame list; it doubles when exhausted.
    pub frame_info_capacity: usize,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            capacity: 1 << 20,
            width: 256,
            height: 256,
            frame_info_capacity: 16,
        }
    }
}

impl EventStoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_frame_info_capacity(mut self, capacity: usize) -> Self {
        self.frame_info_capacity = capacity;
        self
    }
}

/// Event range and timing of one frame.
///
/// Passed to [`EventPixelStore::add_pixels`], `start` and `end` are
/// relative to the added events; stored, they are absolute.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameInfo {
    pub start: usize,
    pub end: usize,
    /// Acquisition time in seconds.
    pub acq_time: f64,
    /// Acquisition start time in seconds.
    pub start_time: f64,
}

impl FrameInfo {
    #[must_use]
    pub fn new(start: usize, end: usize, acq_time: f64, start_time: f64) -> Self {
        Self {
            start,
            end,
            acq_time,
            start_time,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

struct Inner {
    width: u32,
    height: u32,
    capacity: usize,
    events: PixelEventBatch,
    frames: Vec<FrameInfo>,
    saved_frame_count: usize,
    metadata: MetaDataMap,
    file_metadata_loaded: bool,
}

/// Fixed-capacity buffer of pixel events, shared through [`Arc`].
///
/// All state sits behind one mutex; every operation holds it for its full
/// duration, so frame count, event count and frame list stay consistent.
pub struct EventPixelStore {
    inner: Mutex<Inner>,
}

impl EventPixelStore {
    /// Creates a shared store.
    #[must_use]
    pub fn new(config: &EventStoreConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                width: config.width,
                height: config.height,
                capacity: config.capacity,
                events: PixelEventBatch::with_capacity(config.capacity),
                frames: Vec::with_capacity(config.frame_info_capacity.max(1)),
                saved_frame_count: 0,
                metadata: MetaDataMap::new(),
                file_metadata_loaded: false,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of handles sharing this store.
    #[must_use]
    pub fn ref_count(this: &Arc<Self>) -> usize {
        Arc::strong_count(this)
    }

    /// Appends packed little-endian `(value: i16, index: u16)` events and
    /// the frames they form.
    ///
    /// # Errors
    /// - [`Error::BufferFull`] if the events do not fit; nothing is added.
    /// - [`Error::InvalidArgument`] for a malformed buffer or a frame range
    ///   outside it.
    pub fn add_pixels(&self, packed: &[u8], frames: &[FrameInfo]) -> Result<()> {
        let batch = PixelEventBatch::from_packed(packed)?;
        self.add_events(&batch, frames)
    }

    /// Appends decoded events and the frames they form.
    ///
    /// # Errors
    /// See [`Self::add_pixels`].
    pub fn add_events(&self, batch: &PixelEventBatch, frames: &[FrameInfo]) -> Result<()> {
        if let Some(bad) = frames
            .iter()
            .find(|f| f.start > f.end || f.end > batch.len())
        {
            return Err(Error::InvalidArgument(format!(
                "frame range {}..{} outside {} added events",
                bad.start,
                bad.end,
                batch.len()
            )));
        }

        let mut inner = self.lock();
        let filled = inner.events.len();
        let available = inner.capacity - filled;
        if batch.len() > available {
            return Err(Error::BufferFull {
                requested: batch.len(),
                available,
            });
        }

        inner.events.extend_from_range(batch, 0..batch.len());
        for info in frames {
            if inner.frames.len() == inner.frames.capacity() {
                let grow = inner.frames.capacity().max(1);
                inner.frames.reserve_exact(grow);
            }
            inner.frames.push(FrameInfo {
                start: filled + info.start,
                end: filled + info.end,
                ..*info
            });
        }
        Ok(())
    }

    /// Drops all events and frames. Metadata is kept.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.events.clear();
        inner.frames.clear();
        inner.saved_frame_count = 0;
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.lock().frames.len()
    }

    /// Number of buffered events.
    #[must_use]
    pub fn pixels_size(&self) -> usize {
        self.lock().events.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        let inner = self.lock();
        (inner.width, inner.height)
    }

    #[must_use]
    pub fn frame_info(&self, index: usize) -> Option<FrameInfo> {
        self.lock().frames.get(index).copied()
    }

    /// Sets the byte size of stored flat indices.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for anything but 2.
    pub fn set_matrix_index_size(&self, size: usize) -> Result<()> {
        if size == MATRIX_INDEX_SIZE {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "matrix index size {size} not supported, only {MATRIX_INDEX_SIZE}"
            )))
        }
    }

    /// Materializes frame `index` as a dense `i16` frame.
    ///
    /// The store's metadata is copied; `Acq time` and `Start time` come
    /// from the frame itself.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the frame does not exist or one
    /// of its events lies outside it.
    pub fn frame(&self, index: usize) -> Result<Frame> {
        let inner = self.lock();
        let info = *inner.frames.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "frame {index} out of range, store holds {} frames",
                inner.frames.len()
            ))
        })?;

        let len = pixel_count(inner.width, inner.height);
        let mut values = pixstore_core::frame::zeroed_vec::<i16>(len)?;
        for (value, flat) in inner.events.events(info.start..info.end) {
            let cell = values.get_mut(usize::from(flat)).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "event index {flat} outside {}x{} frame {index}",
                    inner.width, inner.height
                ))
            })?;
            *cell = value;
        }

        let metadata = inner
            .metadata
            .iter()
            .filter(|entry| entry.name() != ACQ_TIME && entry.name() != START_TIME)
            .cloned()
            .collect();
        let mut frame =
            Frame::new(inner.width, inner.height, FrameData::I16(values))?.with_metadata(metadata);
        frame.set_acq_time(info.acq_time);
        frame.set_start_time(info.start_time);
        Ok(frame)
    }

    /// Writes every frame not yet saved to the pixel log at `path`.
    /// Returns the number of frames written; frames without events are
    /// skipped and not indexed.
    ///
    /// # Errors
    /// Returns [`Error::BadData`] if `path` exists without its index, and
    /// I/O errors otherwise.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let mut inner = self.lock();
        let pending: Vec<FrameInfo> = inner.frames[inner.saved_frame_count..].to_vec();

        let mut writer = PixelLogWriter::open(path, &inner)?;
        let mut written = 0;
        for info in pending.iter().filter(|info| !info.is_empty()) {
            let rows = inner.events.events(info.start..info.end);
            writer.write_frame(info.start_time, info.acq_time, rows);
            written += 1;
        }
        writer.finish()?;
        inner.saved_frame_count = inner.frames.len();
        log::debug!("{}: wrote {written} of {} frames", path.display(), pending.len());
        Ok(written)
    }

    /// Appends the non-zero cells of a dense frame to the pixel log.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the frame has more cells than
    /// 16-bit indices address or a value outside the 16-bit range.
    pub fn save_frame_to_pixel_log(&self, path: impl AsRef<Path>, frame: &Frame) -> Result<()> {
        let path = path.as_ref();
        if frame.len() > usize::from(u16::MAX) + 1 {
            return Err(Error::InvalidArgument(format!(
                "{}x{} frame exceeds 16-bit pixel indices",
                frame.width(),
                frame.height()
            )));
        }
        let mut batch = PixelEventBatch::default();
        for cell in 0..frame.len() {
            let value = frame.data().get_f64(cell).unwrap_or(0.0);
            if value == 0.0 {
                continue;
            }
            if value.fract() != 0.0 || !(-32_768.0..=65_535.0).contains(&value) {
                return Err(Error::InvalidArgument(format!(
                    "value {value} at cell {cell} does not fit a pixel log"
                )));
            }
            batch.push(value as i32 as i16, cell as u16);
        }

        let inner = self.lock();
        let mut writer = PixelLogWriter::open(path, &inner)?;
        if !batch.is_empty() {
            writer.write_frame(
                frame.start_time().unwrap_or(0.0),
                frame.acq_time().unwrap_or(0.0),
                batch.events(0..batch.len()),
            );
        }
        writer.finish()
    }

    /// Loads frame `index` (0-based, counting written frames) of the pixel
    /// log at `path`, replacing the buffered events.
    ///
    /// The file metadata block is parsed on the first load only.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if the frame does not exist.
    /// - [`Error::BadData`] for malformed rows.
    pub fn load(&self, path: impl AsRef<Path>, index: u64) -> Result<()> {
        let path = path.as_ref();
        let mut inner = self.lock();
        let mut scanner = TextScanner::<PixelLogHeader>::open(path)?;

        if !inner.file_metadata_loaded {
            let metadata = read_file_metadata(&mut scanner)?;
            apply_file_metadata(&mut inner, metadata);
            inner.file_metadata_loaded = true;
        }

        let position = locate_frame(&mut scanner, path, index)?;
        let (info, events) = read_frame(&mut scanner, path, position, index)?;

        let needed = events.len().max(pixel_count(inner.width, inner.height));
        if inner.capacity < needed {
            inner.capacity = needed;
        }
        inner.events = events;
        inner.frames.clear();
        inner.frames.push(info);
        inner.saved_frame_count = inner.frames.len();
        Ok(())
    }

    /// Number of frames in the pixel log at `path`: the index size when
    /// an index exists, otherwise the last frame header found in the final
    /// [`DEFAULT_TAIL_WINDOW`] bytes.
    ///
    /// # Errors
    /// Returns an error if the log cannot be read.
    pub fn count_in_file(path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        if let Some(count) = index::offset_count(&index_path(path)) {
            return Ok(count);
        }
        let mut scanner = TextScanner::<PixelLogHeader>::open(path)?;
        Ok(scanner.last_header_in_tail(DEFAULT_TAIL_WINDOW)?.unwrap_or(0))
    }

    /// Adds a metadata entry.
    ///
    /// # Errors
    /// Returns [`Error::Exists`] if the name is taken.
    pub fn add_metadata(&self, entry: MetaData) -> Result<()> {
        self.lock().metadata.add(entry)
    }

    /// A copy of the entry called `name`.
    ///
    /// # Errors
    /// Returns [`Error::ItemNotFound`] if there is none.
    pub fn metadata(&self, name: &str) -> Result<MetaData> {
        self.lock().metadata.require(name).cloned()
    }

    /// # Errors
    /// Returns [`Error::ItemNotFound`] if there is no such entry.
    pub fn remove_metadata(&self, name: &str) -> Result<MetaData> {
        self.lock().metadata.remove(name)
    }

    pub fn remove_all_metadata(&self) {
        self.lock().metadata.clear();
    }

    /// # Errors
    /// Returns [`Error::ItemNotFound`] if there is no such entry.
    pub fn metadata_raw(&self, name: &str) -> Result<Vec<u8>> {
        self.lock().metadata.raw(name).map(<[u8]>::to_vec)
    }

    /// # Errors
    /// Returns [`Error::ItemNotFound`] if there is no such entry.
    pub fn set_metadata_raw(&self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        self.lock().metadata.set_raw(name, data)
    }

    #[must_use]
    pub fn metadata_names(&self) -> Vec<String> {
        self.lock().metadata.names().map(str::to_string).collect()
    }

    #[must_use]
    pub fn metadata_count(&self) -> usize {
        self.lock().metadata.len()
    }
}

fn index_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".idx");
    name.into()
}

/// Appends frames to a pixel log and its index.
struct PixelLogWriter<'a> {
    path: &'a Path,
    index: std::path::PathBuf,
    text: String,
    offset: u64,
    next_number: u64,
    offsets: Vec<u64>,
}

impl<'a> PixelLogWriter<'a> {
    /// A new log starts with the store metadata. `Width` and `Height` are
    /// always recorded so a reader restores the frame shape.
    fn open(path: &'a Path, inner: &Inner) -> Result<Self> {
        let index = index_path(path);
        let offset = fsutil::file_size(path).unwrap_or(0);
        let indexed = index::offset_count(&index);
        if offset > 0 && indexed.is_none() {
            return Err(Error::bad_data(
                path,
                "pixel log exists without index, cannot append",
            ));
        }

        let mut text = String::new();
        if offset == 0 {
            text.push_str(FILE_METADATA_HEADER);
            text.push('\n');
            for entry in &inner.metadata {
                let _ = writeln!(text, "{}:{}", entry.name(), entry.format_values(true));
            }
            for (name, value) in [("Width", inner.width), ("Height", inner.height)] {
                if !inner.metadata.contains(name) {
                    let _ = writeln!(text, "{name}:{value}");
                }
            }
            text.push('\n');
        }
        Ok(Self {
            path,
            index,
            text,
            offset,
            next_number: indexed.unwrap_or(0) + 1,
            offsets: Vec::new(),
        })
    }

    fn write_frame(
        &mut self,
        start_time: f64,
        acq_time: f64,
        rows: impl Iterator<Item = (i16, u16)>,
    ) {
        self.offsets.push(self.offset + self.text.len() as u64);
        let _ = writeln!(
            self.text,
            "[Frame {}, {start_time}, {acq_time} s]",
            self.next_number
        );
        for (value, flat) in rows {
            let _ = writeln!(self.text, "{flat}\t{value}");
        }
        self.text.push('\n');
        self.next_number += 1;
    }

    fn finish(self) -> Result<()> {
        if self.text.is_empty() {
            return Ok(());
        }
        let mut file = fsutil::open_append(self.path)?;
        fsutil::write_all(&mut file, self.text.as_bytes(), self.path)?;
        fsutil::flush(&mut file, self.path)?;
        if self.offsets.is_empty() && index::offset_count(&self.index).is_none() {
            // A new log with only metadata still gets an (empty) index.
            fsutil::open_append(&self.index)?;
        }
        for offset in self.offsets {
            index::append_offset(&self.index, offset)?;
        }
        Ok(())
    }
}

fn read_file_metadata(scanner: &mut TextScanner<PixelLogHeader>) -> Result<MetaDataMap> {
    let mut metadata = MetaDataMap::new();
    scanner.seek(0)?;
    if scanner.next_line()?.is_none() || scanner.line() != FILE_METADATA_HEADER {
        return Ok(metadata);
    }
    while scanner.next_line()?.is_some() {
        let line = scanner.line();
        if line.trim().is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            log::warn!("{}: ignoring metadata line \"{line}\"", scanner.path().display());
            continue;
        };
        metadata.insert(file_metadata_entry(name.trim(), value.trim()));
    }
    Ok(metadata)
}

fn file_metadata_entry(name: &str, value: &str) -> MetaData {
    let data_type = match name {
        "HV" => DataType::Double,
        "Width" | "Height" => DataType::I32,
        _ => DataType::Char,
    };
    if data_type.is_text() {
        return MetaData::from_text(name, "", value);
    }
    MetaData::parse(name, "", data_type, 1, value)
        .unwrap_or_else(|_| MetaData::from_text(name, "", value))
}

fn apply_file_metadata(inner: &mut Inner, metadata: MetaDataMap) {
    let dimension = |name: &str| {
        metadata
            .get(name)
            .and_then(MetaData::as_i64)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|&v| v > 0)
    };
    if let (Some(width), Some(height)) = (dimension("Width"), dimension("Height")) {
        inner.width = width;
        inner.height = height;
    }
    for entry in &metadata {
        inner.metadata.insert(entry.clone());
    }
}

fn locate_frame(scanner: &mut TextScanner<PixelLogHeader>, path: &Path, index: u64) -> Result<u64> {
    let out_of_range = || {
        Error::InvalidArgument(format!(
            "frame {index} not found in \"{}\"",
            path.display()
        ))
    };
    if let Some(count) = index::offset_count(&index_path(path)) {
        if index >= count {
            return Err(out_of_range());
        }
        return index::read_offset(&index_path(path), index);
    }
    log::debug!("{}: no index, searching for frame {}", path.display(), index + 1);
    scanner.find_frame(index + 1, None)?.ok_or_else(out_of_range)
}

fn read_frame(
    scanner: &mut TextScanner<PixelLogHeader>,
    path: &Path,
    position: u64,
    index: u64,
) -> Result<(FrameInfo, PixelEventBatch)> {
    scanner.seek(position)?;
    if scanner.next_line()?.is_none()
        || PixelLogHeader::frame_number(scanner.line()) != Some(index + 1)
    {
        log::warn!(
            "{}: no header of frame {} at offset {position}",
            path.display(),
            index + 1
        );
        return Err(Error::bad_data(
            path,
            format!("expected frame {} at offset {position}", index + 1),
        ));
    }
    let (start_time, acq_time) = parse_header_times(scanner.line()).ok_or_else(|| {
        Error::bad_data(path, format!("malformed frame header \"{}\"", scanner.line()))
    })?;

    let mut events = PixelEventBatch::default();
    while scanner.next_line()?.is_some() {
        let line = scanner.line().trim();
        if line.is_empty() || PixelLogHeader::frame_number(line).is_some() {
            break;
        }
        let (flat, value) = parse_row(line)
            .ok_or_else(|| Error::bad_data(path, format!("malformed pixel row \"{line}\"")))?;
        events.push(value, flat);
    }

    let info = FrameInfo::new(0, events.len(), acq_time, start_time);
    Ok((info, events))
}

/// `index\tvalue`. Values are 16-bit, written signed; unsigned writers'
/// values up to 65535 wrap into the signed range.
fn parse_row(line: &str) -> Option<(u16, i16)> {
    let mut items = line.split_ascii_whitespace();
    let flat = items.next()?.parse::<u16>().ok()?;
    let value = items.next()?.parse::<i32>().ok()?;
    if items.next().is_some() {
        return None;
    }
    let value = match value {
        -32_768..=32_767 => value as i16,
        32_768..=65_535 => value as u16 as i16,
        _ => return None,
    };
    Some((flat, value))
}

/// `(start, acq)` from `[Frame <n>, <start>, <acq> s]`.
fn parse_header_times(line: &str) -> Option<(f64, f64)> {
    let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut fields = inner.split(',').map(str::trim);
    fields.next()?;
    let start = fields.next()?.parse().ok()?;
    let acq = fields.next()?.strip_suffix('s')?.trim_end().parse().ok()?;
    Some((start, acq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixstore_core::ErrorKind;
    use tempfile::tempdir;

    fn packed(events: &[(i16, u16)]) -> Vec<u8> {
        let mut batch = PixelEventBatch::default();
        for &(value, index) in events {
            batch.push(value, index);
        }
        batch.to_packed()
    }

    fn small_store(capacity: usize) -> Arc<EventPixelStore> {
        EventPixelStore::new(
            &EventStoreConfig::new()
                .with_capacity(capacity)
                .with_dimensions(4, 4)
                .with_frame_info_capacity(1),
        )
    }

    #[test]
    fn test_buffer_full_leaves_state_unchanged() {
        let store = small_store(3);
        store
            .add_pixels(&packed(&[(1, 0), (2, 1)]), &[FrameInfo::new(0, 2, 0.1, 1.0)])
            .unwrap();

        let err = store
            .add_pixels(&packed(&[(3, 2), (4, 3)]), &[FrameInfo::new(0, 2, 0.1, 2.0)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BufferFull);
        assert_eq!(store.pixels_size(), 2);
        assert_eq!(store.frame_count(), 1);
    }

    #[test]
    fn test_frame_offsets_become_absolute() {
        let store = small_store(16);
        store
            .add_pixels(&packed(&[(1, 0)]), &[FrameInfo::new(0, 1, 0.1, 1.0)])
            .unwrap();
        store
            .add_pixels(
                &packed(&[(5, 5), (6, 6), (7, 15)]),
                &[FrameInfo::new(0, 2, 0.1, 2.0), FrameInfo::new(2, 3, 0.2, 3.0)],
            )
            .unwrap();
        assert_eq!(store.frame_count(), 3);
        assert_eq!(store.frame_info(2).unwrap(), FrameInfo::new(3, 4, 0.2, 3.0));

        let frame = store.frame(1).unwrap();
        assert_eq!(frame.data().get_f64(5), Some(5.0));
        assert_eq!(frame.data().get_f64(0), Some(0.0));
        assert_eq!(frame.start_time(), Some(2.0));
        assert_eq!(store.frame(3).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_frame_range_outside_batch() {
        let store = small_store(16);
        let err = store
            .add_pixels(&packed(&[(1, 0)]), &[FrameInfo::new(0, 2, 0.1, 1.0)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(store.pixels_size(), 0);
    }

    #[test]
    fn test_metadata_copied_except_times() {
        let store = small_store(16);
        store.add_metadata(MetaData::from_f64("HV", "Bias", 60.0)).unwrap();
        store.add_metadata(MetaData::from_f64(ACQ_TIME, "", 99.0)).unwrap();
        store
            .add_pixels(&packed(&[(1, 0)]), &[FrameInfo::new(0, 1, 0.5, 1.0)])
            .unwrap();

        let frame = store.frame(0).unwrap();
        assert_eq!(frame.acq_time(), Some(0.5));
        assert_eq!(frame.metadata.get("HV").unwrap().as_f64(), Some(60.0));
        assert_eq!(store.metadata_count(), 2);
        assert_eq!(
            store.add_metadata(MetaData::from_i32("HV", "", 1)).unwrap_err().kind(),
            ErrorKind::Exists
        );
    }

    #[test]
    fn test_save_skips_empty_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.plog");
        let store = small_store(16);
        store.add_metadata(MetaData::from_f64("HV", "", 60.0)).unwrap();
        store
            .add_pixels(
                &packed(&[(12, 3), (-3, 4), (9, 1)]),
                &[
                    FrameInfo::new(0, 2, 0.01, 10.0),
                    FrameInfo::new(2, 2, 0.01, 11.0),
                    FrameInfo::new(2, 3, 0.01, 12.0),
                ],
            )
            .unwrap();

        assert_eq!(store.save(&path).unwrap(), 2);
        assert_eq!(store.save(&path).unwrap(), 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "[File Meta Data]\nHV:60\nWidth:4\nHeight:4\n\n[Frame 1, 10, 0.01 s]\n3\t12\n4\t-3\n\n[Frame 2, 12, 0.01 s]\n1\t9\n\n"
        );
        assert_eq!(EventPixelStore::count_in_file(&path).unwrap(), 2);

        let reader = small_store(1);
        reader.load(&path, 1).unwrap();
        assert_eq!(reader.pixels_size(), 1);
        assert_eq!(reader.frame(0).unwrap().start_time(), Some(12.0));
        assert_eq!(reader.metadata("HV").unwrap().as_f64(), Some(60.0));
        assert!(reader.capacity() >= 16);
    }

    #[test]
    fn test_log_records_store_dimensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("narrow.plog");
        let store = EventPixelStore::new(&EventStoreConfig::new().with_dimensions(64, 64));
        store
            .add_pixels(&packed(&[(7, 643)]), &[FrameInfo::new(0, 1, 0.1, 1.0)])
            .unwrap();
        assert_eq!(store.save(&path).unwrap(), 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[File Meta Data]\nWidth:64\nHeight:64\n\n"));

        let reader = EventPixelStore::new(&EventStoreConfig::new());
        reader.load(&path, 0).unwrap();
        assert_eq!(reader.dimensions(), (64, 64));
        let frame = reader.frame(0).unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 64));
        assert_eq!(frame.data().get_f64(643), Some(7.0));
    }

    #[test]
    fn test_existing_log_without_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orphan.plog");
        std::fs::write(&path, "[Frame 1, 0, 1 s]\n0\t1\n\n").unwrap();
        let store = small_store(16);
        store
            .add_pixels(&packed(&[(1, 0)]), &[FrameInfo::new(0, 1, 0.1, 1.0)])
            .unwrap();
        assert_eq!(store.save(&path).unwrap_err().kind(), ErrorKind::BadData);

        // Reading still works through the text search.
        store.load(&path, 0).unwrap();
        assert_eq!(store.frame(0).unwrap().data().get_f64(0), Some(1.0));
        assert_eq!(EventPixelStore::count_in_file(&path).unwrap(), 1);
    }

    #[test]
    fn test_rows_accept_unsigned_values() {
        assert_eq!(parse_row("17\t65535"), Some((17, -1)));
        assert_eq!(parse_row("17\t-2"), Some((17, -2)));
        assert_eq!(parse_row("17\t65536"), None);
        assert_eq!(parse_row("70000\t1"), None);
        assert_eq!(parse_header_times("[Frame 4, 1.25, 0.5 s]"), Some((1.25, 0.5)));
    }

    #[test]
    fn test_matrix_index_size() {
        let store = small_store(1);
        assert!(store.set_matrix_index_size(2).is_ok());
        assert_eq!(
            store.set_matrix_index_size(4).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_shared_handles() {
        let store = small_store(8);
        let other = Arc::clone(&store);
        assert_eq!(EventPixelStore::ref_count(&store), 2);
        std::thread::spawn(move || {
            other
                .add_pixels(&packed(&[(1, 1)]), &[FrameInfo::new(0, 1, 0.1, 0.0)])
                .unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(EventPixelStore::ref_count(&store), 1);
        assert_eq!(store.pixels_size(), 1);
    }
}
