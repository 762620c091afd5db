//! Cluster logs: per-frame text listings of clustered pixels.
//!
//! ```text
//! Frame 1 (1700000000.25, 0.01 s)
//! [12, 40, 3] [13, 40, 7] [13, 41, 2]
//! [200, 9, 1]
//!
//! Frame 2 (1700000000.26, 0.01 s)
//!
//! ```
//!
//! Tpx3 detectors add the time of arrival as a fourth record field. Frame
//! numbers are 1-based. A parallel `<log>.idx` holds one 8-byte offset
//! per frame.

use crate::fsutil;
use crate::index;
use crate::scanner::{ClusterLogHeader, HeaderSyntax, TextScanner, DEFAULT_TAIL_WINDOW};
use pixstore_algorithms::find_clusters;
use pixstore_core::{
    pixel_count, Element, Error, Frame, FrameData, MetaData, MetaDataMap, Result, ACQ_TIME,
    START_TIME,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Detector tile size; guessed dimensions are multiples of it.
const TILE: u32 = 256;

/// Record layout of a cluster log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClusterLogFormat {
    /// `[x, y, value]`
    Legacy,
    /// `[x, y, value, toa]`
    Tpx3,
}

/// One frame read back from a cluster log.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterLogFrame {
    pub width: u32,
    pub height: u32,
    /// Dense values, row-major.
    pub tot: Vec<f64>,
    /// Dense times of arrival, if requested.
    pub toa: Option<Vec<f64>>,
    /// `Start time` and `Acq time` from the frame header.
    pub metadata: MetaDataMap,
}

impl ClusterLogFrame {
    /// The values as a `double` frame carrying the header times.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the buffer does not match the
    /// dimensions.
    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame::new(self.width, self.height, FrameData::Double(self.tot.clone()))?
            .with_metadata(self.metadata.clone()))
    }
}

/// A single `[x, y, value(, toa)]` record.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Record {
    x: u32,
    y: u32,
    value: f64,
    toa: Option<f64>,
}

impl Record {
    fn parse(text: &str) -> Option<Self> {
        let mut fields = text.split(',').map(str::trim);
        let x = u32::parse_text(fields.next()?)?;
        let y = u32::parse_text(fields.next()?)?;
        let value = f64::parse_text(fields.next()?)?;
        let toa = match fields.next() {
            Some(field) => Some(f64::parse_text(field)?),
            None => None,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(Self { x, y, value, toa })
    }
}

/// Bracketed groups of a record line.
fn bracketed(line: &str) -> impl Iterator<Item = &str> {
    line.split('[')
        .skip(1)
        .filter_map(|part| part.split_once(']').map(|(inner, _)| inner))
}

/// Appends the bracket records of one cluster pixel.
fn push_record(line: &mut String, x: u32, y: u32, value: &str, toa: Option<&str>) {
    if !line.is_empty() {
        line.push(' ');
    }
    let _ = match toa {
        Some(toa) => write!(line, "[{x}, {y}, {value}, {toa}]"),
        None => write!(line, "[{x}, {y}, {value}]"),
    };
}

/// A cluster log and its offset index.
#[derive(Debug, Clone)]
pub struct ClusterLog {
    path: PathBuf,
    index: PathBuf,
}

impl ClusterLog {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut index = path.clone().into_os_string();
        index.push(".idx");
        Self {
            path,
            index: PathBuf::from(index),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn index_path(&self) -> &Path {
        &self.index
    }

    /// Clusters `raster` and appends it as the next frame. Returns the
    /// number of clusters written.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the raster does not match the
    /// dimensions, and I/O errors otherwise.
    pub fn save<T: Element>(
        &self,
        raster: &[T],
        width: u32,
        height: u32,
        metadata: &MetaDataMap,
    ) -> Result<usize> {
        let clusters = find_clusters(raster, width, height)?;
        let mut body = String::new();
        for cluster in &clusters {
            let mut line = String::new();
            for pixel in cluster.iter() {
                push_record(&mut line, pixel.x(), pixel.y(), &pixel.value.to_text(), None);
            }
            body.push_str(&line);
            body.push('\n');
        }
        self.append_frame(&body, metadata)?;
        Ok(clusters.len())
    }

    /// Clusters a frame and appends it, taking the times from its metadata.
    ///
    /// # Errors
    /// See [`Self::save`].
    pub fn save_frame(&self, frame: &Frame) -> Result<usize> {
        let (width, height) = (frame.width(), frame.height());
        match frame.data() {
            FrameData::I16(v) => self.save(v, width, height, &frame.metadata),
            FrameData::U32(v) => self.save(v, width, height, &frame.metadata),
            FrameData::U64(v) => self.save(v, width, height, &frame.metadata),
            FrameData::Double(v) => self.save(v, width, height, &frame.metadata),
        }
    }

    /// Clusters `tot` and appends it with the time of arrival of every
    /// pixel taken from `toa` at the same position.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if either raster does not match the
    /// dimensions, and I/O errors otherwise.
    pub fn save_with_toa<T: Element, U: Element>(
        &self,
        tot: &[T],
        toa: &[U],
        width: u32,
        height: u32,
        metadata: &MetaDataMap,
    ) -> Result<usize> {
        if toa.len() != tot.len() {
            return Err(Error::InvalidArgument(format!(
                "toa raster has {} cells, tot raster has {}",
                toa.len(),
                tot.len()
            )));
        }
        let clusters = find_clusters(tot, width, height)?;
        let mut body = String::new();
        for cluster in &clusters {
            let mut line = String::new();
            for pixel in cluster.iter() {
                let time = toa[pixel.coord.flat_index(width)].to_text();
                push_record(&mut line, pixel.x(), pixel.y(), &pixel.value.to_text(), Some(&time));
            }
            body.push_str(&line);
            body.push('\n');
        }
        self.append_frame(&body, metadata)?;
        Ok(clusters.len())
    }

    fn append_frame(&self, body: &str, metadata: &MetaDataMap) -> Result<()> {
        let offset = fsutil::file_size(&self.path).unwrap_or(0);
        let number = match index::offset_count(&self.index) {
            Some(count) => count + 1,
            None if offset > 0 => self.frame_count_in_file()? + 1,
            None => 1,
        };
        let time = |name: &str| metadata.get(name).and_then(MetaData::as_f64).unwrap_or(0.0);

        let mut text = format!("Frame {number} ({}, {} s)\n", time(START_TIME), time(ACQ_TIME));
        text.push_str(body);
        text.push('\n');

        let mut file = fsutil::open_append(&self.path)?;
        fsutil::write_all(&mut file, text.as_bytes(), &self.path)?;
        fsutil::flush(&mut file, &self.path)?;
        index::append_offset(&self.index, offset)
    }

    /// Offset of the header of frame `index` (0-based).
    fn locate(&self, scanner: &mut TextScanner<ClusterLogHeader>, index: u64) -> Result<u64> {
        if let Some(count) = index::offset_count(&self.index) {
            if index >= count {
                return Err(Error::InvalidArgument(format!(
                    "frame {index} out of range, \"{}\" holds {count} frames",
                    self.path.display()
                )));
            }
            return index::read_offset(&self.index, index);
        }
        log::debug!(
            "{}: no index, searching for frame {}",
            self.path.display(),
            index + 1
        );
        scanner.find_frame(index + 1, None)?.ok_or_else(|| {
            Error::InvalidArgument(format!(
                "frame {index} not found in \"{}\"",
                self.path.display()
            ))
        })
    }

    /// Walks the records of frame `index`, calling `visit` for each.
    /// Returns the header times `(start, acq)`.
    fn visit_frame(
        &self,
        index: u64,
        mut visit: impl FnMut(Record) -> Result<()>,
    ) -> Result<(f64, f64)> {
        let mut scanner = TextScanner::<ClusterLogHeader>::open(&self.path)?;
        let position = self.locate(&mut scanner, index)?;
        scanner.seek(position)?;

        let bad = |message: String| Error::bad_data(&self.path, message);
        if scanner.next_line()?.is_none() {
            return Err(bad(format!("frame {} header missing", index + 1)));
        }
        let number = ClusterLogHeader::frame_number(scanner.line());
        if number != Some(index + 1) {
            log::warn!(
                "{}: expected frame {} at offset {position}, found \"{}\"",
                self.path.display(),
                index + 1,
                scanner.line()
            );
            return Err(bad(format!(
                "expected frame {} at offset {position}, found \"{}\"",
                index + 1,
                scanner.line()
            )));
        }
        let times = parse_header_times(scanner.line())
            .ok_or_else(|| bad(format!("malformed frame header \"{}\"", scanner.line())))?;

        while scanner.next_line()?.is_some() {
            let line = scanner.line();
            if line.trim().is_empty() || ClusterLogHeader::frame_number(line).is_some() {
                break;
            }
            for text in bracketed(line) {
                let record =
                    Record::parse(text).ok_or_else(|| bad(format!("malformed record \"[{text}]\"")))?;
                visit(record)?;
            }
        }
        Ok(times)
    }

    /// Loads frame `index` (0-based) into dense buffers of the given size.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] if the frame does not exist.
    /// - [`Error::BadData`] for malformed records or records outside
    ///   `width` x `height`.
    pub fn load(&self, index: u64, width: u32, height: u32, with_toa: bool) -> Result<ClusterLogFrame> {
        let len = pixel_count(width, height);
        let mut tot = pixstore_core::frame::zeroed_vec::<f64>(len)?;
        let mut toa = if with_toa {
            Some(pixstore_core::frame::zeroed_vec::<f64>(len)?)
        } else {
            None
        };

        let (start, acq) = self.visit_frame(index, |record| {
            if record.x >= width || record.y >= height {
                return Err(Error::bad_data(
                    &self.path,
                    format!(
                        "pixel ({}, {}) outside {width}x{height} frame",
                        record.x, record.y
                    ),
                ));
            }
            let cell = record.y as usize * width as usize + record.x as usize;
            tot[cell] = record.value;
            if let (Some(toa), Some(time)) = (toa.as_mut(), record.toa) {
                toa[cell] = time;
            }
            Ok(())
        })?;

        let mut metadata = MetaDataMap::new();
        metadata.insert(MetaData::from_f64(START_TIME, "Acquisition start time [s]", start));
        metadata.insert(MetaData::from_f64(ACQ_TIME, "Acquisition time [s]", acq));
        Ok(ClusterLogFrame {
            width,
            height,
            tot,
            toa,
            metadata,
        })
    }

    /// Number of the last frame header in the final
    /// [`DEFAULT_TAIL_WINDOW`] bytes of the log.
    ///
    /// This is a heuristic: if the last frame's records span more than the
    /// window, an earlier frame number (or zero) is reported.
    ///
    /// # Errors
    /// Returns an error if the log cannot be read.
    pub fn frame_count_in_file(&self) -> Result<u64> {
        self.frame_count_in_file_with_window(DEFAULT_TAIL_WINDOW)
    }

    /// [`Self::frame_count_in_file`] with an explicit window in bytes.
    ///
    /// # Errors
    /// Returns an error if the log cannot be read.
    pub fn frame_count_in_file_with_window(&self, window: u64) -> Result<u64> {
        let mut scanner = TextScanner::<ClusterLogHeader>::open(&self.path)?;
        let last = scanner.last_header_in_tail(window)?;
        log::debug!(
            "{}: last header in final {window} bytes is {last:?}",
            self.path.display()
        );
        Ok(last.unwrap_or(0))
    }

    /// Record layout, from the first record in the log.
    ///
    /// # Errors
    /// Returns [`Error::BadData`] if the log holds no parsable record.
    pub fn detect_format(&self) -> Result<ClusterLogFormat> {
        let mut scanner = TextScanner::<ClusterLogHeader>::open(&self.path)?;
        while scanner.next_line()?.is_some() {
            let line = scanner.line();
            if ClusterLogHeader::frame_number(line).is_some() {
                continue;
            }
            if let Some(first) = bracketed(line).next() {
                return match Record::parse(first) {
                    Some(Record { toa: Some(_), .. }) => Ok(ClusterLogFormat::Tpx3),
                    Some(_) => Ok(ClusterLogFormat::Legacy),
                    None => Err(Error::bad_data(
                        &self.path,
                        format!("malformed record \"[{first}]\""),
                    )),
                };
            }
        }
        Err(Error::bad_data(&self.path, "no cluster records"))
    }

    /// True if the log carries time-of-arrival fields.
    #[must_use]
    pub fn is_tpx3_cluster_log(&self) -> bool {
        matches!(self.detect_format(), Ok(ClusterLogFormat::Tpx3))
    }

    /// Frame size covering every record of frame `index`, in whole
    /// detector tiles and at least one tile.
    ///
    /// # Errors
    /// Returns an error if the frame cannot be read.
    pub fn frame_dimensions(&self, index: u64) -> Result<(u32, u32)> {
        let (mut max_x, mut max_y) = (0u32, 0u32);
        self.visit_frame(index, |record| {
            max_x = max_x.max(record.x);
            max_y = max_y.max(record.y);
            Ok(())
        })?;
        Ok((round_up_to_tile(max_x), round_up_to_tile(max_y)))
    }
}

fn round_up_to_tile(max: u32) -> u32 {
    (max / TILE + 1).saturating_mul(TILE)
}

/// `(start, acq)` from `Frame <n> (<start>, <acq> s)`.
fn parse_header_times(line: &str) -> Option<(f64, f64)> {
    let (_, rest) = line.split_once('(')?;
    let (start, rest) = rest.split_once(',')?;
    let acq = rest.trim().strip_suffix(')')?.trim_end().strip_suffix('s')?;
    Some((start.trim().parse().ok()?, acq.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixstore_core::ErrorKind;
    use tempfile::tempdir;

    fn times(start: f64, acq: f64) -> MetaDataMap {
        [
            MetaData::from_f64(START_TIME, "", start),
            MetaData::from_f64(ACQ_TIME, "", acq),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_written_text() {
        let dir = tempdir().unwrap();
        let log = ClusterLog::new(dir.path().join("c.clog"));
        #[rustfmt::skip]
        let raster: Vec<u32> = vec![
            3, 0, 0, 0,
            0, 0, 0, 5,
        ];
        assert_eq!(log.save(&raster, 4, 2, &times(10.5, 0.25)).unwrap(), 2);
        assert_eq!(log.save(&vec![0u32; 8], 4, 2, &times(11.0, 0.25)).unwrap(), 0);

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            text,
            "Frame 1 (10.5, 0.25 s)\n[0, 0, 3]\n[3, 1, 5]\n\nFrame 2 (11, 0.25 s)\n\n"
        );
        assert_eq!(index::offset_count(log.index_path()), Some(2));
        assert_eq!(index::read_offset(log.index_path(), 1).unwrap(), 44);
    }

    #[test]
    fn test_load_with_toa() {
        let dir = tempdir().unwrap();
        let log = ClusterLog::new(dir.path().join("t.clog"));
        let tot: Vec<u16> = vec![0, 4, 4, 0];
        let toa: Vec<f64> = vec![0.0, 1.5e-6, 1.75e-6, 0.0];
        log.save_with_toa(&tot, &toa, 2, 2, &times(1.0, 2.0)).unwrap();

        assert_eq!(log.detect_format().unwrap(), ClusterLogFormat::Tpx3);
        assert!(log.is_tpx3_cluster_log());

        let frame = log.load(0, 2, 2, true).unwrap();
        assert_eq!(frame.tot, vec![0.0, 4.0, 4.0, 0.0]);
        assert_eq!(frame.toa.unwrap(), toa);
        assert_eq!(frame.metadata.get(ACQ_TIME).unwrap().as_f64(), Some(2.0));
    }

    #[test]
    fn test_load_out_of_bounds_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hand.clog");
        std::fs::write(&path, "Frame 1 (0, 1 s)\n[1, 1, 9] [300, 2, 1]\n\n").unwrap();
        let log = ClusterLog::new(&path);

        assert_eq!(log.detect_format().unwrap(), ClusterLogFormat::Legacy);
        assert_eq!(log.load(0, 256, 256, false).unwrap_err().kind(), ErrorKind::BadData);
        assert_eq!(log.frame_dimensions(0).unwrap(), (512, 256));
        assert_eq!(log.load(1, 256, 256, false).unwrap_err().kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_record_parse() {
        assert_eq!(
            Record::parse(" 4, 5, 2.5"),
            Some(Record { x: 4, y: 5, value: 2.5, toa: None })
        );
        assert_eq!(Record::parse("4, 5"), None);
        assert_eq!(Record::parse("4, 5, 1, 2, 3"), None);
        assert_eq!(parse_header_times("Frame 3 (1.5, 0.01 s)"), Some((1.5, 0.01)));
    }

    #[test]
    fn test_dimensions_floor() {
        assert_eq!(round_up_to_tile(0), 256);
        assert_eq!(round_up_to_tile(255), 256);
        assert_eq!(round_up_to_tile(256), 512);
    }
}
