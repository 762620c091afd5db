//! Frame payload layouts and their encoders.
//!
//! | layout  | ASCII                        | binary (little-endian)     |
//! |---------|------------------------------|----------------------------|
//! | matrix  | rows of space-separated values | `width * height` elements |
//! | `[X,C]`   | `index\tvalue` lines         | `u32` index, element      |
//! | `[X,Y,C]` | `x\ty\tvalue` lines          | `u32` x, `u32` y, element |
//!
//! Sparse layouts omit zero cells.

use pixstore_core::{frame::zeroed_vec, pixel_count, Element, Error, FrameElement, Result};
use std::fmt::{self, Write as _};
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Arrangement of cells in a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Layout {
    /// Every cell, row-major.
    #[default]
    Matrix,
    /// Non-zero cells as `(flat index, value)`.
    SparseX,
    /// Non-zero cells as `(x, y, value)`.
    SparseXY,
}

impl Layout {
    /// Name used in description files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Matrix => "matrix",
            Self::SparseX => "[X,C]",
            Self::SparseXY => "[X,Y,C]",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "matrix" => Some(Self::Matrix),
            "[X,C]" => Some(Self::SparseX),
            "[X,Y,C]" => Some(Self::SparseXY),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_sparse(self) -> bool {
        self != Self::Matrix
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Text or binary payload encoding. One stream uses a single encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Encoding {
    Ascii,
    #[default]
    Binary,
}

impl Encoding {
    /// Description header letter.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Self::Ascii => 'A',
            Self::Binary => 'B',
        }
    }

    #[must_use]
    pub fn from_letter(letter: u8) -> Option<Self> {
        match letter {
            b'A' => Some(Self::Ascii),
            b'B' => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Encodes a `width`-wide raster.
#[must_use]
pub fn encode<T: Element>(values: &[T], width: u32, layout: Layout, encoding: Encoding) -> Vec<u8> {
    let width = width.max(1);
    match (layout, encoding) {
        (Layout::Matrix, Encoding::Binary) => pixstore_core::element::encode_le(values),
        (Layout::Matrix, Encoding::Ascii) => {
            let mut text = String::with_capacity(values.len() * 4);
            for row in values.chunks(width as usize) {
                for (i, value) in row.iter().enumerate() {
                    if i > 0 {
                        text.push(' ');
                    }
                    text.push_str(&value.to_text());
                }
                text.push('\n');
            }
            text.into_bytes()
        }
        (sparse, Encoding::Ascii) => {
            let mut text = String::new();
            for (index, value) in non_zero(values) {
                let _ = match sparse {
                    Layout::SparseXY => {
                        let (x, y) = split_index(index, width);
                        writeln!(text, "{x}\t{y}\t{}", value.to_text())
                    }
                    _ => writeln!(text, "{index}\t{}", value.to_text()),
                };
            }
            text.into_bytes()
        }
        (sparse, Encoding::Binary) => {
            let mut out = Vec::new();
            for (index, value) in non_zero(values) {
                if sparse == Layout::SparseXY {
                    let (x, y) = split_index(index, width);
                    out.extend_from_slice(&x.to_le_bytes());
                    out.extend_from_slice(&y.to_le_bytes());
                } else {
                    out.extend_from_slice(&index.to_le_bytes());
                }
                value.write_le(&mut out);
            }
            out
        }
    }
}

fn non_zero<T: Element>(values: &[T]) -> impl Iterator<Item = (u32, T)> + '_ {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_zero())
        .filter_map(|(i, v)| Some((u32::try_from(i).ok()?, *v)))
}

fn split_index(index: u32, width: u32) -> (u32, u32) {
    (index % width, index / width)
}

/// Decodes a payload into a dense `width` x `height` buffer.
///
/// `path` only labels errors.
///
/// # Errors
/// Returns [`Error::BadData`] if the payload is truncated, malformed or
/// addresses cells outside the raster, and [`Error::MemoryAllocation`] if
/// the buffer cannot be allocated.
pub fn decode<T: FrameElement>(
    bytes: &[u8],
    width: u32,
    height: u32,
    layout: Layout,
    encoding: Encoding,
    path: &Path,
) -> Result<Vec<T>> {
    let len = pixel_count(width, height);
    match (layout, encoding) {
        (Layout::Matrix, Encoding::Binary) => {
            let expected = len * T::SIZE;
            if bytes.len() != expected {
                return Err(Error::bad_data(
                    path,
                    format!("frame needs {expected} bytes, found {}", bytes.len()),
                ));
            }
            Ok(pixstore_core::element::decode_le(bytes))
        }
        (Layout::Matrix, Encoding::Ascii) => {
            let mut values = Vec::new();
            values
                .try_reserve_exact(len)
                .map_err(|_| Error::MemoryAllocation(len * T::SIZE))?;
            for token in ascii(bytes, path)?.split_ascii_whitespace().take(len) {
                values.push(parse_item(token, path)?);
            }
            if values.len() != len {
                return Err(Error::bad_data(
                    path,
                    format!("frame needs {len} values, found {}", values.len()),
                ));
            }
            Ok(values)
        }
        (sparse, Encoding::Ascii) => {
            let mut values = zeroed_vec::<T>(len)?;
            for line in ascii(bytes, path)?.lines() {
                let line = line.trim();
                if line.is_empty() || line == "#" {
                    continue;
                }
                let mut items = line.split_ascii_whitespace();
                let mut next = || items.next().ok_or_else(|| bad_line(path, line));
                let index = if sparse == Layout::SparseXY {
                    let x = parse_item::<u32>(next()?, path)?;
                    let y = parse_item::<u32>(next()?, path)?;
                    flat_index(x, y, width, height, path)?
                } else {
                    parse_item::<u64>(next()?, path)?
                };
                let value = parse_item::<T>(next()?, path)?;
                store(&mut values, index, value, path)?;
            }
            Ok(values)
        }
        (sparse, Encoding::Binary) => {
            let record = T::SIZE + if sparse == Layout::SparseXY { 8 } else { 4 };
            if bytes.len() % record != 0 {
                return Err(Error::bad_data(
                    path,
                    format!("sparse payload of {} bytes is not a multiple of {record}", bytes.len()),
                ));
            }
            let mut values = zeroed_vec::<T>(len)?;
            for chunk in bytes.chunks_exact(record) {
                let (index, value) = if sparse == Layout::SparseXY {
                    let x = u32::read_le(&chunk[0..4]);
                    let y = u32::read_le(&chunk[4..8]);
                    (flat_index(x, y, width, height, path)?, T::read_le(&chunk[8..]))
                } else {
                    (u64::from(u32::read_le(&chunk[0..4])), T::read_le(&chunk[4..]))
                };
                store(&mut values, index, value, path)?;
            }
            Ok(values)
        }
    }
}

fn ascii<'a>(bytes: &'a [u8], path: &Path) -> Result<&'a str> {
    std::str::from_utf8(bytes).map_err(|_| Error::bad_data(path, "payload is not text"))
}

fn parse_item<T: Element>(token: &str, path: &Path) -> Result<T> {
    T::parse_text(token).ok_or_else(|| {
        Error::bad_data(path, format!("cannot parse \"{token}\" as {}", T::DATA_TYPE))
    })
}

fn bad_line(path: &Path, line: &str) -> Error {
    Error::bad_data(path, format!("malformed sparse record \"{line}\""))
}

fn flat_index(x: u32, y: u32, width: u32, height: u32, path: &Path) -> Result<u64> {
    if x >= width || y >= height {
        return Err(Error::bad_data(
            path,
            format!("pixel ({x}, {y}) outside {width}x{height} frame"),
        ));
    }
    Ok(u64::from(y) * u64::from(width) + u64::from(x))
}

fn store<T: Copy>(values: &mut [T], index: u64, value: T, path: &Path) -> Result<()> {
    let len = values.len();
    let slot = usize::try_from(index)
        .ok()
        .and_then(|i| values.get_mut(i))
        .ok_or_else(|| {
            Error::bad_data(path, format!("pixel index {index} outside frame of {len} cells"))
        })?;
    *slot = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixstore_core::ErrorKind;

    const LAYOUTS: [Layout; 3] = [Layout::Matrix, Layout::SparseX, Layout::SparseXY];

    fn raster() -> Vec<f64> {
        // 4x3 with explicit zeros and a negative value
        vec![0.0, 1.5, 0.0, 2.0, 0.0, 0.0, -3.25, 0.0, 1e-9, 0.0, 0.0, 7.0]
    }

    #[test]
    fn test_ascii_matrix_text() {
        let bytes = encode(&[1u32, 2, 3, 4, 5, 6], 3, Layout::Matrix, Encoding::Ascii);
        assert_eq!(String::from_utf8(bytes).unwrap(), "1 2 3\n4 5 6\n");
    }

    #[test]
    fn test_sparse_text() {
        let values = [0u32, 9, 0, 0, 4, 0];
        let x = encode(&values, 3, Layout::SparseX, Encoding::Ascii);
        assert_eq!(String::from_utf8(x).unwrap(), "1\t9\n4\t4\n");
        let xy = encode(&values, 3, Layout::SparseXY, Encoding::Ascii);
        assert_eq!(String::from_utf8(xy).unwrap(), "1\t0\t9\n1\t1\t4\n");
    }

    #[test]
    fn test_all_layouts_decode_to_same_raster() {
        let path = Path::new("mem");
        let values = raster();
        for encoding in [Encoding::Ascii, Encoding::Binary] {
            for layout in LAYOUTS {
                let bytes = encode(&values, 4, layout, encoding);
                let decoded: Vec<f64> = decode(&bytes, 4, 3, layout, encoding, path).unwrap();
                assert_eq!(decoded, values, "{layout} {encoding:?}");
            }
        }
    }

    #[test]
    fn test_sparse_binary_record_size() {
        let bytes = encode(&[0i16, 5, 0, 6], 2, Layout::SparseXY, Encoding::Binary);
        assert_eq!(bytes.len(), 2 * (8 + 2));
        let bytes = encode(&[0i16, 5, 0, 6], 2, Layout::SparseX, Encoding::Binary);
        assert_eq!(bytes.len(), 2 * (4 + 2));
    }

    #[test]
    fn test_out_of_range_index_is_bad_data() {
        let path = Path::new("mem");
        let err = decode::<u32>(b"99\t1\n", 4, 4, Layout::SparseX, Encoding::Ascii, path)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadData);
        let err = decode::<u32>(b"4\t0\t1\n", 4, 4, Layout::SparseXY, Encoding::Ascii, path)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadData);
    }

    #[test]
    fn test_truncated_matrix_is_bad_data() {
        let path = Path::new("mem");
        let err = decode::<u32>(b"1 2 3", 2, 2, Layout::Matrix, Encoding::Ascii, path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadData);
        let err = decode::<u64>(&[0u8; 31], 2, 2, Layout::Matrix, Encoding::Binary, path)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadData);
    }

    #[test]
    fn test_delimiter_lines_are_skipped() {
        let path = Path::new("mem");
        let decoded: Vec<u32> =
            decode(b"#\n0\t3\n\n3\t1\n", 2, 2, Layout::SparseX, Encoding::Ascii, path).unwrap();
        assert_eq!(decoded, vec![3, 0, 0, 1]);
    }
}
