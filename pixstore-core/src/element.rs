//! Numeric element trait shared by frames, encoders and the clusterer.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::float_cmp
)]

use crate::DataType;

/// A numeric raster element with a fixed little-endian byte encoding and a
/// plain-text rendering.
pub trait Element: Copy + PartialEq + Default + Send + Sync + 'static {
    /// Type tag written to description files.
    const DATA_TYPE: DataType;
    /// Encoded size in bytes.
    const SIZE: usize;

    /// True for the zero value; zero cells are empty.
    fn is_zero(&self) -> bool;

    /// Widening conversion used for statistics.
    fn to_f64(self) -> f64;

    /// Appends the little-endian encoding to `out`.
    fn write_le(self, out: &mut Vec<u8>);

    /// Decodes from the first [`Self::SIZE`] bytes of `bytes`.
    ///
    /// Callers guarantee `bytes.len() >= Self::SIZE`.
    fn read_le(bytes: &[u8]) -> Self;

    /// Parses one text item.
    fn parse_text(text: &str) -> Option<Self>;

    /// Renders one value as text that parses back to the same value.
    fn to_text(self) -> String;
}

macro_rules! int_element {
    ($ty:ty, $tag:expr) => {
        impl Element for $ty {
            const DATA_TYPE: DataType = $tag;
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn is_zero(&self) -> bool {
                *self == 0
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_le_bytes(raw)
            }

            fn parse_text(text: &str) -> Option<Self> {
                let text = text.trim();
                text.parse::<$ty>().ok().or_else(|| {
                    // Accept integral values written in float notation.
                    let value = text.parse::<f64>().ok()?;
                    (value.fract() == 0.0
                        && value >= <$ty>::MIN as f64
                        && value <= <$ty>::MAX as f64)
                        .then(|| value as $ty)
                })
            }

            fn to_text(self) -> String {
                self.to_string()
            }
        }
    };
}

macro_rules! float_element {
    ($ty:ty, $tag:expr) => {
        impl Element for $ty {
            const DATA_TYPE: DataType = $tag;
            const SIZE: usize = std::mem::size_of::<$ty>();

            #[inline]
            fn is_zero(&self) -> bool {
                *self == 0.0
            }

            #[inline]
            fn to_f64(self) -> f64 {
                f64::from(self)
            }

            #[inline]
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            #[inline]
            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(&bytes[..Self::SIZE]);
                <$ty>::from_le_bytes(raw)
            }

            fn parse_text(text: &str) -> Option<Self> {
                text.trim().parse::<$ty>().ok()
            }

            fn to_text(self) -> String {
                // Display is the shortest representation that round-trips.
                self.to_string()
            }
        }
    };
}

int_element!(u8, DataType::Byte);
int_element!(i16, DataType::I16);
int_element!(u16, DataType::U16);
int_element!(i32, DataType::I32);
int_element!(u32, DataType::U32);
int_element!(i64, DataType::I64);
int_element!(u64, DataType::U64);
float_element!(f32, DataType::Float);
float_element!(f64, DataType::Double);

/// Decodes a little-endian buffer into elements. Trailing bytes that do not
/// form a whole element are ignored.
#[must_use]
pub fn decode_le<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::read_le).collect()
}

/// Encodes elements as a little-endian buffer.
#[must_use]
pub fn encode_le<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    for value in values {
        value.write_le(&mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_encoding() {
        let values: Vec<i16> = vec![-1, 0, 300];
        let bytes = encode_le(&values);
        assert_eq!(bytes, vec![0xFF, 0xFF, 0x00, 0x00, 0x2C, 0x01]);
        assert_eq!(decode_le::<i16>(&bytes), values);
    }

    #[test]
    fn test_double_text_is_exact() {
        let value = 0.1_f64 + 0.2;
        let parsed = f64::parse_text(&value.to_text()).unwrap();
        assert_eq!(parsed.to_bits(), value.to_bits());
    }

    #[test]
    fn test_integer_text_accepts_float_notation() {
        assert_eq!(u32::parse_text("12"), Some(12));
        assert_eq!(u32::parse_text("12.0"), Some(12));
        assert_eq!(u32::parse_text("12.5"), None);
        assert_eq!(i16::parse_text("70000"), None);
    }

    #[test]
    fn test_zero() {
        assert!(0u64.is_zero());
        assert!(!1i16.is_zero());
        assert!((-0.0f64).is_zero());
    }
}
