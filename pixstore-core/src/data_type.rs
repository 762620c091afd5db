//! Type tags for metadata values and frame elements.
//!
//! The ordinal of each tag is fixed and part of the on-disk contract.
#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type tag of a metadata value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum DataType {
    Char = 0,
    Byte = 1,
    I16 = 2,
    U16 = 3,
    I32 = 4,
    U32 = 5,
    I64 = 6,
    U64 = 7,
    Float = 8,
    Double = 9,
    Bool = 10,
    String = 11,
}

impl DataType {
    /// All tags in ordinal order.
    pub const ALL: [DataType; 12] = [
        Self::Char,
        Self::Byte,
        Self::I16,
        Self::U16,
        Self::I32,
        Self::U32,
        Self::I64,
        Self::U64,
        Self::Float,
        Self::Double,
        Self::Bool,
        Self::String,
    ];

    /// Returns the 8-bit ordinal of the tag.
    #[inline]
    #[must_use]
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Looks a tag up by ordinal.
    #[must_use]
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    /// Name used in description files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::Byte => "byte",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
        }
    }

    /// Parses a tag name. `uchar` is accepted as an alias of `char`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "uchar" {
            return Some(Self::Char);
        }
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Size of one item in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::Char | Self::Byte | Self::String => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::Float | Self::Bool => 4,
            Self::I64 | Self::U64 | Self::Double => 8,
        }
    }

    /// True for tags whose values are stored as text.
    #[must_use]
    pub fn is_text(self) -> bool {
        matches!(self, Self::Char | Self::String)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Formats `value` like C's `%.<significant>g`.
#[must_use]
pub fn format_general(value: f64, significant: usize) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let precision = significant.max(1);
    // Rounding may bump the exponent (9.99995 -> 1.0000e1), so take it from
    // the rounded scientific form.
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i64 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i64 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (precision as i64 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_fixed() {
        for (i, tag) in DataType::ALL.iter().enumerate() {
            assert_eq!(usize::from(tag.ordinal()), i);
            assert_eq!(DataType::from_ordinal(tag.ordinal()), Some(*tag));
        }
        assert_eq!(DataType::Double.ordinal(), 9);
        assert_eq!(DataType::from_ordinal(12), None);
    }

    #[test]
    fn test_names_round_trip() {
        for tag in DataType::ALL {
            assert_eq!(DataType::from_name(tag.name()), Some(tag));
        }
        assert_eq!(DataType::from_name("uchar"), Some(DataType::Char));
        assert_eq!(DataType::from_name("int"), None);
    }

    #[test]
    fn test_format_general() {
        assert_eq!(format_general(0.0, 5), "0");
        assert_eq!(format_general(1.5, 5), "1.5");
        assert_eq!(format_general(123_456.0, 5), "1.2346e+05");
        assert_eq!(format_general(0.000_123_4, 5), "0.0001234");
        assert_eq!(format_general(0.000_012_34, 5), "1.234e-05");
        assert_eq!(format_general(-2.0, 5), "-2");
        assert_eq!(format_general(99_999.9, 5), "1e+05");
        assert_eq!(format_general(3.141_592_65, 5), "3.1416");
    }
}
