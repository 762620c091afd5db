//! Named, typed metadata attached to frames and event stores.
//!
//! Each entry owns its value bytes (little-endian, `count * type size`
//! long). Cloning an entry copies the bytes.
#![allow(clippy::cast_possible_truncation)]

use crate::data_type::format_general;
use crate::{DataType, Element, Error, Result};
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reserved key holding the acquisition time of a frame, in seconds.
pub const ACQ_TIME: &str = "Acq time";
/// Reserved key holding the start time of a frame, in seconds since epoch.
pub const START_TIME: &str = "Start time";

/// Significant digits used when floats are not written at full precision.
const COMPACT_DIGITS: usize = 5;

/// A single metadata entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetaData {
    name: String,
    description: String,
    data_type: DataType,
    data: Vec<u8>,
}

impl MetaData {
    /// Creates an entry from raw little-endian bytes.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        data_type: DataType,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            data_type,
            data: data.into(),
        }
    }

    /// Creates an entry holding numeric values of type `T`.
    pub fn from_values<T: Element>(
        name: impl Into<String>,
        description: impl Into<String>,
        values: &[T],
    ) -> Self {
        Self::new(name, description, T::DATA_TYPE, crate::element::encode_le(values))
    }

    /// Creates a single-double entry.
    pub fn from_f64(name: impl Into<String>, description: impl Into<String>, value: f64) -> Self {
        Self::from_values(name, description, &[value])
    }

    /// Creates a single-`i32` entry.
    pub fn from_i32(name: impl Into<String>, description: impl Into<String>, value: i32) -> Self {
        Self::from_values(name, description, &[value])
    }

    /// Creates a `char` entry holding `text`.
    pub fn from_text(
        name: impl Into<String>,
        description: impl Into<String>,
        text: &str,
    ) -> Self {
        Self::new(name, description, DataType::Char, text.as_bytes())
    }

    /// Creates a boolean entry. Booleans are stored as 32-bit integers.
    pub fn from_bool(name: impl Into<String>, description: impl Into<String>, value: bool) -> Self {
        Self::from_values(name, description, &[i32::from(value)])
            .with_type(DataType::Bool)
    }

    fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Entry name, unique within its map.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Type tag of the stored values.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Raw value bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Size of the value in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Number of items of [`Self::data_type`] stored.
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / self.data_type.size()
    }

    /// Replaces the raw value bytes, keeping name and type.
    pub fn set_bytes(&mut self, data: impl Into<Vec<u8>>) {
        self.data = data.into();
    }

    /// First value as a double, converting from any numeric type.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.values_f64().into_iter().next()
    }

    /// First value as an `i64`, for integer and boolean types.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        let bytes = self.data.get(..self.data_type.size())?;
        Some(match self.data_type {
            DataType::Byte => i64::from(bytes[0]),
            DataType::I16 => i64::from(i16::read_le(bytes)),
            DataType::U16 => i64::from(u16::read_le(bytes)),
            DataType::I32 | DataType::Bool => i64::from(i32::read_le(bytes)),
            DataType::U32 => i64::from(u32::read_le(bytes)),
            DataType::I64 => i64::read_le(bytes),
            DataType::U64 => i64::try_from(u64::read_le(bytes)).ok()?,
            DataType::Char | DataType::String | DataType::Float | DataType::Double => {
                return None
            }
        })
    }

    /// Value as text, for `char` and `string` entries.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if !self.data_type.is_text() {
            return None;
        }
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        std::str::from_utf8(&self.data[..end]).ok()
    }

    /// All numeric values widened to `f64`. Empty for text types.
    #[must_use]
    pub fn values_f64(&self) -> Vec<f64> {
        let size = self.data_type.size();
        self.data
            .chunks_exact(size)
            .filter_map(|item| match self.data_type {
                DataType::Byte => Some(f64::from(item[0])),
                DataType::I16 => Some(i16::read_le(item).to_f64()),
                DataType::U16 => Some(u16::read_le(item).to_f64()),
                DataType::I32 | DataType::Bool => Some(i32::read_le(item).to_f64()),
                DataType::U32 => Some(u32::read_le(item).to_f64()),
                DataType::I64 => Some(i64::read_le(item).to_f64()),
                DataType::U64 => Some(u64::read_le(item).to_f64()),
                DataType::Float => Some(f32::read_le(item).to_f64()),
                DataType::Double => Some(f64::read_le(item)),
                DataType::Char | DataType::String => None,
            })
            .collect()
    }

    /// Renders the values as a single line of text.
    ///
    /// Integers are written plain and booleans as `TRUE`/`FALSE`. Floats use
    /// five significant digits unless `max_precision` is set, in which case
    /// the output parses back to the identical bit pattern.
    #[must_use]
    pub fn format_values(&self, max_precision: bool) -> String {
        if self.data_type.is_text() {
            return self
                .as_text()
                .map_or_else(|| String::from_utf8_lossy(&self.data).into_owned(), str::to_string);
        }

        let size = self.data_type.size();
        let items: Vec<String> = self
            .data
            .chunks_exact(size)
            .map(|item| match self.data_type {
                DataType::Byte => item[0].to_text(),
                DataType::I16 => i16::read_le(item).to_text(),
                DataType::U16 => u16::read_le(item).to_text(),
                DataType::I32 => i32::read_le(item).to_text(),
                DataType::U32 => u32::read_le(item).to_text(),
                DataType::I64 => i64::read_le(item).to_text(),
                DataType::U64 => u64::read_le(item).to_text(),
                DataType::Float => {
                    let value = f32::read_le(item);
                    if max_precision {
                        value.to_text()
                    } else {
                        format_general(f64::from(value), COMPACT_DIGITS)
                    }
                }
                DataType::Double => {
                    let value = f64::read_le(item);
                    if max_precision {
                        value.to_text()
                    } else {
                        format_general(value, COMPACT_DIGITS)
                    }
                }
                DataType::Bool => {
                    if i32::read_le(item) == 0 {
                        "FALSE".to_string()
                    } else {
                        "TRUE".to_string()
                    }
                }
                DataType::Char | DataType::String => String::new(),
            })
            .collect();
        items.join(" ")
    }

    /// Parses `count` values of `data_type` from `text` and builds an entry.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `text` holds fewer than `count`
    /// parsable items.
    pub fn parse(
        name: impl Into<String>,
        description: impl Into<String>,
        data_type: DataType,
        count: usize,
        text: &str,
    ) -> Result<Self> {
        let name = name.into();
        let data = if data_type.is_text() {
            text.as_bytes().to_vec()
        } else {
            parse_items(data_type, count, text).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "cannot parse {count} {data_type} values for \"{name}\" from \"{text}\""
                ))
            })?
        };
        Ok(Self::new(name, description, data_type, data))
    }
}

fn parse_items(data_type: DataType, count: usize, text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(count * data_type.size());
    let mut tokens = text.split_whitespace();
    for _ in 0..count {
        let token = tokens.next()?;
        match data_type {
            DataType::Byte => u8::parse_text(token)?.write_le(&mut out),
            DataType::I16 => i16::parse_text(token)?.write_le(&mut out),
            DataType::U16 => u16::parse_text(token)?.write_le(&mut out),
            DataType::I32 => i32::parse_text(token)?.write_le(&mut out),
            DataType::U32 => u32::parse_text(token)?.write_le(&mut out),
            DataType::I64 => i64::parse_text(token)?.write_le(&mut out),
            DataType::U64 => u64::parse_text(token)?.write_le(&mut out),
            DataType::Float => f32::parse_text(token)?.write_le(&mut out),
            DataType::Double => f64::parse_text(token)?.write_le(&mut out),
            DataType::Bool => parse_bool(token)?.write_le(&mut out),
            DataType::Char | DataType::String => return None,
        }
    }
    Some(out)
}

fn parse_bool(token: &str) -> Option<i32> {
    if let Some(value) = i32::parse_text(token) {
        return Some(value);
    }
    if token.eq_ignore_ascii_case("true") {
        Some(1)
    } else if token.eq_ignore_ascii_case("false") {
        Some(0)
    } else {
        None
    }
}

/// Metadata entries keyed by name, iterated in name order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MetaDataMap {
    entries: BTreeMap<String, MetaData>,
}

impl MetaDataMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry.
    ///
    /// # Errors
    /// Returns [`Error::Exists`] if an entry with the same name is present.
    pub fn add(&mut self, entry: MetaData) -> Result<()> {
        if self.entries.contains_key(entry.name()) {
            return Err(Error::Exists(entry.name));
        }
        self.entries.insert(entry.name.clone(), entry);
        Ok(())
    }

    /// Inserts an entry, replacing any entry with the same name.
    pub fn insert(&mut self, entry: MetaData) -> Option<MetaData> {
        self.entries.insert(entry.name.clone(), entry)
    }

    /// Looks an entry up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetaData> {
        self.entries.get(name)
    }

    /// Looks an entry up by name.
    ///
    /// # Errors
    /// Returns [`Error::ItemNotFound`] if there is no such entry.
    pub fn require(&self, name: &str) -> Result<&MetaData> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::ItemNotFound(name.to_string()))
    }

    /// Removes an entry.
    ///
    /// # Errors
    /// Returns [`Error::ItemNotFound`] if there is no such entry.
    pub fn remove(&mut self, name: &str) -> Result<MetaData> {
        self.entries
            .remove(name)
            .ok_or_else(|| Error::ItemNotFound(name.to_string()))
    }

    /// Raw value bytes of an entry.
    ///
    /// # Errors
    /// Returns [`Error::ItemNotFound`] if there is no such entry.
    pub fn raw(&self, name: &str) -> Result<&[u8]> {
        self.require(name).map(MetaData::as_bytes)
    }

    /// Replaces the raw value bytes of an existing entry.
    ///
    /// # Errors
    /// Returns [`Error::ItemNotFound`] if there is no such entry.
    pub fn set_raw(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| Error::ItemNotFound(name.to_string()))?;
        entry.set_bytes(data);
        Ok(())
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entry names in iteration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &MetaData> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl FromIterator<MetaData> for MetaDataMap {
    fn from_iter<I: IntoIterator<Item = MetaData>>(iter: I) -> Self {
        let mut map = Self::new();
        for entry in iter {
            map.insert(entry);
        }
        map
    }
}

impl<'a> IntoIterator for &'a MetaDataMap {
    type Item = &'a MetaData;
    type IntoIter = std::collections::btree_map::Values<'a, String, MetaData>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.values()
    }
}
