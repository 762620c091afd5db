//! Structure of Arrays (`SoA`) pixel-event storage.
//!
//! Detector readout delivers events as packed 4-byte records: a 16-bit
//! value followed by a 16-bit flat pixel index, both little-endian.
//! [`PixelEventBatch`] keeps the two halves in parallel vectors.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Size of one packed `(value, flat index)` event in bytes.
pub const PACKED_EVENT_SIZE: usize = 4;

/// A batch of pixel events stored in Structure of Arrays (`SoA`) format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelEventBatch {
    /// Columnar storage for event values.
    pub value: Vec<i16>,
    /// Columnar storage for flat pixel indices (`y * width + x`).
    pub index: Vec<u16>,
}

impl PixelEventBatch {
    /// Creates a new empty batch with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            value: Vec::with_capacity(capacity),
            index: Vec::with_capacity(capacity),
        }
    }

    /// Decodes packed little-endian events.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the length is not a multiple of
    /// [`PACKED_EVENT_SIZE`].
    pub fn from_packed(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % PACKED_EVENT_SIZE != 0 {
            return Err(Error::InvalidArgument(format!(
                "packed event buffer of {} bytes is not a multiple of {PACKED_EVENT_SIZE}",
                bytes.len()
            )));
        }
        let mut batch = Self::with_capacity(bytes.len() / PACKED_EVENT_SIZE);
        for chunk in bytes.chunks_exact(PACKED_EVENT_SIZE) {
            batch.push(
                i16::from_le_bytes([chunk[0], chunk[1]]),
                u16::from_le_bytes([chunk[2], chunk[3]]),
            );
        }
        Ok(batch)
    }

    /// Encodes the batch as packed little-endian events.
    #[must_use]
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * PACKED_EVENT_SIZE);
        for (value, index) in self.value.iter().zip(&self.index) {
            out.extend_from_slice(&value.to_le_bytes());
            out.extend_from_slice(&index.to_le_bytes());
        }
        out
    }

    /// Returns the number of events in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Returns true if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Clears all vectors in the batch.
    pub fn clear(&mut self) {
        self.value.clear();
        self.index.clear();
    }

    /// Pushes a single event into the batch.
    pub fn push(&mut self, value: i16, index: u16) {
        self.value.push(value);
        self.index.push(index);
    }

    /// Appends `range` of another batch to this one.
    pub fn extend_from_range(&mut self, other: &PixelEventBatch, range: std::ops::Range<usize>) {
        self.value.extend_from_slice(&other.value[range.clone()]);
        self.index.extend_from_slice(&other.index[range]);
    }

    /// Iterates over `(value, index)` pairs in `range`.
    pub fn events(&self, range: std::ops::Range<usize>) -> impl Iterator<Item = (i16, u16)> + '_ {
        self.value[range.clone()]
            .iter()
            .copied()
            .zip(self.index[range].iter().copied())
    }
}
