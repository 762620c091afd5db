//! Dense 2-D frames.

use crate::element::{decode_le, encode_le};
use crate::metadata::{ACQ_TIME, START_TIME};
use crate::{DataType, Element, Error, MetaData, MetaDataMap, Result};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Element types a frame can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementType {
    I16,
    U32,
    U64,
    Double,
}

impl ElementType {
    /// All frame element types, smallest first.
    pub const ALL: [ElementType; 4] = [Self::I16, Self::U32, Self::U64, Self::Double];

    /// Corresponding metadata type tag.
    #[must_use]
    pub fn data_type(self) -> DataType {
        match self {
            Self::I16 => DataType::I16,
            Self::U32 => DataType::U32,
            Self::U64 => DataType::U64,
            Self::Double => DataType::Double,
        }
    }

    /// Maps a type tag back to a frame element type.
    #[must_use]
    pub fn from_data_type(data_type: DataType) -> Option<Self> {
        match data_type {
            DataType::I16 => Some(Self::I16),
            DataType::U32 => Some(Self::U32),
            DataType::U64 => Some(Self::U64),
            DataType::Double => Some(Self::Double),
            _ => None,
        }
    }

    /// Size of one element in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        self.data_type().size()
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.data_type().name()
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed pixel buffer of a frame, row-major.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FrameData {
    I16(Vec<i16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    Double(Vec<f64>),
}

impl FrameData {
    /// Allocates a zero-filled buffer of `len` elements.
    ///
    /// # Errors
    /// Returns [`Error::MemoryAllocation`] if the buffer cannot be reserved.
    pub fn zeroed(element_type: ElementType, len: usize) -> Result<Self> {
        Ok(match element_type {
            ElementType::I16 => Self::I16(zeroed_vec(len)?),
            ElementType::U32 => Self::U32(zeroed_vec(len)?),
            ElementType::U64 => Self::U64(zeroed_vec(len)?),
            ElementType::Double => Self::Double(zeroed_vec(len)?),
        })
    }

    /// Decodes a little-endian byte buffer.
    #[must_use]
    pub fn from_le_bytes(element_type: ElementType, bytes: &[u8]) -> Self {
        match element_type {
            ElementType::I16 => Self::I16(decode_le(bytes)),
            ElementType::U32 => Self::U32(decode_le(bytes)),
            ElementType::U64 => Self::U64(decode_le(bytes)),
            ElementType::Double => Self::Double(decode_le(bytes)),
        }
    }

    /// Encodes the buffer as little-endian bytes.
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            Self::I16(v) => encode_le(v),
            Self::U32(v) => encode_le(v),
            Self::U64(v) => encode_le(v),
            Self::Double(v) => encode_le(v),
        }
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::I16(_) => ElementType::I16,
            Self::U32(_) => ElementType::U32,
            Self::U64(_) => ElementType::U64,
            Self::Double(_) => ElementType::Double,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::I16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `index` widened to `f64`.
    #[must_use]
    pub fn get_f64(&self, index: usize) -> Option<f64> {
        match self {
            Self::I16(v) => v.get(index).map(|x| x.to_f64()),
            Self::U32(v) => v.get(index).map(|x| x.to_f64()),
            Self::U64(v) => v.get(index).map(|x| x.to_f64()),
            Self::Double(v) => v.get(index).copied(),
        }
    }

    /// Number of non-zero cells.
    #[must_use]
    pub fn non_zero_count(&self) -> usize {
        fn count<T: Element>(values: &[T]) -> usize {
            values.iter().filter(|v| !v.is_zero()).count()
        }
        match self {
            Self::I16(v) => count(v),
            Self::U32(v) => count(v),
            Self::U64(v) => count(v),
            Self::Double(v) => count(v),
        }
    }
}

/// Element types that can back a [`Frame`].
pub trait FrameElement: Element {
    const ELEMENT_TYPE: ElementType;

    /// Wraps a typed buffer.
    fn into_frame_data(values: Vec<Self>) -> FrameData;
}

macro_rules! frame_element {
    ($ty:ty, $variant:ident) => {
        impl FrameElement for $ty {
            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn into_frame_data(values: Vec<Self>) -> FrameData {
                FrameData::$variant(values)
            }
        }
    };
}

frame_element!(i16, I16);
frame_element!(u32, U32);
frame_element!(u64, U64);
frame_element!(f64, Double);

/// Allocates `len` default elements, reporting allocation failure as an error.
///
/// # Errors
/// Returns [`Error::MemoryAllocation`] if the buffer cannot be reserved.
pub fn zeroed_vec<T: Element>(len: usize) -> Result<Vec<T>> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(len)
        .map_err(|_| Error::MemoryAllocation(len.saturating_mul(T::SIZE)))?;
    values.resize(len, T::default());
    Ok(values)
}

/// A `width` x `height` raster with its metadata.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    width: u32,
    height: u32,
    data: FrameData,
    /// Metadata attached to this frame.
    pub metadata: MetaDataMap,
}

impl Frame {
    /// Creates a frame from a buffer.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the buffer length is not
    /// `width * height`.
    pub fn new(width: u32, height: u32, data: FrameData) -> Result<Self> {
        let expected = pixel_count(width, height);
        if data.len() != expected {
            return Err(Error::InvalidArgument(format!(
                "frame {width}x{height} needs {expected} elements, buffer has {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            metadata: MetaDataMap::new(),
        })
    }

    /// Creates a zero-filled frame.
    ///
    /// # Errors
    /// Returns [`Error::MemoryAllocation`] if the buffer cannot be reserved.
    pub fn zeroed(width: u32, height: u32, element_type: ElementType) -> Result<Self> {
        let data = FrameData::zeroed(element_type, pixel_count(width, height))?;
        Ok(Self {
            width,
            height,
            data,
            metadata: MetaDataMap::new(),
        })
    }

    /// Attaches metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MetaDataMap) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    #[must_use]
    pub fn data(&self) -> &FrameData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut FrameData {
        &mut self.data
    }

    /// Consumes the frame, returning its buffer and metadata.
    #[must_use]
    pub fn into_parts(self) -> (FrameData, MetaDataMap) {
        (self.data, self.metadata)
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Acquisition time in seconds, from the `Acq time` entry.
    #[must_use]
    pub fn acq_time(&self) -> Option<f64> {
        self.metadata.get(ACQ_TIME).and_then(MetaData::as_f64)
    }

    /// Start time in seconds, from the `Start time` entry.
    #[must_use]
    pub fn start_time(&self) -> Option<f64> {
        self.metadata.get(START_TIME).and_then(MetaData::as_f64)
    }

    /// Sets the `Acq time` entry.
    pub fn set_acq_time(&mut self, seconds: f64) {
        self.metadata
            .insert(MetaData::from_f64(ACQ_TIME, "Acquisition time [s]", seconds));
    }

    /// Sets the `Start time` entry.
    pub fn set_start_time(&mut self, seconds: f64) {
        self.metadata.insert(MetaData::from_f64(
            START_TIME,
            "Acquisition start time [s]",
            seconds,
        ));
    }
}

/// `width * height` as a buffer length.
#[must_use]
pub fn pixel_count(width: u32, height: u32) -> usize {
    (width as usize).saturating_mul(height as usize)
}
