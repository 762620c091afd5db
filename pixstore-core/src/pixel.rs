//! Pixel coordinates and 8-neighbourhood stepping.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pixel coordinate on the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelCoord {
    /// X coordinate (column).
    pub x: u32,
    /// Y coordinate (row).
    pub y: u32,
}

impl PixelCoord {
    /// Creates a new pixel coordinate.
    #[inline]
    #[must_use]
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Decodes a flat index `y * width + x`.
    #[inline]
    #[must_use]
    pub fn from_flat_index(index: usize, width: u32) -> Self {
        let width = width.max(1) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let (x, y) = ((index % width) as u32, (index / width) as u32);
        Self { x, y }
    }

    /// Flat index `y * width + x`.
    #[inline]
    #[must_use]
    pub fn flat_index(self, width: u32) -> usize {
        self.y as usize * width as usize + self.x as usize
    }

    /// Steps one pixel in `direction`.
    ///
    /// Returns `None` when the step leaves the `width` x `height` raster, so
    /// any coordinate this returns is safe to index with.
    #[inline]
    #[must_use]
    pub fn neighbor(self, direction: Direction, width: u32, height: u32) -> Option<Self> {
        let (dx, dy) = direction.offset();
        let x = self.x.checked_add_signed(dx).filter(|&x| x < width)?;
        let y = self.y.checked_add_signed(dy).filter(|&y| y < height)?;
        Some(Self { x, y })
    }
}

/// Neighbour direction. The discriminant is the bit position in a pixel's
/// neighbour mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Direction {
    Left = 0,
    UpLeft = 1,
    Up = 2,
    UpRight = 3,
    Right = 4,
    DownRight = 5,
    Down = 6,
    DownLeft = 7,
}

impl Direction {
    /// All directions in bit order.
    pub const ALL: [Direction; 8] = [
        Self::Left,
        Self::UpLeft,
        Self::Up,
        Self::UpRight,
        Self::Right,
        Self::DownRight,
        Self::Down,
        Self::DownLeft,
    ];

    /// Mask of the four axis-aligned directions.
    pub const ORTHOGONAL_MASK: u8 = 0b0101_0101;

    /// Bit for this direction in a neighbour mask.
    #[inline]
    #[must_use]
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }

    /// `(dx, dy)` step.
    #[inline]
    #[must_use]
    pub fn offset(self) -> (i32, i32) {
        match self {
            Self::Left => (-1, 0),
            Self::UpLeft => (-1, 1),
            Self::Up => (0, 1),
            Self::UpRight => (1, 1),
            Self::Right => (1, 0),
            Self::DownRight => (1, -1),
            Self::Down => (0, -1),
            Self::DownLeft => (-1, -1),
        }
    }
}
