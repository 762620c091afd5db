//! Cluster and cluster-pixel types.
#![allow(clippy::cast_precision_loss)]

use crate::{Direction, Element, PixelCoord};
use std::f64::consts::PI;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Classification of a cluster pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PixelKind {
    /// All four orthogonal neighbours belong to the cluster.
    Inner,
    #[default]
    Border,
}

/// A member pixel of a cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Pixel<T> {
    pub coord: PixelCoord,
    pub value: T,
    /// One bit per [`Direction`] with a non-zero neighbour.
    pub neighbors: u8,
    /// Valid after [`Cluster::analyze`].
    pub kind: PixelKind,
}

impl<T> Pixel<T> {
    #[inline]
    pub fn new(coord: PixelCoord, value: T) -> Self {
        Self {
            coord,
            value,
            neighbors: 0,
            kind: PixelKind::Border,
        }
    }

    #[inline]
    pub fn x(&self) -> u32 {
        self.coord.x
    }

    #[inline]
    pub fn y(&self) -> u32 {
        self.coord.y
    }

    /// Records a neighbour in `direction`.
    #[inline]
    pub fn mark(&mut self, direction: Direction) {
        self.neighbors |= direction.bit();
    }

    /// True if all four orthogonal neighbours are present.
    #[inline]
    #[must_use]
    pub fn is_inner(&self) -> bool {
        self.neighbors & Direction::ORTHOGONAL_MASK == Direction::ORTHOGONAL_MASK
    }
}

/// Inclusive pixel bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Aggregate cluster geometry computed by [`Cluster::analyze`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterStats {
    /// Number of pixels.
    pub size: usize,
    /// Sum of pixel values.
    pub volume: f64,
    pub min_value: f64,
    pub max_value: f64,
    /// Unweighted mean position `(x, y)`.
    pub centroid: (f64, f64),
    /// Value-weighted mean position `(x, y)`.
    pub volume_centroid: (f64, f64),
    pub bounding_box: BoundingBox,
    pub inner_count: usize,
    pub border_count: usize,
    /// `2 * sqrt(pi * size) / border_count`.
    pub roundness: f64,
    /// Diameter of a disc with the cluster's area.
    pub diameter: f64,
}

/// A maximal 8-connected group of non-zero pixels.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster<T = f64> {
    /// Member pixels in discovery order.
    pub pixels: Vec<Pixel<T>>,
    stats: Option<ClusterStats>,
}

impl<T: Element> Cluster<T> {
    /// Adds a pixel. Invalidates previously computed statistics.
    pub fn push(&mut self, pixel: Pixel<T>) {
        self.stats = None;
        self.pixels.push(pixel);
    }

    /// Returns the number of pixels in the cluster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Returns true if the cluster is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Returns an iterator over the pixels.
    pub fn iter(&self) -> impl Iterator<Item = &Pixel<T>> {
        self.pixels.iter()
    }

    /// Statistics from the last [`Self::analyze`], if still valid.
    #[must_use]
    pub fn stats(&self) -> Option<&ClusterStats> {
        self.stats.as_ref()
    }

    /// Classifies every pixel as inner or border and computes the cluster
    /// statistics.
    pub fn analyze(&mut self) -> &ClusterStats {
        let mut stats = ClusterStats {
            size: self.pixels.len(),
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
            bounding_box: BoundingBox {
                min_x: u32::MAX,
                min_y: u32::MAX,
                max_x: 0,
                max_y: 0,
            },
            ..ClusterStats::default()
        };
        let (mut sum_x, mut sum_y) = (0.0, 0.0);
        let (mut weighted_x, mut weighted_y) = (0.0, 0.0);

        for pixel in &mut self.pixels {
            let value = pixel.value.to_f64();
            let (x, y) = (f64::from(pixel.coord.x), f64::from(pixel.coord.y));

            stats.volume += value;
            stats.min_value = stats.min_value.min(value);
            stats.max_value = stats.max_value.max(value);
            sum_x += x;
            sum_y += y;
            weighted_x += x * value;
            weighted_y += y * value;

            let bbox = &mut stats.bounding_box;
            bbox.min_x = bbox.min_x.min(pixel.coord.x);
            bbox.min_y = bbox.min_y.min(pixel.coord.y);
            bbox.max_x = bbox.max_x.max(pixel.coord.x);
            bbox.max_y = bbox.max_y.max(pixel.coord.y);

            if pixel.is_inner() {
                pixel.kind = PixelKind::Inner;
                stats.inner_count += 1;
            } else {
                pixel.kind = PixelKind::Border;
                stats.border_count += 1;
            }
        }

        if stats.size == 0 {
            stats.min_value = 0.0;
            stats.max_value = 0.0;
            stats.bounding_box = BoundingBox::default();
        } else {
            let size = stats.size as f64;
            stats.centroid = (sum_x / size, sum_y / size);
            if stats.volume != 0.0 {
                stats.volume_centroid = (weighted_x / stats.volume, weighted_y / stats.volume);
            }
            stats.diameter = 2.0 * (size / PI).sqrt();
            if stats.border_count > 0 {
                stats.roundness = 2.0 * (PI * size).sqrt() / stats.border_count as f64;
            }
        }

        self.stats.insert(stats)
    }
}

impl<T: Element> FromIterator<Pixel<T>> for Cluster<T> {
    fn from_iter<I: IntoIterator<Item = Pixel<T>>>(iter: I) -> Self {
        Self {
            pixels: iter.into_iter().collect(),
            stats: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn block(values: &[(u32, u32, u16, u8)]) -> Cluster<u16> {
        values
            .iter()
            .map(|&(x, y, v, neighbors)| Pixel {
                neighbors,
                ..Pixel::new(PixelCoord::new(x, y), v)
            })
            .collect()
    }

    #[test]
    fn test_stats_invalid_until_analyzed() {
        let mut cluster = block(&[(1, 1, 5, 0)]);
        assert!(cluster.stats().is_none());
        cluster.analyze();
        assert!(cluster.stats().is_some());
        cluster.push(Pixel::new(PixelCoord::new(2, 1), 3));
        assert!(cluster.stats().is_none());
    }

    #[test]
    fn test_single_pixel() {
        let mut cluster = block(&[(4, 9, 7, 0)]);
        let stats = *cluster.analyze();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.inner_count, 0);
        assert_eq!(stats.border_count, 1);
        assert_relative_eq!(stats.volume, 7.0);
        assert_relative_eq!(stats.centroid.0, 4.0);
        assert_relative_eq!(stats.volume_centroid.1, 9.0);
        assert_relative_eq!(stats.roundness, 2.0 * PI.sqrt());
        assert_relative_eq!(stats.diameter, 2.0 / PI.sqrt());
    }

    #[test]
    fn test_weighted_centroid_and_bbox() {
        let mut cluster = block(&[(0, 0, 1, 0b0001_0000), (1, 0, 3, 0b0000_0001)]);
        let stats = *cluster.analyze();
        assert_relative_eq!(stats.centroid.0, 0.5);
        assert_relative_eq!(stats.volume_centroid.0, 0.75);
        assert_relative_eq!(stats.min_value, 1.0);
        assert_relative_eq!(stats.max_value, 3.0);
        assert_eq!(stats.bounding_box.width(), 2);
        assert_eq!(stats.bounding_box.height(), 1);
    }

    #[test]
    fn test_inner_requires_all_orthogonal_bits() {
        let mut cluster = block(&[(5, 5, 1, 0b0101_0101), (6, 6, 1, 0b1111_1110)]);
        cluster.analyze();
        assert_eq!(cluster.pixels[0].kind, PixelKind::Inner);
        assert_eq!(cluster.pixels[1].kind, PixelKind::Border);
    }
}
