//! 8-connected flood-fill clustering of dense rasters.
//!
//! Every non-zero cell ends up in exactly one cluster; zero cells are never
//! part of a cluster. Clusters grow breadth-first from the first unlabeled
//! non-zero cell in scan order.

use pixstore_core::{pixel_count, Cluster, Direction, Element, Error, Pixel, PixelCoord, Result};
use rayon::prelude::*;

/// Reusable connected-component finder.
///
/// Holds the label buffer between calls so repeated clustering of
/// same-sized frames does not reallocate.
#[derive(Debug, Clone, Default)]
pub struct ClusterFinder {
    labels: Vec<bool>,
}

impl ClusterFinder {
    /// Creates a new finder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds and analyzes all clusters of `raster`, scanning row-major.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `raster.len() != width * height`.
    pub fn find_clusters<T: Element>(
        &mut self,
        raster: &[T],
        width: u32,
        height: u32,
    ) -> Result<Vec<Cluster<T>>> {
        self.find_clusters_from(raster, width, height, 0..raster.len())
    }

    /// Finds and analyzes the clusters containing the given seed cells,
    /// visiting seeds in the order given.
    ///
    /// Passing every cell index in any order yields the same partition as
    /// [`Self::find_clusters`]; only the order of clusters and of pixels
    /// within them differs.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `raster.len() != width * height`
    /// or a seed lies outside the raster.
    pub fn find_clusters_from<T, I>(
        &mut self,
        raster: &[T],
        width: u32,
        height: u32,
        seeds: I,
    ) -> Result<Vec<Cluster<T>>>
    where
        T: Element,
        I: IntoIterator<Item = usize>,
    {
        let len = pixel_count(width, height);
        if raster.len() != len {
            return Err(Error::InvalidArgument(format!(
                "raster has {} cells, {width}x{height} needs {len}",
                raster.len()
            )));
        }

        self.labels.clear();
        self.labels.resize(len, false);

        let mut clusters = Vec::new();
        for seed in seeds {
            let value = *raster.get(seed).ok_or_else(|| {
                Error::InvalidArgument(format!("seed {seed} outside raster of {len} cells"))
            })?;
            if value.is_zero() || self.labels[seed] {
                continue;
            }
            clusters.push(self.grow(raster, width, height, seed));
        }

        clusters.par_iter_mut().for_each(|cluster| {
            cluster.analyze();
        });
        Ok(clusters)
    }

    fn grow<T: Element>(&mut self, raster: &[T], width: u32, height: u32, seed: usize) -> Cluster<T> {
        let mut pixels = vec![Pixel::new(
            PixelCoord::from_flat_index(seed, width),
            raster[seed],
        )];
        self.labels[seed] = true;

        // The list grows while it is walked; appended members are expanded too.
        let mut next = 0;
        while next < pixels.len() {
            let coord = pixels[next].coord;
            for direction in Direction::ALL {
                let Some(neighbor) = coord.neighbor(direction, width, height) else {
                    continue;
                };
                let index = neighbor.flat_index(width);
                let value = raster[index];
                if value.is_zero() {
                    continue;
                }
                pixels[next].mark(direction);
                if !self.labels[index] {
                    self.labels[index] = true;
                    pixels.push(Pixel::new(neighbor, value));
                }
            }
            next += 1;
        }

        pixels.into_iter().collect()
    }
}

/// Finds and analyzes all clusters of `raster` with a fresh [`ClusterFinder`].
///
/// # Errors
/// Returns [`Error::InvalidArgument`] if `raster.len() != width * height`.
pub fn find_clusters<T: Element>(raster: &[T], width: u32, height: u32) -> Result<Vec<Cluster<T>>> {
    ClusterFinder::new().find_clusters(raster, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixstore_core::{ErrorKind, PixelKind};

    #[test]
    fn test_empty_raster_has_no_clusters() {
        let raster = vec![0u32; 16];
        assert!(find_clusters(&raster, 4, 4).unwrap().is_empty());
    }

    #[test]
    fn test_size_mismatch() {
        let raster = vec![1u32; 15];
        let err = find_clusters(&raster, 4, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_diagonal_pixels_connect() {
        #[rustfmt::skip]
        let raster: Vec<i16> = vec![
            1, 0, 0,
            0, 2, 0,
            0, 0, 3,
        ];
        let clusters = find_clusters(&raster, 3, 3).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 3);
    }

    #[test]
    fn test_neighbor_bits_are_symmetric() {
        let raster: Vec<u16> = vec![1, 1, 0, 0];
        let clusters = find_clusters(&raster, 2, 2).unwrap();
        let pixels = &clusters[0].pixels;
        assert_eq!(pixels[0].neighbors, Direction::Right.bit());
        assert_eq!(pixels[1].neighbors, Direction::Left.bit());
        assert!(pixels.iter().all(|p| p.kind == PixelKind::Border));
    }

    #[test]
    fn test_edge_clusters_do_not_wrap() {
        // A pixel at the end of one row must not join the start of the next.
        #[rustfmt::skip]
        let raster: Vec<u32> = vec![
            0, 0, 5,
            5, 0, 0,
        ];
        let clusters = find_clusters(&raster, 3, 2).unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[test]
    fn test_finder_reuse_resets_labels() {
        let mut finder = ClusterFinder::new();
        let raster = vec![1.0f64; 9];
        assert_eq!(finder.find_clusters(&raster, 3, 3).unwrap().len(), 1);
        assert_eq!(finder.find_clusters(&raster, 3, 3).unwrap().len(), 1);
    }

    #[test]
    fn test_seed_out_of_range() {
        let raster = vec![1u32; 4];
        let err = ClusterFinder::new()
            .find_clusters_from(&raster, 2, 2, [7])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
