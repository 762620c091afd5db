#![allow(
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::unreadable_literal
)]
use approx::assert_relative_eq;
use pixstore_algorithms::{find_clusters, Cluster, ClusterFinder, PixelKind};
use std::collections::BTreeSet;

fn member_sets<T: pixstore_core::Element>(clusters: &[Cluster<T>]) -> BTreeSet<Vec<(u32, u32)>> {
    clusters
        .iter()
        .map(|cluster| {
            let mut members: Vec<(u32, u32)> = cluster.iter().map(|p| (p.x(), p.y())).collect();
            members.sort_unstable();
            members
        })
        .collect()
}

fn sprinkle(width: u32, height: u32, seed: u64) -> Vec<u32> {
    let mut rng_seed = seed;
    let mut rand = || {
        rng_seed = (rng_seed.wrapping_mul(1103515245).wrapping_add(12345)) & 0x7fffffff;
        rng_seed as u32
    };
    (0..width * height)
        .map(|_| if rand() % 3 == 0 { 1 + rand() % 100 } else { 0 })
        .collect()
}

#[test]
fn test_full_3x3_block() {
    let mut raster = vec![0u16; 25];
    for y in 1..4 {
        for x in 1..4 {
            raster[y * 5 + x] = 10;
        }
    }

    let clusters = find_clusters(&raster, 5, 5).unwrap();
    assert_eq!(clusters.len(), 1);

    let stats = clusters[0].stats().unwrap();
    assert_eq!(stats.size, 9);
    assert_eq!(stats.inner_count, 1);
    assert_eq!(stats.border_count, 8);
    assert_relative_eq!(stats.volume, 90.0);
    assert_relative_eq!(stats.centroid.0, 2.0);
    assert_relative_eq!(stats.centroid.1, 2.0);

    let inner: Vec<_> = clusters[0]
        .iter()
        .filter(|p| p.kind == PixelKind::Inner)
        .map(|p| (p.x(), p.y()))
        .collect();
    assert_eq!(inner, vec![(2, 2)]);
}

#[test]
fn test_isolated_pixel() {
    let mut raster = vec![0.0f64; 64];
    raster[27] = 4.5;

    let clusters = find_clusters(&raster, 8, 8).unwrap();
    assert_eq!(clusters.len(), 1);
    let stats = clusters[0].stats().unwrap();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.border_count, 1);
    assert_eq!(stats.inner_count, 0);
    assert_relative_eq!(stats.max_value, 4.5);
}

#[test]
fn test_every_non_zero_cell_in_exactly_one_cluster() {
    let (width, height) = (48, 37);
    let raster = sprinkle(width, height, 7);

    let clusters = find_clusters(&raster, width, height).unwrap();
    let mut seen = vec![0u32; raster.len()];
    for cluster in &clusters {
        for pixel in cluster.iter() {
            seen[pixel.coord.flat_index(width)] += 1;
        }
    }
    for (value, count) in raster.iter().zip(&seen) {
        assert_eq!(*count, u32::from(*value != 0));
    }
}

#[test]
fn test_partition_independent_of_scan_order() {
    let (width, height) = (64, 40);
    for seed in [1u64, 99, 4242] {
        let raster = sprinkle(width, height, seed);
        let reference = member_sets(&find_clusters(&raster, width, height).unwrap());

        // Fisher-Yates shuffle of the scan order.
        let mut order: Vec<usize> = (0..raster.len()).collect();
        let mut rng_seed = seed ^ 0x5555;
        for i in (1..order.len()).rev() {
            rng_seed = (rng_seed.wrapping_mul(1103515245).wrapping_add(12345)) & 0x7fffffff;
            order.swap(i, rng_seed as usize % (i + 1));
        }

        let shuffled = ClusterFinder::new()
            .find_clusters_from(&raster, width, height, order)
            .unwrap();
        assert_eq!(
            member_sets(&shuffled),
            reference,
            "partition differs for seed {}",
            seed
        );
    }
}

#[test]
fn test_corner_and_edge_pixels() {
    // Clusters touching every border of the raster.
    let (width, height) = (6u32, 4u32);
    let mut raster = vec![0i16; 24];
    for index in [0, 5, 18, 23] {
        raster[index] = 1;
    }
    let clusters = find_clusters(&raster, width, height).unwrap();
    assert_eq!(clusters.len(), 4);
    assert!(clusters.iter().all(|c| c.len() == 1));
}
