//! pixstore-algorithms: Clustering of dense detector frames.
//!
//! - **Flood fill** - 8-connected component labeling with per-cluster
//!   geometry, analyzed in parallel across clusters
//!
#![warn(missing_docs)]

mod clusterer;

pub use clusterer::{find_clusters, ClusterFinder};

// Re-export core cluster types
pub use pixstore_core::clustering::{BoundingBox, Cluster, ClusterStats, Pixel, PixelKind};
