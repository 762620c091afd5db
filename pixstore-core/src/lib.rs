//! pixstore-core: Core types for frame and pixel-event storage.
//!
//! This crate provides the error taxonomy, metadata model, dense frames,
//! the numeric element trait and the cluster types shared by the
//! clustering and file-format crates.
//!

pub mod clustering;
pub mod data_type;
pub mod element;
pub mod error;
pub mod frame;
pub mod metadata;
pub mod pixel;
pub mod soa;

pub use clustering::{BoundingBox, Cluster, ClusterStats, Pixel, PixelKind};
pub use data_type::DataType;
pub use element::Element;
pub use error::{Error, ErrorKind, Result};
pub use frame::{pixel_count, ElementType, Frame, FrameData, FrameElement};
pub use metadata::{MetaData, MetaDataMap, ACQ_TIME, START_TIME};
pub use pixel::{Direction, PixelCoord};
pub use soa::PixelEventBatch;
