//! pixstore-io: File formats for pixstore.
//!
//! - [`FrameContainer`]: frame streams stored as data, description and
//!   index files, in dense or sparse layouts with ASCII or binary payloads.
//! - [`ClusterLog`]: per-frame text listings of clustered pixels.
//! - [`EventPixelStore`]: an in-memory pixel-event buffer persisted to a
//!   text pixel log.
//!
//! Text records without an index are located by binary search over byte
//! offsets (see [`scanner`]).

mod cluster_log;
pub mod codec;
pub mod description;
mod event_store;
mod frame_file;
mod fsutil;
pub mod index;
mod reader;
pub mod scanner;

pub use cluster_log::{ClusterLog, ClusterLogFormat, ClusterLogFrame};
pub use codec::{Encoding, Layout};
pub use event_store::{EventPixelStore, EventStoreConfig, FrameInfo};
pub use frame_file::{FrameContainer, GuessedFormat, SaveOptions, StreamPaths, StreamReport};
pub use pixstore_core::{Error, ErrorKind, Result};
pub use reader::MappedFileReader;
pub use scanner::DEFAULT_TAIL_WINDOW;
