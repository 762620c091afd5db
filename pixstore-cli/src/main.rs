//! pixstore CLI
//!
//! Inspects frame streams and turns them into other frame streams,
//! cluster logs or pixel logs.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::Serialize;

use pixstore_algorithms::find_clusters;
use pixstore_core::{Cluster, Frame, FrameData};
use pixstore_io::{
    ClusterLog, Encoding, EventPixelStore, EventStoreConfig, FrameContainer, Layout, SaveOptions,
    StreamReport,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Store(#[from] pixstore_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} holds no frames")]
    EmptyStream(PathBuf),
}

/// Layout selection for `convert`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LayoutArg {
    /// Every cell, row-major
    Matrix,
    /// Non-zero cells as (flat index, value)
    SparseX,
    /// Non-zero cells as (x, y, value)
    SparseXy,
}

impl From<LayoutArg> for Layout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Matrix => Layout::Matrix,
            LayoutArg::SparseX => Layout::SparseX,
            LayoutArg::SparseXy => Layout::SparseXY,
        }
    }
}

/// Encoding selection for `convert`.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingArg {
    Ascii,
    Binary,
}

impl From<EncodingArg> for Encoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Ascii => Encoding::Ascii,
            EncodingArg::Binary => Encoding::Binary,
        }
    }
}

/// Frame, cluster-log and pixel-log storage for pixel detectors.
#[derive(Parser)]
#[command(name = "pixstore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log lookup decisions (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show frame count and consistency of a frame stream
    Info {
        /// Data, description or index path of the stream
        input: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-save every frame of a stream with another layout or encoding
    Convert {
        /// Input stream
        input: PathBuf,

        /// Output stream
        #[arg(short, long)]
        output: PathBuf,

        #[arg(short, long, value_enum, default_value = "matrix")]
        layout: LayoutArg,

        #[arg(short, long, value_enum, default_value = "binary")]
        encoding: EncodingArg,

        /// Round metadata to five significant digits
        #[arg(long)]
        compact: bool,

        /// Append to an existing output stream instead of replacing it
        #[arg(long)]
        append: bool,
    },

    /// Cluster every frame of a stream
    Cluster {
        /// Input stream
        input: PathBuf,

        /// Cluster log to append to; without it only statistics are printed
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Append every frame of a stream to a pixel log
    Pixels {
        /// Input stream
        input: PathBuf,

        /// Pixel log to append to
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Serialize)]
struct InfoReport<'a> {
    stream: &'a Path,
    frames: u64,
    width: Option<u32>,
    height: Option<u32>,
    element_type: Option<String>,
    report: StreamReport,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Info { input, json } => run_info(&input, json),
        Commands::Convert {
            input,
            output,
            layout,
            encoding,
            compact,
            append,
        } => {
            let options = SaveOptions::new()
                .with_layout(layout.into())
                .with_encoding(encoding.into())
                .with_max_precision(!compact);
            run_convert(&input, &output, &options, append)
        }
        Commands::Cluster { input, output } => run_cluster(&input, output.as_deref()),
        Commands::Pixels { input, output } => run_pixels(&input, &output),
    }
}

fn run_info(input: &Path, json: bool) -> Result<()> {
    let container = FrameContainer::new(input);
    let report = container.validate()?;
    let frames = container.frame_count().unwrap_or_else(|err| {
        warn!("cannot count frames: {err}");
        0
    });
    let first = if frames > 0 {
        container.load(0).ok()
    } else {
        None
    };

    let info = InfoReport {
        stream: &container.paths().data,
        frames,
        width: first.as_ref().map(Frame::width),
        height: first.as_ref().map(Frame::height),
        element_type: first.as_ref().map(|f| f.element_type().to_string()),
        report,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Stream: {}", info.stream.display());
    println!("Frames: {}", info.frames);
    if let (Some(w), Some(h), Some(t)) = (info.width, info.height, &info.element_type) {
        println!("First frame: {}x{} {}", w, h, t);
    }
    for (label, size) in [
        ("Data", info.report.data_size),
        ("Description", info.report.description_size),
        ("Index", info.report.index_size),
    ] {
        match size {
            Some(bytes) => println!("{label}: {bytes} bytes"),
            None => println!("{label}: missing"),
        }
    }
    if info.report.is_consistent() {
        println!("Consistent: yes");
    } else {
        println!("Consistent: no");
        for problem in &info.report.problems {
            println!("  - {problem}");
        }
    }
    Ok(())
}

/// Loads every frame of a stream, in parallel.
fn load_all(input: &Path) -> Result<Vec<Frame>> {
    let container = FrameContainer::new(input);
    let count = container.frame_count()?;
    if count == 0 {
        return Err(CliError::EmptyStream(input.to_path_buf()));
    }
    debug!("loading {} frames from {}", count, input.display());
    let frames = (0..count)
        .into_par_iter()
        .map(|n| container.load(n))
        .collect::<pixstore_core::Result<Vec<_>>>()?;
    Ok(frames)
}

fn run_convert(input: &Path, output: &Path, options: &SaveOptions, append: bool) -> Result<()> {
    let start = Instant::now();
    let frames = load_all(input)?;
    let target = FrameContainer::new(output);

    for (n, frame) in frames.iter().enumerate() {
        let options = options.clone().with_append(append || n > 0);
        target.save(frame, &options)?;
    }

    println!(
        "Converted {} frames to {} in {:.2}s",
        frames.len(),
        target.paths().data.display(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Cluster sizes of one frame.
fn cluster_sizes(frame: &Frame) -> pixstore_core::Result<Vec<usize>> {
    let (w, h) = (frame.width(), frame.height());
    let clusters: Vec<usize> = match frame.data() {
        FrameData::I16(v) => find_clusters(v, w, h)?.iter().map(Cluster::len).collect(),
        FrameData::U32(v) => find_clusters(v, w, h)?.iter().map(Cluster::len).collect(),
        FrameData::U64(v) => find_clusters(v, w, h)?.iter().map(Cluster::len).collect(),
        FrameData::Double(v) => find_clusters(v, w, h)?.iter().map(Cluster::len).collect(),
    };
    Ok(clusters)
}

fn run_cluster(input: &Path, output: Option<&Path>) -> Result<()> {
    let start = Instant::now();
    let frames = load_all(input)?;

    let (clusters, largest) = if let Some(path) = output {
        let log = ClusterLog::new(path);
        let mut total = 0usize;
        for frame in &frames {
            total += log.save_frame(frame)?;
        }
        info!("appended {} frames to {}", frames.len(), path.display());
        (total, None)
    } else {
        let sizes = frames
            .par_iter()
            .map(cluster_sizes)
            .collect::<pixstore_core::Result<Vec<_>>>()?;
        let total = sizes.iter().map(Vec::len).sum::<usize>();
        let largest = sizes.iter().flatten().copied().max();
        (total, largest)
    };

    println!(
        "Clustered {} frames in {:.2}s",
        frames.len(),
        start.elapsed().as_secs_f64()
    );
    println!("Total clusters: {}", clusters);
    println!(
        "Mean clusters per frame: {:.2}",
        clusters as f64 / frames.len() as f64
    );
    if let Some(largest) = largest {
        println!("Largest cluster: {} pixels", largest);
    }
    Ok(())
}

fn run_pixels(input: &Path, output: &Path) -> Result<()> {
    let frames = load_all(input)?;
    let (width, height) = (frames[0].width(), frames[0].height());
    let store = EventPixelStore::new(&EventStoreConfig::new().with_dimensions(width, height));

    let mut written = 0usize;
    for frame in &frames {
        if frame.data().non_zero_count() == 0 {
            debug!("skipping empty frame");
            continue;
        }
        store.save_frame_to_pixel_log(output, frame)?;
        written += 1;
    }

    println!(
        "Wrote {} of {} frames to {}",
        written,
        frames.len(),
        output.display()
    );
    Ok(())
}
