//! vpx-trajectory - VP8 decoding with state fingerprints for trajectory switching
//!
//! A VP8 decoder whose complete state (entropy probabilities, segmentation,
//! filter deltas and the three reference rasters) is summarized by 64-bit
//! fingerprints. Every coded frame is then named by the state it requires
//! and the state it produces, and an index over those names tells a player
//! which frames of *any* encoding of the same content it can switch to.
//!
//! # Architecture
//!
//! - `codec`: the VP8 bitstream parser and reconstruction pipeline
//! - `tracking`: source/target/decoder hashes and the tracking player
//! - `format`: the multi-key frame index and the catalog importer
//! - `util`: fingerprints
//!
//! # Example
//!
//! ```no_run
//! use vpx_trajectory::format::CatalogImporter;
//!
//! # fn main() -> vpx_trajectory::Result<()> {
//! # let chunks: Vec<Vec<u8>> = Vec::new();
//! let mut importer = CatalogImporter::new(640, 480);
//! importer.import_all(&chunks)?;
//! let (index, data) = importer.into_parts();
//!
//! let start = vpx_trajectory::tracking::DecoderHash::default();
//! for frame in index.find_decodable(&start) {
//!     println!("{} ({} bytes)", frame, frame.chunk(&data)?.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod format;
pub mod tracking;
pub mod util;

pub use codec::{DecodedFrame, Decoder, DecoderOptions};
pub use error::{Error, Result};
pub use format::{CatalogImporter, FrameIndex, FrameInfo, SharedFrameIndex};
pub use tracking::{DecoderHash, SourceHash, TargetHash, TrackingPlayer};

/// vpx-trajectory version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Process-wide library configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Enable verbose logging
    pub verbose: bool,
    /// Enable debug output
    pub debug: bool,
}

/// Initialize logging with the given configuration
///
/// Installs nothing unless `verbose` or `debug` is set. Calling it again
/// after a subscriber is installed has no effect.
pub fn init(config: Config) -> Result<()> {
    if config.verbose || config.debug {
        let level = if config.debug { "debug" } else { "info" };
        let installed = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(level))
            .try_init();
        if installed.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    }

    Ok(())
}
