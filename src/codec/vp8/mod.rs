//! VP8 decoding
//!
//! A pure Rust VP8 decoder built for state tracking: every piece of state
//! that influences later frames (entropy tables, segmentation, loop filter
//! deltas, the three reference rasters) is explicit and fingerprintable.
//!
//! ## Example
//!
//! ```no_run
//! use vpx_trajectory::codec::vp8::Decoder;
//!
//! # fn frames() -> Vec<Vec<u8>> { Vec::new() }
//! let mut decoder = Decoder::new(640, 480);
//! for chunk in frames() {
//!     let frame = decoder.decode(&chunk)?;
//!     if frame.shown {
//!         let _pixels = frame.raster.to_i420();
//!     }
//! }
//! # Ok::<(), vpx_trajectory::error::Error>(())
//! ```

pub mod bool_decoder;
pub mod bool_encoder;
pub mod decoder;
pub mod entropy;
pub mod filter;
pub mod frame;
pub mod frame_writer;
pub mod header;
pub mod macroblock;
pub mod prediction;
pub mod quant;
pub mod raster;
pub mod reconstruct;
pub mod residual;
pub mod tables;
pub mod transform;

pub use bool_decoder::{BoolDecoder, EntropyDecoder};
pub use bool_encoder::BoolEncoder;
pub use decoder::{DecodedFrame, Decoder, DecoderOptions, DecoderState};
pub use frame::Frame;
pub use frame_writer::{FrameBuilder, MacroblockRecipe};
pub use header::{ContinuationHeader, FrameHeader, KindHeader, MissingTracker};
pub use raster::{Raster, RasterHandle, ReferenceSet};
pub use tables::ReferenceFrame;
