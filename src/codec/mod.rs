//! Codec implementations

pub mod vp8;

pub use vp8::{DecodedFrame, Decoder, DecoderOptions};
