//! Decoder state tracking for trajectory switching
//!
//! Every coded frame is named by the decoder state it needs
//! ([`SourceHash`]) and the state it produces ([`TargetHash`]). A decoder
//! in state [`DecoderHash`] can consume any frame whose source hash it
//! satisfies, which is what allows switching between differently encoded
//! streams mid-decode.

pub mod hash;
pub mod player;

pub use crate::codec::vp8::header::MissingTracker;
pub use hash::{
    frame_name, parse_frame_name, CheckKind, DecoderHash, DependencyTracker, SourceHash,
    TargetHash, UpdateTracker,
};
pub use player::{decoder_hash_of, TrackedFrame, TrackingPlayer};
