//! A decoder that tracks its own state fingerprints

use tracing::{debug, warn};

use super::hash::{DecoderHash, DependencyTracker, SourceHash, TargetHash, UpdateTracker};
use crate::codec::vp8::decoder::{DecodedFrame, Decoder, DecoderOptions};
use crate::codec::vp8::tables::ReferenceFrame;
use crate::error::{Error, Result};

/// One decoded frame with the state transition it performed
#[derive(Debug, Clone)]
pub struct TrackedFrame {
    pub frame: DecodedFrame,
    pub source: SourceHash,
    pub target: TargetHash,
    /// What the frame actually read, finer than `source`
    pub dependencies: DependencyTracker,
}

/// Recompute the five fingerprints of a decoder from scratch
pub fn decoder_hash_of(decoder: &Decoder) -> DecoderHash {
    let references = decoder.references();
    let slot = |reference: ReferenceFrame| {
        references
            .get(reference)
            .map_or(0, |raster| raster.fingerprint())
    };
    DecoderHash::new(
        decoder.state().hash(),
        decoder.continuation_hash(),
        slot(ReferenceFrame::Last),
        slot(ReferenceFrame::Golden),
        slot(ReferenceFrame::Alternate),
    )
}

/// Couples a [`Decoder`] with its [`DecoderHash`]
#[derive(Debug)]
pub struct TrackingPlayer {
    decoder: Decoder,
    hash: DecoderHash,
    frames_decoded: u64,
}

impl TrackingPlayer {
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_options(width, height, DecoderOptions::default())
    }

    pub fn with_options(width: u16, height: u16, options: DecoderOptions) -> Self {
        let decoder = Decoder::with_options(width, height, options);
        let hash = decoder_hash_of(&decoder);
        TrackingPlayer {
            decoder,
            hash,
            frames_decoded: 0,
        }
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn decoder_hash(&self) -> DecoderHash {
        self.hash
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Decode a frame and derive its source and target hashes
    ///
    /// The source hash describes the state before the frame, chosen by frame
    /// kind. Inter frames depend on the state and on all three references
    /// regardless of which slots their macroblocks used.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<TrackedFrame> {
        let before = self.hash;
        let frame = self.decoder.decode(chunk)?;

        let mut dependencies = DependencyTracker::default();
        let source = if frame.key_frame {
            SourceHash::key()
        } else if frame.continuation.is_some() {
            dependencies.need_state = true;
            dependencies.need_continuation = true;
            SourceHash::continuation(before.state_hash(), before.continuation_hash())
        } else {
            dependencies.need_state = true;
            SourceHash::inter(
                before.state_hash(),
                before.last_hash(),
                before.golden_hash(),
                before.alt_hash(),
            )
        };
        for (reference, used) in ReferenceFrame::ALL.iter().zip(frame.references_used) {
            if used {
                *dependencies.reference_mut(*reference) = true;
            }
        }

        let target = TargetHash::new(
            UpdateTracker::from_header(&frame.header),
            self.decoder.state().hash(),
            self.decoder.continuation_hash(),
            frame.raster.fingerprint(),
            frame.shown,
        );

        let mut next = self.hash;
        next.update(&target);
        let recomputed = decoder_hash_of(&self.decoder);
        if recomputed != next {
            warn!(tracked = %next, actual = %recomputed, "decoder hash diverged");
            return Err(Error::logic(format!(
                "tracked decoder hash {} differs from decoder state {}",
                next, recomputed
            )));
        }
        self.hash = next;

        self.frames_decoded += 1;
        debug!(
            frame = self.frames_decoded,
            source = %source,
            target = %target,
            "tracked frame"
        );

        Ok(TrackedFrame {
            frame,
            source,
            target,
            dependencies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::hash::CheckKind;
    use crate::codec::vp8::tables::{ChromaMode, LumaMode};
    use crate::codec::vp8::{FrameBuilder, MacroblockRecipe};

    #[test]
    fn test_fresh_player_hash() {
        let player = TrackingPlayer::new(16, 16);
        let hash = player.decoder_hash();
        assert_eq!(hash.last_hash(), 0);
        assert_eq!(hash.golden_hash(), 0);
        assert_eq!(hash.alt_hash(), 0);
        assert_eq!(hash.continuation_hash(), 0);
        assert_eq!(hash.state_hash(), player.decoder().state().hash());
    }

    #[test]
    fn test_failed_decode_keeps_hash() {
        let mut player = TrackingPlayer::new(16, 16);
        let before = player.decoder_hash();
        assert!(player.decode(&[1, 2]).is_err());
        assert_eq!(player.decoder_hash(), before);
        assert_eq!(player.frames_decoded(), 0);
    }

    #[test]
    fn test_diverged_hash_is_not_advanced() {
        let mut player = TrackingPlayer::new(16, 16);
        let key = FrameBuilder::key_frame(16, 16)
            .fill(MacroblockRecipe::Intra {
                luma: LumaMode::Dc,
                chroma: ChromaMode::Dc,
                dc: 40,
            })
            .build()
            .unwrap();
        player.decode(&key).unwrap();

        // The inter frame leaves golden untouched, so a wrong golden survives
        let good = player.decoder_hash();
        let bogus = DecoderHash::new(
            good.state_hash(),
            good.continuation_hash(),
            good.last_hash(),
            good.golden_hash() ^ 1,
            good.alt_hash(),
        );
        player.hash = bogus;

        let inter = FrameBuilder::inter_frame(16, 16).build().unwrap();
        assert!(matches!(player.decode(&inter), Err(Error::LogicError(_))));
        assert_eq!(player.decoder_hash(), bogus);
        assert_eq!(player.frames_decoded(), 1);

        player.hash = decoder_hash_of(player.decoder());
        let tracked = player.decode(&inter).unwrap();
        assert_eq!(player.decoder_hash(), decoder_hash_of(player.decoder()));
        assert_eq!(tracked.source.check_kind(), CheckKind::Inter);
        assert_eq!(player.frames_decoded(), 2);
    }
}
