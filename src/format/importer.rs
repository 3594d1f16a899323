//! Building a frame index from a coded stream

use bytes::{Bytes, BytesMut};
use tracing::debug;

use super::frame_db::FrameIndex;
use super::frame_info::FrameInfo;
use crate::codec::DecoderOptions;
use crate::error::{Error, Result};
use crate::tracking::TrackingPlayer;

/// Decodes coded chunks in order and catalogs the transitions they perform
///
/// The coded bytes of every newly indexed frame are appended to a data
/// buffer; a frame's offset points into that buffer.
pub struct CatalogImporter {
    player: TrackingPlayer,
    index: FrameIndex,
    data: BytesMut,
}

impl CatalogImporter {
    pub fn new(width: u16, height: u16) -> Self {
        Self::with_options(width, height, DecoderOptions::default())
    }

    pub fn with_options(width: u16, height: u16, options: DecoderOptions) -> Self {
        CatalogImporter {
            player: TrackingPlayer::with_options(width, height, options),
            index: FrameIndex::new(),
            data: BytesMut::new(),
        }
    }

    pub fn player(&self) -> &TrackingPlayer {
        &self.player
    }

    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    /// Decode one chunk and return the entry describing it
    ///
    /// A transition the index already holds is not stored again.
    pub fn import(&mut self, chunk: &[u8]) -> Result<FrameInfo> {
        let tracked = self.player.decode(chunk)?;

        if let Some(existing) = self.index.find_by_identity(&tracked.source, &tracked.target) {
            debug!(frame_id = existing.frame_id, "transition already indexed");
            return Ok(existing.clone());
        }

        let length = u64::try_from(chunk.len())
            .map_err(|_| Error::invalid_input("chunk length does not fit in 64 bits"))?;
        let info = FrameInfo::new(
            self.index.next_frame_id(),
            self.data.len() as u64,
            length,
            tracked.source,
            tracked.target,
        );
        self.index.insert(info.clone())?;
        self.data.extend_from_slice(chunk);
        Ok(info)
    }

    /// Import every chunk, stopping at the first failure
    pub fn import_all<I, C>(&mut self, chunks: I) -> Result<Vec<FrameInfo>>
    where
        I: IntoIterator<Item = C>,
        C: AsRef<[u8]>,
    {
        chunks
            .into_iter()
            .map(|chunk| self.import(chunk.as_ref()))
            .collect()
    }

    /// The finished index and the coded data its offsets refer to
    pub fn into_parts(self) -> (FrameIndex, Bytes) {
        (self.index, self.data.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::vp8::tables::{ChromaMode, LumaMode};
    use crate::codec::vp8::{FrameBuilder, MacroblockRecipe};
    use crate::tracking::CheckKind;

    fn key_frame(dc: i16) -> Vec<u8> {
        FrameBuilder::key_frame(16, 16)
            .fill(MacroblockRecipe::Intra {
                luma: LumaMode::Dc,
                chroma: ChromaMode::Dc,
                dc,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_import_assigns_offsets() {
        let mut importer = CatalogImporter::new(16, 16);
        let first = key_frame(0);
        let second = key_frame(40);

        let a = importer.import(&first).unwrap();
        let b = importer.import(&second).unwrap();
        assert_eq!((a.frame_id, a.offset), (0, 0));
        assert_eq!((b.frame_id, b.offset), (1, first.len() as u64));
        assert_eq!(a.source.check_kind(), CheckKind::Key);
        assert_ne!(a.output_hash(), b.output_hash());

        let (index, data) = importer.into_parts();
        assert_eq!(index.len(), 2);
        assert_eq!(&b.chunk(&data).unwrap()[..], &second[..]);
    }

    #[test]
    fn test_reimport_reuses_entry() {
        let mut importer = CatalogImporter::new(16, 16);
        let frame = key_frame(10);
        let first = importer.import(&frame).unwrap();
        let again = importer.import(&frame).unwrap();
        assert_eq!(first, again);
        assert_eq!(importer.index().len(), 1);
        assert_eq!(importer.player().frames_decoded(), 2);

        let (_, data) = importer.into_parts();
        assert_eq!(data.len(), frame.len());
    }

    #[test]
    fn test_import_failure_keeps_index() {
        let mut importer = CatalogImporter::new(16, 16);
        assert!(importer.import(&[0x00, 0x01]).is_err());
        assert!(importer.index().is_empty());
    }
}
