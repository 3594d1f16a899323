//! Multi-key frame index
//!
//! Frames are owned by one map keyed by frame id. Secondary maps index
//! them by (source, target) identity, by output raster and by the concrete
//! fields of their source hash. The last one turns "which frames can this
//! decoder consume" into a fixed number of hash lookups: every frame sits
//! in exactly one bucket keyed by its populated source fields, and a query
//! probes each combination of the decoder's fields.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::frame_info::FrameInfo;
use crate::error::{Error, Result};
use crate::tracking::{CheckKind, DecoderHash, SourceHash, TargetHash};

type SourceKey = [Option<u64>; 5];

const STATE: u8 = 1 << 0;
const CONTINUATION: u8 = 1 << 1;
const LAST: u8 = 1 << 2;
const GOLDEN: u8 = 1 << 3;
const ALTERNATE: u8 = 1 << 4;

/// Field combinations probed by [`FrameIndex::find_decodable`], in order:
/// inter frames, continuation frames, key frames, then everything else
fn search_masks() -> impl Iterator<Item = u8> {
    const PREFERRED: [u8; 3] = [STATE | LAST | GOLDEN | ALTERNATE, STATE | CONTINUATION, 0];
    PREFERRED
        .into_iter()
        .chain((0u8..32).filter(|mask| !PREFERRED.contains(mask)))
}

/// The source fields its check kind compares; the rest never constrain it
fn source_key(source: &SourceHash) -> SourceKey {
    let [state, continuation, last, golden, alt] = source.fields();
    match source.check_kind() {
        CheckKind::Key => [None; 5],
        CheckKind::Inter => [state, None, last, golden, alt],
        CheckKind::Continuation => [state, continuation, None, None, None],
    }
}

fn masked_key(decoder: &DecoderHash, mask: u8) -> SourceKey {
    let fields = decoder.fields();
    let mut key = [None; 5];
    for (bit, (slot, value)) in key.iter_mut().zip(fields).enumerate() {
        if mask & (1 << bit) != 0 {
            *slot = Some(value);
        }
    }
    key
}

/// In-memory catalog of coded frames
#[derive(Debug, Clone, Default)]
pub struct FrameIndex {
    frames: BTreeMap<u64, FrameInfo>,
    by_identity: HashMap<(SourceHash, TargetHash), u64>,
    by_output: HashMap<u64, BTreeSet<u64>>,
    by_source: HashMap<SourceKey, BTreeSet<u64>>,
}

impl FrameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames in frame id order
    pub fn iter(&self) -> impl Iterator<Item = &FrameInfo> {
        self.frames.values()
    }

    /// Smallest id above every id in use
    pub fn next_frame_id(&self) -> u64 {
        self.frames.keys().next_back().map_or(0, |id| id + 1)
    }

    pub fn has_frame_id(&self, frame_id: u64) -> bool {
        self.frames.contains_key(&frame_id)
    }

    pub fn has_identity(&self, source: &SourceHash, target: &TargetHash) -> bool {
        self.by_identity.contains_key(&(*source, *target))
    }

    /// Add a frame; its id and its (source, target) pair must both be new
    pub fn insert(&mut self, frame: FrameInfo) -> Result<()> {
        if self.frames.contains_key(&frame.frame_id) {
            return Err(Error::duplicate(format!("frame id {} already indexed", frame.frame_id)));
        }
        if let Some(existing) = self.by_identity.get(&frame.identity()) {
            return Err(Error::duplicate(format!(
                "frame {} has the same identity as frame {}",
                frame.frame_id, existing
            )));
        }

        debug!(frame_id = frame.frame_id, name = %frame.name(), "indexed frame");
        self.index_frame(frame);
        Ok(())
    }

    fn index_frame(&mut self, frame: FrameInfo) {
        let id = frame.frame_id;
        self.by_identity.insert(frame.identity(), id);
        self.by_output.entry(frame.output_hash()).or_default().insert(id);
        self.by_source.entry(source_key(&frame.source)).or_default().insert(id);
        self.frames.insert(id, frame);
    }

    pub fn find_by_id(&self, frame_id: u64) -> Option<&FrameInfo> {
        self.frames.get(&frame_id)
    }

    pub fn find_by_identity(&self, source: &SourceHash, target: &TargetHash) -> Option<&FrameInfo> {
        self.by_identity
            .get(&(*source, *target))
            .and_then(|id| self.frames.get(id))
    }

    /// Every frame whose decoded raster has this fingerprint, by id
    pub fn find_by_output_hash(&self, output_hash: u64) -> impl Iterator<Item = &FrameInfo> + '_ {
        self.by_output
            .get(&output_hash)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.frames.get(id))
    }

    /// Every frame a decoder in state `decoder` can decode next
    ///
    /// Lazy. The order is fixed for a given index: inter frames first, then
    /// continuation frames, then key frames, each group by frame id.
    pub fn find_decodable(&self, decoder: &DecoderHash) -> impl Iterator<Item = &FrameInfo> + '_ {
        let decoder = *decoder;
        search_masks()
            .filter_map(move |mask| self.by_source.get(&masked_key(&decoder, mask)))
            .flatten()
            .filter_map(move |id| self.frames.get(id))
            .filter(move |frame| decoder.can_decode(&frame.source))
    }

    /// The first result of [`find_decodable`](Self::find_decodable)
    pub fn first_decodable(&self, decoder: &DecoderHash) -> Result<&FrameInfo> {
        self.find_decodable(decoder).next().ok_or_else(|| {
            Error::no_decodable(format!("no indexed frame can follow state {}", decoder))
        })
    }

    /// Append another index whose coded data was appended at `data_offset`
    ///
    /// Frames whose identity is already indexed map to the existing entry;
    /// the rest get fresh ids above the current maximum and shifted offsets.
    /// Returns the mapping from the other index's ids to ids in this one.
    pub fn merge(&mut self, other: &FrameIndex, data_offset: u64) -> Result<BTreeMap<u64, u64>> {
        let mut mapping = BTreeMap::new();
        let mut added = Vec::new();
        let mut next_id = self.next_frame_id();

        for frame in other.iter() {
            if let Some(&existing) = self.by_identity.get(&frame.identity()) {
                mapping.insert(frame.frame_id, existing);
                continue;
            }
            let offset = frame.offset.checked_add(data_offset).ok_or_else(|| {
                Error::invalid_input(format!(
                    "frame {} offset overflows after shifting by {}",
                    frame.frame_id, data_offset
                ))
            })?;
            mapping.insert(frame.frame_id, next_id);
            added.push(FrameInfo {
                frame_id: next_id,
                offset,
                ..frame.clone()
            });
            next_id += 1;
        }

        debug!(
            merged = other.len(),
            added = added.len(),
            reused = other.len() - added.len(),
            "merged frame index"
        );
        for frame in added {
            self.index_frame(frame);
        }
        Ok(mapping)
    }

    /// Write one JSON object per frame, by frame id
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        for frame in self.iter() {
            serde_json::to_writer(&mut writer, frame)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Read an index written by [`write_to`](Self::write_to)
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut index = FrameIndex::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            index.insert(serde_json::from_str(&line)?)?;
        }
        Ok(index)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.write_to(BufWriter::new(File::create(path)?))
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_from(File::open(path)?)
    }
}

/// A frame index shared between threads
///
/// Any number of readers may query concurrently; inserts and merges take
/// the lock exclusively.
#[derive(Debug, Clone, Default)]
pub struct SharedFrameIndex {
    inner: Arc<RwLock<FrameIndex>>,
}

impl SharedFrameIndex {
    pub fn new(index: FrameIndex) -> Self {
        SharedFrameIndex {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, FrameIndex> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, FrameIndex> {
        self.inner.write()
    }

    pub fn insert(&self, frame: FrameInfo) -> Result<()> {
        self.inner.write().insert(frame)
    }

    pub fn merge(&self, other: &FrameIndex, data_offset: u64) -> Result<BTreeMap<u64, u64>> {
        self.inner.write().merge(other, data_offset)
    }

    pub fn find_by_id(&self, frame_id: u64) -> Option<FrameInfo> {
        self.inner.read().find_by_id(frame_id).cloned()
    }

    pub fn find_decodable(&self, decoder: &DecoderHash) -> Vec<FrameInfo> {
        self.inner.read().find_decodable(decoder).cloned().collect()
    }

    pub fn first_decodable(&self, decoder: &DecoderHash) -> Result<FrameInfo> {
        self.inner.read().first_decodable(decoder).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
