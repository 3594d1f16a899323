//! Catalog entries: where a coded frame lives and which state transition it performs

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tracking::{frame_name, CheckKind, SourceHash, TargetHash};

/// One indexed frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame_id: u64,
    /// Byte offset of the coded frame in the coded-data file
    pub offset: u64,
    pub length: u64,
    pub source: SourceHash,
    pub target: TargetHash,
}

impl FrameInfo {
    pub fn new(frame_id: u64, offset: u64, length: u64, source: SourceHash, target: TargetHash) -> Self {
        FrameInfo {
            frame_id,
            offset,
            length,
            source,
            target,
        }
    }

    /// The (source, target) pair that identifies this frame
    pub fn identity(&self) -> (SourceHash, TargetHash) {
        (self.source, self.target)
    }

    pub fn output_hash(&self) -> u64 {
        self.target.output_hash
    }

    pub fn is_key_frame(&self) -> bool {
        self.source.check_kind() == CheckKind::Key
    }

    pub fn name(&self) -> String {
        frame_name(&self.source, &self.target)
    }

    /// The coded bytes of this frame within a loaded coded-data buffer
    pub fn chunk(&self, data: &Bytes) -> Result<Bytes> {
        let start = usize::try_from(self.offset).ok();
        let end = self
            .offset
            .checked_add(self.length)
            .and_then(|end| usize::try_from(end).ok());
        match (start, end) {
            (Some(start), Some(end)) if end <= data.len() => Ok(data.slice(start..end)),
            _ => Err(Error::invalid_input(format!(
                "frame {} spans {}+{} bytes, data holds {}",
                self.frame_id,
                self.offset,
                self.length,
                data.len()
            ))),
        }
    }
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} @{}+{} {}",
            self.frame_id,
            self.offset,
            self.length,
            self.name()
        )
    }
}
