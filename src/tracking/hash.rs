//! Decoder state fingerprints
//!
//! Three views of the same five-part state (running entropy state,
//! continuation table, last/golden/alternate references):
//!
//! - [`DecoderHash`]: where a live decoder is
//! - [`SourceHash`]: what a coded frame needs, with absent fields meaning
//!   "any value"
//! - [`TargetHash`]: what a coded frame leaves behind
//!
//! A (source, target) pair names a frame: two encodings of the same state
//! transition are the same frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::vp8::header::{FrameHeader, KindHeader};
use crate::codec::vp8::tables::ReferenceFrame;
use crate::error::{Error, Result};

/// Which source fields a frame is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Decodable from any state
    Key,
    /// State and all three references
    Inter,
    /// State and continuation table only
    Continuation,
}

impl CheckKind {
    fn as_str(self) -> &'static str {
        match self {
            CheckKind::Key => "key",
            CheckKind::Inter => "inter",
            CheckKind::Continuation => "continuation",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "key" => Ok(CheckKind::Key),
            "inter" => Ok(CheckKind::Inter),
            "continuation" => Ok(CheckKind::Continuation),
            other => Err(Error::invalid_input(format!("unknown check kind '{}'", other))),
        }
    }
}

/// Decoder state a coded frame requires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHash {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_hash: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hash: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub golden_hash: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_hash: Option<u64>,
    check: CheckKind,
}

fn matches(required: Option<u64>, actual: u64) -> bool {
    required.map_or(true, |value| value == actual)
}

impl SourceHash {
    /// Source of a key frame: no requirements
    pub fn key() -> Self {
        SourceHash {
            state_hash: None,
            continuation_hash: None,
            last_hash: None,
            golden_hash: None,
            alt_hash: None,
            check: CheckKind::Key,
        }
    }

    pub fn inter(state: u64, last: u64, golden: u64, alt: u64) -> Self {
        SourceHash {
            state_hash: Some(state),
            continuation_hash: None,
            last_hash: Some(last),
            golden_hash: Some(golden),
            alt_hash: Some(alt),
            check: CheckKind::Inter,
        }
    }

    pub fn continuation(state: u64, continuation: u64) -> Self {
        SourceHash {
            state_hash: Some(state),
            continuation_hash: Some(continuation),
            last_hash: None,
            golden_hash: None,
            alt_hash: None,
            check: CheckKind::Continuation,
        }
    }

    /// Arbitrary fields; which of them are checked depends on `check` alone
    pub fn with_fields(
        check: CheckKind,
        state: Option<u64>,
        continuation: Option<u64>,
        last: Option<u64>,
        golden: Option<u64>,
        alt: Option<u64>,
    ) -> Self {
        SourceHash {
            state_hash: state,
            continuation_hash: continuation,
            last_hash: last,
            golden_hash: golden,
            alt_hash: alt,
            check,
        }
    }

    pub fn check_kind(&self) -> CheckKind {
        self.check
    }

    /// Whether a decoder in state `decoder` can decode this frame
    pub fn check(&self, decoder: &DecoderHash) -> bool {
        match self.check {
            CheckKind::Key => true,
            CheckKind::Inter => {
                matches(self.state_hash, decoder.state_hash)
                    && matches(self.last_hash, decoder.last_hash)
                    && matches(self.golden_hash, decoder.golden_hash)
                    && matches(self.alt_hash, decoder.alt_hash)
            }
            CheckKind::Continuation => {
                matches(self.state_hash, decoder.state_hash)
                    && matches(self.continuation_hash, decoder.continuation_hash)
            }
        }
    }

    /// The five fields, state first
    pub fn fields(&self) -> [Option<u64>; 5] {
        [
            self.state_hash,
            self.continuation_hash,
            self.last_hash,
            self.golden_hash,
            self.alt_hash,
        ]
    }
}

fn write_optional(f: &mut fmt::Formatter<'_>, value: Option<u64>) -> fmt::Result {
    match value {
        Some(value) => write!(f, "{:x}", value),
        None => f.write_str("x"),
    }
}

fn parse_hex(field: &str) -> Result<u64> {
    u64::from_str_radix(field, 16)
        .map_err(|e| Error::invalid_input(format!("bad hash field '{}': {}", field, e)))
}

fn parse_optional(field: &str) -> Result<Option<u64>> {
    if field == "x" {
        Ok(None)
    } else {
        parse_hex(field).map(Some)
    }
}

impl fmt::Display for SourceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for field in self.fields() {
            write_optional(f, field)?;
            f.write_str("#")?;
        }
        write!(f, "{}", self.check)
    }
}

impl FromStr for SourceHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('#').collect();
        if parts.len() != 6 {
            return Err(Error::invalid_input(format!(
                "source hash '{}' has {} fields, expected 6",
                s,
                parts.len()
            )));
        }
        Ok(SourceHash::with_fields(
            parts[5].parse()?,
            parse_optional(parts[0])?,
            parse_optional(parts[1])?,
            parse_optional(parts[2])?,
            parse_optional(parts[3])?,
            parse_optional(parts[4])?,
        ))
    }
}

/// Reference slot changes a frame makes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdateTracker {
    pub update_last: bool,
    pub update_golden: bool,
    pub update_alternate: bool,
    pub last_to_golden: bool,
    pub last_to_alternate: bool,
    pub golden_to_alternate: bool,
    pub alternate_to_golden: bool,
}

impl UpdateTracker {
    /// Key frames refresh every slot
    pub fn key_frame() -> Self {
        UpdateTracker {
            update_last: true,
            update_golden: true,
            update_alternate: true,
            ..Default::default()
        }
    }

    /// The slot changes a frame header asks for
    pub fn from_header(header: &FrameHeader) -> Self {
        match &header.kind {
            KindHeader::Key(_) => Self::key_frame(),
            KindHeader::Inter(inter) => UpdateTracker {
                update_last: inter.refresh_last,
                update_golden: inter.refresh_golden,
                update_alternate: inter.refresh_alternate,
                last_to_golden: inter.copy_buffer_to_golden == Some(1),
                alternate_to_golden: inter.copy_buffer_to_golden == Some(2),
                last_to_alternate: inter.copy_buffer_to_alternate == Some(1),
                golden_to_alternate: inter.copy_buffer_to_alternate == Some(2),
            },
        }
    }

    fn flags(&self) -> [bool; 7] {
        [
            self.update_last,
            self.update_golden,
            self.update_alternate,
            self.last_to_golden,
            self.last_to_alternate,
            self.golden_to_alternate,
            self.alternate_to_golden,
        ]
    }

    fn from_flags(flags: [bool; 7]) -> Self {
        UpdateTracker {
            update_last: flags[0],
            update_golden: flags[1],
            update_alternate: flags[2],
            last_to_golden: flags[3],
            last_to_alternate: flags[4],
            golden_to_alternate: flags[5],
            alternate_to_golden: flags[6],
        }
    }
}

/// Decoder state a coded frame produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetHash {
    pub updates: UpdateTracker,
    pub state_hash: u64,
    pub continuation_hash: u64,
    /// Fingerprint of the decoded raster
    pub output_hash: u64,
    pub shown: bool,
}

impl TargetHash {
    pub fn new(
        updates: UpdateTracker,
        state_hash: u64,
        continuation_hash: u64,
        output_hash: u64,
        shown: bool,
    ) -> Self {
        TargetHash {
            updates,
            state_hash,
            continuation_hash,
            output_hash,
            shown,
        }
    }
}

impl fmt::Display for TargetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}#{:x}#{:x}#",
            self.state_hash, self.continuation_hash, self.output_hash
        )?;
        for flag in self.updates.flags() {
            f.write_str(if flag { "1" } else { "0" })?;
        }
        f.write_str(if self.shown { "1" } else { "0" })
    }
}

impl FromStr for TargetHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('#').collect();
        if parts.len() != 4 {
            return Err(Error::invalid_input(format!(
                "target hash '{}' has {} fields, expected 4",
                s,
                parts.len()
            )));
        }

        let bits = parts[3].as_bytes();
        if bits.len() != 8 || bits.iter().any(|&b| b != b'0' && b != b'1') {
            return Err(Error::invalid_input(format!(
                "target hash flags '{}' are not 8 binary digits",
                parts[3]
            )));
        }
        let mut flags = [false; 7];
        for (flag, &bit) in flags.iter_mut().zip(bits.iter()) {
            *flag = bit == b'1';
        }

        Ok(TargetHash {
            updates: UpdateTracker::from_flags(flags),
            state_hash: parse_hex(parts[0])?,
            continuation_hash: parse_hex(parts[1])?,
            output_hash: parse_hex(parts[2])?,
            shown: bits[7] == b'1',
        })
    }
}

/// Textual name of a frame: its source and target joined by `#`
pub fn frame_name(source: &SourceHash, target: &TargetHash) -> String {
    format!("{}#{}", source, target)
}

/// Parse a name produced by [`frame_name`]
pub fn parse_frame_name(name: &str) -> Result<(SourceHash, TargetHash)> {
    let split = name
        .match_indices('#')
        .nth(5)
        .map(|(index, _)| index)
        .ok_or_else(|| Error::invalid_input(format!("frame name '{}' is too short", name)))?;
    Ok((name[..split].parse()?, name[split + 1..].parse()?))
}

/// State of a live decoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecoderHash {
    state_hash: u64,
    continuation_hash: u64,
    last_hash: u64,
    golden_hash: u64,
    alt_hash: u64,
}

impl DecoderHash {
    pub fn new(
        state_hash: u64,
        continuation_hash: u64,
        last_hash: u64,
        golden_hash: u64,
        alt_hash: u64,
    ) -> Self {
        DecoderHash {
            state_hash,
            continuation_hash,
            last_hash,
            golden_hash,
            alt_hash,
        }
    }

    pub fn can_decode(&self, source: &SourceHash) -> bool {
        source.check(self)
    }

    /// Advance to the state a successfully decoded frame produced
    ///
    /// Slot copies read the slots as they were before this frame, then the
    /// refreshes store the frame's output.
    pub fn update(&mut self, target: &TargetHash) {
        let old = *self;
        let updates = &target.updates;

        self.state_hash = target.state_hash;
        self.continuation_hash = target.continuation_hash;

        if updates.last_to_golden {
            self.golden_hash = old.last_hash;
        }
        if updates.alternate_to_golden {
            self.golden_hash = old.alt_hash;
        }
        if updates.last_to_alternate {
            self.alt_hash = old.last_hash;
        }
        if updates.golden_to_alternate {
            self.alt_hash = old.golden_hash;
        }

        if updates.update_last {
            self.last_hash = target.output_hash;
        }
        if updates.update_golden {
            self.golden_hash = target.output_hash;
        }
        if updates.update_alternate {
            self.alt_hash = target.output_hash;
        }
    }

    pub fn state_hash(&self) -> u64 {
        self.state_hash
    }

    pub fn continuation_hash(&self) -> u64 {
        self.continuation_hash
    }

    pub fn last_hash(&self) -> u64 {
        self.last_hash
    }

    pub fn golden_hash(&self) -> u64 {
        self.golden_hash
    }

    pub fn alt_hash(&self) -> u64 {
        self.alt_hash
    }

    pub fn reference_hash(&self, reference: ReferenceFrame) -> u64 {
        match reference {
            ReferenceFrame::Last => self.last_hash,
            ReferenceFrame::Golden => self.golden_hash,
            ReferenceFrame::Alternate => self.alt_hash,
        }
    }

    /// The five fields, state first
    pub fn fields(&self) -> [u64; 5] {
        [
            self.state_hash,
            self.continuation_hash,
            self.last_hash,
            self.golden_hash,
            self.alt_hash,
        ]
    }
}

impl fmt::Display for DecoderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}#{:x}#{:x}#{:x}#{:x}",
            self.state_hash, self.continuation_hash, self.last_hash, self.golden_hash, self.alt_hash
        )
    }
}

/// What parts of the decoder state a frame actually read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyTracker {
    pub need_state: bool,
    pub need_continuation: bool,
    pub need_last: bool,
    pub need_golden: bool,
    pub need_alternate: bool,
}

impl DependencyTracker {
    pub fn reference_mut(&mut self, reference: ReferenceFrame) -> &mut bool {
        match reference {
            ReferenceFrame::Last => &mut self.need_last,
            ReferenceFrame::Golden => &mut self.need_golden,
            ReferenceFrame::Alternate => &mut self.need_alternate,
        }
    }
}
