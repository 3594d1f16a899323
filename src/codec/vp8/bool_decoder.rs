//! Boolean arithmetic decoder for VP8
//!
//! Every symbol after the uncompressed frame tag goes through this decoder.
//! The reconstruction code only talks to the [`EntropyDecoder`] trait, so
//! header and macroblock parsing can be driven by any bit source.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Reading interface the frame parser needs from an entropy decoder
pub trait EntropyDecoder {
    /// Read one bool whose probability of being zero is `prob / 256`
    fn read_bool(&mut self, prob: u8) -> bool;

    /// Read an evenly distributed flag
    #[inline]
    fn read_flag(&mut self) -> bool {
        self.read_bool(128)
    }

    /// Read an unsigned `bits`-wide literal, most significant bit first
    #[inline]
    fn read_literal(&mut self, bits: u8) -> u32 {
        let mut value = 0u32;
        for _ in 0..bits {
            value = (value << 1) | self.read_flag() as u32;
        }
        value
    }

    /// Read a magnitude followed by a sign flag
    #[inline]
    fn read_signed(&mut self, bits: u8) -> i32 {
        let value = self.read_literal(bits) as i32;
        if self.read_flag() {
            -value
        } else {
            value
        }
    }

    /// Read a presence flag and, when set, a signed value
    #[inline]
    fn read_optional_signed(&mut self, bits: u8) -> Option<i32> {
        if self.read_flag() {
            Some(self.read_signed(bits))
        } else {
            None
        }
    }

    /// Read a presence flag and, when set, an unsigned literal
    #[inline]
    fn read_optional_literal(&mut self, bits: u8) -> Option<u32> {
        if self.read_flag() {
            Some(self.read_literal(bits))
        } else {
            None
        }
    }

    /// Walk a coding tree from the root
    #[inline]
    fn read_tree(&mut self, tree: &[i8], probs: &[u8]) -> usize {
        self.read_tree_from(tree, probs, 0)
    }

    /// Walk a coding tree starting at node `start`
    fn read_tree_from(&mut self, tree: &[i8], probs: &[u8], start: usize) -> usize {
        let mut node = start;
        loop {
            let bit = self.read_bool(probs[node >> 1]) as usize;
            let next = tree[node + bit];
            if next <= 0 {
                return (-next) as usize;
            }
            node = next as usize;
        }
    }
}

/// Boolean arithmetic decoder state
#[derive(Clone)]
pub struct BoolDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    value: u32,
    range: u32,
    bit_count: u32,
}

impl<'a> BoolDecoder<'a> {
    /// Initialize decoder from data buffer
    pub fn new(data: &'a [u8]) -> Self {
        let value = ((data.first().copied().unwrap_or(0) as u32) << 8)
            | data.get(1).copied().unwrap_or(0) as u32;

        BoolDecoder {
            data,
            pos: 2,
            value,
            range: 255,
            bit_count: 0,
        }
    }

    /// Check if all input bytes have been loaded
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get current position in bytes
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl EntropyDecoder for BoolDecoder<'_> {
    #[inline]
    fn read_bool(&mut self, prob: u8) -> bool {
        let split = 1 + (((self.range - 1) * prob as u32) >> 8);
        let split_shifted = split << 8;

        let bit = if self.value >= split_shifted {
            self.range -= split;
            self.value -= split_shifted;
            true
        } else {
            self.range = split;
            false
        };

        // Bytes past the end of the partition read as zero
        while self.range < 128 {
            self.value <<= 1;
            self.range <<= 1;
            self.bit_count += 1;

            if self.bit_count == 8 {
                self.bit_count = 0;
                if let Some(&byte) = self.data.get(self.pos) {
                    self.value |= byte as u32;
                }
                self.pos += 1;
            }
        }

        bit
    }
}

/// Token partitions of one frame
///
/// The first partition holds the frame header and per-macroblock modes, the
/// remaining ones hold residual tokens, one partition per macroblock row
/// modulo the partition count.
#[derive(Debug, Clone)]
pub struct Partitions<'a> {
    pub first: &'a [u8],
    pub tokens: Vec<&'a [u8]>,
}

impl<'a> Partitions<'a> {
    /// Split the compressed part of a frame
    ///
    /// `data` starts at the first partition; `count` is the number of token
    /// partitions announced in the frame header.
    pub fn split(data: &'a [u8], first_partition_size: usize, count: usize) -> Result<Self> {
        if first_partition_size > data.len() {
            return Err(Error::bitstream(format!(
                "first partition needs {} bytes, frame has {}",
                first_partition_size,
                data.len()
            )));
        }
        let (first, rest) = data.split_at(first_partition_size);

        let table_len = 3 * (count - 1);
        if rest.len() < table_len {
            return Err(Error::bitstream("truncated token partition size table"));
        }
        let (table, mut body) = rest.split_at(table_len);

        let mut tokens = Vec::with_capacity(count);
        for index in 0..count {
            let size = if index + 1 < count {
                LittleEndian::read_u24(&table[index * 3..index * 3 + 3]) as usize
            } else {
                body.len()
            };
            if size > body.len() {
                return Err(Error::bitstream(format!(
                    "token partition {} needs {} bytes, {} left",
                    index,
                    size,
                    body.len()
                )));
            }
            let (partition, remaining) = body.split_at(size);
            tokens.push(partition);
            body = remaining;
        }

        Ok(Partitions { first, tokens })
    }

    /// Token decoders, one per partition
    pub fn token_decoders(&self) -> Vec<BoolDecoder<'a>> {
        self.tokens.iter().map(|data| BoolDecoder::new(data)).collect()
    }
}
