//! Boolean arithmetic encoder for VP8
//!
//! Mirror image of [`BoolDecoder`](super::bool_decoder::BoolDecoder). The
//! decoder pipeline never needs it; it is used to synthesize bitstreams for
//! tests, benches and tools that rewrite frame headers.

/// Boolean arithmetic encoder state
#[derive(Debug, Clone)]
pub struct BoolEncoder {
    output: Vec<u8>,
    range: u32,
    bottom: u32,
    bit_count: i32,
}

impl Default for BoolEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BoolEncoder {
    pub fn new() -> Self {
        BoolEncoder {
            output: Vec::new(),
            range: 255,
            bottom: 0,
            bit_count: 24,
        }
    }

    fn add_one_to_output(&mut self) {
        for byte in self.output.iter_mut().rev() {
            if *byte == 255 {
                *byte = 0;
            } else {
                *byte += 1;
                return;
            }
        }
    }

    /// Encode one bool whose probability of being zero is `prob / 256`
    pub fn write_bool(&mut self, bit: bool, prob: u8) {
        let split = 1 + (((self.range - 1) * prob as u32) >> 8);

        if bit {
            self.bottom = self.bottom.wrapping_add(split);
            self.range -= split;
        } else {
            self.range = split;
        }

        while self.range < 128 {
            self.range <<= 1;

            if self.bottom & (1 << 31) != 0 {
                self.add_one_to_output();
            }

            self.bottom <<= 1;
            self.bit_count -= 1;

            if self.bit_count == 0 {
                self.output.push((self.bottom >> 24) as u8);
                self.bottom &= (1 << 24) - 1;
                self.bit_count = 8;
            }
        }
    }

    pub fn write_flag(&mut self, bit: bool) {
        self.write_bool(bit, 128);
    }

    /// Encode an unsigned literal, most significant bit first
    pub fn write_literal(&mut self, bits: u8, value: u32) {
        for shift in (0..bits).rev() {
            self.write_flag((value >> shift) & 1 != 0);
        }
    }

    /// Encode a magnitude and sign flag
    pub fn write_signed(&mut self, bits: u8, value: i32) {
        self.write_literal(bits, value.unsigned_abs());
        self.write_flag(value < 0);
    }

    pub fn write_optional_signed(&mut self, bits: u8, value: Option<i32>) {
        self.write_flag(value.is_some());
        if let Some(value) = value {
            self.write_signed(bits, value);
        }
    }

    pub fn write_optional_literal(&mut self, bits: u8, value: Option<u32>) {
        self.write_flag(value.is_some());
        if let Some(value) = value {
            self.write_literal(bits, value);
        }
    }

    /// Encode `symbol` with a coding tree starting at the root
    pub fn write_tree(&mut self, tree: &[i8], probs: &[u8], symbol: usize) {
        self.write_tree_from(tree, probs, symbol, 0);
    }

    /// Encode `symbol` with a coding tree starting at node `start`
    ///
    /// Symbols that are not reachable from `start` are not written.
    pub fn write_tree_from(&mut self, tree: &[i8], probs: &[u8], symbol: usize, start: usize) {
        let mut path = Vec::new();
        if tree_path(tree, start, symbol as i8, &mut path) {
            for (node, bit) in path {
                self.write_bool(bit, probs[node >> 1]);
            }
        }
    }

    /// Flush pending bits and return the encoded bytes
    pub fn finish(mut self) -> Vec<u8> {
        let mut c = self.bit_count;
        let mut v = self.bottom;

        if v & (1 << (32 - c)) != 0 {
            self.add_one_to_output();
        }

        v <<= c & 7;
        c >>= 3;
        while c > 0 {
            v <<= 8;
            c -= 1;
        }

        for _ in 0..4 {
            self.output.push((v >> 24) as u8);
            v <<= 8;
        }

        self.output
    }
}

fn tree_path(tree: &[i8], node: usize, symbol: i8, path: &mut Vec<(usize, bool)>) -> bool {
    for bit in [false, true] {
        let next = tree[node + bit as usize];
        path.push((node, bit));
        if next <= 0 {
            if -next == symbol {
                return true;
            }
        } else if tree_path(tree, next as usize, symbol, path) {
            return true;
        }
        path.pop();
    }
    false
}
