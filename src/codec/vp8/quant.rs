//! VP8 dequantization
//!
//! A [`Quantizer`] holds the six step sizes of one segment (or of the whole
//! frame when segmentation is off), derived from the header's
//! [`QuantIndices`].

use serde::{Deserialize, Serialize};

use super::header::Segmentation;

/// DC quantizer step by clamped index
const DC_QUANT: [i16; 128] = [
    4, 5, 6, 7, 8, 9, 10, 10, 11, 12, 13, 14, 15, 16, 17, 17, 18, 19, 20, 20, 21, 21, 22, 22, 23,
    23, 24, 25, 25, 26, 27, 28, 29, 30, 31, 32, 33, 34, 35, 36, 37, 37, 38, 39, 40, 41, 42, 43, 44,
    45, 46, 46, 47, 48, 49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, 64, 65, 66, 67,
    68, 69, 70, 71, 72, 73, 74, 75, 76, 76, 77, 78, 79, 80, 81, 82, 83, 84, 85, 86, 87, 88, 89, 91,
    93, 95, 96, 98, 100, 101, 102, 104, 106, 108, 110, 112, 114, 116, 118, 122, 124, 126, 128, 130,
    132, 134, 136, 138, 140, 143, 145, 148, 151, 154, 157,
];

/// AC quantizer step by clamped index
const AC_QUANT: [i16; 128] = [
    4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    29, 30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52,
    53, 54, 55, 56, 57, 58, 60, 62, 64, 66, 68, 70, 72, 74, 76, 78, 80, 82, 84, 86, 88, 90, 92, 94,
    96, 98, 100, 102, 104, 106, 108, 110, 112, 114, 116, 119, 122, 125, 128, 131, 134, 137, 140,
    143, 146, 149, 152, 155, 158, 161, 164, 167, 170, 173, 177, 181, 185, 189, 193, 197, 201, 205,
    209, 213, 217, 221, 225, 229, 234, 239, 245, 249, 254, 259, 264, 269, 274, 279, 284,
];

/// Quantizer indices from the frame header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantIndices {
    pub y_ac_qi: u8,
    pub y_dc: Option<i8>,
    pub y2_dc: Option<i8>,
    pub y2_ac: Option<i8>,
    pub uv_dc: Option<i8>,
    pub uv_ac: Option<i8>,
}

#[inline]
fn lookup(table: &[i16; 128], base: i32, delta: Option<i8>) -> i16 {
    table[(base + delta.unwrap_or(0) as i32).clamp(0, 127) as usize]
}

/// Dequantization factors for one segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Quantizer {
    pub y_ac: i16,
    pub y_dc: i16,
    pub y2_ac: i16,
    pub y2_dc: i16,
    pub uv_ac: i16,
    pub uv_dc: i16,
}

impl Quantizer {
    pub fn new(indices: &QuantIndices) -> Self {
        Self::with_base(indices, indices.y_ac_qi as i32)
    }

    fn with_base(indices: &QuantIndices, q: i32) -> Self {
        let y2_ac = lookup(&AC_QUANT, q, indices.y2_ac) as i32 * 155 / 100;

        Quantizer {
            y_ac: lookup(&AC_QUANT, q, None),
            y_dc: lookup(&DC_QUANT, q, indices.y_dc),
            y2_ac: y2_ac.max(8) as i16,
            y2_dc: lookup(&DC_QUANT, q, indices.y2_dc) * 2,
            uv_ac: lookup(&AC_QUANT, q, indices.uv_ac),
            uv_dc: lookup(&DC_QUANT, q, indices.uv_dc).min(132),
        }
    }

    /// Quantizers for all four segments
    ///
    /// Segment values replace the frame's base index when segmentation is in
    /// absolute mode and are added to it otherwise. The segment index is
    /// clamped to the table range before the per-plane deltas apply.
    pub fn for_segments(indices: &QuantIndices, segmentation: &Segmentation) -> [Quantizer; 4] {
        let mut quantizers = [Quantizer::default(); 4];
        for (segment, quantizer) in quantizers.iter_mut().enumerate() {
            let adjustment = segmentation.quantizer_adjustments[segment] as i32;
            let base = if segmentation.absolute {
                adjustment
            } else {
                adjustment + indices.y_ac_qi as i32
            };
            *quantizer = Self::with_base(indices, base.clamp(0, 127));
        }
        quantizers
    }
}

/// Multiply a block's coefficients by its DC and AC step sizes
#[inline]
pub fn dequantize_block(coeffs: &[i16; 16], dc_quant: i16, ac_quant: i16) -> [i16; 16] {
    let mut output = [0i16; 16];
    output[0] = coeffs[0].wrapping_mul(dc_quant);
    for i in 1..16 {
        output[i] = coeffs[i].wrapping_mul(ac_quant);
    }
    output
}
