//! VP8 inverse transforms (DCT and WHT)

/// Constants for inverse DCT
const C1: i32 = 20091; // cos(pi/8) * sqrt(2) - 1, Q16
const C2: i32 = 35468; // sin(pi/8) * sqrt(2), Q16

/// 4x4 inverse DCT
///
/// Takes dequantized coefficients in raster order and returns the residual.
/// Intermediate rows are kept as 16-bit values, wrapping like the reference
/// decoder, so arbitrary coefficients never overflow the multiplications.
#[inline]
pub fn inverse_dct4x4(input: &[i16; 16], output: &mut [i16; 16]) {
    let mut temp = [0i16; 16];

    // Columns
    for j in 0..4 {
        let a = input[j] as i32;
        let b = input[4 + j] as i32;
        let c = input[8 + j] as i32;
        let d = input[12 + j] as i32;

        let a1 = a + c;
        let b1 = a - c;
        let c1 = ((b * C2) >> 16) - (d + ((d * C1) >> 16));
        let d1 = (b + ((b * C1) >> 16)) + ((d * C2) >> 16);

        temp[j] = (a1 + d1) as i16;
        temp[4 + j] = (b1 + c1) as i16;
        temp[8 + j] = (b1 - c1) as i16;
        temp[12 + j] = (a1 - d1) as i16;
    }

    // Rows
    for i in 0..4 {
        let row = i * 4;
        let a = temp[row] as i32;
        let b = temp[row + 1] as i32;
        let c = temp[row + 2] as i32;
        let d = temp[row + 3] as i32;

        let a1 = a + c;
        let b1 = a - c;
        let c1 = ((b * C2) >> 16) - (d + ((d * C1) >> 16));
        let d1 = (b + ((b * C1) >> 16)) + ((d * C2) >> 16);

        output[row] = ((a1 + d1 + 4) >> 3) as i16;
        output[row + 1] = ((b1 + c1 + 4) >> 3) as i16;
        output[row + 2] = ((b1 - c1 + 4) >> 3) as i16;
        output[row + 3] = ((a1 - d1 + 4) >> 3) as i16;
    }
}

/// Inverse DCT of a block whose only non-zero coefficient is the DC
#[inline]
pub fn inverse_dct4x4_dc_only(dc: i16, output: &mut [i16; 16]) {
    let val = ((dc as i32 + 4) >> 3) as i16;
    output.fill(val);
}

/// 4x4 inverse Walsh-Hadamard transform
///
/// Turns the Y2 block into the DC coefficients of the 16 luma blocks,
/// output index `i` belonging to luma block `i` in raster order.
#[inline]
pub fn inverse_wht4x4(input: &[i16; 16], output: &mut [i16; 16]) {
    let mut temp = [0i32; 16];

    // Columns
    for j in 0..4 {
        let a1 = input[j] as i32 + input[12 + j] as i32;
        let b1 = input[4 + j] as i32 + input[8 + j] as i32;
        let c1 = input[4 + j] as i32 - input[8 + j] as i32;
        let d1 = input[j] as i32 - input[12 + j] as i32;

        temp[j] = a1 + b1;
        temp[4 + j] = c1 + d1;
        temp[8 + j] = a1 - b1;
        temp[12 + j] = d1 - c1;
    }

    // Rows
    for i in 0..4 {
        let row = i * 4;
        let a1 = temp[row] + temp[row + 3];
        let b1 = temp[row + 1] + temp[row + 2];
        let c1 = temp[row + 1] - temp[row + 2];
        let d1 = temp[row] - temp[row + 3];

        output[row] = ((a1 + b1 + 3) >> 3) as i16;
        output[row + 1] = ((c1 + d1 + 3) >> 3) as i16;
        output[row + 2] = ((a1 - b1 + 3) >> 3) as i16;
        output[row + 3] = ((d1 - c1 + 3) >> 3) as i16;
    }
}

/// Add a residual to a 4x4 block of predicted pixels
#[inline]
pub fn add_residual(residual: &[i16; 16], pixels: &mut [u8], offset: usize, stride: usize) {
    for y in 0..4 {
        let row = offset + y * stride;
        for x in 0..4 {
            let value = pixels[row + x] as i32 + residual[y * 4 + x] as i32;
            pixels[row + x] = value.clamp(0, 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idct_dc_only_matches_full() {
        for dc in [-2048i16, -100, -5, 0, 3, 60, 1024] {
            let mut input = [0i16; 16];
            input[0] = dc;
            let mut full = [0i16; 16];
            let mut fast = [0i16; 16];
            inverse_dct4x4(&input, &mut full);
            inverse_dct4x4_dc_only(dc, &mut fast);
            assert_eq!(full, fast, "dc {}", dc);
        }
    }

    #[test]
    fn test_idct_zero() {
        let mut output = [1i16; 16];
        inverse_dct4x4(&[0; 16], &mut output);
        assert_eq!(output, [0; 16]);
    }

    #[test]
    fn test_iwht_dc_spreads_evenly() {
        let mut input = [0i16; 16];
        input[0] = 80;
        let mut output = [0i16; 16];
        inverse_wht4x4(&input, &mut output);
        assert_eq!(output, [10; 16]);
    }

    #[test]
    fn test_iwht_first_ac() {
        // A horizontal AC term splits the columns into two signs
        let mut input = [0i16; 16];
        input[1] = 16;
        let mut output = [0i16; 16];
        inverse_wht4x4(&input, &mut output);
        for row in 0..4 {
            assert_eq!(output[row * 4], 2);
            assert_eq!(output[row * 4 + 1], 2);
            assert_eq!(output[row * 4 + 2], -2);
            assert_eq!(output[row * 4 + 3], -2);
        }
    }

    #[test]
    fn test_idct_extreme_coefficients_do_not_overflow() {
        let mut mixed = [i16::MAX; 16];
        for (i, c) in mixed.iter_mut().enumerate() {
            if i % 3 == 0 {
                *c = i16::MIN;
            }
        }
        let mut output = [0i16; 16];
        for input in [[i16::MAX; 16], [i16::MIN; 16], mixed] {
            inverse_dct4x4(&input, &mut output);
            inverse_dct4x4_dc_only(input[0], &mut output);
        }
    }

    #[test]
    fn test_iwht_extreme_coefficients_do_not_overflow() {
        let mut alternating = [i16::MIN; 16];
        for c in alternating.iter_mut().step_by(2) {
            *c = i16::MAX;
        }
        let mut output = [0i16; 16];
        for input in [[i16::MAX; 16], [i16::MIN; 16], alternating] {
            inverse_wht4x4(&input, &mut output);
        }
        inverse_wht4x4(&[i16::MAX; 16], &mut output);
        assert_eq!(output[0], (((i16::MAX as i32) * 16 + 3) >> 3) as i16);
    }

    #[test]
    fn test_add_residual_clamps() {
        let mut pixels = vec![250u8; 4 * 8];
        let mut residual = [10i16; 16];
        residual[5] = -300;
        add_residual(&residual, &mut pixels, 2, 8);
        assert_eq!(pixels[2], 255);
        assert_eq!(pixels[8 + 3], 0);
        assert_eq!(pixels[0], 250);
    }
}
