//! Half-precision and bfloat16 conversions.
//!
//! The binary16 routines round the mantissa to nearest-even and flush values
//! below the smallest normal half to signed zero. Overflow saturates to
//! infinity and NaN stays NaN (quiet bit set). Half subnormals are widened
//! exactly.
//!
//! bfloat16 is the upper half of the binary32 pattern (truncation).
//!
//! # Usage
//!
//! ```rust
//! use mat_core::fp16::{float16_to_float32, float32_to_float16};
//!
//! let h = float32_to_float16(1.5);
//! assert_eq!(h, 0x3E00);
//! assert_eq!(float16_to_float32(h), 1.5);
//! ```
//!
//! # Used By
//!
//! - [`crate::scalar::Element`] for `half::f16` arithmetic
//! - Callers packing video/tensor data by hand

const F16_SIGN: u16 = 0x8000;
const F16_EXP_MASK: u16 = 0x1F;
const F16_MANT_MASK: u16 = 0x03FF;

/// Converts a binary32 value to a binary16 bit pattern.
pub fn float32_to_float16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 31) as u16) << 15;
    let exponent = ((bits >> 23) & 0xFF) as i32;
    let significand = bits & 0x007F_FFFF;

    if exponent == 0 {
        // zero or binary32 subnormal, far below half range
        return sign;
    }
    if exponent == 0xFF {
        let nan = if significand != 0 { 0x0200 } else { 0 };
        return sign | (F16_EXP_MASK << 10) | nan;
    }

    let mut new_exp = exponent - 127 + 15;
    if new_exp >= 31 {
        return sign | (F16_EXP_MASK << 10);
    }
    if new_exp <= 0 {
        return sign;
    }

    let mut mantissa = (significand >> 13) as u16;
    let rest = significand & 0x1FFF;
    if rest > 0x1000 || (rest == 0x1000 && mantissa & 1 == 1) {
        mantissa += 1;
        if mantissa > F16_MANT_MASK {
            mantissa = 0;
            new_exp += 1;
            if new_exp >= 31 {
                return sign | (F16_EXP_MASK << 10);
            }
        }
    }

    sign | ((new_exp as u16) << 10) | mantissa
}

/// Converts a binary16 bit pattern to a binary32 value.
pub fn float16_to_float32(value: u16) -> f32 {
    let sign = ((value & F16_SIGN) as u32) << 16;
    let exponent = ((value >> 10) & F16_EXP_MASK) as u32;
    let mut significand = (value & F16_MANT_MASK) as u32;

    let bits = if exponent == 0 {
        if significand == 0 {
            sign
        } else {
            // normalise the subnormal
            let mut shift = 0u32;
            while significand & 0x0200 == 0 {
                significand <<= 1;
                shift += 1;
            }
            significand = (significand << 1) & 0x03FF;
            sign | ((127 - 15 - shift) << 23) | (significand << 13)
        }
    } else if exponent == 0x1F {
        sign | 0x7F80_0000 | (significand << 13)
    } else {
        sign | ((exponent + 127 - 15) << 23) | (significand << 13)
    };

    f32::from_bits(bits)
}

/// Converts a binary32 value to bfloat16 by truncation.
pub fn float32_to_bfloat16(value: f32) -> u16 {
    (value.to_bits() >> 16) as u16
}

/// Widens a bfloat16 bit pattern to binary32.
pub fn bfloat16_to_float32(value: u16) -> f32 {
    f32::from_bits((value as u32) << 16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_patterns() {
        assert_eq!(float32_to_float16(0.0), 0x0000);
        assert_eq!(float32_to_float16(-0.0), 0x8000);
        assert_eq!(float32_to_float16(1.0), 0x3C00);
        assert_eq!(float32_to_float16(-2.0), 0xC000);
        assert_eq!(float32_to_float16(65504.0), 0x7BFF);
        assert_eq!(float32_to_float16(f32::INFINITY), 0x7C00);
        assert_eq!(float32_to_float16(f32::NEG_INFINITY), 0xFC00);
    }

    #[test]
    fn test_overflow_and_underflow() {
        assert_eq!(float32_to_float16(1.0e6), 0x7C00);
        assert_eq!(float32_to_float16(-1.0e6), 0xFC00);
        assert_eq!(float32_to_float16(1.0e-10), 0x0000);
        assert_eq!(float32_to_float16(-1.0e-10), 0x8000);
        // rounding up past the largest finite half
        assert_eq!(float32_to_float16(65520.0), 0x7C00);
    }

    #[test]
    fn test_half_subnormal_range_flushes() {
        // between the smallest half subnormal (2^-24) and smallest normal (2^-14)
        for v in [1.0e-7f32, 1.0e-6, 3.0e-5, 6.0e-5] {
            assert_eq!(float32_to_float16(v), 0x0000, "{v}");
            assert_eq!(float32_to_float16(-v), 0x8000, "{v}");
        }
        assert_eq!(float32_to_float16(2.0f32.powi(-14)), 0x0400);
        assert_eq!(float16_to_float32(0x0400), 2.0f32.powi(-14));
    }

    #[test]
    fn test_nan_stays_nan() {
        let h = float32_to_float16(f32::NAN);
        assert_eq!(h & 0x7C00, 0x7C00);
        assert_ne!(h & 0x03FF, 0);
        assert!(float16_to_float32(h).is_nan());
    }

    #[test]
    fn test_round_to_nearest() {
        // 1 + 2^-11 is halfway between 1.0 and the next half; ties to even
        assert_eq!(float32_to_float16(1.0 + 2f32.powi(-11)), 0x3C00);
        // 1 + 3 * 2^-11 is halfway between odd and even mantissas
        assert_eq!(float32_to_float16(1.0 + 3.0 * 2f32.powi(-11)), 0x3C02);
        assert_eq!(float32_to_float16(1.0 + 2f32.powi(-11) + 2f32.powi(-16)), 0x3C01);
    }

    #[test]
    fn test_subnormal_widening() {
        assert_eq!(float16_to_float32(0x0001), 2f32.powi(-24));
        assert_eq!(float16_to_float32(0x0200), 2f32.powi(-15));
        assert_eq!(float16_to_float32(0x83FF), -(1023.0 * 2f32.powi(-24)));
    }

    #[test]
    fn test_roundtrip_normals() {
        for bits in (0x0400u16..0x7C00).step_by(7) {
            assert_eq!(float32_to_float16(float16_to_float32(bits)), bits);
            let neg = bits | 0x8000;
            assert_eq!(float32_to_float16(float16_to_float32(neg)), neg);
        }
    }

    #[test]
    fn test_matches_half_crate() {
        for v in [0.5f32, 3.140625, -1234.0, 0.000_061_035_156, 6.0e4] {
            let ours = float32_to_float16(v);
            assert_eq!(ours, half::f16::from_f32(v).to_bits());
        }
    }

    #[test]
    fn test_bfloat16() {
        assert_eq!(float32_to_bfloat16(1.0), 0x3F80);
        assert_eq!(bfloat16_to_float32(0x3F80), 1.0);
        assert_eq!(float32_to_bfloat16(-2.0), 0xC000);
        // truncation drops the low mantissa bits
        let v = f32::from_bits(0x3F80_FFFF);
        assert_eq!(float32_to_bfloat16(v), 0x3F80);
    }
}
