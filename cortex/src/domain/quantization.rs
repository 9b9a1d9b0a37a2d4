// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Stored-vector compression.
//!
//! Quantization is decided once per index. Every insert is checked against
//! the index's tolerance: a vector whose largest per-component round-trip
//! error exceeds it is rejected rather than silently degraded.

use aegis_core::domain::node_config::QuantizationKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EncodedVector {
    Full(Vec<f32>),
    Half(Vec<u16>),
    Int8 { scale: f32, codes: Vec<i8> },
}

impl EncodedVector {
    pub fn encode(kind: QuantizationKind, vector: &[f32]) -> Self {
        match kind {
            QuantizationKind::None => EncodedVector::Full(vector.to_vec()),
            QuantizationKind::Float16 => {
                EncodedVector::Half(vector.iter().map(|v| f32_to_f16(*v)).collect())
            }
            QuantizationKind::Int8 => {
                let max_abs = vector.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
                if max_abs == 0.0 {
                    return EncodedVector::Int8 {
                        scale: 0.0,
                        codes: vec![0; vector.len()],
                    };
                }
                let scale = max_abs / 127.0;
                let codes = vector
                    .iter()
                    .map(|v| (v / scale).round().clamp(-127.0, 127.0) as i8)
                    .collect();
                EncodedVector::Int8 { scale, codes }
            }
        }
    }

    pub fn decode(&self) -> Vec<f32> {
        match self {
            EncodedVector::Full(v) => v.clone(),
            EncodedVector::Half(bits) => bits.iter().map(|b| f16_to_f32(*b)).collect(),
            EncodedVector::Int8 { scale, codes } => {
                codes.iter().map(|c| f32::from(*c) * scale).collect()
            }
        }
    }

    /// Run `f` over the decoded components, borrowing when no decode is needed.
    pub fn with_decoded<R>(&self, f: impl FnOnce(&[f32]) -> R) -> R {
        match self {
            EncodedVector::Full(v) => f(v),
            other => f(&other.decode()),
        }
    }

    /// Largest absolute difference between `original` and its decoded form.
    pub fn max_error(&self, original: &[f32]) -> f32 {
        self.with_decoded(|decoded| {
            decoded
                .iter()
                .zip(original)
                .fold(0.0f32, |acc, (d, o)| acc.max((d - o).abs()))
        })
    }
}

/// IEEE-754 binary32 to binary16, round to nearest even.
pub fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mant = bits & 0x007f_ffff;

    if exp == 0xff {
        let nan = if mant != 0 { 0x0200 } else { 0 };
        return sign | 0x7c00 | nan;
    }

    let half_exp = exp - 127 + 15;
    if half_exp >= 0x1f {
        return sign | 0x7c00;
    }

    if half_exp <= 0 {
        if half_exp < -10 {
            return sign;
        }
        let full = mant | 0x0080_0000;
        let shift = (14 - half_exp) as u32;
        let mut half_mant = full >> shift;
        let halfway = 1u32 << (shift - 1);
        let remainder = full & ((1u32 << shift) - 1);
        if remainder > halfway || (remainder == halfway && half_mant & 1 == 1) {
            half_mant += 1;
        }
        return sign | half_mant as u16;
    }

    let mut half = ((half_exp as u32) << 10) | (mant >> 13);
    let remainder = mant & 0x1fff;
    if remainder > 0x1000 || (remainder == 0x1000 && half & 1 == 1) {
        // may carry into the exponent, which is the correct rounding
        half += 1;
    }
    sign | half as u16
}

pub fn f16_to_f32(half: u16) -> f32 {
    let sign = u32::from(half & 0x8000) << 16;
    let exp = u32::from((half >> 10) & 0x1f);
    let mant = u32::from(half & 0x03ff);

    match exp {
        0 if mant == 0 => f32::from_bits(sign),
        0 => {
            let magnitude = mant as f32 * 2f32.powi(-24);
            if sign != 0 {
                -magnitude
            } else {
                magnitude
            }
        }
        0x1f => f32::from_bits(sign | 0x7f80_0000 | (mant << 13)),
        _ => f32::from_bits(sign | ((exp + 127 - 15) << 23) | (mant << 13)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f16_exact_values() {
        for v in [0.0f32, 1.0, -1.0, 0.5, 2.0, 65504.0, -0.25] {
            assert_eq!(f16_to_f32(f32_to_f16(v)), v, "value {v}");
        }
        assert_eq!(f32_to_f16(1.0), 0x3c00);
        assert_eq!(f32_to_f16(f32::INFINITY), 0x7c00);
        assert_eq!(f32_to_f16(1.0e6), 0x7c00);
    }

    #[test]
    fn test_f16_subnormal() {
        let tiny = 2f32.powi(-24);
        assert_eq!(f32_to_f16(tiny), 0x0001);
        assert_eq!(f16_to_f32(0x0001), tiny);
        assert_eq!(f32_to_f16(2f32.powi(-30)), 0);
    }

    #[test]
    fn test_float16_error_within_tolerance_for_unit_range() {
        let v: Vec<f32> = (0..64).map(|i| (i as f32 / 32.0) - 1.0 + 0.0123).collect();
        let encoded = EncodedVector::encode(QuantizationKind::Float16, &v);
        assert!(encoded.max_error(&v) < 0.001);
    }

    #[test]
    fn test_int8_error_bounded_by_half_step() {
        let v = vec![0.9, -0.44, 0.1, 0.0, -0.9];
        let encoded = EncodedVector::encode(QuantizationKind::Int8, &v);
        assert!(encoded.max_error(&v) <= 0.9 / 254.0 + 1e-5);
    }

    #[test]
    fn test_int8_large_range_exceeds_small_tolerance() {
        let v = vec![1000.0, 0.3];
        let encoded = EncodedVector::encode(QuantizationKind::Int8, &v);
        assert!(encoded.max_error(&v) > 0.01);
    }

    #[test]
    fn test_int8_zero_vector() {
        let encoded = EncodedVector::encode(QuantizationKind::Int8, &[0.0, 0.0]);
        assert_eq!(encoded.decode(), vec![0.0, 0.0]);
    }
}
