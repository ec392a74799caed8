//! Storage formats and the bit-rate table
//!
//! Format discriminants are part of the compressed data contract: changing a
//! value invalidates every clip compressed with the old table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Rotation / Vector Formats
// ============================================================================

/// How rotation samples are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum RotationFormat {
    /// Full precision quaternion, [x, y, z, w] as f32
    #[serde(rename = "Quat_128")]
    Quat128 = 0,
    /// Full precision quaternion, [x, y, z] as f32 (w dropped)
    #[serde(rename = "QuatDropW_96")]
    QuatDropW96 = 1,
    /// Quantized quaternion, [x, y, z] as [16, 16, 16] bits (w dropped)
    #[serde(rename = "QuatDropW_48")]
    QuatDropW48 = 2,
    /// Quantized quaternion, [x, y, z] as [11, 11, 10] bits (w dropped)
    #[serde(rename = "QuatDropW_32")]
    QuatDropW32 = 3,
    /// Quantized quaternion, [x, y, z] as [N, N, N] bits (w dropped)
    #[default]
    #[serde(rename = "QuatDropW_Variable")]
    QuatDropWVariable = 4,
}

/// How translation and scale samples are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum VectorFormat {
    /// Full precision, [x, y, z] as f32
    #[serde(rename = "Vector3_96")]
    Vector3_96 = 0,
    /// Quantized, [x, y, z] as [16, 16, 16] bits
    #[serde(rename = "Vector3_48")]
    Vector3_48 = 1,
    /// Quantized, [x, y, z] as [11, 11, 10] bits
    #[serde(rename = "Vector3_32")]
    Vector3_32 = 2,
    /// Quantized, [x, y, z] as [N, N, N] bits
    #[default]
    #[serde(rename = "Vector3_Variable")]
    Vector3Variable = 3,
}

/// Rotation representation family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationVariant {
    Quat,
    QuatDropW,
}

impl RotationFormat {
    pub const ALL: [RotationFormat; 5] = [
        RotationFormat::Quat128,
        RotationFormat::QuatDropW96,
        RotationFormat::QuatDropW48,
        RotationFormat::QuatDropW32,
        RotationFormat::QuatDropWVariable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RotationFormat::Quat128 => "Quat_128",
            RotationFormat::QuatDropW96 => "QuatDropW_96",
            RotationFormat::QuatDropW48 => "QuatDropW_48",
            RotationFormat::QuatDropW32 => "QuatDropW_32",
            RotationFormat::QuatDropWVariable => "QuatDropW_Variable",
        }
    }

    pub fn variant(self) -> RotationVariant {
        match self {
            RotationFormat::Quat128 => RotationVariant::Quat,
            _ => RotationVariant::QuatDropW,
        }
    }

    pub fn is_variable(self) -> bool {
        self == RotationFormat::QuatDropWVariable
    }

    /// Full precision formats are never range reduced
    pub fn is_full_precision(self) -> bool {
        matches!(self, RotationFormat::Quat128 | RotationFormat::QuatDropW96)
    }

    /// Format used to store a constant track's single sample
    pub fn constant_format(self) -> RotationFormat {
        self.variant().highest_precision()
    }
}

impl RotationVariant {
    pub fn lowest_precision(self) -> RotationFormat {
        match self {
            RotationVariant::Quat => RotationFormat::Quat128,
            RotationVariant::QuatDropW => RotationFormat::QuatDropW32,
        }
    }

    pub fn highest_precision(self) -> RotationFormat {
        match self {
            RotationVariant::Quat => RotationFormat::Quat128,
            RotationVariant::QuatDropW => RotationFormat::QuatDropW96,
        }
    }
}

impl VectorFormat {
    pub const ALL: [VectorFormat; 4] = [
        VectorFormat::Vector3_96,
        VectorFormat::Vector3_48,
        VectorFormat::Vector3_32,
        VectorFormat::Vector3Variable,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VectorFormat::Vector3_96 => "Vector3_96",
            VectorFormat::Vector3_48 => "Vector3_48",
            VectorFormat::Vector3_32 => "Vector3_32",
            VectorFormat::Vector3Variable => "Vector3_Variable",
        }
    }

    pub fn is_variable(self) -> bool {
        self == VectorFormat::Vector3Variable
    }

    pub fn is_full_precision(self) -> bool {
        self == VectorFormat::Vector3_96
    }
}

impl fmt::Display for RotationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for VectorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RotationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RotationFormat::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| format!("unknown rotation format '{}'", s))
    }
}

impl FromStr for VectorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VectorFormat::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| format!("unknown vector format '{}'", s))
    }
}

/// Format tag carried by a single packed track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackFormat {
    Rotation(RotationFormat),
    Vector(VectorFormat),
}

// ============================================================================
// Track Kinds
// ============================================================================

/// The three channels animated per bone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Rotation,
    Translation,
    Scale,
}

impl TrackKind {
    pub const ALL: [TrackKind; 3] = [TrackKind::Rotation, TrackKind::Translation, TrackKind::Scale];

    pub fn name(self) -> &'static str {
        match self {
            TrackKind::Rotation => "rotation",
            TrackKind::Translation => "translation",
            TrackKind::Scale => "scale",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Bit Rates
// ============================================================================

/// Bits per component for each bit-rate.
///
/// Rate 0 is the constant pseudo-rate (one 16-bit sample per segment), rates
/// 1..=17 are 3..=19 bits, and the last rate is raw f32 storage.
pub const BIT_RATE_NUM_BITS: [u8; 19] = [
    0, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 32,
];

/// Number of entries in the bit-rate table
pub const NUM_BIT_RATES: u8 = BIT_RATE_NUM_BITS.len() as u8;

/// Sentinel for tracks stored in a fixed (non-variable) format
pub const INVALID_BIT_RATE: u8 = 0xFF;

/// Lowest quantized bit-rate (3 bits per component)
pub const LOWEST_BIT_RATE: u8 = 1;

/// Raw f32 passthrough
pub const HIGHEST_BIT_RATE: u8 = NUM_BIT_RATES - 1;

/// Constant pseudo-rate
pub const CONSTANT_BIT_RATE: u8 = 0;

/// Bits per component at `bit_rate`
#[inline]
pub fn num_bits_at_bit_rate(bit_rate: u8) -> u8 {
    assert!(
        bit_rate <= HIGHEST_BIT_RATE,
        "invalid bit rate: {}",
        bit_rate
    );
    BIT_RATE_NUM_BITS[bit_rate as usize]
}

#[inline]
pub const fn is_constant_bit_rate(bit_rate: u8) -> bool {
    bit_rate == CONSTANT_BIT_RATE
}

#[inline]
pub const fn is_raw_bit_rate(bit_rate: u8) -> bool {
    bit_rate == HIGHEST_BIT_RATE
}

/// Per-bone bit-rate assignment for one segment
///
/// Encoder and decoder must use the identical assignment; nothing in the
/// packed data detects a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoneBitRate {
    pub rotation: u8,
    pub translation: u8,
    pub scale: u8,
}

impl BoneBitRate {
    /// All three channels stored in fixed formats
    pub const INVALID: Self = Self {
        rotation: INVALID_BIT_RATE,
        translation: INVALID_BIT_RATE,
        scale: INVALID_BIT_RATE,
    };

    /// All three channels at raw precision
    pub const RAW: Self = Self {
        rotation: HIGHEST_BIT_RATE,
        translation: HIGHEST_BIT_RATE,
        scale: HIGHEST_BIT_RATE,
    };

    pub fn get(&self, kind: TrackKind) -> u8 {
        match kind {
            TrackKind::Rotation => self.rotation,
            TrackKind::Translation => self.translation,
            TrackKind::Scale => self.scale,
        }
    }

    pub fn set(&mut self, kind: TrackKind, bit_rate: u8) {
        match kind {
            TrackKind::Rotation => self.rotation = bit_rate,
            TrackKind::Translation => self.translation = bit_rate,
            TrackKind::Scale => self.scale = bit_rate,
        }
    }
}

impl Default for BoneBitRate {
    fn default() -> Self {
        Self::INVALID
    }
}
