//! Sample codec: per-format pack/unpack and two-stage range reconstruction
//!
//! # Sample layouts
//!
//! | Format | Bit-rate | Bits | Contents |
//! |--------|----------|------|----------|
//! | `Quat_128` | - | 128 | x, y, z, w as f32 |
//! | `QuatDropW_96`, `Vector3_96` | - | 96 | x, y, z as f32 |
//! | `QuatDropW_48`, `Vector3_48` | - | 48 | x, y, z as 16-bit |
//! | `QuatDropW_32`, `Vector3_32` | - | 32 | x, y, z as 11, 11, 10 bits |
//! | `*_Variable` | 0 (constant) | 48 | x, y, z as 16-bit, unsigned |
//! | `*_Variable` | 1..=17 | 3N | x, y, z as N bits |
//! | `*_Variable` | 18 (raw) | 96 | x, y, z as f32 |
//!
//! Quantized lanes are unsigned `[0, 1]` when the clip range normalized the
//! track and signed `[-1, 1]` otherwise.
//!
//! # Reconstruction
//!
//! ```text
//! value = unpack(bits)
//! if segment normalized and rate is neither constant nor raw:
//!     value = value * segment_extent + segment_min
//! if clip normalized and rate is not raw:
//!     value = value * clip_extent + clip_min
//! drop-W rotations: w = sqrt(max(0, 1 - x² - y² - z²))
//! ```

use glam::{Quat, Vec4};

use crate::format::{
    INVALID_BIT_RATE, RotationFormat, RotationVariant, TrackFormat, TrackKind, VectorFormat,
    is_constant_bit_rate, is_raw_bit_rate, num_bits_at_bit_rate,
};
use crate::math::quat_from_positive_w;
use crate::packing::{BitReader, BitWriter, dequantize_vector3, quantize_vector3};
use crate::range::{QvvRanges, denormalize_sample};

/// Bits per lane of the constant pseudo-rate sample
pub const CONSTANT_SAMPLE_BITS: u8 = 16;

/// Physical layout of one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Three f32 lanes
    Float3,
    /// Four f32 lanes
    Float4,
    /// Three quantized lanes with the given widths
    Quantized([u8; 3]),
}

impl SampleEncoding {
    pub fn num_bits(self) -> u32 {
        match self {
            SampleEncoding::Float3 => 96,
            SampleEncoding::Float4 => 128,
            SampleEncoding::Quantized(bits) => bits.iter().map(|&b| b as u32).sum(),
        }
    }

    fn write(self, value: Vec4, is_signed: bool, writer: &mut BitWriter) {
        match self {
            SampleEncoding::Float3 => {
                writer.write_f32(value.x);
                writer.write_f32(value.y);
                writer.write_f32(value.z);
            }
            SampleEncoding::Float4 => {
                for lane in value.to_array() {
                    writer.write_f32(lane);
                }
            }
            SampleEncoding::Quantized(bits) => {
                let packed = quantize_vector3(value, bits, is_signed);
                for (lane, width) in packed.into_iter().zip(bits) {
                    writer.write_bits(lane, width);
                }
            }
        }
    }

    fn read(self, is_signed: bool, reader: &mut BitReader<'_>) -> Vec4 {
        match self {
            SampleEncoding::Float3 => {
                let x = reader.read_f32();
                let y = reader.read_f32();
                let z = reader.read_f32();
                Vec4::new(x, y, z, 0.0)
            }
            SampleEncoding::Float4 => {
                let x = reader.read_f32();
                let y = reader.read_f32();
                let z = reader.read_f32();
                let w = reader.read_f32();
                Vec4::new(x, y, z, w)
            }
            SampleEncoding::Quantized(bits) => {
                let packed = bits.map(|width| reader.read_bits(width));
                dequantize_vector3(packed, bits, is_signed)
            }
        }
    }

    /// Value as it reads back after a write/read round trip
    fn decay(self, value: Vec4, is_signed: bool) -> Vec4 {
        match self {
            SampleEncoding::Float3 => value.truncate().extend(0.0),
            SampleEncoding::Float4 => value,
            SampleEncoding::Quantized(bits) => {
                dequantize_vector3(quantize_vector3(value, bits, is_signed), bits, is_signed)
            }
        }
    }
}

fn variable_encoding(bit_rate: u8) -> SampleEncoding {
    if is_constant_bit_rate(bit_rate) {
        SampleEncoding::Quantized([CONSTANT_SAMPLE_BITS; 3])
    } else if is_raw_bit_rate(bit_rate) {
        SampleEncoding::Float3
    } else {
        SampleEncoding::Quantized([num_bits_at_bit_rate(bit_rate); 3])
    }
}

fn assert_fixed(format: impl std::fmt::Display, bit_rate: u8) {
    assert!(
        bit_rate == INVALID_BIT_RATE,
        "fixed format {} used with bit rate {}",
        format,
        bit_rate
    );
}

/// Sample layout of a rotation stored as `format` at `bit_rate`
pub fn rotation_encoding(format: RotationFormat, bit_rate: u8) -> SampleEncoding {
    match format {
        RotationFormat::QuatDropWVariable => variable_encoding(bit_rate),
        RotationFormat::Quat128 => {
            assert_fixed(format, bit_rate);
            SampleEncoding::Float4
        }
        RotationFormat::QuatDropW96 => {
            assert_fixed(format, bit_rate);
            SampleEncoding::Float3
        }
        RotationFormat::QuatDropW48 => {
            assert_fixed(format, bit_rate);
            SampleEncoding::Quantized([16, 16, 16])
        }
        RotationFormat::QuatDropW32 => {
            assert_fixed(format, bit_rate);
            SampleEncoding::Quantized([11, 11, 10])
        }
    }
}

/// Sample layout of a translation or scale stored as `format` at `bit_rate`
pub fn vector_encoding(format: VectorFormat, bit_rate: u8) -> SampleEncoding {
    match format {
        VectorFormat::Vector3Variable => variable_encoding(bit_rate),
        VectorFormat::Vector3_96 => {
            assert_fixed(format, bit_rate);
            SampleEncoding::Float3
        }
        VectorFormat::Vector3_48 => {
            assert_fixed(format, bit_rate);
            SampleEncoding::Quantized([16, 16, 16])
        }
        VectorFormat::Vector3_32 => {
            assert_fixed(format, bit_rate);
            SampleEncoding::Quantized([11, 11, 10])
        }
    }
}

impl TrackFormat {
    pub fn encoding(self, bit_rate: u8) -> SampleEncoding {
        match self {
            TrackFormat::Rotation(format) => rotation_encoding(format, bit_rate),
            TrackFormat::Vector(format) => vector_encoding(format, bit_rate),
        }
    }
}

/// Quantized lanes are signed unless the clip range normalized the track.
/// The constant pseudo-rate only exists for clip-normalized tracks.
fn is_signed_encoding(bit_rate: u8, is_normalized: bool) -> bool {
    if is_constant_bit_rate(bit_rate) {
        assert!(
            is_normalized,
            "constant bit rate requires clip range normalization"
        );
    }
    !is_normalized
}

// ============================================================================
// Pack / Unpack
// ============================================================================

pub fn pack_rotation_sample(
    value: Vec4,
    format: RotationFormat,
    bit_rate: u8,
    is_normalized: bool,
    writer: &mut BitWriter,
) {
    let signed = is_signed_encoding(bit_rate, is_normalized);
    rotation_encoding(format, bit_rate).write(value, signed, writer);
}

pub fn unpack_rotation_sample(
    format: RotationFormat,
    bit_rate: u8,
    is_normalized: bool,
    reader: &mut BitReader<'_>,
) -> Vec4 {
    let signed = is_signed_encoding(bit_rate, is_normalized);
    rotation_encoding(format, bit_rate).read(signed, reader)
}

pub fn pack_vector_sample(
    value: Vec4,
    format: VectorFormat,
    bit_rate: u8,
    is_normalized: bool,
    writer: &mut BitWriter,
) {
    let signed = is_signed_encoding(bit_rate, is_normalized);
    vector_encoding(format, bit_rate).write(value, signed, writer);
}

pub fn unpack_vector_sample(
    format: VectorFormat,
    bit_rate: u8,
    is_normalized: bool,
    reader: &mut BitReader<'_>,
) -> Vec4 {
    let signed = is_signed_encoding(bit_rate, is_normalized);
    vector_encoding(format, bit_rate).read(signed, reader)
}

/// Stored value of `value` without going through a byte buffer.
///
/// Produces exactly what [`unpack_rotation_sample`] or
/// [`unpack_vector_sample`] return for the same inputs.
pub fn decay_sample(value: Vec4, format: TrackFormat, bit_rate: u8, is_normalized: bool) -> Vec4 {
    let signed = is_signed_encoding(bit_rate, is_normalized);
    format.encoding(bit_rate).decay(value, signed)
}

// ============================================================================
// Reconstruction
// ============================================================================

/// Undoes segment then clip normalization of an unpacked sample
pub fn denormalize_unpacked(
    value: Vec4,
    kind: TrackKind,
    bit_rate: u8,
    clip_ranges: &QvvRanges,
    segment_ranges: &QvvRanges,
) -> Vec4 {
    if is_raw_bit_rate(bit_rate) {
        return value;
    }

    let mut value = value;
    if segment_ranges.is_normalized(kind) && !is_constant_bit_rate(bit_rate) {
        value = denormalize_sample(value, &segment_ranges.range(kind));
    }
    if clip_ranges.is_normalized(kind) {
        value = denormalize_sample(value, &clip_ranges.range(kind));
    }
    value
}

/// Final rotation from reconstructed lanes
#[inline]
pub fn finish_rotation(value: Vec4, format: RotationFormat) -> Quat {
    match format.variant() {
        RotationVariant::Quat => Quat::from_vec4(value),
        RotationVariant::QuatDropW => quat_from_positive_w(value.truncate()),
    }
}

// ============================================================================
// Packed Tracks
// ============================================================================

/// One track's samples inside a segment's bit stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedTrack {
    pub format: TrackFormat,
    pub bit_rate: u8,
    pub is_normalized: bool,
    /// Offset of the first sample in the stream
    pub bit_offset: usize,
    pub num_samples: u32,
}

impl PackedTrack {
    pub fn sample_bits(&self) -> u32 {
        self.format.encoding(self.bit_rate).num_bits()
    }

    /// Constant-rate tracks store one sample shared by every index
    pub fn stride_bits(&self) -> u32 {
        if is_constant_bit_rate(self.bit_rate) {
            0
        } else {
            self.sample_bits()
        }
    }

    /// Unsegmented clips can exceed `u32::MAX` bits
    pub fn size_bits(&self) -> u64 {
        let sample_bits = u64::from(self.sample_bits());
        if is_constant_bit_rate(self.bit_rate) {
            sample_bits
        } else {
            sample_bits * u64::from(self.num_samples)
        }
    }

    /// Writes `samples` and records where they landed
    pub fn pack(
        writer: &mut BitWriter,
        format: TrackFormat,
        bit_rate: u8,
        is_normalized: bool,
        samples: impl IntoIterator<Item = Vec4>,
    ) -> PackedTrack {
        let bit_offset = writer.bit_len();
        let encoding = format.encoding(bit_rate);
        let signed = is_signed_encoding(bit_rate, is_normalized);

        let mut num_samples = 0;
        for sample in samples {
            encoding.write(sample, signed, writer);
            num_samples += 1;
            if is_constant_bit_rate(bit_rate) {
                break;
            }
        }

        PackedTrack {
            format,
            bit_rate,
            is_normalized,
            bit_offset,
            num_samples,
        }
    }

    /// Unpacked (still normalized) lanes of `sample_index`
    pub fn read(&self, data: &[u8], sample_index: u32) -> Vec4 {
        assert!(
            is_constant_bit_rate(self.bit_rate) || sample_index < self.num_samples,
            "sample index {} out of range ({} samples)",
            sample_index,
            self.num_samples
        );
        let bit = self.bit_offset + self.stride_bits() as usize * sample_index as usize;
        let mut reader = BitReader::at_bit(data, bit);
        let signed = is_signed_encoding(self.bit_rate, self.is_normalized);
        self.format.encoding(self.bit_rate).read(signed, &mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::HIGHEST_BIT_RATE;
    use crate::range::TrackRange;

    #[test]
    fn test_raw_rate_roundtrip_is_bit_exact() {
        let value = Vec4::new(0.123_456_79, -9876.5, 1.0e-7, 0.0);
        let mut writer = BitWriter::new();
        pack_vector_sample(
            value,
            VectorFormat::Vector3Variable,
            HIGHEST_BIT_RATE,
            true,
            &mut writer,
        );
        let data = writer.finish();

        let decoded = unpack_vector_sample(
            VectorFormat::Vector3Variable,
            HIGHEST_BIT_RATE,
            true,
            &mut BitReader::new(&data),
        );
        assert_eq!(decoded.to_array().map(f32::to_bits), value.to_array().map(f32::to_bits));
    }

    #[test]
    fn test_quat_128_roundtrip() {
        let q = Quat::from_rotation_y(1.2);
        let mut writer = BitWriter::new();
        pack_rotation_sample(
            Vec4::from(q),
            RotationFormat::Quat128,
            INVALID_BIT_RATE,
            false,
            &mut writer,
        );
        let data = writer.finish();
        assert_eq!(data.len(), 16);

        let lanes = unpack_rotation_sample(
            RotationFormat::Quat128,
            INVALID_BIT_RATE,
            false,
            &mut BitReader::new(&data),
        );
        assert_eq!(finish_rotation(lanes, RotationFormat::Quat128), q);
    }

    #[test]
    fn test_n_bit_roundtrip_within_step() {
        let range = TrackRange::from_min_max(
            Vec4::new(-5.0, 0.0, 2.0, 0.0),
            Vec4::new(5.0, 0.5, 3.0, 0.0),
        );
        let value = Vec4::new(1.2345, 0.3, 2.9, 0.0);
        let normalized = crate::range::normalize_sample(value, &range);

        for bit_rate in 1..HIGHEST_BIT_RATE {
            let bits = num_bits_at_bit_rate(bit_rate);
            let mut writer = BitWriter::new();
            pack_vector_sample(
                normalized,
                VectorFormat::Vector3Variable,
                bit_rate,
                true,
                &mut writer,
            );
            let data = writer.finish();

            let unpacked = unpack_vector_sample(
                VectorFormat::Vector3Variable,
                bit_rate,
                true,
                &mut BitReader::new(&data),
            );
            let decoded = denormalize_sample(unpacked, &range);
            let bound = range.extent / ((1u32 << bits) - 1) as f32 + Vec4::splat(1e-5);
            let error = (decoded - value).abs();
            assert!(
                error.cmple(bound).all(),
                "{} bits: error {:?} exceeds {:?}",
                bits,
                error,
                bound
            );
        }
    }

    #[test]
    fn test_decay_matches_unpack() {
        let value = Vec4::new(0.1, 0.77, 0.5001, 0.0);
        let format = TrackFormat::Vector(VectorFormat::Vector3Variable);
        for bit_rate in 0..=HIGHEST_BIT_RATE {
            let mut writer = BitWriter::new();
            pack_vector_sample(
                value,
                VectorFormat::Vector3Variable,
                bit_rate,
                true,
                &mut writer,
            );
            let data = writer.finish();
            let unpacked = unpack_vector_sample(
                VectorFormat::Vector3Variable,
                bit_rate,
                true,
                &mut BitReader::new(&data),
            );
            let decayed = decay_sample(value, format, bit_rate, true);
            assert_eq!(unpacked, decayed, "bit rate {}", bit_rate);
        }
    }

    #[test]
    fn test_fixed_32_bit_layout() {
        let mut writer = BitWriter::new();
        pack_vector_sample(
            Vec4::ONE,
            VectorFormat::Vector3_32,
            INVALID_BIT_RATE,
            true,
            &mut writer,
        );
        assert_eq!(writer.bit_len(), 32);
        assert_eq!(writer.finish(), vec![0xFF; 4]);
    }

    #[test]
    #[should_panic(expected = "fixed format")]
    fn test_fixed_format_rejects_variable_rate() {
        vector_encoding(VectorFormat::Vector3_48, 5);
    }

    #[test]
    #[should_panic(expected = "constant bit rate requires clip range normalization")]
    fn test_constant_rate_requires_normalization() {
        let mut writer = BitWriter::new();
        pack_vector_sample(
            Vec4::ZERO,
            VectorFormat::Vector3Variable,
            0,
            false,
            &mut writer,
        );
    }

    fn ranges_with(kind: TrackKind, range: &TrackRange, normalized: bool) -> QvvRanges {
        let mut ranges = QvvRanges::default();
        ranges.set_range(kind, range);
        ranges.set_normalized(kind, normalized);
        ranges
    }

    #[test]
    fn test_denormalize_applies_segment_then_clip() {
        let clip = ranges_with(
            TrackKind::Translation,
            &TrackRange::from_min_max(Vec4::splat(10.0), Vec4::splat(20.0)),
            true,
        );
        let segment = ranges_with(
            TrackKind::Translation,
            &TrackRange::from_min_max(Vec4::splat(0.5), Vec4::splat(0.75)),
            true,
        );

        // 0.5 in segment space -> 0.625 in clip space -> 16.25
        let value =
            denormalize_unpacked(Vec4::splat(0.5), TrackKind::Translation, 4, &clip, &segment);
        assert!((value.x - 16.25).abs() < 1e-5);

        // Raw skips both stages
        let value = denormalize_unpacked(
            Vec4::splat(0.5),
            TrackKind::Translation,
            HIGHEST_BIT_RATE,
            &clip,
            &segment,
        );
        assert_eq!(value.x, 0.5);
    }

    #[test]
    fn test_constant_rate_is_only_clip_denormalized() {
        let clip = ranges_with(
            TrackKind::Translation,
            &TrackRange::from_min_max(Vec4::splat(10.0), Vec4::splat(20.0)),
            true,
        );
        let segment = ranges_with(
            TrackKind::Translation,
            &TrackRange::from_min_max(Vec4::splat(0.5), Vec4::splat(0.75)),
            true,
        );

        // Constant samples were normalized against the clip range only
        let value =
            denormalize_unpacked(Vec4::splat(0.5), TrackKind::Translation, 0, &clip, &segment);
        assert!((value.x - 15.0).abs() < 1e-5, "got {}", value.x);
    }

    #[test]
    fn test_packed_track_constant_rate_shares_one_sample() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b11, 2);
        let format = TrackFormat::Vector(VectorFormat::Vector3Variable);
        let samples = [Vec4::splat(0.25), Vec4::splat(0.9), Vec4::splat(0.1)];
        let track = PackedTrack::pack(&mut writer, format, 0, true, samples);
        assert_eq!(track.bit_offset, 2);
        assert_eq!(track.size_bits(), 48);
        assert_eq!(writer.bit_len(), 50);

        let data = writer.finish();
        let first = track.read(&data, 0);
        assert_eq!(track.read(&data, 7), first);
        assert!((first.x - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_packed_track_indexing() {
        let mut writer = BitWriter::new();
        let format = TrackFormat::Rotation(RotationFormat::QuatDropWVariable);
        let samples: Vec<Vec4> = (0..5).map(|i| Vec4::splat(i as f32 / 4.0)).collect();
        let track = PackedTrack::pack(&mut writer, format, 7, true, samples.iter().copied());
        assert_eq!(track.num_samples, 5);
        assert_eq!(track.size_bits(), 5 * 27);

        let data = writer.finish();
        for (i, sample) in samples.iter().enumerate() {
            let decoded = track.read(&data, i as u32);
            assert!((decoded.truncate() - sample.truncate()).abs().max_element() < 1e-3);
        }
    }

    #[test]
    fn test_packed_track_sizes_past_u32_bits() {
        let track = PackedTrack {
            format: TrackFormat::Vector(VectorFormat::Vector3_96),
            bit_rate: INVALID_BIT_RATE,
            is_normalized: false,
            bit_offset: 0,
            num_samples: 50_000_000,
        };
        assert_eq!(track.size_bits(), 4_800_000_000);
        assert!(track.size_bits() > u64::from(u32::MAX));
    }
}
