//! Clip compression pipeline
//!
//! ```text
//! clip ─► raw database ──────────────────────────────┐ (error reference)
//!           └─► mutable database                      │
//!                 convert formats                     │
//!                 clip ranges, constant/default flags │
//!                 clip normalization                  │
//!                 per segment: segment ranges ─► bit-rate search (DecayedView)
//!                 pack constants + segments ─► CompressedClip
//! ```
//!
//! Packing reads the same stored samples the search decayed, so the packed
//! clip decodes exactly to what the error metric accepted.

use crate::bit_rate::select_segment_bit_rates;
use crate::clip::AnimationClip;
use crate::codec::PackedTrack;
use crate::database::{TrackDatabase, num_lanes};
use crate::decompress::{BoneStreams, CompressedClip, CompressedSegment};
use crate::error::Result;
use crate::error_metric::measure_segment_error;
use crate::format::INVALID_BIT_RATE;
use crate::packing::BitWriter;
use crate::range::QvvRanges;
use crate::segment::SegmentStats;
use crate::settings::CompressionSettings;
use crate::skeleton::RigidSkeleton;
use crate::storage::{DecayedView, SegmentView, StreamView, TrackState, constant_track_format};

/// Clip header: sample count, rate, formats, flags and section offsets
pub const CLIP_HEADER_SIZE: usize = 32;
/// Segment header before the per-bone bit-rates: start, count, data offset
pub const SEGMENT_HEADER_SIZE: usize = 12;
/// Bit-rate bytes per bone in a segment header
pub const BIT_RATE_BYTES_PER_BONE: usize = 3;

/// Size and accuracy of one compressed clip
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompressionStats {
    /// Bytes of uncompressed f32 samples
    pub raw_size: usize,
    /// Bytes of headers, ranges, constants and packed samples
    pub compressed_size: usize,
    /// `raw_size / compressed_size`
    pub ratio: f32,
    /// Worst skinning error of the packed clip against the raw samples
    pub max_error: f32,
}

/// Compress `clip` for `skeleton`.
///
/// Fails only on invalid input or settings. A track that cannot meet the
/// error threshold is stored raw.
pub fn compress_clip(
    clip: &AnimationClip,
    skeleton: &RigidSkeleton,
    settings: &CompressionSettings,
) -> Result<CompressedClip> {
    settings.validate()?;
    clip.validate_for(skeleton)?;

    let (raw, mut mutable) = prepare_databases(clip, settings);
    for segment in 0..mutable.segments().len() {
        select_segment_bit_rates(&raw, &mut mutable, skeleton, settings, segment);
    }

    let mut compressed = pack_clip(clip, &raw, &mutable);
    compressed.stats = measure_stats(clip, &raw, &compressed, skeleton, settings);

    tracing::info!(
        clip = %clip.name,
        bones = clip.num_bones(),
        samples = clip.num_samples,
        segments = compressed.segments.len(),
        raw_size = compressed.stats.raw_size,
        compressed_size = compressed.stats.compressed_size,
        ratio = compressed.stats.ratio,
        max_error = compressed.stats.max_error,
        "Compressed clip"
    );

    Ok(compressed)
}

/// Raw reference database and the normalized working copy
pub(crate) fn prepare_databases(
    clip: &AnimationClip,
    settings: &CompressionSettings,
) -> (TrackDatabase, TrackDatabase) {
    let raw = TrackDatabase::from_clip(clip, settings);
    let mut mutable = raw.clone();
    mutable.convert_formats(settings);
    mutable.compute_clip_ranges(settings);
    mutable.normalize_clip(settings);
    (raw, mutable)
}

/// Bytes of segment range records for the normalized tracks of one segment
fn range_data_size(database: &TrackDatabase, ranges: &[QvvRanges]) -> usize {
    ranges
        .iter()
        .map(|ranges| {
            database
                .track_kinds()
                .iter()
                .filter(|&&kind| ranges.is_normalized(kind))
                .map(|&kind| num_lanes(kind) * 2 * size_of::<f32>())
                .sum::<usize>()
        })
        .sum()
}

/// Packs constants and segments once bit-rates are final
pub(crate) fn pack_clip(
    clip: &AnimationClip,
    raw: &TrackDatabase,
    mutable: &TrackDatabase,
) -> CompressedClip {
    let num_transforms = mutable.num_transforms();

    // Clip-constant samples, stored once and never normalized
    let mut writer = BitWriter::new();
    let mut constant_streams = vec![BoneStreams::default(); num_transforms];
    for (transform, streams) in constant_streams.iter_mut().enumerate() {
        for &kind in mutable.track_kinds() {
            let state = TrackState::from_ranges(&mutable.clip_ranges()[transform], kind);
            if state != TrackState::Constant {
                continue;
            }
            let format = constant_track_format(kind, mutable.rotation_format());
            let sample = mutable.sample(0, transform, kind, 0);
            streams.set(
                kind,
                PackedTrack::pack(&mut writer, format, INVALID_BIT_RATE, false, [sample]),
            );
        }
    }
    let constant_data = writer.finish();

    let segments = mutable
        .segments()
        .iter()
        .enumerate()
        .map(|(segment, context)| {
            let mut writer = BitWriter::new();
            let mut streams = vec![BoneStreams::default(); num_transforms];
            let mut animated_pose_bit_size = 0;

            for (transform, bone_streams) in streams.iter_mut().enumerate() {
                let clip_ranges = &mutable.clip_ranges()[transform];
                for &kind in mutable.track_kinds() {
                    if TrackState::from_ranges(clip_ranges, kind) != TrackState::Animated {
                        continue;
                    }
                    let bit_rate = context.bit_rates[transform].get(kind);
                    let samples = (0..context.num_samples).map(|i| {
                        DecayedView::stored_sample(
                            raw,
                            mutable,
                            segment,
                            transform,
                            kind,
                            bit_rate,
                            i,
                        )
                    });
                    let track = PackedTrack::pack(
                        &mut writer,
                        mutable.track_format(kind),
                        bit_rate,
                        clip_ranges.is_normalized(kind),
                        samples,
                    );
                    animated_pose_bit_size += track.stride_bits();
                    bone_streams.set(kind, track);
                }
            }

            let data = writer.finish();
            let stats = SegmentStats {
                animated_pose_bit_size,
                animated_data_size: data.len(),
                range_data_size: range_data_size(mutable, &context.ranges),
                total_header_size: SEGMENT_HEADER_SIZE + BIT_RATE_BYTES_PER_BONE * num_transforms,
            };

            tracing::debug!(
                segment,
                start = context.start_offset,
                samples = context.num_samples,
                animated_pose_bit_size,
                data_size = stats.animated_data_size,
                range_size = stats.range_data_size,
                "Packed segment"
            );

            CompressedSegment {
                start_offset: context.start_offset,
                num_samples: context.num_samples,
                distribution: context.distribution,
                ranges: context.ranges.clone(),
                bit_rates: context.bit_rates.clone(),
                streams,
                data,
                stats,
            }
        })
        .collect();

    CompressedClip {
        name: clip.name.clone(),
        num_samples: mutable.num_samples(),
        sample_rate: mutable.sample_rate(),
        additive_format: clip.additive_format,
        has_scale: mutable.has_scale(),
        rotation_format: mutable.rotation_format(),
        translation_format: mutable.translation_format(),
        scale_format: mutable.scale_format(),
        clip_ranges: mutable.clip_ranges().to_vec(),
        constant_streams,
        constant_data,
        segments,
        stats: CompressionStats::default(),
    }
}

fn measure_stats(
    clip: &AnimationClip,
    raw: &TrackDatabase,
    compressed: &CompressedClip,
    skeleton: &RigidSkeleton,
    settings: &CompressionSettings,
) -> CompressionStats {
    let segment_bytes: usize = compressed
        .segments()
        .iter()
        .map(|segment| {
            let stats = segment.stats();
            stats.animated_data_size + stats.range_data_size + stats.total_header_size
        })
        .sum();
    let compressed_size = CLIP_HEADER_SIZE
        + compressed.num_bones() * QvvRanges::SIZE
        + compressed.constant_data().len()
        + segment_bytes;

    let max_error = (0..compressed.segments().len())
        .map(|segment| {
            measure_segment_error(
                &SegmentView::new(raw, segment),
                &StreamView::new(compressed, segment),
                skeleton,
                compressed.has_scale(),
                settings.vertex_distance,
            )
        })
        .fold(0.0, f32::max);

    let raw_size = clip.raw_size();
    CompressionStats {
        raw_size,
        compressed_size,
        ratio: raw_size as f32 / compressed_size as f32,
        max_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::AnimatedBone;
    use crate::error::AnimError;
    use crate::error_metric::{measure_bone_error, skinning_error};
    use crate::format::{
        CONSTANT_BIT_RATE, HIGHEST_BIT_RATE, RotationFormat, TrackKind, VectorFormat,
    };
    use crate::interpolation::{SampleRoundingPolicy, find_linear_interpolation_samples};
    use crate::math::{Transform, quat_nlerp};
    use crate::settings::AdditiveClipFormat;
    use crate::storage::TrackStorage;
    use glam::{Quat, Vec3};
    use std::f32::consts::FRAC_PI_2;

    fn quarter_turn_clip() -> AnimationClip {
        let bones = vec![
            AnimatedBone::constant(Transform::IDENTITY, 4),
            AnimatedBone::from_fn(4, |i| {
                let angle = FRAC_PI_2 * i as f32 / 3.0;
                Transform::new(Quat::from_rotation_z(angle), Vec3::ZERO, Vec3::ONE)
            }),
        ];
        AnimationClip::new("quarter_turn", 4, 30.0, bones)
    }

    fn wave_clip(num_bones: usize, num_samples: u32) -> AnimationClip {
        let bones = (0..num_bones)
            .map(|bone| {
                AnimatedBone::from_fn(num_samples, |i| {
                    let t = i as f32 / 30.0;
                    let phase = bone as f32 * 0.7;
                    Transform::new(
                        Quat::from_euler(
                            glam::EulerRot::XYZ,
                            (t * 2.0 + phase).sin() * 0.6,
                            (t * 1.3).cos() * 0.3,
                            t * 0.5,
                        ),
                        Vec3::new(10.0 + (t * 3.0 + phase).sin() * 4.0, 0.5, t * 2.0),
                        Vec3::ONE,
                    )
                })
            })
            .collect();
        AnimationClip::new("wave", num_samples, 30.0, bones)
    }

    #[test]
    fn test_quarter_turn_scenario() {
        let clip = quarter_turn_clip();
        let skeleton = RigidSkeleton::chain(2).unwrap();
        let settings = CompressionSettings::default();
        let compressed = compress_clip(&clip, &skeleton, &settings).unwrap();

        assert_eq!(compressed.segments().len(), 1);
        let segment = &compressed.segments()[0];

        // Identity root: constant pseudo-rate, nothing stored per sample
        assert_eq!(segment.bit_rates()[0].rotation, CONSTANT_BIT_RATE);
        assert!(segment.streams()[0].rotation.is_none());

        let rate = segment.bit_rates()[1].rotation;
        assert!(rate > 1 && rate < HIGHEST_BIT_RATE, "bit rate {}", rate);
        assert!(compressed.stats().max_error <= settings.error_threshold);

        // The chosen rate is the lowest that fits: one step down breaks the threshold
        let (raw, mut mutable) = prepare_databases(&clip, &settings);
        let selection = select_segment_bit_rates(&raw, &mut mutable, &skeleton, &settings, 0);
        assert_eq!(selection.bit_rates.as_slice(), segment.bit_rates());
        let mut lower = selection.bit_rates.clone();
        lower[1].rotation = rate - 1;
        let error = measure_bone_error(
            &SegmentView::new(&raw, 0),
            &DecayedView::new(&raw, &mutable, 0, &lower),
            &skeleton,
            1,
            mutable.has_scale(),
            settings.vertex_distance,
        );
        assert!(error > settings.error_threshold, "rate {} error {}", rate - 1, error);

        // Exact key reproduces the sample within the error bound
        let pose = compressed.sample_pose(1.0 / 30.0, SampleRoundingPolicy::None);
        let error = skinning_error(&clip.bones[1].sample(1), &pose[1], 3.0, false);
        assert!(error <= settings.error_threshold, "error {}", error);

        // Halfway between keys is the nlerp of the decoded endpoints
        let key0 = compressed.sample_pose_at_index(0);
        let key1 = compressed.sample_pose_at_index(1);
        let keys =
            find_linear_interpolation_samples(4, 30.0, 0.5 / 30.0, SampleRoundingPolicy::None);
        let expected = quat_nlerp(key0[1].rotation, key1[1].rotation, keys.alpha);
        let halfway = compressed.sample_pose(0.5 / 30.0, SampleRoundingPolicy::None);
        assert!(halfway[1].rotation.dot(expected) > 1.0 - 1e-6);
    }

    #[test]
    fn test_packed_streams_match_decayed_search_values() {
        let clip = wave_clip(3, 50);
        let skeleton = RigidSkeleton::chain(3).unwrap();
        let settings = CompressionSettings::default();

        let (raw, mut mutable) = prepare_databases(&clip, &settings);
        for segment in 0..mutable.segments().len() {
            select_segment_bit_rates(&raw, &mut mutable, &skeleton, &settings, segment);
        }
        let compressed = pack_clip(&clip, &raw, &mutable);

        for segment in 0..mutable.segments().len() {
            let rates = &mutable.segment(segment).bit_rates;
            let decayed = DecayedView::new(&raw, &mutable, segment, rates);
            let packed = StreamView::new(&compressed, segment);
            for transform in 0..3 {
                for &kind in mutable.track_kinds() {
                    for i in 0..packed.num_samples() {
                        let a = decayed.sample_lanes(transform, kind, i).to_array();
                        let b = packed.sample_lanes(transform, kind, i).to_array();
                        assert_eq!(
                            a.map(f32::to_bits),
                            b.map(f32::to_bits),
                            "segment {} bone {} {} sample {}",
                            segment,
                            transform,
                            kind,
                            i
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_segmented_clip_meets_threshold() {
        let clip = wave_clip(4, 100);
        let skeleton = RigidSkeleton::chain(4).unwrap();
        let settings = CompressionSettings::default();
        let compressed = compress_clip(&clip, &skeleton, &settings).unwrap();

        assert!(compressed.segments().len() > 1);
        let stats = compressed.stats();
        assert!(stats.max_error <= settings.error_threshold, "max error {}", stats.max_error);
        assert_eq!(stats.raw_size, 4 * 100 * 40);
        assert!(stats.ratio > 1.0, "ratio {}", stats.ratio);
        assert!(!compressed.has_scale());
        assert_eq!(compressed.compressed_size(), stats.compressed_size);
    }

    #[test]
    fn test_lossless_formats_reproduce_samples() {
        let clip = wave_clip(2, 40);
        let skeleton = RigidSkeleton::chain(2).unwrap();
        let settings = CompressionSettings::lossless();
        let compressed = compress_clip(&clip, &skeleton, &settings).unwrap();

        for segment in compressed.segments() {
            assert!(segment.bit_rates().iter().all(|rates| rates.rotation == INVALID_BIT_RATE));
            assert_eq!(segment.stats().range_data_size, 0);
        }
        for i in 0..clip.num_samples {
            let pose = compressed.sample_pose_at_index(i);
            for (bone, decoded) in pose.iter().enumerate() {
                let raw = clip.bones[bone].sample(i);
                assert!(decoded.rotation.dot(raw.rotation).abs() > 1.0 - 1e-6);
                assert!((decoded.translation - raw.translation).abs().max_element() < 1e-5);
            }
        }
    }

    #[test]
    fn test_fixed_quantized_formats() {
        let clip = wave_clip(2, 20);
        let skeleton = RigidSkeleton::chain(2).unwrap();
        let settings = CompressionSettings {
            rotation_format: RotationFormat::QuatDropW48,
            translation_format: VectorFormat::Vector3_48,
            scale_format: VectorFormat::Vector3_32,
            ..CompressionSettings::default()
        };
        let compressed = compress_clip(&clip, &skeleton, &settings).unwrap();

        let segment = &compressed.segments()[0];
        let track = segment.streams()[1].translation.unwrap();
        assert_eq!(track.bit_rate, INVALID_BIT_RATE);
        assert_eq!(track.sample_bits(), 48);
        assert_eq!(segment.stats().animated_pose_bit_size, 2 * (48 + 48));
        // 16 bits over a few cm of range
        assert!(compressed.stats().max_error < 0.01, "max error {}", compressed.stats().max_error);
    }

    #[test]
    fn test_additive_zero_scale_is_default() {
        let bones = vec![AnimatedBone::from_fn(8, |i| {
            Transform::new(Quat::IDENTITY, Vec3::new(i as f32, 0.0, 0.0), Vec3::ZERO)
        })];
        let clip = AnimationClip::new("additive", 8, 30.0, bones)
            .with_additive_format(AdditiveClipFormat::Additive1);
        let skeleton = RigidSkeleton::chain(1).unwrap();
        let compressed = compress_clip(&clip, &skeleton, &CompressionSettings::default()).unwrap();

        assert!(!compressed.has_scale());
        assert!(compressed.clip_ranges()[0].is_default(TrackKind::Scale));
        let pose = compressed.sample_pose(0.1, SampleRoundingPolicy::None);
        assert_eq!(pose[0].scale, Vec3::ZERO);
    }

    #[test]
    fn test_constant_track_is_stored_once() {
        let offset = Transform::new(
            Quat::from_rotation_x(0.5),
            Vec3::new(0.0, 7.0, 0.0),
            Vec3::ONE,
        );
        let bones = vec![
            AnimatedBone::constant(Transform::IDENTITY, 10),
            AnimatedBone::constant(offset, 10),
        ];
        let clip = AnimationClip::new("pose", 10, 30.0, bones);
        let skeleton = RigidSkeleton::chain(2).unwrap();
        let compressed = compress_clip(&clip, &skeleton, &CompressionSettings::default()).unwrap();

        let streams = &compressed.constant_streams()[1];
        assert!(streams.rotation.is_some());
        assert!(streams.translation.is_some());
        // Two Float3 samples
        assert_eq!(compressed.constant_data().len(), 24);
        assert!(compressed.segments()[0].data().is_empty());

        for i in 0..10 {
            let pose = compressed.sample_pose_at_index(i);
            assert_eq!(pose[1].translation, offset.translation);
        }
    }

    #[test]
    fn test_invalid_input_is_rejected_before_work() {
        let skeleton = RigidSkeleton::chain(2).unwrap();
        let settings = CompressionSettings::default();

        let empty = AnimationClip::new("empty", 0, 30.0, vec![AnimatedBone::default(); 2]);
        assert!(matches!(compress_clip(&empty, &skeleton, &settings), Err(AnimError::EmptyClip)));

        let clip = quarter_turn_clip();
        let skeleton = RigidSkeleton::chain(3).unwrap();
        assert!(matches!(
            compress_clip(&clip, &skeleton, &settings),
            Err(AnimError::SkeletonMismatch { .. })
        ));

        let bad = CompressionSettings {
            error_threshold: -1.0,
            ..CompressionSettings::default()
        };
        assert!(matches!(
            compress_clip(&clip, &RigidSkeleton::chain(2).unwrap(), &bad),
            Err(AnimError::InvalidSettings(_))
        ));
    }
}
