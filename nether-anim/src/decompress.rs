//! Compressed clips and runtime sampling
//!
//! A [`CompressedClip`] owns everything it decodes from: clip ranges, the
//! clip-constant samples and one bit stream per segment. Every decode entry
//! point takes `&self` and nothing is mutated after compression, so a clip can
//! be shared between threads and sampled concurrently.
//!
//! Clip-wide times resolve to clip keys first. Keys inside one segment are
//! sampled through that segment's [`StreamView`] with the segment's
//! [`SampleDistribution`]; a key pair straddling a segment boundary decodes
//! both keys exactly and blends them, so playback stays continuous across
//! segments.

use glam::Vec3;

use crate::codec::PackedTrack;
use crate::compress::CompressionStats;
use crate::format::{BoneBitRate, RotationFormat, TrackKind, VectorFormat};
use crate::interpolation::{
    KeyPair, SampleRoundingPolicy, calculate_duration, find_linear_interpolation_samples,
};
use crate::math::Transform;
use crate::range::QvvRanges;
use crate::sampler::{
    sample_bone_chain_with, sample_bone_with, sample_pose_at_index, sample_pose_with,
    sample_transform,
};
use crate::segment::{SampleDistribution, SegmentStats};
use crate::settings::AdditiveClipFormat;
use crate::skeleton::RigidSkeleton;
use crate::storage::StreamView;

/// Packed tracks of one bone, `None` where nothing is stored
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoneStreams {
    pub rotation: Option<PackedTrack>,
    pub translation: Option<PackedTrack>,
    pub scale: Option<PackedTrack>,
}

impl BoneStreams {
    pub fn get(&self, kind: TrackKind) -> Option<&PackedTrack> {
        match kind {
            TrackKind::Rotation => self.rotation.as_ref(),
            TrackKind::Translation => self.translation.as_ref(),
            TrackKind::Scale => self.scale.as_ref(),
        }
    }

    pub fn set(&mut self, kind: TrackKind, track: PackedTrack) {
        match kind {
            TrackKind::Rotation => self.rotation = Some(track),
            TrackKind::Translation => self.translation = Some(track),
            TrackKind::Scale => self.scale = Some(track),
        }
    }
}

/// One segment's ranges, bit-rates and packed samples
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedSegment {
    pub(crate) start_offset: u32,
    pub(crate) num_samples: u32,
    pub(crate) distribution: SampleDistribution,
    pub(crate) ranges: Vec<QvvRanges>,
    pub(crate) bit_rates: Vec<BoneBitRate>,
    pub(crate) streams: Vec<BoneStreams>,
    pub(crate) data: Vec<u8>,
    pub(crate) stats: SegmentStats,
}

impl CompressedSegment {
    /// First clip sample covered by this segment
    #[inline]
    pub fn start_offset(&self) -> u32 {
        self.start_offset
    }

    #[inline]
    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }

    /// How keys are resolved when sampling inside this segment
    #[inline]
    pub fn distribution(&self) -> SampleDistribution {
        self.distribution
    }

    #[inline]
    pub fn ranges(&self) -> &[QvvRanges] {
        &self.ranges
    }

    #[inline]
    pub fn bit_rates(&self) -> &[BoneBitRate] {
        &self.bit_rates
    }

    #[inline]
    pub fn streams(&self) -> &[BoneStreams] {
        &self.streams
    }

    /// Packed animated samples
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn stats(&self) -> &SegmentStats {
        &self.stats
    }
}

/// Output of [`compress_clip`](crate::compress::compress_clip)
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedClip {
    pub(crate) name: String,
    pub(crate) num_samples: u32,
    pub(crate) sample_rate: f32,
    pub(crate) additive_format: AdditiveClipFormat,
    pub(crate) has_scale: bool,
    pub(crate) rotation_format: RotationFormat,
    pub(crate) translation_format: VectorFormat,
    pub(crate) scale_format: VectorFormat,
    pub(crate) clip_ranges: Vec<QvvRanges>,
    pub(crate) constant_streams: Vec<BoneStreams>,
    pub(crate) constant_data: Vec<u8>,
    pub(crate) segments: Vec<CompressedSegment>,
    pub(crate) stats: CompressionStats,
}

/// Where a clip time lands
enum ClipKeys {
    /// Both keys in one segment
    Local { segment: usize },
    /// Keys in adjacent segments (clip keys)
    Straddle { key0: u32, key1: u32, alpha: f32 },
}

impl CompressedClip {
    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn num_bones(&self) -> usize {
        self.clip_ranges.len()
    }

    #[inline]
    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f32 {
        calculate_duration(self.num_samples, self.sample_rate)
    }

    #[inline]
    pub fn additive_format(&self) -> AdditiveClipFormat {
        self.additive_format
    }

    /// Neutral scale, from the additive format the clip was compressed with
    #[inline]
    pub fn default_scale(&self) -> Vec3 {
        self.additive_format.default_scale()
    }

    /// Whether any bone stores scale
    #[inline]
    pub fn has_scale(&self) -> bool {
        self.has_scale
    }

    #[inline]
    pub fn rotation_format(&self) -> RotationFormat {
        self.rotation_format
    }

    #[inline]
    pub fn translation_format(&self) -> VectorFormat {
        self.translation_format
    }

    #[inline]
    pub fn scale_format(&self) -> VectorFormat {
        self.scale_format
    }

    #[inline]
    pub fn clip_ranges(&self) -> &[QvvRanges] {
        &self.clip_ranges
    }

    /// Packed clip-constant samples per bone
    #[inline]
    pub fn constant_streams(&self) -> &[BoneStreams] {
        &self.constant_streams
    }

    #[inline]
    pub fn constant_data(&self) -> &[u8] {
        &self.constant_data
    }

    #[inline]
    pub fn segments(&self) -> &[CompressedSegment] {
        &self.segments
    }

    #[inline]
    pub fn stats(&self) -> &CompressionStats {
        &self.stats
    }

    #[inline]
    pub fn compressed_size(&self) -> usize {
        self.stats.compressed_size
    }

    /// Storage view of one segment, for segment-local sampling
    pub fn segment_view(&self, segment: usize) -> StreamView<'_> {
        StreamView::new(self, segment)
    }

    /// Index of the segment holding clip sample `clip_sample`
    pub fn segment_index(&self, clip_sample: u32) -> usize {
        assert!(
            clip_sample < self.num_samples,
            "sample index {} out of range ({} samples)",
            clip_sample,
            self.num_samples
        );
        self.segments
            .partition_point(|segment| segment.start_offset <= clip_sample)
            - 1
    }

    fn resolve(&self, sample_time: f32, rounding: SampleRoundingPolicy) -> ClipKeys {
        let keys = find_linear_interpolation_samples(
            self.num_samples,
            self.sample_rate,
            sample_time,
            rounding,
        );
        let segment0 = self.segment_index(keys.key0);
        let segment1 = self.segment_index(keys.key1);

        if segment0 == segment1 {
            return ClipKeys::Local { segment: segment0 };
        }

        // A single key is read; the segment holding it clamps onto it
        if rounding != SampleRoundingPolicy::None || keys.alpha == 0.0 {
            return ClipKeys::Local {
                segment: self.segment_index(keys.nearest_key()),
            };
        }

        ClipKeys::Straddle {
            key0: keys.key0,
            key1: keys.key1,
            alpha: keys.alpha,
        }
    }

    /// One bone at exactly clip sample `clip_sample`
    fn bone_at_index(&self, bone: usize, clip_sample: u32) -> Transform {
        let segment = self.segment_index(clip_sample);
        let local = KeyPair::exact(clip_sample - self.segments[segment].start_offset);
        sample_transform(
            &StreamView::new(self, segment),
            &local,
            bone,
            SampleRoundingPolicy::Floor,
        )
    }

    // ------------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------------

    /// Every bone at `sample_time`
    pub fn sample_pose(&self, sample_time: f32, rounding: SampleRoundingPolicy) -> Vec<Transform> {
        let mut pose = vec![Transform::IDENTITY; self.num_bones()];
        self.sample_pose_into(sample_time, rounding, &mut pose);
        pose
    }

    /// [`CompressedClip::sample_pose`] into a caller-owned buffer
    pub fn sample_pose_into(
        &self,
        sample_time: f32,
        rounding: SampleRoundingPolicy,
        out_pose: &mut [Transform],
    ) {
        match self.resolve(sample_time, rounding) {
            ClipKeys::Local { segment } => sample_pose_with(
                self.segments[segment].distribution,
                &StreamView::new(self, segment),
                sample_time,
                rounding,
                out_pose,
            ),
            ClipKeys::Straddle { key0, key1, alpha } => {
                self.sample_pose_at_index_into(key0, out_pose);
                let mut next = vec![Transform::IDENTITY; self.num_bones()];
                self.sample_pose_at_index_into(key1, &mut next);
                for (out, next) in out_pose.iter_mut().zip(&next) {
                    *out = out.blend(next, alpha);
                }
            }
        }
    }

    /// One bone at `sample_time`
    pub fn sample_bone(
        &self,
        bone: usize,
        sample_time: f32,
        rounding: SampleRoundingPolicy,
    ) -> Transform {
        match self.resolve(sample_time, rounding) {
            ClipKeys::Local { segment } => sample_bone_with(
                self.segments[segment].distribution,
                &StreamView::new(self, segment),
                bone,
                sample_time,
                rounding,
            ),
            ClipKeys::Straddle { key0, key1, alpha } => self
                .bone_at_index(bone, key0)
                .blend(&self.bone_at_index(bone, key1), alpha),
        }
    }

    /// `bone` and every ancestor at `sample_time`, written at their indices
    pub fn sample_bone_chain(
        &self,
        skeleton: &RigidSkeleton,
        bone: usize,
        sample_time: f32,
        rounding: SampleRoundingPolicy,
        out_pose: &mut [Transform],
    ) {
        match self.resolve(sample_time, rounding) {
            ClipKeys::Local { segment } => sample_bone_chain_with(
                self.segments[segment].distribution,
                &StreamView::new(self, segment),
                skeleton,
                bone,
                sample_time,
                rounding,
                out_pose,
            ),
            ClipKeys::Straddle { key0, key1, alpha } => {
                for &index in &skeleton.chain_to(bone) {
                    let index = index as usize;
                    out_pose[index] = self
                        .bone_at_index(index, key0)
                        .blend(&self.bone_at_index(index, key1), alpha);
                }
            }
        }
    }

    /// Every bone at exactly clip sample `clip_sample`
    pub fn sample_pose_at_index(&self, clip_sample: u32) -> Vec<Transform> {
        let mut pose = vec![Transform::IDENTITY; self.num_bones()];
        self.sample_pose_at_index_into(clip_sample, &mut pose);
        pose
    }

    pub fn sample_pose_at_index_into(&self, clip_sample: u32, out_pose: &mut [Transform]) {
        let segment = self.segment_index(clip_sample);
        let local = clip_sample - self.segments[segment].start_offset;
        sample_pose_at_index(&StreamView::new(self, segment), local, out_pose);
    }
}
