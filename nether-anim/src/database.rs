//! Track database: every sample of a clip in one struct-of-arrays buffer
//!
//! # Layout
//!
//! ```text
//! segment 0 | segment 1 | ...
//!   transform 0 | transform 1 | ...
//!     rot.x[S] rot.y[S] rot.z[S] rot.w[S]
//!     trans.x[S] trans.y[S] trans.z[S]
//!     (scale.x[S] scale.y[S] scale.z[S])
//! ```
//!
//! `S` is the segment's sample count padded to
//! [`SIMD_WIDTH`](crate::segment::SIMD_WIDTH), the padding repeats the last
//! sample. Scale lanes are only present when some bone carries a non-default
//! scale.
//!
//! Normalization and format conversion happen in place. A raw copy of the
//! database is kept alongside the working one as the error reference.

use glam::{Vec3, Vec4};

use crate::clip::AnimationClip;
use crate::format::{RotationFormat, TrackFormat, TrackKind, VectorFormat};
use crate::math::{quat_ensure_positive_w, vector_all_near_equal};
use crate::range::{QvvRanges, TrackRange, classify_track, normalize_sample};
use crate::segment::{SegmentContext, build_segments};
use crate::settings::CompressionSettings;

/// Components per transform with scale lanes
pub const NUM_COMPONENTS_WITH_SCALE: usize = 10;
/// Components per transform without scale lanes
pub const NUM_COMPONENTS_NO_SCALE: usize = 7;

const KINDS_WITH_SCALE: &[TrackKind] =
    &[TrackKind::Rotation, TrackKind::Translation, TrackKind::Scale];
const KINDS_NO_SCALE: &[TrackKind] = &[TrackKind::Rotation, TrackKind::Translation];

#[inline]
fn component_base(kind: TrackKind) -> usize {
    match kind {
        TrackKind::Rotation => 0,
        TrackKind::Translation => 4,
        TrackKind::Scale => 7,
    }
}

/// Number of lanes a track kind occupies
#[inline]
pub fn num_lanes(kind: TrackKind) -> usize {
    match kind {
        TrackKind::Rotation => 4,
        TrackKind::Translation | TrackKind::Scale => 3,
    }
}

/// Neutral value of a track kind
#[inline]
pub fn neutral_value(kind: TrackKind, default_scale: Vec3) -> Vec4 {
    match kind {
        TrackKind::Rotation => Vec4::new(0.0, 0.0, 0.0, 1.0),
        TrackKind::Translation => Vec4::ZERO,
        TrackKind::Scale => default_scale.extend(0.0),
    }
}

/// Mutable SOA sample storage for one clip
#[derive(Debug, Clone)]
pub struct TrackDatabase {
    num_transforms: usize,
    num_samples: u32,
    sample_rate: f32,
    has_scale: bool,
    default_scale: Vec3,
    rotation_format: RotationFormat,
    translation_format: VectorFormat,
    scale_format: VectorFormat,
    clip_ranges: Vec<QvvRanges>,
    segments: Vec<SegmentContext>,
    /// Float offset of each segment in `data`
    segment_offsets: Vec<usize>,
    data: Vec<f32>,
}

impl TrackDatabase {
    /// Raw database: full-precision formats, no ranges, positive-W rotations.
    ///
    /// The clip must already be validated.
    pub fn from_clip(clip: &AnimationClip, settings: &CompressionSettings) -> Self {
        let num_transforms = clip.num_bones();
        let default_scale = clip.default_scale();
        let has_scale = clip.bones.iter().any(|bone| {
            bone.scales.iter().any(|scale| {
                !vector_all_near_equal(
                    scale.extend(0.0),
                    default_scale.extend(0.0),
                    settings.constant_scale_threshold,
                    3,
                )
            })
        });
        let num_components = if has_scale {
            NUM_COMPONENTS_WITH_SCALE
        } else {
            NUM_COMPONENTS_NO_SCALE
        };

        let segments = build_segments(clip.num_samples, num_transforms, settings);
        let mut segment_offsets = Vec::with_capacity(segments.len());
        let mut total = 0usize;
        for segment in &segments {
            segment_offsets.push(total);
            total += num_transforms * num_components * segment.num_simd_samples as usize;
        }

        let mut database = Self {
            num_transforms,
            num_samples: clip.num_samples,
            sample_rate: clip.sample_rate,
            has_scale,
            default_scale,
            rotation_format: RotationFormat::Quat128,
            translation_format: VectorFormat::Vector3_96,
            scale_format: VectorFormat::Vector3_96,
            clip_ranges: vec![QvvRanges::default(); num_transforms],
            segments,
            segment_offsets,
            data: vec![0.0; total],
        };

        for segment_index in 0..database.segments.len() {
            let start = database.segments[segment_index].start_offset;
            let num_samples = database.segments[segment_index].num_samples;
            let num_simd_samples = database.segments[segment_index].num_simd_samples;

            for (transform, bone) in clip.bones.iter().enumerate() {
                for local in 0..num_simd_samples {
                    // Padding repeats the last sample
                    let clip_sample = (start + local.min(num_samples - 1)) as usize;
                    let rotation = quat_ensure_positive_w(bone.rotations[clip_sample].normalize());
                    database.write(
                        segment_index,
                        transform,
                        TrackKind::Rotation,
                        local,
                        Vec4::from(rotation),
                    );
                    database.write(
                        segment_index,
                        transform,
                        TrackKind::Translation,
                        local,
                        bone.translations[clip_sample].extend(0.0),
                    );
                    if has_scale {
                        database.write(
                            segment_index,
                            transform,
                            TrackKind::Scale,
                            local,
                            bone.scales[clip_sample].extend(0.0),
                        );
                    }
                }
            }
        }

        database
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[inline]
    pub fn num_transforms(&self) -> usize {
        self.num_transforms
    }

    #[inline]
    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }

    #[inline]
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    #[inline]
    pub fn has_scale(&self) -> bool {
        self.has_scale
    }

    #[inline]
    pub fn default_scale(&self) -> Vec3 {
        self.default_scale
    }

    #[inline]
    pub fn num_components(&self) -> usize {
        if self.has_scale {
            NUM_COMPONENTS_WITH_SCALE
        } else {
            NUM_COMPONENTS_NO_SCALE
        }
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

    pub fn track_format(&self, kind: TrackKind) -> TrackFormat {
        match kind {
            TrackKind::Rotation => TrackFormat::Rotation(self.rotation_format),
            TrackKind::Translation => TrackFormat::Vector(self.translation_format),
            TrackKind::Scale => TrackFormat::Vector(self.scale_format),
        }
    }

    #[inline]
    pub fn clip_ranges(&self) -> &[QvvRanges] {
        &self.clip_ranges
    }

    #[inline]
    pub fn segments(&self) -> &[SegmentContext] {
        &self.segments
    }

    #[inline]
    pub fn segment(&self, segment: usize) -> &SegmentContext {
        &self.segments[segment]
    }

    #[inline]
    pub fn segment_mut(&mut self, segment: usize) -> &mut SegmentContext {
        &mut self.segments[segment]
    }

    /// Track kinds stored for each transform
    pub fn track_kinds(&self) -> &'static [TrackKind] {
        if self.has_scale {
            KINDS_WITH_SCALE
        } else {
            KINDS_NO_SCALE
        }
    }

    #[inline]
    fn component_offset(&self, segment: usize, transform: usize, component: usize) -> usize {
        let num_simd_samples = self.segments[segment].num_simd_samples as usize;
        self.segment_offsets[segment]
            + (transform * self.num_components() + component) * num_simd_samples
    }

    /// Stored lanes of one sample (segment-local index)
    pub fn sample(
        &self,
        segment: usize,
        transform: usize,
        kind: TrackKind,
        sample_index: u32,
    ) -> Vec4 {
        assert!(
            sample_index < self.segments[segment].num_simd_samples,
            "sample index {} out of range",
            sample_index
        );
        if kind == TrackKind::Scale && !self.has_scale {
            return self.default_scale.extend(0.0);
        }

        let base = component_base(kind);
        let mut lanes = [0.0f32; 4];
        for (lane, value) in lanes.iter_mut().enumerate().take(num_lanes(kind)) {
            let offset = self.component_offset(segment, transform, base + lane);
            *value = self.data[offset + sample_index as usize];
        }
        Vec4::from_array(lanes)
    }

    fn write(
        &mut self,
        segment: usize,
        transform: usize,
        kind: TrackKind,
        sample_index: u32,
        value: Vec4,
    ) {
        let base = component_base(kind);
        let lanes = value.to_array();
        for (lane, &value) in lanes.iter().enumerate().take(num_lanes(kind)) {
            let offset = self.component_offset(segment, transform, base + lane);
            self.data[offset + sample_index as usize] = value;
        }
    }

    /// Applies `f` to every stored sample (padding included) of one track in
    /// one segment
    fn map_track(
        &mut self,
        segment: usize,
        transform: usize,
        kind: TrackKind,
        f: impl Fn(Vec4) -> Vec4,
    ) {
        for i in 0..self.segments[segment].num_simd_samples {
            let value = self.sample(segment, transform, kind, i);
            self.write(segment, transform, kind, i, f(value));
        }
    }

    fn track_samples(
        &self,
        segment: usize,
        transform: usize,
        kind: TrackKind,
    ) -> impl Iterator<Item = Vec4> + '_ {
        (0..self.segments[segment].num_samples)
            .map(move |i| self.sample(segment, transform, kind, i))
    }

    // ------------------------------------------------------------------------
    // Conversion and normalization
    // ------------------------------------------------------------------------

    /// Adopt the storage formats from `settings`
    ///
    /// Rotations are already positive-W, which every drop-W format expects.
    pub fn convert_formats(&mut self, settings: &CompressionSettings) {
        self.rotation_format = settings.rotation_format;
        self.translation_format = settings.translation_format;
        self.scale_format = settings.scale_format;
    }

    /// Measure clip ranges and flag constant and default tracks
    pub fn compute_clip_ranges(&mut self, settings: &CompressionSettings) {
        for transform in 0..self.num_transforms {
            let mut ranges = QvvRanges::default();
            for kind in TrackKind::ALL {
                if kind == TrackKind::Scale && !self.has_scale {
                    let neutral = neutral_value(kind, self.default_scale);
                    ranges.set_range(kind, &TrackRange::from_min_max(neutral, neutral));
                    ranges.set_constant(kind, true, true);
                    continue;
                }

                let range = TrackRange::from_samples(
                    (0..self.segments.len())
                        .flat_map(|segment| self.track_samples(segment, transform, kind)),
                );
                let first = self.sample(0, transform, kind, 0);
                let neutral = neutral_value(kind, self.default_scale);
                let (is_constant, is_default) = classify_track(
                    &range,
                    first,
                    neutral,
                    settings.constant_threshold(kind),
                    num_lanes(kind),
                );
                ranges.set_range(kind, &range);
                ranges.set_constant(kind, is_constant, is_default);
            }
            self.clip_ranges[transform] = ranges;
        }
    }

    /// Normalize animated tracks against the clip range
    pub fn normalize_clip(&mut self, settings: &CompressionSettings) {
        if !settings.range_reduction {
            return;
        }

        for transform in 0..self.num_transforms {
            for &kind in self.track_kinds() {
                let ranges = self.clip_ranges[transform];
                if settings.is_full_precision(kind) || !ranges.is_animated(kind) {
                    continue;
                }

                let range = ranges.range(kind);
                for segment in 0..self.segments.len() {
                    self.map_track(segment, transform, kind, |value| {
                        normalize_sample(value, &range)
                    });
                }
                self.clip_ranges[transform].set_normalized(kind, true);
            }
        }
    }

    /// Measure each track's range inside `segment` on the current data.
    ///
    /// The constant flag marks tracks that can use the constant bit-rate here.
    pub fn compute_segment_ranges(&mut self, segment: usize, constant_threshold: f32) {
        for transform in 0..self.num_transforms {
            let mut ranges = QvvRanges::default();
            for &kind in self.track_kinds() {
                let range = TrackRange::from_samples(self.track_samples(segment, transform, kind));
                ranges.set_range(kind, &range);
                ranges.set_constant(kind, range.is_constant(constant_threshold), false);
            }
            self.segments[segment].ranges[transform] = ranges;
        }
    }

    /// Normalize clip-normalized tracks against their segment range
    pub fn normalize_segment(&mut self, segment: usize) {
        for transform in 0..self.num_transforms {
            for &kind in self.track_kinds() {
                if !self.clip_ranges[transform].is_normalized(kind) {
                    continue;
                }

                let range = self.segments[segment].ranges[transform].range(kind);
                self.map_track(segment, transform, kind, |value| {
                    normalize_sample(value, &range)
                });
                self.segments[segment].ranges[transform].set_normalized(kind, true);
            }
        }
    }

    /// Copy of one segment's samples and ranges
    pub fn snapshot_segment(&self, segment: usize) -> (Vec<f32>, Vec<QvvRanges>) {
        let (start, end) = self.segment_span(segment);
        (self.data[start..end].to_vec(), self.segments[segment].ranges.clone())
    }

    /// Undo changes made after [`TrackDatabase::snapshot_segment`]
    pub fn restore_segment(&mut self, segment: usize, snapshot: &(Vec<f32>, Vec<QvvRanges>)) {
        let (start, end) = self.segment_span(segment);
        self.data[start..end].copy_from_slice(&snapshot.0);
        self.segments[segment].ranges.clone_from(&snapshot.1);
    }

    fn segment_span(&self, segment: usize) -> (usize, usize) {
        let start = self.segment_offsets[segment];
        let len = self.num_transforms
            * self.num_components()
            * self.segments[segment].num_simd_samples as usize;
        (start, start + len)
    }

    /// Floats in the SOA buffer
    #[inline]
    pub fn data_len(&self) -> usize {
        self.data.len()
    }
}
