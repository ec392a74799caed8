//! Range analysis and the per-transform range record
//!
//! A range is the bounding box of a track's samples. Ranges are measured once
//! over the whole clip and again inside every segment; normalization remaps
//! samples into `[0, 1]` relative to one of them.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

use crate::format::TrackKind;

/// Extents below this are treated as zero when normalizing
pub const MIN_RANGE_EXTENT: f32 = 1.0e-9;

/// Segment tracks whose extent stays within this can use the constant bit-rate
pub const SEGMENT_CONSTANT_THRESHOLD: f32 = 1.0e-5;

/// Min and extent of one track (unused lanes are zero)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackRange {
    pub min: Vec4,
    pub extent: Vec4,
}

impl TrackRange {
    pub const EMPTY: Self = Self {
        min: Vec4::ZERO,
        extent: Vec4::ZERO,
    };

    pub fn from_min_max(min: Vec4, max: Vec4) -> Self {
        Self {
            min,
            extent: (max - min).max(Vec4::ZERO),
        }
    }

    /// Bounding box of `samples`
    pub fn from_samples(samples: impl IntoIterator<Item = Vec4>) -> Self {
        let mut min = Vec4::splat(f32::MAX);
        let mut max = Vec4::splat(f32::MIN);
        let mut any = false;

        for sample in samples {
            min = min.min(sample);
            max = max.max(sample);
            any = true;
        }

        if any {
            Self::from_min_max(min, max)
        } else {
            Self::EMPTY
        }
    }

    #[inline]
    pub fn max(&self) -> Vec4 {
        self.min + self.extent
    }

    /// Every component of the extent within `threshold` (inclusive, like
    /// [`vector_all_near_equal`](crate::math::vector_all_near_equal))
    pub fn is_constant(&self, threshold: f32) -> bool {
        self.extent.max_element() <= threshold
    }
}

/// Remaps `value` into `[0, 1]` relative to `range`
#[inline]
pub fn normalize_sample(value: Vec4, range: &TrackRange) -> Vec4 {
    let extent = range.extent.to_array();
    let offset = (value - range.min).to_array();
    let mut out = [0.0f32; 4];
    for i in 0..4 {
        if extent[i] >= MIN_RANGE_EXTENT {
            out[i] = (offset[i] / extent[i]).clamp(0.0, 1.0);
        }
    }
    Vec4::from_array(out)
}

/// Inverse of [`normalize_sample`]
#[inline]
pub fn denormalize_sample(value: Vec4, range: &TrackRange) -> Vec4 {
    value * range.extent + range.min
}

// ============================================================================
// QvvRanges
// ============================================================================

/// Per-transform range record: rotation, translation and scale bounds plus flags.
///
/// Plain data so a whole segment's records can be viewed as bytes. The
/// `NORMALIZED` bits mean clip normalization when the record describes the
/// clip and segment normalization when it describes a segment.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct QvvRanges {
    pub rotation_min: [f32; 4],
    pub rotation_max: [f32; 4],
    pub rotation_extent: [f32; 4],
    pub translation_min: [f32; 3],
    pub translation_max: [f32; 3],
    pub translation_extent: [f32; 3],
    pub scale_min: [f32; 3],
    pub scale_max: [f32; 3],
    pub scale_extent: [f32; 3],
    pub flags: u32,
}

impl QvvRanges {
    pub const ROTATION_CONSTANT: u32 = 1 << 0;
    pub const ROTATION_DEFAULT: u32 = 1 << 1;
    pub const ROTATION_NORMALIZED: u32 = 1 << 2;
    pub const TRANSLATION_CONSTANT: u32 = 1 << 3;
    pub const TRANSLATION_DEFAULT: u32 = 1 << 4;
    pub const TRANSLATION_NORMALIZED: u32 = 1 << 5;
    pub const SCALE_CONSTANT: u32 = 1 << 6;
    pub const SCALE_DEFAULT: u32 = 1 << 7;
    pub const SCALE_NORMALIZED: u32 = 1 << 8;

    /// Size of one serialized record
    pub const SIZE: usize = std::mem::size_of::<QvvRanges>();

    fn flag_base(kind: TrackKind) -> u32 {
        match kind {
            TrackKind::Rotation => Self::ROTATION_CONSTANT,
            TrackKind::Translation => Self::TRANSLATION_CONSTANT,
            TrackKind::Scale => Self::SCALE_CONSTANT,
        }
    }

    pub fn range(&self, kind: TrackKind) -> TrackRange {
        match kind {
            TrackKind::Rotation => TrackRange {
                min: Vec4::from_array(self.rotation_min),
                extent: Vec4::from_array(self.rotation_extent),
            },
            TrackKind::Translation => TrackRange {
                min: Vec3::from_array(self.translation_min).extend(0.0),
                extent: Vec3::from_array(self.translation_extent).extend(0.0),
            },
            TrackKind::Scale => TrackRange {
                min: Vec3::from_array(self.scale_min).extend(0.0),
                extent: Vec3::from_array(self.scale_extent).extend(0.0),
            },
        }
    }

    pub fn set_range(&mut self, kind: TrackKind, range: &TrackRange) {
        let max = range.max();
        match kind {
            TrackKind::Rotation => {
                self.rotation_min = range.min.to_array();
                self.rotation_max = max.to_array();
                self.rotation_extent = range.extent.to_array();
            }
            TrackKind::Translation => {
                self.translation_min = range.min.truncate().to_array();
                self.translation_max = max.truncate().to_array();
                self.translation_extent = range.extent.truncate().to_array();
            }
            TrackKind::Scale => {
                self.scale_min = range.min.truncate().to_array();
                self.scale_max = max.truncate().to_array();
                self.scale_extent = range.extent.truncate().to_array();
            }
        }
    }

    #[inline]
    pub fn is_constant(&self, kind: TrackKind) -> bool {
        self.flags & Self::flag_base(kind) != 0
    }

    #[inline]
    pub fn is_default(&self, kind: TrackKind) -> bool {
        self.flags & (Self::flag_base(kind) << 1) != 0
    }

    #[inline]
    pub fn is_animated(&self, kind: TrackKind) -> bool {
        !self.is_constant(kind)
    }

    #[inline]
    pub fn is_normalized(&self, kind: TrackKind) -> bool {
        self.flags & (Self::flag_base(kind) << 2) != 0
    }

    fn set_flag(&mut self, flag: u32, value: bool) {
        if value {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    pub fn set_constant(&mut self, kind: TrackKind, is_constant: bool, is_default: bool) {
        let base = Self::flag_base(kind);
        self.set_flag(base, is_constant);
        self.set_flag(base << 1, is_constant && is_default);
    }

    pub fn set_normalized(&mut self, kind: TrackKind, value: bool) {
        self.set_flag(Self::flag_base(kind) << 2, value);
    }
}

impl Default for QvvRanges {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Classifies a clip-level track as constant and/or default.
///
/// `first_sample` is compared against `neutral` with the same tolerance used
/// for the extent. Only the first `num_components` lanes are considered.
pub fn classify_track(
    range: &TrackRange,
    first_sample: Vec4,
    neutral: Vec4,
    threshold: f32,
    num_components: usize,
) -> (bool, bool) {
    let is_constant = range.is_constant(threshold);
    let is_default = is_constant
        && crate::math::vector_all_near_equal(first_sample, neutral, threshold, num_components);
    (is_constant, is_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_from_samples() {
        let samples = [
            Vec4::new(1.0, -2.0, 0.5, 0.0),
            Vec4::new(3.0, 2.0, 0.5, 0.0),
            Vec4::new(2.0, 0.0, 0.5, 0.0),
        ];
        let range = TrackRange::from_samples(samples);
        assert_eq!(range.min, Vec4::new(1.0, -2.0, 0.5, 0.0));
        assert_eq!(range.extent, Vec4::new(2.0, 4.0, 0.0, 0.0));
        assert_eq!(range.max(), Vec4::new(3.0, 2.0, 0.5, 0.0));
        assert!(range.extent.min_element() >= 0.0);
    }

    #[test]
    fn test_normalize_handles_zero_extent() {
        let range = TrackRange::from_min_max(
            Vec4::new(0.0, 1.0, 0.0, 0.0),
            Vec4::new(4.0, 1.0, 0.0, 0.0),
        );
        let n = normalize_sample(Vec4::new(1.0, 1.0, 0.0, 0.0), &range);
        assert_eq!(n, Vec4::new(0.25, 0.0, 0.0, 0.0));

        let back = denormalize_sample(n, &range);
        assert_eq!(back, Vec4::new(1.0, 1.0, 0.0, 0.0));
    }

    #[test]
    fn test_normalize_clamps_out_of_range() {
        let range = TrackRange::from_min_max(Vec4::ZERO, Vec4::ONE);
        let n = normalize_sample(Vec4::new(-0.5, 1.5, 0.5, 1.0), &range);
        assert_eq!(n, Vec4::new(0.0, 1.0, 0.5, 1.0));
    }

    #[test]
    fn test_classify_constant_and_default() {
        let range = TrackRange::from_samples([
            Vec4::new(0.0, 0.0, 0.0, 1.0),
            Vec4::new(0.000_001, 0.0, 0.0, 1.0),
        ]);
        let identity = Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!(classify_track(&range, identity, identity, 1.0e-5, 4), (true, true));

        let offset = Vec4::new(0.5, 0.0, 0.0, 0.0);
        let range = TrackRange::from_samples([offset, offset]);
        assert_eq!(classify_track(&range, offset, Vec4::ZERO, 1.0e-3, 3), (true, false));

        let range = TrackRange::from_samples([Vec4::ZERO, Vec4::ONE]);
        assert_eq!(classify_track(&range, Vec4::ZERO, Vec4::ZERO, 1.0e-3, 3), (false, false));
    }

    #[test]
    fn test_constant_threshold_is_inclusive() {
        let range = TrackRange::from_min_max(Vec4::ZERO, Vec4::new(0.25, 0.125, 0.0, 0.0));
        assert!(range.is_constant(0.25));
        assert!(!range.is_constant(0.125));

        let flat = TrackRange::from_samples([Vec4::ONE, Vec4::ONE]);
        assert!(flat.is_constant(0.0));
    }

    #[test]
    fn test_qvv_flags() {
        let mut ranges = QvvRanges::default();
        ranges.set_constant(TrackKind::Translation, true, true);
        ranges.set_normalized(TrackKind::Scale, true);

        assert!(ranges.is_constant(TrackKind::Translation));
        assert!(ranges.is_default(TrackKind::Translation));
        assert!(!ranges.is_animated(TrackKind::Translation));
        assert!(ranges.is_animated(TrackKind::Rotation));
        assert!(ranges.is_normalized(TrackKind::Scale));
        assert!(!ranges.is_normalized(TrackKind::Rotation));

        ranges.set_constant(TrackKind::Translation, false, true);
        assert!(!ranges.is_default(TrackKind::Translation));
    }

    #[test]
    fn test_qvv_range_roundtrip_and_pod_size() {
        let mut ranges = QvvRanges::default();
        let range = TrackRange::from_min_max(
            Vec4::new(1.0, 2.0, 3.0, 0.0),
            Vec4::new(2.0, 4.0, 6.0, 0.0),
        );
        ranges.set_range(TrackKind::Scale, &range);
        assert_eq!(ranges.range(TrackKind::Scale), range);
        assert_eq!(ranges.scale_max, [2.0, 4.0, 6.0]);

        assert_eq!(QvvRanges::SIZE, 31 * 4);
        let bytes: &[u8] = bytemuck::bytes_of(&ranges);
        assert_eq!(bytes.len(), QvvRanges::SIZE);
    }
}
