//! Track storage: one read interface over every place samples live
//!
//! - [`SegmentView`]: a segment of a [`TrackDatabase`], as stored (raw or
//!   normalized floats)
//! - [`DecayedView`]: what a segment would decode to under a candidate set of
//!   bit-rates, without packing anything
//! - [`StreamView`]: a segment of a [`CompressedClip`]'s packed streams
//!
//! `DecayedView` and `StreamView` share the quantizers and the reconstruction
//! helpers, so a bit-rate accepted during the search decodes to the same
//! values at runtime.

use glam::{Quat, Vec3, Vec4};

use crate::codec::{decay_sample, denormalize_unpacked, finish_rotation};
use crate::database::{TrackDatabase, neutral_value};
use crate::decompress::{CompressedClip, CompressedSegment};
use crate::format::{
    BoneBitRate, INVALID_BIT_RATE, RotationFormat, TrackFormat, TrackKind, is_constant_bit_rate,
    is_raw_bit_rate,
};
use crate::range::{QvvRanges, normalize_sample};

/// How a track is reconstructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Neutral value, nothing stored
    Default,
    /// One stored sample for the whole clip
    Constant,
    /// One stored sample per key
    Animated,
}

impl TrackState {
    pub fn from_ranges(ranges: &QvvRanges, kind: TrackKind) -> Self {
        if ranges.is_default(kind) {
            TrackState::Default
        } else if ranges.is_constant(kind) {
            TrackState::Constant
        } else {
            TrackState::Animated
        }
    }
}

/// Read access to one segment's tracks
pub trait TrackStorage {
    fn num_transforms(&self) -> usize;

    /// Samples in the whole clip
    fn clip_num_samples(&self) -> u32;

    fn sample_rate(&self) -> f32;

    /// First clip sample of this segment
    fn segment_start(&self) -> u32;

    /// Samples in this segment
    fn num_samples(&self) -> u32;

    fn default_scale(&self) -> Vec3;

    fn rotation_format(&self) -> RotationFormat;

    fn track_state(&self, transform: usize, kind: TrackKind) -> TrackState;

    /// Fully reconstructed lanes of one sample (segment-local index)
    fn sample_lanes(&self, transform: usize, kind: TrackKind, sample_index: u32) -> Vec4;

    /// Sample count of one track (per-track timing)
    fn track_num_samples(&self, _transform: usize, _kind: TrackKind) -> u32 {
        self.num_samples()
    }

    /// Sample rate of one track (per-track timing)
    fn track_sample_rate(&self, _transform: usize, _kind: TrackKind) -> f32 {
        self.sample_rate()
    }

    #[inline]
    fn rotation(&self, transform: usize, sample_index: u32) -> Quat {
        let lanes = self.sample_lanes(transform, TrackKind::Rotation, sample_index);
        finish_rotation(lanes, self.rotation_format())
    }

    #[inline]
    fn vector(&self, transform: usize, kind: TrackKind, sample_index: u32) -> Vec3 {
        self.sample_lanes(transform, kind, sample_index).truncate()
    }
}

// ============================================================================
// SegmentView
// ============================================================================

/// A database segment as currently stored
#[derive(Debug, Clone, Copy)]
pub struct SegmentView<'a> {
    database: &'a TrackDatabase,
    segment: usize,
}

impl<'a> SegmentView<'a> {
    pub fn new(database: &'a TrackDatabase, segment: usize) -> Self {
        assert!(segment < database.segments().len(), "segment {} out of range", segment);
        Self { database, segment }
    }
}

impl TrackStorage for SegmentView<'_> {
    fn num_transforms(&self) -> usize {
        self.database.num_transforms()
    }

    fn clip_num_samples(&self) -> u32 {
        self.database.num_samples()
    }

    fn sample_rate(&self) -> f32 {
        self.database.sample_rate()
    }

    fn segment_start(&self) -> u32 {
        self.database.segment(self.segment).start_offset
    }

    fn num_samples(&self) -> u32 {
        self.database.segment(self.segment).num_samples
    }

    fn default_scale(&self) -> Vec3 {
        self.database.default_scale()
    }

    fn rotation_format(&self) -> RotationFormat {
        self.database.rotation_format()
    }

    fn track_state(&self, transform: usize, kind: TrackKind) -> TrackState {
        TrackState::from_ranges(&self.database.clip_ranges()[transform], kind)
    }

    fn sample_lanes(&self, transform: usize, kind: TrackKind, sample_index: u32) -> Vec4 {
        let value = self.database.sample(self.segment, transform, kind, sample_index);
        match self.track_state(transform, kind) {
            TrackState::Animated => denormalize_unpacked(
                value,
                kind,
                INVALID_BIT_RATE,
                &self.database.clip_ranges()[transform],
                &self.database.segment(self.segment).ranges[transform],
            ),
            _ => value,
        }
    }
}

// ============================================================================
// DecayedView
// ============================================================================

/// Stored form of a clip-constant sample
pub(crate) fn constant_track_format(
    kind: TrackKind,
    rotation_format: RotationFormat,
) -> TrackFormat {
    match kind {
        TrackKind::Rotation => TrackFormat::Rotation(rotation_format.constant_format()),
        _ => TrackFormat::Vector(crate::format::VectorFormat::Vector3_96),
    }
}

/// A database segment as it would decode under `bit_rates`
#[derive(Debug, Clone, Copy)]
pub struct DecayedView<'a> {
    raw: &'a TrackDatabase,
    mutable: &'a TrackDatabase,
    segment: usize,
    bit_rates: &'a [BoneBitRate],
}

impl<'a> DecayedView<'a> {
    pub fn new(
        raw: &'a TrackDatabase,
        mutable: &'a TrackDatabase,
        segment: usize,
        bit_rates: &'a [BoneBitRate],
    ) -> Self {
        assert_eq!(raw.num_transforms(), mutable.num_transforms());
        assert_eq!(bit_rates.len(), mutable.num_transforms());
        Self {
            raw,
            mutable,
            segment,
            bit_rates,
        }
    }

    /// Value that gets packed for one sample at `bit_rate`
    pub(crate) fn stored_sample(
        raw: &TrackDatabase,
        mutable: &TrackDatabase,
        segment: usize,
        transform: usize,
        kind: TrackKind,
        bit_rate: u8,
        sample_index: u32,
    ) -> Vec4 {
        if is_raw_bit_rate(bit_rate) {
            raw.sample(segment, transform, kind, sample_index)
        } else if is_constant_bit_rate(bit_rate) {
            // Segment constant: first raw sample against the clip range only
            let clip_range = mutable.clip_ranges()[transform].range(kind);
            normalize_sample(raw.sample(segment, transform, kind, 0), &clip_range)
        } else {
            mutable.sample(segment, transform, kind, sample_index)
        }
    }
}

impl TrackStorage for DecayedView<'_> {
    fn num_transforms(&self) -> usize {
        self.mutable.num_transforms()
    }

    fn clip_num_samples(&self) -> u32 {
        self.mutable.num_samples()
    }

    fn sample_rate(&self) -> f32 {
        self.mutable.sample_rate()
    }

    fn segment_start(&self) -> u32 {
        self.mutable.segment(self.segment).start_offset
    }

    fn num_samples(&self) -> u32 {
        self.mutable.segment(self.segment).num_samples
    }

    fn default_scale(&self) -> Vec3 {
        self.mutable.default_scale()
    }

    fn rotation_format(&self) -> RotationFormat {
        self.mutable.rotation_format()
    }

    fn track_state(&self, transform: usize, kind: TrackKind) -> TrackState {
        TrackState::from_ranges(&self.mutable.clip_ranges()[transform], kind)
    }

    fn sample_lanes(&self, transform: usize, kind: TrackKind, sample_index: u32) -> Vec4 {
        match self.track_state(transform, kind) {
            TrackState::Default => neutral_value(kind, self.mutable.default_scale()),
            TrackState::Constant => {
                // Clip constants are stored from the first clip sample
                let value = self.mutable.sample(0, transform, kind, 0);
                let format = constant_track_format(kind, self.mutable.rotation_format());
                decay_sample(value, format, INVALID_BIT_RATE, false)
            }
            TrackState::Animated => {
                let bit_rate = self.bit_rates[transform].get(kind);
                let clip_ranges = &self.mutable.clip_ranges()[transform];
                let stored = Self::stored_sample(
                    self.raw,
                    self.mutable,
                    self.segment,
                    transform,
                    kind,
                    bit_rate,
                    sample_index,
                );
                let decayed = decay_sample(
                    stored,
                    self.mutable.track_format(kind),
                    bit_rate,
                    clip_ranges.is_normalized(kind),
                );
                denormalize_unpacked(
                    decayed,
                    kind,
                    bit_rate,
                    clip_ranges,
                    &self.mutable.segment(self.segment).ranges[transform],
                )
            }
        }
    }
}

// ============================================================================
// StreamView
// ============================================================================

/// A segment of a compressed clip
#[derive(Debug, Clone, Copy)]
pub struct StreamView<'a> {
    clip: &'a CompressedClip,
    segment: &'a CompressedSegment,
}

impl<'a> StreamView<'a> {
    pub fn new(clip: &'a CompressedClip, segment: usize) -> Self {
        Self {
            clip,
            segment: &clip.segments()[segment],
        }
    }
}

impl TrackStorage for StreamView<'_> {
    fn num_transforms(&self) -> usize {
        self.clip.num_bones()
    }

    fn clip_num_samples(&self) -> u32 {
        self.clip.num_samples()
    }

    fn sample_rate(&self) -> f32 {
        self.clip.sample_rate()
    }

    fn segment_start(&self) -> u32 {
        self.segment.start_offset
    }

    fn num_samples(&self) -> u32 {
        self.segment.num_samples
    }

    fn default_scale(&self) -> Vec3 {
        self.clip.default_scale()
    }

    fn rotation_format(&self) -> RotationFormat {
        self.clip.rotation_format()
    }

    fn track_state(&self, transform: usize, kind: TrackKind) -> TrackState {
        TrackState::from_ranges(&self.clip.clip_ranges()[transform], kind)
    }

    fn sample_lanes(&self, transform: usize, kind: TrackKind, sample_index: u32) -> Vec4 {
        match self.track_state(transform, kind) {
            TrackState::Default => neutral_value(kind, self.clip.default_scale()),
            TrackState::Constant => {
                let Some(track) = self.clip.constant_streams()[transform].get(kind) else {
                    panic!("bone {} {} track has no constant sample", transform, kind);
                };
                track.read(self.clip.constant_data(), 0)
            }
            TrackState::Animated => {
                let Some(track) = self.segment.streams[transform].get(kind) else {
                    panic!("bone {} {} track has no packed stream", transform, kind);
                };
                let lanes = track.read(&self.segment.data, sample_index);
                denormalize_unpacked(
                    lanes,
                    kind,
                    track.bit_rate,
                    &self.clip.clip_ranges()[transform],
                    &self.segment.ranges[transform],
                )
            }
        }
    }
}
