//! Variable bit-rate selection
//!
//! For each segment, bones are visited parent first. Each animated track of a
//! variable format tries the constant pseudo-rate (when the segment range
//! allows it), then 3..=19 bits, and keeps the first rate whose skinning error
//! stays under the threshold, falling back to raw. Tracks not yet visited stay
//! at the raw rate, so a track is only ever judged against its own
//! quantization plus that of its ancestors.

use crate::codec::PackedTrack;
use crate::database::{TrackDatabase, num_lanes};
use crate::error_metric::measure_bone_error;
use crate::format::{
    BoneBitRate, CONSTANT_BIT_RATE, HIGHEST_BIT_RATE, LOWEST_BIT_RATE, TrackKind,
};
use crate::range::SEGMENT_CONSTANT_THRESHOLD;
use crate::settings::{CompressionSettings, SegmentRangeReduction};
use crate::skeleton::RigidSkeleton;
use crate::storage::{DecayedView, SegmentView, TrackState};

/// Outcome of the search for one segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSelection {
    pub bit_rates: Vec<BoneBitRate>,
    /// Packed sample bits plus segment range bits
    pub encoded_bits: u64,
    pub segment_normalized: bool,
}

/// Starting assignment: fixed formats are invalid, non-animated tracks report
/// the constant rate and animated ones start raw.
pub fn initial_bit_rates(
    database: &TrackDatabase,
    settings: &CompressionSettings,
) -> Vec<BoneBitRate> {
    database
        .clip_ranges()
        .iter()
        .map(|ranges| {
            let mut rates = BoneBitRate::INVALID;
            for kind in TrackKind::ALL {
                if !settings.is_variable(kind) {
                    continue;
                }
                let rate = if ranges.is_animated(kind) {
                    HIGHEST_BIT_RATE
                } else {
                    CONSTANT_BIT_RATE
                };
                rates.set(kind, rate);
            }
            rates
        })
        .collect()
}

/// Bits needed to store `segment` under `bit_rates`
pub fn segment_encoded_bits(
    database: &TrackDatabase,
    segment: usize,
    bit_rates: &[BoneBitRate],
) -> u64 {
    let context = database.segment(segment);
    let mut bits = 0u64;

    for (transform, ranges) in database.clip_ranges().iter().enumerate() {
        for &kind in database.track_kinds() {
            if TrackState::from_ranges(ranges, kind) != TrackState::Animated {
                continue;
            }
            let track = PackedTrack {
                format: database.track_format(kind),
                bit_rate: bit_rates[transform].get(kind),
                is_normalized: ranges.is_normalized(kind),
                bit_offset: 0,
                num_samples: context.num_samples,
            };
            bits += track.size_bits();

            if context.ranges[transform].is_normalized(kind) {
                // min + extent, f32 per lane
                bits += (num_lanes(kind) * 2 * 32) as u64;
            }
        }
    }

    bits
}

/// Everything one search pass reads
struct SearchContext<'a> {
    raw: &'a TrackDatabase,
    mutable: &'a TrackDatabase,
    skeleton: &'a RigidSkeleton,
    settings: &'a CompressionSettings,
    segment: usize,
}

impl SearchContext<'_> {
    fn bone_error(&self, bone: usize, bit_rates: &[BoneBitRate]) -> f32 {
        measure_bone_error(
            &SegmentView::new(self.raw, self.segment),
            &DecayedView::new(self.raw, self.mutable, self.segment, bit_rates),
            self.skeleton,
            bone,
            self.mutable.has_scale(),
            self.settings.vertex_distance,
        )
    }

    fn is_searched(&self, bone: usize, kind: TrackKind) -> bool {
        self.settings.is_variable(kind) && self.mutable.clip_ranges()[bone].is_animated(kind)
    }

    /// First rate in ascending order that keeps `bone` within the threshold
    fn select_track(&self, bone: usize, kind: TrackKind, bit_rates: &mut [BoneBitRate]) -> u8 {
        let segment_constant = self.mutable.segment(self.segment).ranges[bone].is_constant(kind);
        let candidates = segment_constant
            .then_some(CONSTANT_BIT_RATE)
            .into_iter()
            .chain(LOWEST_BIT_RATE..HIGHEST_BIT_RATE);

        for bit_rate in candidates {
            bit_rates[bone].set(kind, bit_rate);
            if self.bone_error(bone, bit_rates) <= self.settings.error_threshold {
                return bit_rate;
            }
        }
        bit_rates[bone].set(kind, HIGHEST_BIT_RATE);
        HIGHEST_BIT_RATE
    }

    /// Raise tracks on the chain to `bone` one step at a time until its error
    /// fits. The lowest rate goes first, ties go to the bone closest to `bone`.
    ///
    /// Returns whether any rate changed.
    fn raise_chain(&self, bone: usize, include_self: bool, bit_rates: &mut [BoneBitRate]) -> bool {
        let chain = self.skeleton.chain_to(bone);
        let mut raised = false;

        while self.bone_error(bone, bit_rates) > self.settings.error_threshold {
            let mut lowest: Option<(u8, usize, TrackKind)> = None;
            for &index in chain.iter().rev() {
                let index = index as usize;
                if index == bone && !include_self {
                    continue;
                }
                for &kind in self.mutable.track_kinds() {
                    let rate = bit_rates[index].get(kind);
                    if !self.is_searched(index, kind) || rate >= HIGHEST_BIT_RATE {
                        continue;
                    }
                    if lowest.is_none_or(|(lowest_rate, _, _)| rate < lowest_rate) {
                        lowest = Some((rate, index, kind));
                    }
                }
            }

            let Some((rate, index, kind)) = lowest else {
                break;
            };
            bit_rates[index].set(kind, rate + 1);
            raised = true;
            tracing::trace!(
                segment = self.segment,
                bone,
                raised_bone = index,
                %kind,
                bit_rate = rate + 1,
                "raised bit rate"
            );
        }

        raised
    }
}

/// Per-track search over the current segment data
///
/// A bone that misses the threshold even with its own tracks raw owes the
/// error to its ancestors, whose rates are then raised. A final sweep repeats
/// that for every bone until nothing changes, so each bone ends within the
/// threshold whenever full precision can reach it.
fn search_bit_rates(
    raw: &TrackDatabase,
    mutable: &TrackDatabase,
    skeleton: &RigidSkeleton,
    settings: &CompressionSettings,
    segment: usize,
) -> Vec<BoneBitRate> {
    let context = SearchContext {
        raw,
        mutable,
        skeleton,
        settings,
        segment,
    };
    let mut bit_rates = initial_bit_rates(mutable, settings);

    for bone in 0..mutable.num_transforms() {
        for &kind in mutable.track_kinds() {
            if !context.is_searched(bone, kind) {
                continue;
            }
            let selected = context.select_track(bone, kind, &mut bit_rates);
            tracing::trace!(segment, bone, %kind, bit_rate = selected, "selected bit rate");
        }
        context.raise_chain(bone, false, &mut bit_rates);
    }

    loop {
        let mut changed = false;
        for bone in 0..mutable.num_transforms() {
            changed |= context.raise_chain(bone, true, &mut bit_rates);
        }
        if !changed {
            break;
        }
    }

    bit_rates
}

/// Choose segment normalization and bit-rates for `segment`.
///
/// Leaves the segment's data, ranges and bit-rates in `mutable` in their
/// final state.
pub fn select_segment_bit_rates(
    raw: &TrackDatabase,
    mutable: &mut TrackDatabase,
    skeleton: &RigidSkeleton,
    settings: &CompressionSettings,
    segment: usize,
) -> SegmentSelection {
    mutable.compute_segment_ranges(segment, SEGMENT_CONSTANT_THRESHOLD);

    let mode = if settings.range_reduction {
        settings.segment_range_reduction
    } else {
        SegmentRangeReduction::Never
    };

    let selection = match mode {
        SegmentRangeReduction::Never => run_pass(raw, mutable, skeleton, settings, segment, false),
        SegmentRangeReduction::Always => run_pass(raw, mutable, skeleton, settings, segment, true),
        SegmentRangeReduction::Compare => {
            let snapshot = mutable.snapshot_segment(segment);
            let clip_only = run_pass(raw, mutable, skeleton, settings, segment, false);
            let with_segment = run_pass(raw, mutable, skeleton, settings, segment, true);

            if clip_only.encoded_bits < with_segment.encoded_bits {
                mutable.restore_segment(segment, &snapshot);
                clip_only
            } else {
                with_segment
            }
        }
    };

    tracing::debug!(
        segment,
        segment_normalized = selection.segment_normalized,
        encoded_bits = selection.encoded_bits,
        "segment bit rates selected"
    );

    mutable.segment_mut(segment).bit_rates.clone_from(&selection.bit_rates);
    selection
}

fn run_pass(
    raw: &TrackDatabase,
    mutable: &mut TrackDatabase,
    skeleton: &RigidSkeleton,
    settings: &CompressionSettings,
    segment: usize,
    normalize_segment: bool,
) -> SegmentSelection {
    if normalize_segment {
        mutable.normalize_segment(segment);
    }
    let bit_rates = search_bit_rates(raw, mutable, skeleton, settings, segment);
    let encoded_bits = segment_encoded_bits(mutable, segment, &bit_rates);
    SegmentSelection {
        bit_rates,
        encoded_bits,
        segment_normalized: normalize_segment,
    }
}
