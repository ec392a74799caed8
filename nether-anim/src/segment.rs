//! Clip segmentation
//!
//! Long clips are split into segments of roughly `segment_target_sample_count`
//! samples. Each segment gets its own ranges and bit-rates, which keeps the
//! quantized ranges tight and lets a decoder touch only the segment it needs.

use crate::format::BoneBitRate;
use crate::range::QvvRanges;
use crate::settings::CompressionSettings;

/// Lanes processed together; per-component runs are padded to a multiple of this
pub const SIMD_WIDTH: u32 = 4;

/// How sample keys are resolved inside a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleDistribution {
    /// One key pair per call, shared by every track
    #[default]
    Uniform,
    /// Each track resolves its own keys from its own sample count and rate
    Variable,
}

/// Size breakdown of one segment, for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStats {
    /// Bits of one pose's animated samples
    pub animated_pose_bit_size: u32,
    /// Bytes of packed animated samples
    pub animated_data_size: usize,
    /// Bytes of segment range records
    pub range_data_size: usize,
    /// Bytes of segment header and bit-rates
    pub total_header_size: usize,
}

/// Working state of one segment during compression
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentContext {
    pub index: u32,
    /// First clip sample covered by this segment
    pub start_offset: u32,
    pub num_samples: u32,
    /// `num_samples` rounded up to [`SIMD_WIDTH`]
    pub num_simd_samples: u32,
    /// Key resolution used when this segment is sampled; bone clips are uniform
    pub distribution: SampleDistribution,
    /// Segment-local range per transform
    pub ranges: Vec<QvvRanges>,
    /// Chosen bit-rates per transform
    pub bit_rates: Vec<BoneBitRate>,
    pub stats: SegmentStats,
}

impl SegmentContext {
    pub fn new(index: u32, start_offset: u32, num_samples: u32, num_transforms: usize) -> Self {
        Self {
            index,
            start_offset,
            num_samples,
            num_simd_samples: num_samples.div_ceil(SIMD_WIDTH) * SIMD_WIDTH,
            distribution: SampleDistribution::Uniform,
            ranges: vec![QvvRanges::default(); num_transforms],
            bit_rates: vec![BoneBitRate::INVALID; num_transforms],
            stats: SegmentStats::default(),
        }
    }

    /// One past the last clip sample in this segment
    #[inline]
    pub fn end_offset(&self) -> u32 {
        self.start_offset + self.num_samples
    }

    #[inline]
    pub fn contains(&self, clip_sample: u32) -> bool {
        clip_sample >= self.start_offset && clip_sample < self.end_offset()
    }
}

/// Sample counts of each segment, in clip order
pub fn partition_clip(num_samples: u32, settings: &CompressionSettings) -> Vec<u32> {
    let target = settings.segment_target_sample_count;
    let max = settings.segment_max_sample_count;

    if !settings.segmenting_enabled || num_samples <= max || target == 0 {
        return vec![num_samples];
    }

    let num_segments = num_samples.div_ceil(target) as usize;
    let mut counts = vec![target; num_segments];
    let leftover = num_samples - target * (num_segments as u32 - 1);
    counts[num_segments - 1] = leftover;

    // Fold a short tail into the other segments when they have room
    let slack = max - target;
    let others = num_segments as u32 - 1;
    if others > 0 && others * slack >= leftover {
        for i in 0..leftover as usize {
            counts[i % others as usize] += 1;
        }
        counts.pop();
    }

    counts
}

/// Segment contexts for a clip partitioned by `settings`
pub fn build_segments(
    num_samples: u32,
    num_transforms: usize,
    settings: &CompressionSettings,
) -> Vec<SegmentContext> {
    let mut start = 0;
    partition_clip(num_samples, settings)
        .into_iter()
        .enumerate()
        .map(|(index, count)| {
            let segment = SegmentContext::new(index as u32, start, count, num_transforms);
            start += count;
            segment
        })
        .collect()
}
