//! Generic scalar track arrays
//!
//! Tracks here are not bone transforms, just float vectors sampled over time
//! (blend weights, curves, custom channels). Each track carries its own
//! sample rate and resolves its own keys, the same way the `Variable`
//! distribution does for bone tracks.

use glam::{Vec2, Vec3, Vec4};

use crate::error::{AnimError, Result};
use crate::interpolation::{SampleRoundingPolicy, calculate_duration};
use crate::sampler::TrackTime;

/// Output index that strips a track from the output
pub const INVALID_TRACK_INDEX: u32 = u32::MAX;

/// Element type of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Float1f,
    Float2f,
    Float3f,
    Float4f,
    Vector4f,
}

impl TrackType {
    pub fn name(self) -> &'static str {
        match self {
            TrackType::Float1f => "float1f",
            TrackType::Float2f => "float2f",
            TrackType::Float3f => "float3f",
            TrackType::Float4f => "float4f",
            TrackType::Vector4f => "vector4f",
        }
    }

    pub fn num_components(self) -> usize {
        match self {
            TrackType::Float1f => 1,
            TrackType::Float2f => 2,
            TrackType::Float3f => 3,
            TrackType::Float4f | TrackType::Vector4f => 4,
        }
    }

    /// Bytes of one raw sample
    pub fn element_size(self) -> usize {
        self.num_components() * size_of::<f32>()
    }
}

/// Per-track metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackDesc {
    /// Index handed to the writer in place of the track index,
    /// [`INVALID_TRACK_INDEX`] to skip the track
    pub output_index: u32,
    /// Largest acceptable error on this track
    pub precision: f32,
    /// Samples closer than this are considered equal
    pub constant_threshold: f32,
}

impl TrackDesc {
    pub fn new(output_index: u32) -> Self {
        Self {
            output_index,
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.precision.is_finite()
            && self.precision > 0.0
            && self.constant_threshold.is_finite()
            && self.constant_threshold >= 0.0
    }
}

impl Default for TrackDesc {
    fn default() -> Self {
        Self {
            output_index: 0,
            precision: 0.0001,
            constant_threshold: 0.00001,
        }
    }
}

/// Samples of one track, typed by element
#[derive(Debug, Clone, PartialEq)]
pub enum TrackSamples {
    Float1(Vec<f32>),
    Float2(Vec<Vec2>),
    Float3(Vec<Vec3>),
    Float4(Vec<Vec4>),
    Vector4(Vec<Vec4>),
}

impl TrackSamples {
    pub fn track_type(&self) -> TrackType {
        match self {
            TrackSamples::Float1(_) => TrackType::Float1f,
            TrackSamples::Float2(_) => TrackType::Float2f,
            TrackSamples::Float3(_) => TrackType::Float3f,
            TrackSamples::Float4(_) => TrackType::Float4f,
            TrackSamples::Vector4(_) => TrackType::Vector4f,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TrackSamples::Float1(samples) => samples.len(),
            TrackSamples::Float2(samples) => samples.len(),
            TrackSamples::Float3(samples) => samples.len(),
            TrackSamples::Float4(samples) | TrackSamples::Vector4(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One sampled channel
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub desc: TrackDesc,
    /// Samples per second
    pub sample_rate: f32,
    pub samples: TrackSamples,
}

impl Track {
    pub fn new(desc: TrackDesc, sample_rate: f32, samples: TrackSamples) -> Self {
        Self {
            desc,
            sample_rate,
            samples,
        }
    }

    pub fn float1(desc: TrackDesc, sample_rate: f32, samples: Vec<f32>) -> Self {
        Self::new(desc, sample_rate, TrackSamples::Float1(samples))
    }

    pub fn float3(desc: TrackDesc, sample_rate: f32, samples: Vec<Vec3>) -> Self {
        Self::new(desc, sample_rate, TrackSamples::Float3(samples))
    }

    pub fn vector4(desc: TrackDesc, sample_rate: f32, samples: Vec<Vec4>) -> Self {
        Self::new(desc, sample_rate, TrackSamples::Vector4(samples))
    }

    #[inline]
    pub fn track_type(&self) -> TrackType {
        self.samples.track_type()
    }

    #[inline]
    pub fn num_samples(&self) -> u32 {
        self.samples.len() as u32
    }

    pub fn duration(&self) -> f32 {
        calculate_duration(self.num_samples(), self.sample_rate)
    }

    /// Whether every sample is within the constant threshold of the first
    pub fn is_constant(&self) -> bool {
        let threshold = self.desc.constant_threshold;
        match &self.samples {
            TrackSamples::Float1(s) => s.iter().all(|v| (v - s[0]).abs() <= threshold),
            TrackSamples::Float2(s) => {
                s.iter().all(|v| (*v - s[0]).abs().max_element() <= threshold)
            }
            TrackSamples::Float3(s) => {
                s.iter().all(|v| (*v - s[0]).abs().max_element() <= threshold)
            }
            TrackSamples::Float4(s) | TrackSamples::Vector4(s) => {
                s.iter().all(|v| (*v - s[0]).abs().max_element() <= threshold)
            }
        }
    }
}

/// Receives sampled values, one call per track
///
/// Every method defaults to ignoring the value, so a writer only implements
/// the types it expects.
pub trait TrackWriter {
    fn write_float1(&mut self, _track_index: u32, _value: f32) {}
    fn write_float2(&mut self, _track_index: u32, _value: Vec2) {}
    fn write_float3(&mut self, _track_index: u32, _value: Vec3) {}
    fn write_float4(&mut self, _track_index: u32, _value: Vec4) {}
    fn write_vector4(&mut self, _track_index: u32, _value: Vec4) {}
}

/// Tracks of one element type and sample count
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackArray {
    tracks: Vec<Track>,
}

impl TrackArray {
    pub fn new(tracks: Vec<Track>) -> Self {
        Self { tracks }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_type(&self) -> Option<TrackType> {
        self.tracks.first().map(Track::track_type)
    }

    pub fn num_samples_per_track(&self) -> u32 {
        self.tracks.first().map_or(0, Track::num_samples)
    }

    pub fn sample_rate(&self) -> f32 {
        self.tracks.first().map_or(0.0, |track| track.sample_rate)
    }

    pub fn duration(&self) -> f32 {
        self.tracks.first().map_or(0.0, Track::duration)
    }

    /// Bytes of raw samples, for comparison against a compressed size
    pub fn raw_size(&self) -> usize {
        let num_samples = self.num_samples_per_track() as usize;
        self.tracks
            .iter()
            .map(|track| num_samples * track.track_type().element_size())
            .sum()
    }

    /// Every track must share the first track's type and sample count
    pub fn is_valid(&self) -> Result<()> {
        let Some(first) = self.tracks.first() else {
            return Ok(());
        };
        let expected_type = first.track_type();
        let expected_samples = first.num_samples();

        for (index, track) in self.tracks.iter().enumerate() {
            if !track.desc.is_valid() {
                return Err(AnimError::InvalidTrackDesc {
                    track: index,
                    precision: track.desc.precision,
                    constant_threshold: track.desc.constant_threshold,
                });
            }
            if track.track_type() != expected_type {
                return Err(AnimError::TrackTypeMismatch {
                    track: index,
                    expected: expected_type.name(),
                    found: track.track_type().name(),
                });
            }
            if track.num_samples() != expected_samples {
                return Err(AnimError::TrackSampleCountMismatch {
                    track: index,
                    expected: expected_samples,
                    found: track.num_samples(),
                });
            }
        }
        Ok(())
    }

    /// Every track at `sample_time`
    pub fn sample_tracks<W: TrackWriter>(
        &self,
        sample_time: f32,
        rounding: SampleRoundingPolicy,
        writer: &mut W,
    ) {
        for index in 0..self.tracks.len() {
            self.sample_track(index, sample_time, rounding, writer);
        }
    }

    /// One track at `sample_time`, written under its output index
    pub fn sample_track<W: TrackWriter>(
        &self,
        track_index: usize,
        sample_time: f32,
        rounding: SampleRoundingPolicy,
        writer: &mut W,
    ) {
        let track = &self.tracks[track_index];
        let output_index = track.desc.output_index;
        if output_index == INVALID_TRACK_INDEX {
            return;
        }

        let keys = TrackTime {
            local_time: sample_time,
            rounding,
        }
        .keys_for(track.num_samples(), track.sample_rate);
        let (key0, key1, alpha) = (keys.key0 as usize, keys.key1 as usize, keys.alpha);

        match &track.samples {
            TrackSamples::Float1(s) => {
                writer.write_float1(output_index, s[key0] + (s[key1] - s[key0]) * alpha)
            }
            TrackSamples::Float2(s) => {
                writer.write_float2(output_index, s[key0].lerp(s[key1], alpha))
            }
            TrackSamples::Float3(s) => {
                writer.write_float3(output_index, s[key0].lerp(s[key1], alpha))
            }
            TrackSamples::Float4(s) => {
                writer.write_float4(output_index, s[key0].lerp(s[key1], alpha))
            }
            TrackSamples::Vector4(s) => {
                writer.write_vector4(output_index, s[key0].lerp(s[key1], alpha))
            }
        }
    }
}
