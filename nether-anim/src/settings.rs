//! Compression settings (TOML)
//!
//! Every field has a default, so a settings file only needs to list what it
//! overrides:
//!
//! ```toml
//! rotation_format = "QuatDropW_Variable"
//! error_threshold = 0.05
//! segment_range_reduction = "Always"
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{AnimError, Result};
use crate::format::{RotationFormat, TrackKind, VectorFormat};

/// When segment-local range reduction is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SegmentRangeReduction {
    /// Try with and without per segment, keep the smaller encoding
    #[default]
    Compare,
    /// Always normalize segments
    Always,
    /// Clip ranges only
    Never,
}

/// How a clip blends on top of a base pose
///
/// Only `Additive1` changes decoding: its scale is relative to zero, so the
/// neutral scale is `0` instead of `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AdditiveClipFormat {
    #[default]
    None,
    Relative,
    Additive0,
    Additive1,
}

impl AdditiveClipFormat {
    pub fn default_scale(self) -> Vec3 {
        match self {
            AdditiveClipFormat::Additive1 => Vec3::ZERO,
            _ => Vec3::ONE,
        }
    }
}

/// Compression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// Rotation storage (default: QuatDropW_Variable)
    #[serde(default)]
    pub rotation_format: RotationFormat,
    /// Translation storage (default: Vector3_Variable)
    #[serde(default)]
    pub translation_format: VectorFormat,
    /// Scale storage (default: Vector3_Variable)
    #[serde(default)]
    pub scale_format: VectorFormat,

    /// Normalize animated tracks against the clip range (default: true)
    #[serde(default = "default_true")]
    pub range_reduction: bool,
    /// Normalize animated tracks against each segment's range (default: Compare)
    #[serde(default)]
    pub segment_range_reduction: SegmentRangeReduction,

    /// Split long clips into segments (default: true)
    #[serde(default = "default_true")]
    pub segmenting_enabled: bool,
    /// Preferred samples per segment (default: 16)
    #[serde(default = "default_segment_target")]
    pub segment_target_sample_count: u32,
    /// Clips up to this many samples stay in one segment (default: 31)
    #[serde(default = "default_segment_max")]
    pub segment_max_sample_count: u32,

    /// Constant rotation tolerance (default: 0.00001)
    #[serde(default = "default_constant_rotation_threshold")]
    pub constant_rotation_threshold: f32,
    /// Constant translation tolerance in cm (default: 0.001)
    #[serde(default = "default_constant_translation_threshold")]
    pub constant_translation_threshold: f32,
    /// Constant scale tolerance (default: 0.00001)
    #[serde(default = "default_constant_scale_threshold")]
    pub constant_scale_threshold: f32,

    /// Maximum skinning error in cm (default: 0.01)
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f32,
    /// Virtual vertex distance from each bone in cm (default: 3.0)
    #[serde(default = "default_vertex_distance")]
    pub vertex_distance: f32,
}

fn default_true() -> bool {
    true
}
fn default_segment_target() -> u32 {
    16
}
fn default_segment_max() -> u32 {
    31
}
fn default_constant_rotation_threshold() -> f32 {
    0.00001
}
fn default_constant_translation_threshold() -> f32 {
    0.001
}
fn default_constant_scale_threshold() -> f32 {
    0.00001
}
fn default_error_threshold() -> f32 {
    0.01
}
fn default_vertex_distance() -> f32 {
    3.0
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            rotation_format: RotationFormat::default(),
            translation_format: VectorFormat::default(),
            scale_format: VectorFormat::default(),
            range_reduction: true,
            segment_range_reduction: SegmentRangeReduction::default(),
            segmenting_enabled: true,
            segment_target_sample_count: default_segment_target(),
            segment_max_sample_count: default_segment_max(),
            constant_rotation_threshold: default_constant_rotation_threshold(),
            constant_translation_threshold: default_constant_translation_threshold(),
            constant_scale_threshold: default_constant_scale_threshold(),
            error_threshold: default_error_threshold(),
            vertex_distance: default_vertex_distance(),
        }
    }
}

impl CompressionSettings {
    /// Parse settings from TOML, then validate them
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: CompressionSettings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Settings that keep every track at full precision
    pub fn lossless() -> Self {
        Self {
            rotation_format: RotationFormat::Quat128,
            translation_format: VectorFormat::Vector3_96,
            scale_format: VectorFormat::Vector3_96,
            range_reduction: false,
            segment_range_reduction: SegmentRangeReduction::Never,
            ..Self::default()
        }
    }

    pub fn constant_threshold(&self, kind: TrackKind) -> f32 {
        match kind {
            TrackKind::Rotation => self.constant_rotation_threshold,
            TrackKind::Translation => self.constant_translation_threshold,
            TrackKind::Scale => self.constant_scale_threshold,
        }
    }

    /// Whether `kind` is stored at full precision (never range reduced)
    pub fn is_full_precision(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Rotation => self.rotation_format.is_full_precision(),
            TrackKind::Translation => self.translation_format.is_full_precision(),
            TrackKind::Scale => self.scale_format.is_full_precision(),
        }
    }

    pub fn is_variable(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Rotation => self.rotation_format.is_variable(),
            TrackKind::Translation => self.translation_format.is_variable(),
            TrackKind::Scale => self.scale_format.is_variable(),
        }
    }

    /// Check that the settings describe an encodable configuration
    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("constant_rotation_threshold", self.constant_rotation_threshold),
            ("constant_translation_threshold", self.constant_translation_threshold),
            ("constant_scale_threshold", self.constant_scale_threshold),
            ("error_threshold", self.error_threshold),
            ("vertex_distance", self.vertex_distance),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() || value <= 0.0 {
                return Err(AnimError::InvalidSettings(format!(
                    "{} must be finite and > 0, got {}",
                    name, value
                )));
            }
        }

        if self.segment_target_sample_count == 0 {
            return Err(AnimError::InvalidSettings(
                "segment_target_sample_count must be > 0".to_string(),
            ));
        }
        if self.segment_target_sample_count > self.segment_max_sample_count {
            return Err(AnimError::InvalidSettings(format!(
                "segment_target_sample_count ({}) exceeds segment_max_sample_count ({})",
                self.segment_target_sample_count, self.segment_max_sample_count
            )));
        }

        if !self.range_reduction {
            // Quantized vectors have no signed encoding without a range
            for (name, format) in [
                ("translation_format", self.translation_format),
                ("scale_format", self.scale_format),
            ] {
                if !format.is_full_precision() {
                    return Err(AnimError::InvalidSettings(format!(
                        "{} {} requires range_reduction",
                        name, format
                    )));
                }
            }
            if self.rotation_format.is_variable() {
                return Err(AnimError::InvalidSettings(format!(
                    "rotation_format {} requires range_reduction",
                    self.rotation_format
                )));
            }
        }

        Ok(())
    }
}
