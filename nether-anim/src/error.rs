//! Error types for clip validation and settings

use crate::format::TrackKind;

/// Errors reported before any compression work starts.
///
/// Encoder/decoder mismatches and out-of-range indices are programmer errors
/// and panic instead; a precision shortfall is never an error (the selector
/// falls back to the raw bit-rate).
#[derive(Debug, thiserror::Error)]
pub enum AnimError {
    /// Clip has no samples
    #[error("clip has no samples")]
    EmptyClip,

    /// Clip has no bones
    #[error("clip has no bones")]
    NoBones,

    /// Too many bones for a 16-bit bone index
    #[error("clip has {0} bones (max 65535)")]
    TooManyBones(usize),

    /// Sample rate must be finite and positive
    #[error("invalid sample rate {0} (must be finite and > 0)")]
    InvalidSampleRate(f32),

    /// A bone track does not carry the clip's sample count
    #[error("bone {bone} {kind} track has {found} samples, expected {expected}")]
    SampleCountMismatch {
        bone: usize,
        kind: TrackKind,
        expected: u32,
        found: usize,
    },

    /// Clip and skeleton disagree on the number of bones
    #[error("clip has {clip} bones but skeleton has {skeleton}")]
    SkeletonMismatch { clip: usize, skeleton: usize },

    /// Parent must exist and precede its child
    #[error("bone {bone} has invalid parent {parent}")]
    InvalidParent { bone: usize, parent: u16 },

    /// Track arrays require one element type for every track
    #[error("track {track} has type {found}, expected {expected} (tracks must share one type)")]
    TrackTypeMismatch {
        track: usize,
        expected: &'static str,
        found: &'static str,
    },

    /// Track arrays require one sample count for every track
    #[error("track {track} has {found} samples, expected {expected}")]
    TrackSampleCountMismatch {
        track: usize,
        expected: u32,
        found: u32,
    },

    /// Precision must be finite and positive, the constant threshold finite and not negative
    #[error(
        "track {track} has precision {precision} and constant threshold {constant_threshold}"
    )]
    InvalidTrackDesc {
        track: usize,
        precision: f32,
        constant_threshold: f32,
    },

    /// Settings failed validation
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Settings file could not be parsed
    #[error("failed to parse settings: {0}")]
    SettingsParse(#[from] toml::de::Error),

    /// Settings could not be written out
    #[error("failed to serialize settings: {0}")]
    SettingsSerialize(#[from] toml::ser::Error),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, AnimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_descriptive() {
        let err = AnimError::SampleCountMismatch {
            bone: 3,
            kind: TrackKind::Translation,
            expected: 30,
            found: 29,
        };
        assert_eq!(
            err.to_string(),
            "bone 3 translation track has 29 samples, expected 30"
        );

        let err = AnimError::InvalidParent { bone: 1, parent: 4 };
        assert_eq!(err.to_string(), "bone 1 has invalid parent 4");
    }
}
