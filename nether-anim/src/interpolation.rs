//! Key resolution: maps a sample time onto two bracketing keys and a blend alpha

/// How the interpolation alpha is snapped once keys are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleRoundingPolicy {
    /// Keep the exact alpha and interpolate
    #[default]
    None,
    /// Always return the first key
    Floor,
    /// Always return the second key
    Ceil,
    /// Return whichever key is closest
    Nearest,
}

impl SampleRoundingPolicy {
    #[inline]
    pub fn apply(self, alpha: f32) -> f32 {
        match self {
            SampleRoundingPolicy::None => alpha,
            SampleRoundingPolicy::Floor => 0.0,
            SampleRoundingPolicy::Ceil => 1.0,
            SampleRoundingPolicy::Nearest => {
                if alpha >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Two bracketing keys and the blend factor between them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPair {
    pub key0: u32,
    pub key1: u32,
    pub alpha: f32,
}

impl KeyPair {
    /// Single key, no interpolation
    pub fn exact(key: u32) -> Self {
        Self {
            key0: key,
            key1: key,
            alpha: 0.0,
        }
    }

    /// Key nearest to the blend point
    #[inline]
    pub fn nearest_key(&self) -> u32 {
        if self.alpha == 0.0 { self.key0 } else { self.key1 }
    }
}

/// Duration in seconds of `num_samples` samples at `sample_rate`
///
/// A single sample lasts zero seconds.
pub fn calculate_duration(num_samples: u32, sample_rate: f32) -> f32 {
    if num_samples <= 1 || sample_rate <= 0.0 {
        return 0.0;
    }
    (num_samples - 1) as f32 / sample_rate
}

/// Resolves `sample_time` against a track of `num_samples` samples.
///
/// Times before zero clamp to the first key, times past the end to the last.
pub fn find_linear_interpolation_samples(
    num_samples: u32,
    sample_rate: f32,
    sample_time: f32,
    rounding: SampleRoundingPolicy,
) -> KeyPair {
    assert!(num_samples > 0, "cannot sample an empty track");

    let last_key = num_samples - 1;
    let sample_index = (sample_time.max(0.0) * sample_rate).max(0.0);
    let floor_index = sample_index.floor();

    if floor_index >= last_key as f32 {
        return KeyPair::exact(last_key);
    }

    let key0 = floor_index as u32;
    let key1 = (key0 + 1).min(last_key);
    let alpha = (sample_index - floor_index).clamp(0.0, 1.0);

    KeyPair {
        key0,
        key1,
        alpha: rounding.apply(alpha),
    }
}

/// Clip-global keys mapped into a segment's local key range.
///
/// Keys before the segment snap to its first sample; keys at or past its end
/// snap to the last local sample with alpha forced to zero.
pub fn clamp_keys_to_segment(
    keys: KeyPair,
    segment_start: u32,
    segment_num_samples: u32,
) -> KeyPair {
    assert!(segment_num_samples > 0, "segment has no samples");

    let last_local = segment_num_samples - 1;
    let local0 = keys.key0 as i64 - segment_start as i64;
    let local1 = keys.key1 as i64 - segment_start as i64;
    let mut alpha = keys.alpha;

    let key0 = if local0 < 0 {
        alpha = 1.0;
        0
    } else if local0 > last_local as i64 {
        alpha = 0.0;
        last_local
    } else {
        local0 as u32
    };

    let key1 = if local1 < 0 {
        0
    } else if local1 > last_local as i64 {
        alpha = 0.0;
        last_local
    } else {
        local1 as u32
    };

    KeyPair { key0, key1, alpha }
}

/// Segment-local key closest to `sample_time`
pub fn get_uniform_sample_key(
    clip_num_samples: u32,
    sample_rate: f32,
    segment_start: u32,
    segment_num_samples: u32,
    sample_time: f32,
) -> u32 {
    let keys = find_linear_interpolation_samples(
        clip_num_samples,
        sample_rate,
        sample_time,
        SampleRoundingPolicy::Nearest,
    );
    clamp_keys_to_segment(keys, segment_start, segment_num_samples).nearest_key()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration() {
        assert_eq!(calculate_duration(0, 30.0), 0.0);
        assert_eq!(calculate_duration(1, 30.0), 0.0);
        assert!((calculate_duration(31, 30.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_keys_between_samples() {
        let keys =
            find_linear_interpolation_samples(4, 30.0, 0.5 / 30.0, SampleRoundingPolicy::None);
        assert_eq!(keys.key0, 0);
        assert_eq!(keys.key1, 1);
        assert!((keys.alpha - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_rounding_policies() {
        let t = 1.7 / 30.0;
        let floor = find_linear_interpolation_samples(4, 30.0, t, SampleRoundingPolicy::Floor);
        let ceil = find_linear_interpolation_samples(4, 30.0, t, SampleRoundingPolicy::Ceil);
        let nearest = find_linear_interpolation_samples(4, 30.0, t, SampleRoundingPolicy::Nearest);
        assert_eq!(floor.alpha, 0.0);
        assert_eq!(ceil.alpha, 1.0);
        assert_eq!(nearest.alpha, 1.0);
        assert_eq!(nearest.nearest_key(), 2);
        assert_eq!(floor.nearest_key(), 1);
    }

    #[test]
    fn test_time_past_end_clamps_to_last_key() {
        let keys = find_linear_interpolation_samples(4, 30.0, 10.0, SampleRoundingPolicy::None);
        assert_eq!(keys, KeyPair::exact(3));

        let keys = find_linear_interpolation_samples(4, 30.0, -1.0, SampleRoundingPolicy::None);
        assert_eq!(keys.key0, 0);
        assert_eq!(keys.alpha, 0.0);
    }

    #[test]
    fn test_segment_clamp_past_end() {
        // Segment covers clip samples [16, 24)
        let keys = KeyPair {
            key0: 23,
            key1: 24,
            alpha: 0.6,
        };
        let local = clamp_keys_to_segment(keys, 16, 8);
        assert_eq!(local.key0, 7);
        assert_eq!(local.key1, 7);
        assert_eq!(local.alpha, 0.0);

        let keys = KeyPair::exact(40);
        let local = clamp_keys_to_segment(keys, 16, 8);
        assert_eq!(local, KeyPair::exact(7));
    }

    #[test]
    fn test_segment_clamp_before_start() {
        let keys = KeyPair {
            key0: 15,
            key1: 16,
            alpha: 0.25,
        };
        let local = clamp_keys_to_segment(keys, 16, 8);
        assert_eq!(local.key0, 0);
        assert_eq!(local.key1, 0);
        assert_eq!(local.alpha, 1.0);
    }

    #[test]
    fn test_uniform_sample_key_never_leaves_segment() {
        for i in 0..100 {
            let t = i as f32 / 60.0;
            let key = get_uniform_sample_key(40, 30.0, 16, 8, t);
            assert!(key < 8, "key {} out of range at t={}", key, t);
        }
        assert_eq!(get_uniform_sample_key(40, 30.0, 16, 8, 18.4 / 30.0), 2);
    }
}
