//! Pose sampler
//!
//! Reconstructs local bone transforms from any [`TrackStorage`]. Key
//! resolution is chosen at compile time through a [`Distribution`], so the
//! per-track loop is monomorphized for both the storage and the distribution;
//! the `*_with` entry points do the one runtime dispatch per call.
//!
//! Per track:
//! - default: neutral value, no reads
//! - constant: the single stored sample
//! - animated: `key0`, plus `key1` and a blend when rounding is `None`

use glam::{Quat, Vec3};

use crate::format::TrackKind;
use crate::interpolation::{
    KeyPair, SampleRoundingPolicy, clamp_keys_to_segment, find_linear_interpolation_samples,
    get_uniform_sample_key,
};
use crate::math::{Transform, quat_nlerp};
use crate::segment::SampleDistribution;
use crate::skeleton::RigidSkeleton;
use crate::storage::{TrackState, TrackStorage};

// ============================================================================
// Key Resolution
// ============================================================================

/// Resolves the keys of one track
pub trait KeySource {
    fn keys<S: TrackStorage>(&self, storage: &S, transform: usize, kind: TrackKind) -> KeyPair;
}

/// Keys shared by every track
impl KeySource for KeyPair {
    #[inline]
    fn keys<S: TrackStorage>(&self, _storage: &S, _transform: usize, _kind: TrackKind) -> KeyPair {
        *self
    }
}

/// Segment-local time, resolved per track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackTime {
    pub local_time: f32,
    pub rounding: SampleRoundingPolicy,
}

impl TrackTime {
    /// Keys of a track with its own sample count and rate
    #[inline]
    pub fn keys_for(&self, num_samples: u32, sample_rate: f32) -> KeyPair {
        find_linear_interpolation_samples(num_samples, sample_rate, self.local_time, self.rounding)
    }
}

impl KeySource for TrackTime {
    #[inline]
    fn keys<S: TrackStorage>(&self, storage: &S, transform: usize, kind: TrackKind) -> KeyPair {
        self.keys_for(
            storage.track_num_samples(transform, kind),
            storage.track_sample_rate(transform, kind),
        )
    }
}

/// Compile-time sample distribution
pub trait Distribution {
    type Keys: KeySource;

    fn resolve<S: TrackStorage>(
        storage: &S,
        sample_time: f32,
        rounding: SampleRoundingPolicy,
    ) -> Self::Keys;
}

/// Clip-wide keys computed once, clamped into the segment
#[derive(Debug, Clone, Copy)]
pub struct Uniform;

/// Per-track keys from each track's own sample count and rate
#[derive(Debug, Clone, Copy)]
pub struct Variable;

impl Distribution for Uniform {
    type Keys = KeyPair;

    fn resolve<S: TrackStorage>(
        storage: &S,
        sample_time: f32,
        rounding: SampleRoundingPolicy,
    ) -> KeyPair {
        if rounding == SampleRoundingPolicy::Nearest {
            return KeyPair::exact(get_uniform_sample_key(
                storage.clip_num_samples(),
                storage.sample_rate(),
                storage.segment_start(),
                storage.num_samples(),
                sample_time,
            ));
        }
        let keys = find_linear_interpolation_samples(
            storage.clip_num_samples(),
            storage.sample_rate(),
            sample_time,
            rounding,
        );
        clamp_keys_to_segment(keys, storage.segment_start(), storage.num_samples())
    }
}

impl Distribution for Variable {
    type Keys = TrackTime;

    fn resolve<S: TrackStorage>(
        storage: &S,
        sample_time: f32,
        rounding: SampleRoundingPolicy,
    ) -> TrackTime {
        let segment_time = storage.segment_start() as f32 / storage.sample_rate();
        TrackTime {
            local_time: (sample_time - segment_time).max(0.0),
            rounding,
        }
    }
}

// ============================================================================
// Per-Track Sampling
// ============================================================================

#[inline]
fn interpolates(keys: &KeyPair, rounding: SampleRoundingPolicy) -> bool {
    rounding == SampleRoundingPolicy::None && keys.alpha != 0.0
}

fn sample_rotation<S: TrackStorage, K: KeySource>(
    storage: &S,
    keys: &K,
    transform: usize,
    rounding: SampleRoundingPolicy,
) -> Quat {
    match storage.track_state(transform, TrackKind::Rotation) {
        TrackState::Default => Quat::IDENTITY,
        TrackState::Constant => storage.rotation(transform, 0),
        TrackState::Animated => {
            let keys = keys.keys(storage, transform, TrackKind::Rotation);
            if interpolates(&keys, rounding) {
                let sample0 = storage.rotation(transform, keys.key0);
                let sample1 = storage.rotation(transform, keys.key1);
                quat_nlerp(sample0, sample1, keys.alpha)
            } else {
                storage.rotation(transform, keys.nearest_key())
            }
        }
    }
}

fn sample_vector<S: TrackStorage, K: KeySource>(
    storage: &S,
    keys: &K,
    transform: usize,
    kind: TrackKind,
    rounding: SampleRoundingPolicy,
) -> Vec3 {
    match storage.track_state(transform, kind) {
        TrackState::Default => match kind {
            TrackKind::Scale => storage.default_scale(),
            _ => Vec3::ZERO,
        },
        TrackState::Constant => storage.vector(transform, kind, 0),
        TrackState::Animated => {
            let keys = keys.keys(storage, transform, kind);
            if interpolates(&keys, rounding) {
                let sample0 = storage.vector(transform, kind, keys.key0);
                let sample1 = storage.vector(transform, kind, keys.key1);
                sample0.lerp(sample1, keys.alpha)
            } else {
                storage.vector(transform, kind, keys.nearest_key())
            }
        }
    }
}

/// One bone's local transform using already-resolved keys
#[inline]
pub fn sample_transform<S: TrackStorage, K: KeySource>(
    storage: &S,
    keys: &K,
    transform: usize,
    rounding: SampleRoundingPolicy,
) -> Transform {
    Transform {
        rotation: sample_rotation(storage, keys, transform, rounding),
        translation: sample_vector(storage, keys, transform, TrackKind::Translation, rounding),
        scale: sample_vector(storage, keys, transform, TrackKind::Scale, rounding),
    }
}

// ============================================================================
// Entry Points
// ============================================================================

/// Every bone at `sample_time`
pub fn sample_pose<D: Distribution, S: TrackStorage>(
    storage: &S,
    sample_time: f32,
    rounding: SampleRoundingPolicy,
    out_pose: &mut [Transform],
) {
    let keys = D::resolve(storage, sample_time, rounding);
    sample_pose_with_keys(storage, &keys, rounding, out_pose);
}

/// Every bone with already-resolved keys
pub fn sample_pose_with_keys<S: TrackStorage, K: KeySource>(
    storage: &S,
    keys: &K,
    rounding: SampleRoundingPolicy,
    out_pose: &mut [Transform],
) {
    assert_eq!(
        out_pose.len(),
        storage.num_transforms(),
        "pose buffer does not match the bone count"
    );
    for (transform, out) in out_pose.iter_mut().enumerate() {
        *out = sample_transform(storage, keys, transform, rounding);
    }
}

/// One bone at `sample_time`
pub fn sample_bone<D: Distribution, S: TrackStorage>(
    storage: &S,
    bone: usize,
    sample_time: f32,
    rounding: SampleRoundingPolicy,
) -> Transform {
    let keys = D::resolve(storage, sample_time, rounding);
    sample_transform(storage, &keys, bone, rounding)
}

/// `bone` and all of its ancestors, written into `out_pose` at their indices
pub fn sample_bone_chain<D: Distribution, S: TrackStorage>(
    storage: &S,
    skeleton: &RigidSkeleton,
    bone: usize,
    sample_time: f32,
    rounding: SampleRoundingPolicy,
    out_pose: &mut [Transform],
) {
    let keys = D::resolve(storage, sample_time, rounding);
    sample_bone_chain_with_keys(storage, skeleton, bone, &keys, rounding, out_pose);
}

pub fn sample_bone_chain_with_keys<S: TrackStorage, K: KeySource>(
    storage: &S,
    skeleton: &RigidSkeleton,
    bone: usize,
    keys: &K,
    rounding: SampleRoundingPolicy,
    out_pose: &mut [Transform],
) {
    let mut current = Some(bone);
    while let Some(index) = current {
        out_pose[index] = sample_transform(storage, keys, index, rounding);
        current = skeleton.parent(index);
    }
}

/// Every bone at exactly `sample_index` (segment-local), no interpolation
pub fn sample_pose_at_index<S: TrackStorage>(
    storage: &S,
    sample_index: u32,
    out_pose: &mut [Transform],
) {
    assert!(
        sample_index < storage.num_samples(),
        "sample index {} out of range ({} samples)",
        sample_index,
        storage.num_samples()
    );
    sample_pose_with_keys(
        storage,
        &KeyPair::exact(sample_index),
        SampleRoundingPolicy::Floor,
        out_pose,
    );
}

/// `bone` and its ancestors at exactly `sample_index`
pub fn sample_bone_chain_at_index<S: TrackStorage>(
    storage: &S,
    skeleton: &RigidSkeleton,
    bone: usize,
    sample_index: u32,
    out_pose: &mut [Transform],
) {
    assert!(
        sample_index < storage.num_samples(),
        "sample index {} out of range ({} samples)",
        sample_index,
        storage.num_samples()
    );
    sample_bone_chain_with_keys(
        storage,
        skeleton,
        bone,
        &KeyPair::exact(sample_index),
        SampleRoundingPolicy::Floor,
        out_pose,
    );
}

/// [`sample_pose`] with the distribution picked at runtime
pub fn sample_pose_with<S: TrackStorage>(
    distribution: SampleDistribution,
    storage: &S,
    sample_time: f32,
    rounding: SampleRoundingPolicy,
    out_pose: &mut [Transform],
) {
    match distribution {
        SampleDistribution::Uniform => {
            sample_pose::<Uniform, S>(storage, sample_time, rounding, out_pose)
        }
        SampleDistribution::Variable => {
            sample_pose::<Variable, S>(storage, sample_time, rounding, out_pose)
        }
    }
}

/// [`sample_bone`] with the distribution picked at runtime
pub fn sample_bone_with<S: TrackStorage>(
    distribution: SampleDistribution,
    storage: &S,
    bone: usize,
    sample_time: f32,
    rounding: SampleRoundingPolicy,
) -> Transform {
    match distribution {
        SampleDistribution::Uniform => {
            sample_bone::<Uniform, S>(storage, bone, sample_time, rounding)
        }
        SampleDistribution::Variable => {
            sample_bone::<Variable, S>(storage, bone, sample_time, rounding)
        }
    }
}

/// [`sample_bone_chain`] with the distribution picked at runtime
pub fn sample_bone_chain_with<S: TrackStorage>(
    distribution: SampleDistribution,
    storage: &S,
    skeleton: &RigidSkeleton,
    bone: usize,
    sample_time: f32,
    rounding: SampleRoundingPolicy,
    out_pose: &mut [Transform],
) {
    match distribution {
        SampleDistribution::Uniform => sample_bone_chain::<Uniform, S>(
            storage,
            skeleton,
            bone,
            sample_time,
            rounding,
            out_pose,
        ),
        SampleDistribution::Variable => sample_bone_chain::<Variable, S>(
            storage,
            skeleton,
            bone,
            sample_time,
            rounding,
            out_pose,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{AnimatedBone, AnimationClip};
    use crate::database::TrackDatabase;
    use crate::settings::CompressionSettings;
    use crate::storage::SegmentView;

    fn sliding_clip(num_samples: u32) -> AnimationClip {
        let bones = vec![
            AnimatedBone::from_fn(num_samples, |i| {
                Transform::new(Quat::IDENTITY, Vec3::new(i as f32, 0.0, 0.0), Vec3::ONE)
            }),
            AnimatedBone::from_fn(num_samples, |i| {
                Transform::new(
                    Quat::from_rotation_y(i as f32 * 0.1),
                    Vec3::new(0.0, 10.0, 0.0),
                    Vec3::ONE,
                )
            }),
        ];
        AnimationClip::new("slide", num_samples, 30.0, bones)
    }

    #[test]
    fn test_uniform_interpolates_between_keys() {
        let clip = sliding_clip(8);
        let db = TrackDatabase::from_clip(&clip, &CompressionSettings::default());
        let view = SegmentView::new(&db, 0);

        let mut pose = vec![Transform::IDENTITY; 2];
        sample_pose::<Uniform, _>(&view, 2.25 / 30.0, SampleRoundingPolicy::None, &mut pose);
        assert!((pose[0].translation.x - 2.25).abs() < 1e-4);

        sample_pose::<Uniform, _>(&view, 2.25 / 30.0, SampleRoundingPolicy::Nearest, &mut pose);
        assert_eq!(pose[0].translation.x, 2.0);
        sample_pose::<Uniform, _>(&view, 2.25 / 30.0, SampleRoundingPolicy::Ceil, &mut pose);
        assert_eq!(pose[0].translation.x, 3.0);
    }

    #[test]
    fn test_segment_clamp_never_reads_past_end() {
        let clip = sliding_clip(50);
        let db = TrackDatabase::from_clip(&clip, &CompressionSettings::default());
        assert_eq!(db.segments().len(), 3);
        let view = SegmentView::new(&db, 0);
        let last = view.num_samples() - 1;

        let mut pose = vec![Transform::IDENTITY; 2];
        sample_pose::<Uniform, _>(&view, 10.0, SampleRoundingPolicy::None, &mut pose);
        assert_eq!(pose[0].translation.x, last as f32);

        // Between the segment's last sample and the next segment's first
        let between = (last as f32 + 0.5) / 30.0;
        sample_pose::<Uniform, _>(&view, between, SampleRoundingPolicy::None, &mut pose);
        assert_eq!(pose[0].translation.x, last as f32);
    }

    #[test]
    fn test_variable_uses_segment_local_time() {
        let clip = sliding_clip(50);
        let db = TrackDatabase::from_clip(&clip, &CompressionSettings::default());
        let view = SegmentView::new(&db, 1);
        let start = view.segment_start();

        let mut pose = vec![Transform::IDENTITY; 2];
        let t = (start as f32 + 1.5) / 30.0;
        let rounding = SampleRoundingPolicy::None;
        sample_pose_with(SampleDistribution::Variable, &view, t, rounding, &mut pose);
        assert!((pose[0].translation.x - (start as f32 + 1.5)).abs() < 1e-3);

        let mut uniform = vec![Transform::IDENTITY; 2];
        sample_pose_with(
            SampleDistribution::Uniform,
            &view,
            t,
            rounding,
            &mut uniform,
        );
        assert!((uniform[0].translation.x - pose[0].translation.x).abs() < 1e-3);
    }

    #[test]
    fn test_chain_matches_full_pose() {
        let clip = sliding_clip(8);
        let db = TrackDatabase::from_clip(&clip, &CompressionSettings::default());
        let view = SegmentView::new(&db, 0);
        let skeleton = RigidSkeleton::chain(2).unwrap();

        let mut full = vec![Transform::IDENTITY; 2];
        let mut chain = vec![Transform::IDENTITY; 2];
        sample_pose::<Uniform, _>(&view, 3.7 / 30.0, SampleRoundingPolicy::None, &mut full);
        sample_bone_chain::<Uniform, _>(
            &view,
            &skeleton,
            1,
            3.7 / 30.0,
            SampleRoundingPolicy::None,
            &mut chain,
        );
        assert_eq!(full, chain);

        let single = sample_bone::<Uniform, _>(&view, 1, 3.7 / 30.0, SampleRoundingPolicy::None);
        assert_eq!(single, full[1]);
    }

    #[test]
    fn test_exact_index() {
        let clip = sliding_clip(8);
        let db = TrackDatabase::from_clip(&clip, &CompressionSettings::default());
        let view = SegmentView::new(&db, 0);

        let mut pose = vec![Transform::IDENTITY; 2];
        sample_pose_at_index(&view, 5, &mut pose);
        assert_eq!(pose[0].translation.x, 5.0);
        let expected = Quat::from_rotation_y(0.5);
        assert!(pose[1].rotation.dot(expected).abs() > 0.99999);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_exact_index_out_of_range_panics() {
        let clip = sliding_clip(8);
        let db = TrackDatabase::from_clip(&clip, &CompressionSettings::default());
        let view = SegmentView::new(&db, 0);
        let mut pose = vec![Transform::IDENTITY; 2];
        sample_pose_at_index(&view, 8, &mut pose);
    }
}
