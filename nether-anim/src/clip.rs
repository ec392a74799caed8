//! Uncompressed animation clips

use glam::{Quat, Vec3};

use crate::error::{AnimError, Result};
use crate::format::TrackKind;
use crate::interpolation::{
    SampleRoundingPolicy, calculate_duration, find_linear_interpolation_samples,
};
use crate::math::Transform;
use crate::settings::AdditiveClipFormat;
use crate::skeleton::{INVALID_BONE_INDEX, RigidSkeleton};

/// Raw bytes per sampled bone transform (quat + 2 × vec3, all f32)
pub const RAW_TRANSFORM_SIZE: usize = 16 + 12 + 12;

/// Raw samples of one bone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimatedBone {
    pub rotations: Vec<Quat>,
    pub translations: Vec<Vec3>,
    pub scales: Vec<Vec3>,
}

impl AnimatedBone {
    /// Bone holding `transform` for `num_samples` samples
    pub fn constant(transform: Transform, num_samples: u32) -> Self {
        let n = num_samples as usize;
        Self {
            rotations: vec![transform.rotation; n],
            translations: vec![transform.translation; n],
            scales: vec![transform.scale; n],
        }
    }

    /// Bone whose samples come from `f(sample_index)`
    pub fn from_fn(num_samples: u32, mut f: impl FnMut(u32) -> Transform) -> Self {
        let mut bone = Self::default();
        for i in 0..num_samples {
            let transform = f(i);
            bone.rotations.push(transform.rotation);
            bone.translations.push(transform.translation);
            bone.scales.push(transform.scale);
        }
        bone
    }

    #[inline]
    pub fn sample(&self, sample_index: u32) -> Transform {
        let i = sample_index as usize;
        Transform::new(self.rotations[i], self.translations[i], self.scales[i])
    }

    fn track_len(&self, kind: TrackKind) -> usize {
        match kind {
            TrackKind::Rotation => self.rotations.len(),
            TrackKind::Translation => self.translations.len(),
            TrackKind::Scale => self.scales.len(),
        }
    }
}

/// A clip of uniformly sampled bone transforms
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub bones: Vec<AnimatedBone>,
    pub num_samples: u32,
    /// Samples per second
    pub sample_rate: f32,
    pub additive_format: AdditiveClipFormat,
}

impl AnimationClip {
    pub fn new(
        name: impl Into<String>,
        num_samples: u32,
        sample_rate: f32,
        bones: Vec<AnimatedBone>,
    ) -> Self {
        Self {
            name: name.into(),
            bones,
            num_samples,
            sample_rate,
            additive_format: AdditiveClipFormat::None,
        }
    }

    pub fn with_additive_format(mut self, additive_format: AdditiveClipFormat) -> Self {
        self.additive_format = additive_format;
        self
    }

    #[inline]
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn duration(&self) -> f32 {
        calculate_duration(self.num_samples, self.sample_rate)
    }

    /// Neutral scale for this clip's additive format
    pub fn default_scale(&self) -> Vec3 {
        self.additive_format.default_scale()
    }

    /// Size of the uncompressed sample data in bytes
    pub fn raw_size(&self) -> usize {
        self.bones.len() * self.num_samples as usize * RAW_TRANSFORM_SIZE
    }

    /// Check sample counts and the sample rate
    pub fn validate(&self) -> Result<()> {
        if self.bones.is_empty() {
            return Err(AnimError::NoBones);
        }
        if self.bones.len() >= INVALID_BONE_INDEX as usize {
            return Err(AnimError::TooManyBones(self.bones.len()));
        }
        if self.num_samples == 0 {
            return Err(AnimError::EmptyClip);
        }
        if !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return Err(AnimError::InvalidSampleRate(self.sample_rate));
        }

        for (bone_index, bone) in self.bones.iter().enumerate() {
            for kind in TrackKind::ALL {
                let found = bone.track_len(kind);
                if found != self.num_samples as usize {
                    return Err(AnimError::SampleCountMismatch {
                        bone: bone_index,
                        kind,
                        expected: self.num_samples,
                        found,
                    });
                }
            }
        }

        Ok(())
    }

    /// [`AnimationClip::validate`] plus agreement with `skeleton`
    pub fn validate_for(&self, skeleton: &RigidSkeleton) -> Result<()> {
        self.validate()?;
        if skeleton.num_bones() != self.bones.len() {
            return Err(AnimError::SkeletonMismatch {
                clip: self.bones.len(),
                skeleton: skeleton.num_bones(),
            });
        }
        Ok(())
    }

    /// Local pose at exactly `sample_index`
    pub fn sample_pose_at_index(&self, sample_index: u32) -> Vec<Transform> {
        self.bones.iter().map(|bone| bone.sample(sample_index)).collect()
    }

    /// Local pose at `sample_time`, interpolating the raw samples
    pub fn sample_pose(&self, sample_time: f32, rounding: SampleRoundingPolicy) -> Vec<Transform> {
        let keys = find_linear_interpolation_samples(
            self.num_samples,
            self.sample_rate,
            sample_time,
            rounding,
        );

        self.bones
            .iter()
            .map(|bone| bone.sample(keys.key0).blend(&bone.sample(keys.key1), keys.alpha))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_bone_clip() -> AnimationClip {
        let bones = vec![
            AnimatedBone::constant(Transform::IDENTITY, 4),
            AnimatedBone::from_fn(4, |i| {
                Transform::new(Quat::IDENTITY, Vec3::new(i as f32, 0.0, 0.0), Vec3::ONE)
            }),
        ];
        AnimationClip::new("walk", 4, 30.0, bones)
    }

    #[test]
    fn test_validate_accepts_well_formed_clip() {
        let clip = two_bone_clip();
        assert!(clip.validate().is_ok());
        assert!(clip.validate_for(&RigidSkeleton::chain(2).unwrap()).is_ok());
        assert_eq!(clip.raw_size(), 2 * 4 * 40);
        assert!((clip.duration() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_validate_reports_mismatched_track() {
        let mut clip = two_bone_clip();
        clip.bones[1].translations.pop();
        let err = clip.validate().unwrap_err();
        assert!(matches!(
            err,
            AnimError::SampleCountMismatch {
                bone: 1,
                kind: TrackKind::Translation,
                expected: 4,
                found: 3
            }
        ));
    }

    #[test]
    fn test_validate_rejects_bad_clips() {
        let mut clip = two_bone_clip();
        clip.sample_rate = 0.0;
        assert!(matches!(clip.validate(), Err(AnimError::InvalidSampleRate(_))));

        let clip = AnimationClip::new("empty", 0, 30.0, vec![AnimatedBone::default()]);
        assert!(matches!(clip.validate(), Err(AnimError::EmptyClip)));

        let clip = two_bone_clip();
        let skeleton = RigidSkeleton::chain(3).unwrap();
        assert!(matches!(
            clip.validate_for(&skeleton),
            Err(AnimError::SkeletonMismatch { clip: 2, skeleton: 3 })
        ));
    }

    #[test]
    fn test_sample_pose_interpolates() {
        let clip = two_bone_clip();
        let pose = clip.sample_pose(1.5 / 30.0, SampleRoundingPolicy::None);
        assert!((pose[1].translation.x - 1.5).abs() < 1e-4);

        let pose = clip.sample_pose(1.5 / 30.0, SampleRoundingPolicy::Floor);
        assert_eq!(pose[1].translation.x, 1.0);
    }
}
