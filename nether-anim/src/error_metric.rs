//! Skinning error: how far a virtual vertex moves between raw and lossy poses
//!
//! Each bone carries two virtual vertices at `vertex_distance` along its
//! local X and Y axes. The error of a bone is the larger displacement of those
//! vertices in object space, so parent error propagates down the hierarchy.

use glam::Vec3;

use crate::math::Transform;
use crate::sampler::{sample_bone_chain_at_index, sample_pose_at_index};
use crate::skeleton::RigidSkeleton;
use crate::storage::TrackStorage;

/// Object-space transform of `bone` from a local pose
///
/// Only `bone` and its ancestors need to be valid in `local_pose`.
pub fn object_transform(
    local_pose: &[Transform],
    skeleton: &RigidSkeleton,
    bone: usize,
    has_scale: bool,
) -> Transform {
    let chain = skeleton.chain_to(bone);
    let mut object = local_pose[chain[0] as usize];
    for &index in &chain[1..] {
        let local = &local_pose[index as usize];
        object = if has_scale {
            local.then_parent(&object)
        } else {
            local.then_parent_no_scale(&object)
        };
    }
    object
}

/// Object-space transforms of every bone (parents precede children)
pub fn object_pose(
    local_pose: &[Transform],
    skeleton: &RigidSkeleton,
    has_scale: bool,
    out_pose: &mut [Transform],
) {
    for bone in 0..local_pose.len() {
        out_pose[bone] = match skeleton.parent(bone) {
            None => local_pose[bone],
            Some(parent) => {
                let parent = out_pose[parent];
                if has_scale {
                    local_pose[bone].then_parent(&parent)
                } else {
                    local_pose[bone].then_parent_no_scale(&parent)
                }
            }
        };
    }
}

/// Displacement of the virtual vertices between two object-space transforms
pub fn skinning_error(
    raw: &Transform,
    lossy: &Transform,
    vertex_distance: f32,
    has_scale: bool,
) -> f32 {
    let points = [
        Vec3::new(vertex_distance, 0.0, 0.0),
        Vec3::new(0.0, vertex_distance, 0.0),
    ];
    points
        .iter()
        .map(|&point| {
            let (raw_point, lossy_point) = if has_scale {
                (raw.transform_point(point), lossy.transform_point(point))
            } else {
                (
                    raw.transform_point_no_scale(point),
                    lossy.transform_point_no_scale(point),
                )
            };
            raw_point.distance(lossy_point)
        })
        .fold(0.0, f32::max)
}

/// Worst error of one bone over every sample of a segment
pub fn measure_bone_error<R: TrackStorage, L: TrackStorage>(
    raw: &R,
    lossy: &L,
    skeleton: &RigidSkeleton,
    bone: usize,
    has_scale: bool,
    vertex_distance: f32,
) -> f32 {
    let num_transforms = raw.num_transforms();
    let mut raw_pose = vec![Transform::IDENTITY; num_transforms];
    let mut lossy_pose = vec![Transform::IDENTITY; num_transforms];
    let mut max_error = 0.0f32;

    for sample_index in 0..lossy.num_samples() {
        sample_bone_chain_at_index(raw, skeleton, bone, sample_index, &mut raw_pose);
        sample_bone_chain_at_index(lossy, skeleton, bone, sample_index, &mut lossy_pose);

        let raw_object = object_transform(&raw_pose, skeleton, bone, has_scale);
        let lossy_object = object_transform(&lossy_pose, skeleton, bone, has_scale);
        max_error = max_error.max(skinning_error(
            &raw_object,
            &lossy_object,
            vertex_distance,
            has_scale,
        ));
    }

    max_error
}

/// Worst error of any bone over every sample of a segment
pub fn measure_segment_error<R: TrackStorage, L: TrackStorage>(
    raw: &R,
    lossy: &L,
    skeleton: &RigidSkeleton,
    has_scale: bool,
    vertex_distance: f32,
) -> f32 {
    let num_transforms = raw.num_transforms();
    let mut raw_local = vec![Transform::IDENTITY; num_transforms];
    let mut lossy_local = vec![Transform::IDENTITY; num_transforms];
    let mut raw_object = vec![Transform::IDENTITY; num_transforms];
    let mut lossy_object = vec![Transform::IDENTITY; num_transforms];
    let mut max_error = 0.0f32;

    for sample_index in 0..lossy.num_samples() {
        sample_pose_at_index(raw, sample_index, &mut raw_local);
        sample_pose_at_index(lossy, sample_index, &mut lossy_local);
        object_pose(&raw_local, skeleton, has_scale, &mut raw_object);
        object_pose(&lossy_local, skeleton, has_scale, &mut lossy_object);

        for (raw_bone, lossy_bone) in raw_object.iter().zip(&lossy_object) {
            let error = skinning_error(raw_bone, lossy_bone, vertex_distance, has_scale);
            max_error = max_error.max(error);
        }
    }

    max_error
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_identical_transforms_have_no_error() {
        let t = Transform::new(
            Quat::from_rotation_x(0.3),
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::ONE,
        );
        assert_eq!(skinning_error(&t, &t, 3.0, true), 0.0);
    }

    #[test]
    fn test_translation_offset_is_the_error() {
        let raw = Transform::IDENTITY;
        let lossy = Transform::new(Quat::IDENTITY, Vec3::new(0.0, 0.0, 0.25), Vec3::ONE);
        assert!((skinning_error(&raw, &lossy, 3.0, false) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_error_scales_with_distance() {
        let raw = Transform::IDENTITY;
        let lossy = Transform::new(Quat::from_rotation_z(0.01), Vec3::ZERO, Vec3::ONE);
        let near = skinning_error(&raw, &lossy, 1.0, false);
        let far = skinning_error(&raw, &lossy, 10.0, false);
        assert!((far / near - 10.0).abs() < 1e-2);
    }

    #[test]
    fn test_parent_error_reaches_child() {
        let skeleton = RigidSkeleton::chain(2).unwrap();
        let child = Transform::new(Quat::IDENTITY, Vec3::new(10.0, 0.0, 0.0), Vec3::ONE);

        let raw_pose = [Transform::IDENTITY, child];
        let lossy_pose = [
            Transform::new(Quat::from_rotation_z(0.01), Vec3::ZERO, Vec3::ONE),
            child,
        ];

        let raw_root = object_transform(&raw_pose, &skeleton, 0, false);
        let lossy_root = object_transform(&lossy_pose, &skeleton, 0, false);
        let raw_child = object_transform(&raw_pose, &skeleton, 1, false);
        let lossy_child = object_transform(&lossy_pose, &skeleton, 1, false);

        let root_error = skinning_error(&raw_root, &lossy_root, 3.0, false);
        let child_error = skinning_error(&raw_child, &lossy_child, 3.0, false);
        assert!(child_error > root_error * 3.0, "{} vs {}", child_error, root_error);
    }

    #[test]
    fn test_object_pose_matches_object_transform() {
        let skeleton = RigidSkeleton::chain(3).unwrap();
        let local = [
            Transform::new(
                Quat::from_rotation_x(0.4),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::splat(2.0),
            ),
            Transform::new(
                Quat::from_rotation_y(0.2),
                Vec3::new(0.0, 3.0, 0.0),
                Vec3::ONE,
            ),
            Transform::new(
                Quat::from_rotation_z(0.7),
                Vec3::new(0.0, 0.0, 5.0),
                Vec3::splat(0.5),
            ),
        ];
        let mut object = [Transform::IDENTITY; 3];
        object_pose(&local, &skeleton, true, &mut object);
        assert_eq!(object[2], object_transform(&local, &skeleton, 2, true));
    }
}
