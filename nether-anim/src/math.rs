//! Rigid transform math on top of glam
//!
//! Composition follows the skinning convention: a local transform is applied
//! first, then its parent's. Scale is non-uniform and does not shear.

use glam::{Quat, Vec3, Vec4};

/// Rotation, translation and non-uniform scale of one bone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub rotation: Quat,
    pub translation: Vec3,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn new(rotation: Quat, translation: Vec3, scale: Vec3) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    /// Neutral transform for a clip whose default scale is `default_scale`
    pub fn neutral(default_scale: Vec3) -> Self {
        Self {
            scale: default_scale,
            ..Self::IDENTITY
        }
    }

    /// Composes this local transform with its parent's object-space transform
    pub fn then_parent(&self, parent: &Transform) -> Transform {
        Transform {
            rotation: parent.rotation * self.rotation,
            translation: parent.rotation * (self.translation * parent.scale) + parent.translation,
            scale: self.scale * parent.scale,
        }
    }

    /// Same as [`Transform::then_parent`] without scale
    pub fn then_parent_no_scale(&self, parent: &Transform) -> Transform {
        Transform {
            rotation: parent.rotation * self.rotation,
            translation: parent.rotation * self.translation + parent.translation,
            scale: Vec3::ONE,
        }
    }

    /// Interpolates towards `other` (nlerp for the rotation)
    pub fn blend(&self, other: &Transform, alpha: f32) -> Transform {
        Transform {
            rotation: quat_nlerp(self.rotation, other.rotation, alpha),
            translation: self.translation.lerp(other.translation, alpha),
            scale: self.scale.lerp(other.scale, alpha),
        }
    }

    #[inline]
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.rotation * (point * self.scale) + self.translation
    }

    #[inline]
    pub fn transform_point_no_scale(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.translation
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ============================================================================
// Quaternion Helpers
// ============================================================================

/// Flips `q` into the hemisphere where `w >= 0` (same rotation)
#[inline]
pub fn quat_ensure_positive_w(q: Quat) -> Quat {
    if q.w >= 0.0 { q } else { -q }
}

/// Rebuilds a positive-W quaternion from its [x, y, z] components
#[inline]
pub fn quat_from_positive_w(xyz: Vec3) -> Quat {
    let w_squared = 1.0 - xyz.length_squared();
    // Quantization can push the length slightly past 1
    let w = w_squared.max(0.0).sqrt();
    Quat::from_xyzw(xyz.x, xyz.y, xyz.z, w)
}

/// Normalized linear interpolation along the shortest arc
#[inline]
pub fn quat_nlerp(start: Quat, end: Quat, alpha: f32) -> Quat {
    let end = if start.dot(end) < 0.0 { -end } else { end };
    let blended = Vec4::from(start).lerp(Vec4::from(end), alpha);
    Quat::from_vec4(blended).normalize()
}

/// Component-wise closeness check on the first `num_components` lanes
#[inline]
pub fn vector_all_near_equal(lhs: Vec4, rhs: Vec4, threshold: f32, num_components: usize) -> bool {
    let delta = (lhs - rhs).abs().to_array();
    delta[..num_components].iter().all(|&d| d <= threshold)
}
