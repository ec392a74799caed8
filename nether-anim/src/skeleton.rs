//! Rigid skeleton: bone names and parent links

use smallvec::SmallVec;

use crate::error::{AnimError, Result};

/// Parent index of root bones
pub const INVALID_BONE_INDEX: u16 = u16::MAX;

/// Inline capacity of ancestor chains (deeper rigs spill to the heap)
pub const INLINE_CHAIN_DEPTH: usize = 16;

/// Bone indices from a root down to a bone
pub type BoneChain = SmallVec<[u16; INLINE_CHAIN_DEPTH]>;

#[derive(Debug, Clone, PartialEq)]
pub struct RigidBone {
    pub name: String,
    /// Parent bone or [`INVALID_BONE_INDEX`]
    pub parent_index: u16,
}

impl RigidBone {
    pub fn new(name: impl Into<String>, parent_index: u16) -> Self {
        Self {
            name: name.into(),
            parent_index,
        }
    }

    pub fn root(name: impl Into<String>) -> Self {
        Self::new(name, INVALID_BONE_INDEX)
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent_index == INVALID_BONE_INDEX
    }
}

/// Bones ordered so every parent precedes its children
#[derive(Debug, Clone, PartialEq)]
pub struct RigidSkeleton {
    bones: Vec<RigidBone>,
}

impl RigidSkeleton {
    pub fn new(bones: Vec<RigidBone>) -> Result<Self> {
        if bones.is_empty() {
            return Err(AnimError::NoBones);
        }
        if bones.len() >= INVALID_BONE_INDEX as usize {
            return Err(AnimError::TooManyBones(bones.len()));
        }
        for (index, bone) in bones.iter().enumerate() {
            if !bone.is_root() && bone.parent_index as usize >= index {
                return Err(AnimError::InvalidParent {
                    bone: index,
                    parent: bone.parent_index,
                });
            }
        }
        Ok(Self { bones })
    }

    /// Single chain where bone `i` is the parent of bone `i + 1`
    pub fn chain(num_bones: usize) -> Result<Self> {
        let bones = (0..num_bones)
            .map(|i| {
                let parent = if i == 0 {
                    INVALID_BONE_INDEX
                } else {
                    (i - 1) as u16
                };
                RigidBone::new(format!("bone_{}", i), parent)
            })
            .collect();
        Self::new(bones)
    }

    #[inline]
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn bones(&self) -> &[RigidBone] {
        &self.bones
    }

    #[inline]
    pub fn bone(&self, index: usize) -> &RigidBone {
        &self.bones[index]
    }

    #[inline]
    pub fn parent(&self, index: usize) -> Option<usize> {
        let parent = self.bones[index].parent_index;
        (parent != INVALID_BONE_INDEX).then_some(parent as usize)
    }

    /// Root-first chain ending at `bone`
    pub fn chain_to(&self, bone: usize) -> BoneChain {
        let mut chain = BoneChain::new();
        let mut current = Some(bone);
        while let Some(index) = current {
            chain.push(index as u16);
            current = self.parent(index);
        }
        chain.reverse();
        chain
    }
}
