//! Nether-Anim: lossy skeletal animation codec for Nethercore
//!
//! Compresses clips of per-bone rigid transforms (rotation, translation,
//! non-uniform scale) sampled at a fixed rate, while keeping the skinning
//! error (how far a virtual vertex near each bone drifts) under a threshold.
//!
//! **This is a pure codec** - it produces an in-memory [`CompressedClip`] and
//! samples poses from it. Container framing, skeleton import and tooling are
//! handled by the caller.
//!
//! # Pipeline
//!
//! | Stage | Module |
//! |-------|--------|
//! | Clip ranges, constant/default detection | [`range`], [`database`] |
//! | Segmenting (16 samples, up to 31 in one) | [`segment`] |
//! | Clip then segment range reduction | [`database`] |
//! | Per-track bit-rate search against the skinning error | [`bit_rate`], [`error_metric`] |
//! | Bit packing | [`codec`], [`packing`] |
//! | Pose sampling | [`sampler`], [`decompress`] |
//!
//! # Bit-Rates
//!
//! Variable formats pick one of 19 rates per track per segment:
//!
//! ```text
//! rate  0     constant: one 3×16-bit sample for the whole segment
//! rate  1-17  3 to 19 bits per component
//! rate  18    raw: 3×f32, no range reduction
//! ```
//!
//! Fixed formats (`Quat_128`, `QuatDropW_48`, `Vector3_32`, ...) skip the
//! search and report the invalid rate `0xFF`.
//!
//! # Threading
//!
//! A [`CompressedClip`] is immutable once built and every sampling method
//! takes `&self`, so one clip can be sampled from any number of threads.
//! Compression is a single sequential call per clip.
//!
//! # Usage
//!
//! ```
//! use glam::{Quat, Vec3};
//! use nether_anim::{
//!     AnimatedBone, AnimationClip, CompressionSettings, RigidSkeleton, SampleRoundingPolicy,
//!     Transform, compress_clip,
//! };
//!
//! let bones = vec![
//!     AnimatedBone::constant(Transform::IDENTITY, 30),
//!     AnimatedBone::from_fn(30, |i| {
//!         let rotation = Quat::from_rotation_z(i as f32 * 0.05);
//!         Transform::new(rotation, Vec3::new(0.0, 12.0, 0.0), Vec3::ONE)
//!     }),
//! ];
//! let clip = AnimationClip::new("wave", 30, 30.0, bones);
//! let skeleton = RigidSkeleton::chain(2).unwrap();
//!
//! let compressed = compress_clip(&clip, &skeleton, &CompressionSettings::default()).unwrap();
//! assert!(compressed.stats().max_error <= 0.01);
//!
//! let pose = compressed.sample_pose(0.5, SampleRoundingPolicy::None);
//! assert_eq!(pose.len(), 2);
//! ```

pub mod bit_rate;
pub mod clip;
pub mod codec;
pub mod compress;
pub mod database;
pub mod decompress;
pub mod error;
pub mod error_metric;
pub mod format;
pub mod interpolation;
pub mod math;
pub mod packing;
pub mod range;
pub mod sampler;
pub mod segment;
pub mod settings;
pub mod skeleton;
pub mod storage;
pub mod track;

pub use clip::{AnimatedBone, AnimationClip};
pub use compress::{CompressionStats, compress_clip};
pub use decompress::{BoneStreams, CompressedClip, CompressedSegment};
pub use error::{AnimError, Result};
pub use format::{BoneBitRate, RotationFormat, TrackKind, VectorFormat};
pub use interpolation::SampleRoundingPolicy;
pub use math::Transform;
pub use range::{QvvRanges, TrackRange};
pub use sampler::{Distribution, Uniform, Variable};
pub use segment::SampleDistribution;
pub use settings::{AdditiveClipFormat, CompressionSettings, SegmentRangeReduction};
pub use skeleton::{RigidBone, RigidSkeleton};
pub use storage::{StreamView, TrackStorage};
pub use track::{Track, TrackArray, TrackDesc, TrackSamples, TrackType, TrackWriter};
