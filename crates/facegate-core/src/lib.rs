//! facegate-core — Descriptor matching and capture quality gating.
//!
//! Decides identity match/no-match over fixed-length face descriptors,
//! checks multi-capture enrollments for consistency, and scores camera
//! frames for framing, pose and liveness before a descriptor is trusted.

pub mod descriptor;
pub mod enrollment;
pub mod liveness;
pub mod matcher;
pub mod quality;
pub mod types;

pub use descriptor::{Descriptor, DescriptorError};
pub use enrollment::{EnrollmentConfig, EnrollmentError, EnrollmentValidator};
pub use liveness::{LivenessConfig, LivenessFlags, LivenessSignal};
pub use matcher::{DescriptorMatcher, MatcherError};
pub use quality::{QualityConfig, QualityGate, QualityVerdict, ReasonCode};
pub use types::{DetectionBox, Landmarks, MatchResult, Point};
