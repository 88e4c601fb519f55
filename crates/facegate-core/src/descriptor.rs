//! Face descriptors and the vector primitives built on them.
//!
//! A descriptor is the fixed-length feature vector the external model
//! produces for one face (128 values for the usual recognition net).
//! Plain IEEE-754 arithmetic throughout: no epsilon rounding, so
//! `distance(a, a) == 0` and distance is symmetric bit-for-bit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor length mismatch: expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("cannot aggregate an empty descriptor set")]
    EmptyInput,
}

/// Immutable face feature vector. Serializes as a bare JSON array of floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(Vec<f64>);

impl Descriptor {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    /// Euclidean distance, `sqrt(sum((a[i] - b[i])^2))`.
    pub fn distance(&self, other: &Descriptor) -> Result<f64, DescriptorError> {
        if self.len() != other.len() {
            return Err(DescriptorError::LengthMismatch {
                expected: self.len(),
                actual: other.len(),
            });
        }

        Ok(self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum::<f64>()
            .sqrt())
    }

    /// Element-wise mean of a non-empty, equal-length descriptor set.
    pub fn average(descriptors: &[Descriptor]) -> Result<Descriptor, DescriptorError> {
        let first = descriptors.first().ok_or(DescriptorError::EmptyInput)?;
        let dim = first.len();

        let mut sum = vec![0.0f64; dim];
        for descriptor in descriptors {
            if descriptor.len() != dim {
                return Err(DescriptorError::LengthMismatch {
                    expected: dim,
                    actual: descriptor.len(),
                });
            }
            for (acc, v) in sum.iter_mut().zip(descriptor.0.iter()) {
                *acc += v;
            }
        }

        let n = descriptors.len() as f64;
        Ok(Descriptor(sum.into_iter().map(|v| v / n).collect()))
    }
}

impl From<Vec<f64>> for Descriptor {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}
