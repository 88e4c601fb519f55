//! Multi-capture enrollment: consistency gating and reduction to one
//! stored descriptor.

use crate::descriptor::{Descriptor, DescriptorError};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_MINIMUM_SAMPLES: usize = 3;
const DEFAULT_CONSISTENCY_THRESHOLD: f64 = 0.4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error("at least {required} face captures are needed, got {actual}; please capture more")]
    InsufficientSamples { required: usize, actual: usize },
    #[error(
        "captures {first} and {second} are inconsistent (distance {distance:.4}); \
         please try again under similar lighting and head position"
    )]
    InconsistentSamples {
        first: usize,
        second: usize,
        distance: f64,
    },
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

impl EnrollmentError {
    /// True for outcomes the user fixes by capturing again.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientSamples { .. } | Self::InconsistentSamples { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnrollmentConfig {
    pub minimum_samples: usize,
    /// Largest pairwise distance tolerated between captures of one enrollment.
    pub consistency_threshold: f64,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            minimum_samples: DEFAULT_MINIMUM_SAMPLES,
            consistency_threshold: DEFAULT_CONSISTENCY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnrollmentValidator {
    config: EnrollmentConfig,
}

impl EnrollmentValidator {
    pub fn new(config: EnrollmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnrollmentConfig {
        &self.config
    }

    /// Check that every pair of samples lies within the consistency
    /// threshold. Stops at the first offending pair.
    ///
    /// All-pairs is quadratic in the sample count; enrollments collect
    /// three to five captures.
    pub fn validate_consistency(&self, samples: &[Descriptor]) -> Result<(), EnrollmentError> {
        if samples.len() < self.config.minimum_samples {
            return Err(EnrollmentError::InsufficientSamples {
                required: self.config.minimum_samples,
                actual: samples.len(),
            });
        }

        for (i, a) in samples.iter().enumerate() {
            for (j, b) in samples.iter().enumerate().skip(i + 1) {
                let distance = a.distance(b)?;
                if distance > self.config.consistency_threshold {
                    tracing::info!(
                        first = i,
                        second = j,
                        distance,
                        "enrollment samples inconsistent"
                    );
                    return Err(EnrollmentError::InconsistentSamples {
                        first: i,
                        second: j,
                        distance,
                    });
                }
            }
        }

        tracing::debug!(samples = samples.len(), "enrollment samples consistent");
        Ok(())
    }

    /// Average the samples into the descriptor that gets stored. Only
    /// meaningful once [`validate_consistency`](Self::validate_consistency)
    /// has passed.
    pub fn reduce(&self, samples: &[Descriptor]) -> Result<Descriptor, DescriptorError> {
        Descriptor::average(samples)
    }

    /// Validate, then reduce.
    pub fn enroll(&self, samples: &[Descriptor]) -> Result<Descriptor, EnrollmentError> {
        self.validate_consistency(samples)?;
        Ok(self.reduce(samples)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(offset: f64) -> Descriptor {
        Descriptor::new(vec![0.1 + offset, -0.2, 0.3, 0.05])
    }

    #[test]
    fn test_fewer_than_minimum_is_insufficient() {
        let validator = EnrollmentValidator::default();
        for n in 0..3 {
            let samples = vec![sample(0.0); n];
            let err = validator.validate_consistency(&samples).unwrap_err();
            assert_eq!(err, EnrollmentError::InsufficientSamples { required: 3, actual: n });
            assert!(err.is_recoverable());
            assert!(err.to_string().contains("capture more"));
        }
    }

    #[test]
    fn test_insufficient_regardless_of_content() {
        // Mismatched lengths would be an error, but the count check comes first.
        let validator = EnrollmentValidator::default();
        let samples = vec![Descriptor::new(vec![0.0]), Descriptor::new(vec![0.0, 1.0])];
        assert!(matches!(
            validator.validate_consistency(&samples),
            Err(EnrollmentError::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn test_identical_samples_are_consistent() {
        let validator = EnrollmentValidator::default();
        let samples = vec![sample(0.0), sample(0.0), sample(0.0)];
        assert!(validator.validate_consistency(&samples).is_ok());
    }

    #[test]
    fn test_small_jitter_is_consistent() {
        let validator = EnrollmentValidator::default();
        let samples = vec![sample(0.0), sample(0.1), sample(-0.1), sample(0.05)];
        assert!(validator.validate_consistency(&samples).is_ok());
    }

    #[test]
    fn test_perturbed_sample_is_inconsistent() {
        let validator = EnrollmentValidator::default();
        let samples = vec![sample(0.0), sample(0.0), sample(0.5)];
        let err = validator.validate_consistency(&samples).unwrap_err();
        match err {
            EnrollmentError::InconsistentSamples { first, second, distance } => {
                assert_eq!((first, second), (0, 2));
                assert!((distance - 0.5).abs() < 1e-12);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("similar lighting"));
    }

    #[test]
    fn test_length_mismatch_is_not_recoverable() {
        let validator = EnrollmentValidator::default();
        let samples = vec![sample(0.0), sample(0.0), Descriptor::new(vec![0.1, -0.2])];
        let err = validator.validate_consistency(&samples).unwrap_err();
        assert!(matches!(err, EnrollmentError::Descriptor(DescriptorError::LengthMismatch { .. })));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_custom_minimum_samples() {
        let validator = EnrollmentValidator::new(EnrollmentConfig {
            minimum_samples: 5,
            ..EnrollmentConfig::default()
        });
        let samples = vec![sample(0.0); 4];
        assert!(matches!(
            validator.validate_consistency(&samples),
            Err(EnrollmentError::InsufficientSamples { required: 5, actual: 4 })
        ));
    }

    #[test]
    fn test_enroll_reduces_to_mean() {
        let validator = EnrollmentValidator::default();
        let samples = vec![sample(0.0), sample(0.1), sample(0.2)];
        let stored = validator.enroll(&samples).unwrap();
        assert!((stored.as_slice()[0] - 0.2).abs() < 1e-12);
        assert_eq!(stored.len(), 4);
    }
}
