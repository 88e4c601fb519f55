//! Identity decisions over Euclidean descriptor distance.
//!
//! One primitive serves both login (does this face match the named
//! account?) and duplicate-enrollment detection (is this face already
//! known?).

use crate::descriptor::{Descriptor, DescriptorError};
use crate::types::MatchResult;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatcherError {
    #[error("match threshold must be a finite positive distance, got {0}")]
    InvalidThreshold(f64),
}

/// Distance-threshold matcher.
///
/// The threshold is a calibration parameter of the deployment and has no
/// default; it must be supplied explicitly.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorMatcher {
    threshold: f64,
}

impl DescriptorMatcher {
    pub fn new(threshold: f64) -> Result<Self, MatcherError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(MatcherError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 1:1 check. A distance exactly at the threshold is a non-match.
    pub fn verify(
        &self,
        candidate: &Descriptor,
        enrolled: &Descriptor,
    ) -> Result<bool, DescriptorError> {
        let distance = candidate.distance(enrolled)?;
        let matched = distance < self.threshold;
        tracing::debug!(distance, threshold = self.threshold, matched, "verify");
        Ok(matched)
    }

    /// 1:N search. Scans every known descriptor and returns the position of
    /// the closest one, but only when it is also under the threshold.
    ///
    /// Exact ties keep the earliest index.
    pub fn search(
        &self,
        candidate: &Descriptor,
        known: &[Descriptor],
    ) -> Result<MatchResult, DescriptorError> {
        let mut best_distance = f64::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, descriptor) in known.iter().enumerate() {
            let distance = candidate.distance(descriptor)?;
            if distance < best_distance {
                best_distance = distance;
                best_idx = Some(i);
            }
        }

        let result = match best_idx {
            Some(idx) if best_distance < self.threshold => MatchResult {
                matched: true,
                distance: best_distance,
                index: Some(idx),
            },
            _ => MatchResult::no_match(best_distance),
        };

        tracing::debug!(
            gallery = known.len(),
            distance = result.distance,
            index = ?result.index,
            "search"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(values: &[f64]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    #[test]
    fn test_threshold_required_positive() {
        assert!(DescriptorMatcher::new(0.45).is_ok());
        assert_eq!(
            DescriptorMatcher::new(0.0).unwrap_err(),
            MatcherError::InvalidThreshold(0.0)
        );
        assert!(DescriptorMatcher::new(-0.6).is_err());
        assert!(DescriptorMatcher::new(f64::NAN).is_err());
        assert!(DescriptorMatcher::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_verify_under_threshold() {
        let matcher = DescriptorMatcher::new(0.6).unwrap();
        assert!(matcher.verify(&d(&[0.0, 0.0]), &d(&[0.3, 0.4])).unwrap());
    }

    #[test]
    fn test_verify_boundary_is_non_match() {
        // distance((0,0), (3,4)) == 5 exactly
        let matcher = DescriptorMatcher::new(5.0).unwrap();
        assert!(!matcher.verify(&d(&[0.0, 0.0]), &d(&[3.0, 4.0])).unwrap());
    }

    #[test]
    fn test_verify_over_threshold() {
        let matcher = DescriptorMatcher::new(0.45).unwrap();
        assert!(!matcher.verify(&d(&[0.0, 0.0]), &d(&[0.3, 0.4])).unwrap());
    }

    #[test]
    fn test_verify_length_mismatch() {
        let matcher = DescriptorMatcher::new(0.45).unwrap();
        assert!(matches!(
            matcher.verify(&d(&[0.0]), &d(&[0.0, 0.0])),
            Err(DescriptorError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_search_returns_closest_under_threshold() {
        let matcher = DescriptorMatcher::new(0.5).unwrap();
        let known = vec![d(&[1.0, 1.0]), d(&[0.3, 0.0]), d(&[0.1, 0.0])];
        let result = matcher.search(&d(&[0.0, 0.0]), &known).unwrap();
        assert!(result.matched);
        assert_eq!(result.index, Some(2));
        assert!((result.distance - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_search_tie_keeps_earliest() {
        let matcher = DescriptorMatcher::new(0.5).unwrap();
        let known = vec![d(&[1.0, 1.0]), d(&[0.2, 0.0]), d(&[0.0, 0.2]), d(&[0.2, 0.0])];
        let result = matcher.search(&d(&[0.0, 0.0]), &known).unwrap();
        assert_eq!(result.index, Some(1));
    }

    #[test]
    fn test_search_no_match_above_threshold() {
        let matcher = DescriptorMatcher::new(0.45).unwrap();
        let known = vec![d(&[1.0, 0.0]), d(&[0.0, 0.5])];
        let result = matcher.search(&d(&[0.0, 0.0]), &known).unwrap();
        assert!(!result.matched);
        assert_eq!(result.index, None);
        assert_eq!(result.distance, 0.5);
    }

    #[test]
    fn test_search_minimum_equal_to_threshold_is_no_match() {
        let matcher = DescriptorMatcher::new(5.0).unwrap();
        // Closest entry is exactly 5 away; the other is 10 away.
        let known = vec![d(&[6.0, 8.0]), d(&[3.0, 4.0])];
        let result = matcher.search(&d(&[0.0, 0.0]), &known).unwrap();
        assert!(!result.matched);
        assert_eq!(result.index, None);
        assert_eq!(result.distance, 5.0);
    }

    #[test]
    fn test_search_empty_gallery() {
        let matcher = DescriptorMatcher::new(0.45).unwrap();
        let result = matcher.search(&d(&[0.0, 0.0]), &[]).unwrap();
        assert!(!result.matched);
        assert_eq!(result.index, None);
        assert_eq!(result.distance, f64::INFINITY);
    }

    #[test]
    fn test_search_length_mismatch_in_gallery() {
        let matcher = DescriptorMatcher::new(0.45).unwrap();
        let known = vec![d(&[0.0, 0.0]), d(&[0.0, 0.0, 0.0])];
        assert!(matcher.search(&d(&[0.0, 0.0]), &known).is_err());
    }
}
