use anyhow::{bail, Context, Result};
use facegate_capture::{CaptureConfig, CaptureMode};
use facegate_core::{DescriptorMatcher, EnrollmentConfig, LivenessConfig, QualityConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// On-disk TOML layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    match_threshold: Option<f64>,
    required_captures: Option<usize>,
    enrollment: EnrollmentConfig,
    quality: QualityConfig,
    liveness: LivenessConfig,
    capture: CaptureConfig,
}

/// CLI configuration: TOML file, then `FACEGATE_*` environment variables,
/// then command-line flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Euclidean distance below which two descriptors are the same person.
    /// Deliberately has no default.
    pub match_threshold: Option<f64>,
    /// Captures collected per enrollment session.
    pub required_captures: usize,
    pub enrollment: EnrollmentConfig,
    pub quality: QualityConfig,
    pub liveness: LivenessConfig,
    pub capture: CaptureConfig,
}

impl Config {
    /// Load from `path` (or `FACEGATE_CONFIG`) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("FACEGATE_CONFIG").ok().map(PathBuf::from));

        let toml_src = match &path {
            Some(p) => Some(
                std::fs::read_to_string(p)
                    .with_context(|| format!("failed to read config file {}", p.display()))?,
            ),
            None => None,
        };

        let config = Self::resolve(toml_src.as_deref(), &|key| std::env::var(key).ok())
            .with_context(|| match &path {
                Some(p) => format!("invalid configuration in {}", p.display()),
                None => "invalid configuration".to_string(),
            })?;

        tracing::debug!(
            file = ?path,
            match_threshold = ?config.match_threshold,
            required_captures = config.required_captures,
            "configuration loaded"
        );
        Ok(config)
    }

    pub(crate) fn resolve(
        toml_src: Option<&str>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file: FileConfig = match toml_src {
            Some(src) => toml::from_str(src)?,
            None => FileConfig::default(),
        };

        let mut enrollment = file.enrollment;
        if let Some(v) = env_parse(env, "FACEGATE_CONSISTENCY_THRESHOLD") {
            enrollment.consistency_threshold = v;
        }
        if let Some(v) = env_parse(env, "FACEGATE_MIN_SAMPLES") {
            enrollment.minimum_samples = v;
        }

        let mut capture = file.capture;
        if let Some(ms) = env_parse(env, "FACEGATE_POLL_INTERVAL_MS") {
            capture.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse(env, "FACEGATE_CAPTURE_PAUSE_MS") {
            capture.capture_pause = Duration::from_millis(ms);
        }
        if capture.poll_interval.is_zero() {
            bail!("poll interval must be greater than zero");
        }

        let config = Self {
            match_threshold: env_parse(env, "FACEGATE_MATCH_THRESHOLD").or(file.match_threshold),
            required_captures: env_parse(env, "FACEGATE_REQUIRED_CAPTURES")
                .or(file.required_captures)
                .unwrap_or(enrollment.minimum_samples),
            enrollment,
            quality: file.quality,
            liveness: file.liveness,
            capture,
        };
        Ok(config)
    }

    /// Build the matcher, failing if no threshold was configured anywhere.
    pub fn matcher(&self) -> Result<DescriptorMatcher> {
        let Some(threshold) = self.match_threshold else {
            bail!(
                "match threshold is not configured; set `match_threshold` in the config file, \
                 FACEGATE_MATCH_THRESHOLD, or pass --match-threshold"
            );
        };
        Ok(DescriptorMatcher::new(threshold)?)
    }

    /// Layer the extended quality checks over whatever was configured.
    pub fn enable_extended_quality(&mut self) {
        self.quality.enable_extended();
    }

    /// Enrollment mode for a capture session. A session shorter than the
    /// enrollment minimum could never be enrolled, so it is refused up front.
    pub fn enrollment_mode(&self, required: Option<usize>) -> Result<CaptureMode> {
        let required = required.unwrap_or(self.required_captures);
        let minimum = self.enrollment.minimum_samples;
        if required < minimum {
            bail!("enrollment needs at least {minimum} captures, but {required} were requested");
        }
        Ok(CaptureMode::Enrollment { required })
    }
}

fn env_parse<T: FromStr>(env: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = Config::resolve(None, &env_of(&[])).unwrap();
        assert_eq!(config.match_threshold, None);
        assert_eq!(config.required_captures, 3);
        assert_eq!(config.enrollment, EnrollmentConfig::default());
        assert_eq!(config.capture.poll_interval, Duration::from_millis(500));
        assert_eq!(config.capture.capture_pause, Duration::from_millis(1500));
    }

    #[test]
    fn test_missing_threshold_is_an_error() {
        let config = Config::resolve(None, &env_of(&[])).unwrap();
        let err = config.matcher().unwrap_err();
        assert!(err.to_string().contains("match threshold is not configured"));
    }

    #[test]
    fn test_toml_file() {
        let src = r#"
            match_threshold = 0.45
            required_captures = 5

            [enrollment]
            consistency_threshold = 0.35

            [quality]
            max_rotation = 0.4
            min_eye_distance_px = 30.0

            [liveness]
            blink_ear_threshold = 0.22

            [capture]
            poll_interval = 250
            capture_pause = 1000
        "#;
        let config = Config::resolve(Some(src), &env_of(&[])).unwrap();
        assert_eq!(config.match_threshold, Some(0.45));
        assert_eq!(config.required_captures, 5);
        assert_eq!(config.enrollment.consistency_threshold, 0.35);
        assert_eq!(config.enrollment.minimum_samples, 3);
        assert_eq!(config.quality.max_rotation, 0.4);
        assert_eq!(config.quality.min_eye_distance_px, Some(30.0));
        assert_eq!(config.liveness.blink_ear_threshold, 0.22);
        assert_eq!(config.capture.poll_interval, Duration::from_millis(250));
        assert_eq!(config.matcher().unwrap().threshold(), 0.45);
    }

    #[test]
    fn test_env_overrides_file() {
        let env = env_of(&[
            ("FACEGATE_MATCH_THRESHOLD", "0.6"),
            ("FACEGATE_MIN_SAMPLES", "4"),
            ("FACEGATE_CAPTURE_PAUSE_MS", "2000"),
        ]);
        let config = Config::resolve(Some("match_threshold = 0.45"), &env).unwrap();
        assert_eq!(config.match_threshold, Some(0.6));
        assert_eq!(config.enrollment.minimum_samples, 4);
        // Required captures follow the minimum sample count unless set.
        assert_eq!(config.required_captures, 4);
        assert_eq!(config.capture.capture_pause, Duration::from_millis(2000));
    }

    #[test]
    fn test_unparsable_env_is_ignored() {
        let env = env_of(&[("FACEGATE_MATCH_THRESHOLD", "strict")]);
        let config = Config::resolve(Some("match_threshold = 0.45"), &env).unwrap();
        assert_eq!(config.match_threshold, Some(0.45));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::resolve(Some("match_treshold = 0.45"), &env_of(&[])).is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let env = env_of(&[("FACEGATE_POLL_INTERVAL_MS", "0")]);
        assert!(Config::resolve(None, &env).is_err());
    }

    #[test]
    fn test_extended_quality_keeps_file_settings() {
        let src = r#"
            [quality]
            max_rotation = 0.4
            min_confidence = 0.7
        "#;
        let mut config = Config::resolve(Some(src), &env_of(&[])).unwrap();
        config.enable_extended_quality();
        assert_eq!(config.quality.max_rotation, 0.4);
        assert_eq!(config.quality.min_confidence, 0.7);
        assert_eq!(config.quality.min_eye_distance_px, Some(40.0));
        assert_eq!(config.quality.max_vertical_asymmetry, Some(0.5));
    }

    #[test]
    fn test_enrollment_mode_below_minimum_rejected() {
        let config = Config::resolve(None, &env_of(&[])).unwrap();
        let err = config.enrollment_mode(Some(2)).unwrap_err();
        assert!(err.to_string().contains("at least 3 captures"));

        assert_eq!(
            config.enrollment_mode(None).unwrap(),
            CaptureMode::Enrollment { required: 3 }
        );
        assert_eq!(
            config.enrollment_mode(Some(5)).unwrap(),
            CaptureMode::Enrollment { required: 5 }
        );
    }

    #[test]
    fn test_enrollment_mode_follows_configured_minimum() {
        let env = env_of(&[("FACEGATE_MIN_SAMPLES", "2")]);
        let config = Config::resolve(None, &env).unwrap();
        assert_eq!(
            config.enrollment_mode(Some(2)).unwrap(),
            CaptureMode::Enrollment { required: 2 }
        );
    }

    #[test]
    fn test_invalid_threshold_rejected_by_matcher() {
        let config = Config::resolve(Some("match_threshold = -1.0"), &env_of(&[])).unwrap();
        assert!(config.matcher().is_err());
    }
}
