use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facegate_capture::{
    spawn_capture, CaptureEvent, CaptureMode, CaptureOrchestrator, ReplayDetector,
};
use facegate_core::{Descriptor, EnrollmentValidator, QualityGate};
use std::path::{Path, PathBuf};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "facegate", about = "Face descriptor matching and capture gating")]
struct Cli {
    /// TOML configuration file (default: $FACEGATE_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured match threshold
    #[arg(long, global = true)]
    match_threshold: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the Euclidean distance between two descriptors
    Distance { a: PathBuf, b: PathBuf },
    /// Check a probe descriptor against one enrolled descriptor
    Verify {
        #[arg(long)]
        probe: PathBuf,
        #[arg(long)]
        enrolled: PathBuf,
    },
    /// Find the closest match for a probe in a gallery of descriptors
    Search {
        #[arg(long)]
        probe: PathBuf,
        /// JSON array of descriptors
        #[arg(long)]
        gallery: PathBuf,
    },
    /// Validate enrollment captures and reduce them to one descriptor
    Enroll {
        /// JSON array of captured descriptors
        #[arg(long)]
        samples: PathBuf,
        /// Reject the enrollment if the face is already in this gallery
        #[arg(long)]
        gallery: Option<PathBuf>,
        /// Write the reduced descriptor here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run a capture session over a recorded frame script
    Capture {
        /// Frame script (JSON) replayed as the detector
        #[arg(long)]
        script: PathBuf,
        /// Single-capture login session; verify against this descriptor
        #[arg(long)]
        login: Option<PathBuf>,
        /// Captures to collect for enrollment
        #[arg(long)]
        required: Option<usize>,
        /// Enable the eye-separation and symmetry checks
        #[arg(long)]
        extended: bool,
        /// Write the captured (enrollment: reduced) descriptor here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(threshold) = cli.match_threshold {
        config.match_threshold = Some(threshold);
    }

    match cli.command {
        Commands::Distance { a, b } => {
            let a = read_descriptor(&a)?;
            let b = read_descriptor(&b)?;
            println!("{}", a.distance(&b)?);
        }
        Commands::Verify { probe, enrolled } => {
            let matcher = config.matcher()?;
            let probe = read_descriptor(&probe)?;
            let enrolled = read_descriptor(&enrolled)?;
            let distance = probe.distance(&enrolled)?;
            let matched = matcher.verify(&probe, &enrolled)?;
            print_json(&serde_json::json!({
                "matched": matched,
                "distance": distance,
                "threshold": matcher.threshold(),
            }))?;
        }
        Commands::Search { probe, gallery } => {
            let matcher = config.matcher()?;
            let probe = read_descriptor(&probe)?;
            let gallery = read_gallery(&gallery)?;
            let result = matcher.search(&probe, &gallery)?;
            print_json(&serde_json::json!({
                "matched": result.matched,
                "distance": result.distance,
                "index": result.index,
                "threshold": matcher.threshold(),
            }))?;
        }
        Commands::Enroll {
            samples,
            gallery,
            output,
        } => {
            let samples = read_gallery(&samples)?;
            let stored = enroll(&config, &samples, gallery.as_deref())?;
            write_descriptor(output.as_deref(), &stored)?;
        }
        Commands::Capture {
            script,
            login,
            required,
            extended,
            output,
        } => {
            if extended {
                config.enable_extended_quality();
            }
            let mode = match login {
                Some(_) => CaptureMode::Login,
                None => config.enrollment_mode(required)?,
            };
            let detector = ReplayDetector::load(&script)?;
            let captured = run_capture(&config, detector, mode).await?;

            match login {
                Some(enrolled) => {
                    let matcher = config.matcher()?;
                    let enrolled = read_descriptor(&enrolled)?;
                    let probe = captured.first().context("login capture produced no descriptor")?;
                    let matched = matcher.verify(probe, &enrolled)?;
                    println!("{}", if matched { "Face recognized" } else { "Face not recognized" });
                    if let Some(path) = output.as_deref() {
                        write_descriptor(Some(path), probe)?;
                    }
                }
                None => {
                    let stored = enroll(&config, &captured, None)?;
                    write_descriptor(output.as_deref(), &stored)?;
                }
            }
        }
    }

    Ok(())
}

/// Validate captures, reduce them, and refuse faces already enrolled.
fn enroll(config: &Config, samples: &[Descriptor], gallery: Option<&Path>) -> Result<Descriptor> {
    let validator = EnrollmentValidator::new(config.enrollment);
    let stored = validator.enroll(samples)?;

    if let Some(path) = gallery {
        let matcher = config.matcher()?;
        let known = read_gallery(path)?;
        let result = matcher.search(&stored, &known)?;
        if let Some(index) = result.index {
            bail!(
                "this face is already registered (gallery entry {index}, distance {:.4})",
                result.distance
            );
        }
    }

    tracing::info!(samples = samples.len(), dim = stored.len(), "enrollment accepted");
    Ok(stored)
}

/// Drive a capture session to completion, printing operator feedback.
async fn run_capture(
    config: &Config,
    detector: ReplayDetector,
    mode: CaptureMode,
) -> Result<Vec<Descriptor>> {
    let orchestrator = CaptureOrchestrator::new(
        config.capture,
        QualityGate::new(config.quality),
        config.liveness,
    );
    let mut handle = spawn_capture(detector, orchestrator, mode)?;
    let required = mode.required();

    let mut last_feedback = "";
    loop {
        tokio::select! {
            event = handle.next_event() => match event {
                Some(CaptureEvent::Feedback(verdict)) => {
                    // Repeated guidance is noise on a terminal.
                    if verdict.message != last_feedback {
                        println!("{}", verdict.message);
                        last_feedback = verdict.message;
                    }
                }
                Some(CaptureEvent::Captured { index, .. }) => {
                    println!("Captured {}/{}", index + 1, required);
                    last_feedback = "";
                }
                Some(CaptureEvent::Error(err)) => eprintln!("capture error: {err}"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                break;
            }
        }
    }

    let outcome = handle.finish().await?;
    if !outcome.liveness.movement && !outcome.liveness.blink {
        tracing::warn!("no movement or blink observed during capture");
    }
    Ok(outcome.descriptors)
}

fn read_descriptor(path: &Path) -> Result<Descriptor> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read descriptor {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))
}

fn read_gallery(path: &Path) -> Result<Vec<Descriptor>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read descriptors {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("{} is not a JSON array of descriptors", path.display()))
}

fn write_descriptor(path: Option<&Path>, descriptor: &Descriptor) -> Result<()> {
    let json = serde_json::to_string(descriptor)?;
    match path {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: Option<f64>) -> Config {
        let mut config = Config::resolve(None, &|_| None).unwrap();
        config.match_threshold = threshold;
        config
    }

    fn d(values: &[f64]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("facegate-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_enroll_without_gallery_needs_no_threshold() {
        let samples = vec![d(&[0.1, 0.2]), d(&[0.1, 0.2]), d(&[0.1, 0.2])];
        let stored = enroll(&config(None), &samples, None).unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_enroll_rejects_registered_face() {
        let gallery = temp_file("gallery.json", "[[5.0, 5.0], [0.1, 0.21]]");
        let samples = vec![d(&[0.1, 0.2]), d(&[0.1, 0.2]), d(&[0.1, 0.2])];
        let err = enroll(&config(Some(0.45)), &samples, Some(&gallery)).unwrap_err();
        assert!(err.to_string().contains("already registered (gallery entry 1"));
        let _ = std::fs::remove_file(gallery);
    }

    #[test]
    fn test_enroll_with_gallery_requires_threshold() {
        let gallery = temp_file("gallery-nothreshold.json", "[]");
        let samples = vec![d(&[0.1, 0.2]); 3];
        assert!(enroll(&config(None), &samples, Some(&gallery)).is_err());
        let _ = std::fs::remove_file(gallery);
    }

    #[test]
    fn test_enroll_surfaces_inconsistency() {
        let samples = vec![d(&[0.0, 0.0]), d(&[0.0, 0.0]), d(&[1.0, 0.0])];
        let err = enroll(&config(None), &samples, None).unwrap_err();
        assert!(err.to_string().contains("similar lighting"));
    }

    #[test]
    fn test_descriptor_file_round_trip() {
        let path = std::env::temp_dir().join(format!("facegate-{}-out.json", std::process::id()));
        write_descriptor(Some(&path), &d(&[0.5, -0.25])).unwrap();
        assert_eq!(read_descriptor(&path).unwrap(), d(&[0.5, -0.25]));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_malformed_descriptor_file() {
        let path = temp_file("bad.json", "{\"x\": 1}");
        let err = read_descriptor(&path).unwrap_err();
        assert!(err.to_string().contains("is not a JSON array of numbers"));
        let _ = std::fs::remove_file(path);
    }
}
