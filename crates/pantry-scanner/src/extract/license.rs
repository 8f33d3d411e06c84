//! License classification and acceptance policy

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::LicenseError;
use crate::models::LicenseSummary;

/// License identifier to classifier confidence in [0, 1]
pub type LicenseMatches = HashMap<String, f64>;

/// Detects licenses in an unpacked module
#[async_trait]
pub trait LicenseClassifier: Send + Sync {
    async fn classify(&self, module_root: &Path) -> Result<LicenseMatches, LicenseError>;
}

/// Runs a go-license-detector compatible command with JSON output, passing the
/// module root as the last argument
#[derive(Debug, Clone)]
pub struct CommandLicenseClassifier {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandLicenseClassifier {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl LicenseClassifier for CommandLicenseClassifier {
    async fn classify(&self, module_root: &Path) -> Result<LicenseMatches, LicenseError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or(LicenseError::NotConfigured)?;
        debug!(program = %program, dir = %module_root.display(), "Classifying licenses");

        let mut command = Command::new(program);
        command.args(args).arg(module_root).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| LicenseError::Timeout {
                program: program.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| LicenseError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(LicenseError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_detector_output(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct ProjectReport {
    #[serde(default)]
    matches: Vec<DetectedLicense>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectedLicense {
    license: String,
    confidence: f64,
}

/// Parse detector JSON: an array of per-project reports
///
/// A project reporting an error (typically "no license file was found")
/// contributes no matches. When an identifier appears more than once the
/// highest confidence is kept.
pub fn parse_detector_output(stdout: &[u8]) -> Result<LicenseMatches, LicenseError> {
    let reports: Vec<ProjectReport> = serde_json::from_slice(stdout)?;
    let mut matches = LicenseMatches::new();

    for report in reports {
        if let Some(error) = report.error {
            debug!(error = %error, "License detector found nothing");
            continue;
        }
        for detected in report.matches {
            let confidence = matches.entry(detected.license).or_insert(0.0);
            *confidence = confidence.max(detected.confidence);
        }
    }

    Ok(matches)
}

/// Which classifier results are recorded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LicensePolicy {
    pub threshold: f64,
}

impl Default for LicensePolicy {
    fn default() -> Self {
        Self {
            threshold: crate::config::DEFAULT_LICENSE_THRESHOLD,
        }
    }
}

impl LicensePolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Keep identifiers at or above the threshold, highest confidence first
    ///
    /// The primary license is the first of that order. Equal confidences are
    /// ordered by identifier so the result does not depend on map iteration.
    pub fn apply(&self, matches: &LicenseMatches) -> LicenseSummary {
        let mut accepted: Vec<(&String, f64)> = matches
            .iter()
            .filter(|(_, confidence)| **confidence >= self.threshold)
            .map(|(id, confidence)| (id, *confidence))
            .collect();

        accepted.sort_by(|(a_id, a), (b_id, b)| {
            b.partial_cmp(a)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a_id.cmp(b_id))
        });

        let licenses: Vec<String> = accepted.into_iter().map(|(id, _)| id.clone()).collect();

        LicenseSummary {
            primary: licenses.first().cloned().unwrap_or_default(),
            licenses,
        }
    }
}
