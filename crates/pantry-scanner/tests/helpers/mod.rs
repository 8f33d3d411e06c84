//! Shared fixtures for scanner integration tests
//!
//! - tracing setup
//! - in-memory module zips
//! - canned documentation and license collaborators
//! - wiremock mounts for the feed and proxy endpoints
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use pantry_scanner::error::{DocError, LicenseError};
use pantry_scanner::extract::{DocRenderer, LicenseClassifier, LicenseMatches};
use pantry_scanner::ScannerConfig;
use std::io::{Cursor, Write};
use std::path::Path;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pantry_scanner=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Zip laid out like a module proxy archive: every file under `path@version/`
pub fn module_zip(module_path: &str, version: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let prefix = format!("{}@{}", module_path, version);
    let entries: Vec<(String, &[u8])> = files
        .iter()
        .map(|(name, content)| (format!("{}/{}", prefix, name), *content))
        .collect();
    raw_zip(
        &entries
            .iter()
            .map(|(name, content)| (name.as_str(), *content))
            .collect::<Vec<_>>(),
    )
}

/// Zip with entry names taken verbatim
pub fn raw_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip entry");
        writer.write_all(content).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Documentation renderer returning fixed text
pub struct StaticDocs(pub String);

#[async_trait]
impl DocRenderer for StaticDocs {
    async fn render(&self, _module_root: &Path) -> Result<String, DocError> {
        Ok(self.0.clone())
    }
}

/// Documentation renderer that always fails
pub struct FailingDocs;

#[async_trait]
impl DocRenderer for FailingDocs {
    async fn render(&self, _module_root: &Path) -> Result<String, DocError> {
        Err(DocError::Failed {
            program: "go".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "no Go files".to_string(),
        })
    }
}

/// License classifier returning fixed matches
pub struct StaticLicenses(pub Vec<(&'static str, f64)>);

#[async_trait]
impl LicenseClassifier for StaticLicenses {
    async fn classify(&self, _module_root: &Path) -> Result<LicenseMatches, LicenseError> {
        Ok(self.0.iter().map(|(id, c)| (id.to_string(), *c)).collect())
    }
}

/// License classifier that always fails
pub struct FailingLicenses;

#[async_trait]
impl LicenseClassifier for FailingLicenses {
    async fn classify(&self, _module_root: &Path) -> Result<LicenseMatches, LicenseError> {
        Err(LicenseError::Timeout {
            program: "license-detector".to_string(),
            secs: 1,
        })
    }
}

/// Classifier that records whether the module root still holds the unpacked files
pub struct RootProbe;

#[async_trait]
impl LicenseClassifier for RootProbe {
    async fn classify(&self, module_root: &Path) -> Result<LicenseMatches, LicenseError> {
        let mut matches = LicenseMatches::new();
        if module_root.join("LICENSE").is_file() {
            matches.insert("MIT".to_string(), 1.0);
        }
        Ok(matches)
    }
}

pub fn ts(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

pub fn format_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Newline-delimited feed page
pub fn feed_page(entries: &[(&str, &str, &str)]) -> String {
    entries
        .iter()
        .map(|(path, version, timestamp)| {
            serde_json::json!({
                "Path": path,
                "Version": version,
                "Timestamp": timestamp,
            })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Configuration pointing at a mock server, with small pools and queues
pub fn test_config(server: &MockServer, scratch: &Path) -> ScannerConfig {
    ScannerConfig {
        scratch_dir: scratch.to_path_buf(),
        index_url: format!("{}/index", server.uri()),
        proxy_url: server.uri(),
        page_limit: 10,
        max_modules: 100,
        resolve_workers: 2,
        extract_workers: 2,
        queue_capacity: 4,
        http_timeout_secs: 5,
        ..Default::default()
    }
}

pub async fn mount_latest(server: &MockServer, module_path: &str, version: &str, time: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/@latest", module_path)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Version": version,
            "Time": time,
        })))
        .expect(1)
        .mount(server)
        .await;
}

pub async fn mount_archive(server: &MockServer, module_path: &str, version: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/@v/{}.zip", module_path, version)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .expect(1)
        .mount(server)
        .await;
}

/// Scratch subdirectories left behind under `root`
pub fn leftover_scratch_dirs(root: &Path) -> usize {
    std::fs::read_dir(root)
        .map(|entries| entries.filter_map(Result::ok).count())
        .unwrap_or(0)
}
