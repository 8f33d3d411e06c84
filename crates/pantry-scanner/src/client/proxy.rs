//! Module proxy client
//!
//! Resolves the latest version of a module path and downloads the zip archive
//! of a specific version.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{ExtractError, ResolveError};
use crate::models::LatestInfo;

/// Version and archive lookups against the module proxy
#[async_trait]
pub trait ModuleProxy: Send + Sync {
    /// Latest known version of `path` and its publish time
    async fn latest(&self, path: &str) -> Result<LatestInfo, ResolveError>;

    /// Raw zip bytes of `path` at `version`
    async fn fetch_archive(&self, path: &str, version: &str) -> Result<Vec<u8>, ExtractError>;
}

/// HTTP client for a GOPROXY-style module proxy
#[derive(Clone)]
pub struct ProxyClient {
    client: Client,
    base_url: String,
    max_archive_bytes: u64,
}

impl ProxyClient {
    pub fn new(client: Client, base_url: impl Into<String>, max_archive_bytes: u64) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_archive_bytes,
        }
    }

    fn latest_url(&self, path: &str) -> String {
        format!("{}/{}/@latest", self.base_url, escape_path(path))
    }

    fn archive_url(&self, path: &str, version: &str) -> String {
        format!(
            "{}/{}/@v/{}.zip",
            self.base_url,
            escape_path(path),
            escape_path(version)
        )
    }
}

#[async_trait]
impl ModuleProxy for ProxyClient {
    async fn latest(&self, path: &str) -> Result<LatestInfo, ResolveError> {
        let url = self.latest_url(path);
        debug!(url = %url, "Resolving latest version");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        Ok(response.json::<LatestInfo>().await?)
    }

    async fn fetch_archive(&self, path: &str, version: &str) -> Result<Vec<u8>, ExtractError> {
        let url = self.archive_url(path, version);
        debug!(url = %url, "Downloading module archive");

        let mut response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ExtractError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        let limit = self.max_archive_bytes;
        if let Some(size) = response.content_length().filter(|size| *size > limit) {
            return Err(ExtractError::TooLarge { size, limit });
        }

        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let size = (data.len() + chunk.len()) as u64;
            if size > limit {
                return Err(ExtractError::TooLarge { size, limit });
            }
            data.extend_from_slice(&chunk);
        }

        Ok(data)
    }
}

/// Encode a module path or version for use in proxy URLs
///
/// Proxies serve case-insensitive filesystems, so every uppercase letter is
/// written as `!` followed by its lowercase form.
pub fn escape_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_ascii_uppercase() {
            escaped.push('!');
            escaped.push(c.to_ascii_lowercase());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_path_lowercases_with_bang() {
        assert_eq!(escape_path("github.com/Azure/azure-sdk"), "github.com/!azure/azure-sdk");
        assert_eq!(escape_path("example.com/foo"), "example.com/foo");
        assert_eq!(escape_path("v1.0.0-RC1"), "v1.0.0-!r!c1");
    }

    #[test]
    fn test_urls_trim_trailing_slash() {
        let proxy = ProxyClient::new(Client::new(), "https://proxy.example/", 1024);
        assert_eq!(
            proxy.latest_url("example.com/Foo"),
            "https://proxy.example/example.com/!foo/@latest"
        );
        assert_eq!(
            proxy.archive_url("example.com/foo", "v1.1.0"),
            "https://proxy.example/example.com/foo/@v/v1.1.0.zip"
        );
    }
}
