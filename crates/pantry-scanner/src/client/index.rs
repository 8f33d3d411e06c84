//! Index feed client
//!
//! The feed is read page by page with `GET <index>?since=<RFC3339>&limit=<n>`.
//! Each page is newline-delimited JSON, one `{Path, Version, Timestamp}` object
//! per line, in publication order.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::FeedError;
use crate::models::{IndexBatch, IndexEntry};

/// Source of index pages
#[async_trait]
pub trait PackageIndex: Send + Sync {
    /// Fetch up to `limit` entries published at or after `since`
    async fn fetch_batch(&self, since: DateTime<Utc>, limit: usize)
        -> Result<IndexBatch, FeedError>;
}

/// HTTP client for the index feed
#[derive(Clone)]
pub struct IndexClient {
    client: Client,
    base_url: String,
}

impl IndexClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PackageIndex for IndexClient {
    async fn fetch_batch(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<IndexBatch, FeedError> {
        let since = since.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let limit_param = limit.to_string();
        debug!(url = %self.base_url, since = %since, limit, "Requesting index page");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("since", since.as_str()), ("limit", limit_param.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                status: response.status().as_u16(),
                url: response.url().to_string(),
            });
        }

        let body = response.text().await?;
        Ok(parse_batch(&body))
    }
}

/// Decode one feed page, skipping blank and malformed lines
pub fn parse_batch(body: &str) -> IndexBatch {
    let mut batch = IndexBatch::default();

    for line in body.lines().map(str::trim).filter(|l| !l.is_empty()) {
        batch.line_count += 1;

        match serde_json::from_str::<IndexEntry>(line) {
            Ok(entry) => batch.entries.push(entry),
            Err(source) => {
                let err = FeedError::Protocol {
                    line: line.to_string(),
                    source,
                };
                warn!(error = %err, "Skipping malformed feed line");
                batch.malformed += 1;
            }
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_skips_blank_and_malformed_lines() {
        let body = concat!(
            r#"{"Path":"example.com/a","Version":"v1.0.0","Timestamp":"2024-01-01T00:00:00Z"}"#,
            "\n\n   \n",
            "{not json}\n",
            r#"{"Path":"example.com/b","Version":"v0.2.0","Timestamp":"2024-01-01T00:00:05.5Z"}"#,
            "\n"
        );

        let batch = parse_batch(body);
        assert_eq!(batch.line_count, 3);
        assert_eq!(batch.malformed, 1);
        let paths: Vec<_> = batch.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["example.com/a", "example.com/b"]);
        assert_eq!(
            batch.max_timestamp().unwrap().to_rfc3339_opts(SecondsFormat::Millis, true),
            "2024-01-01T00:00:05.500Z"
        );
    }

    #[test]
    fn test_parse_batch_empty_body() {
        let batch = parse_batch("");
        assert!(batch.entries.is_empty());
        assert!(batch.is_exhausted(1));
    }
}
