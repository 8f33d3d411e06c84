//! HTTP clients for the upstream index and module proxy

pub mod index;
pub mod proxy;

pub use index::{parse_batch, IndexClient, PackageIndex};
pub use proxy::{escape_path, ModuleProxy, ProxyClient};

use std::time::Duration;

/// User agent sent with every upstream request
pub const USER_AGENT: &str = concat!("pantry-scanner/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the index and proxy clients
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}
