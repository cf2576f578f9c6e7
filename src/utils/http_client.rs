//! Shared HTTP client construction.

use std::time::Duration;

use tracing::warn;

/// Default request timeout for asset downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Connect timeout applied to all outbound requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the `reqwest::Client` used for asset downloads and blob snapshot
/// writes.
///
/// Falls back to the library default client when the builder fails, which
/// only happens with broken TLS backends.
pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DOWNLOAD_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|error| {
            warn!(error = %error, "Failed to build HTTP client; falling back to defaults");
            reqwest::Client::new()
        })
}
