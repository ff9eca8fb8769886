use std::time::Duration;

use reqwest::Client;

/// Shared reqwest client with a request timeout.
///
/// A builder failure is logged and falls back to an untimed client.
pub fn http_client(timeout_ms: u64) -> Client {
    match Client::builder().timeout(Duration::from_millis(timeout_ms)).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(
                "HTTP client with {}ms timeout could not be built ({}), requests will not time out",
                timeout_ms,
                e
            );
            Client::new()
        }
    }
}
