// src/utils/http.rs

//! HTTP client utilities.

use crate::error::Result;
use crate::models::SourceConfig;

/// Create a configured asynchronous HTTP client for talking to the source.
///
/// Each worker builds its own so no connection pool is shared across tasks.
pub fn create_async_client(config: &SourceConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .danger_accept_invalid_certs(config.accept_invalid_certs);
    if let Some(timeout) = config.timeout() {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}
