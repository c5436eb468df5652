//! Utility functions and helpers.

pub mod http;
pub mod url;

use std::path::Path;

use md5::{Digest, Md5};

use crate::error::Result;

/// Lowercase hex MD5 digest, the format S3 uses for single-part ETags.
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Read a newline-delimited list file, skipping blank lines.
pub async fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(parse_lines(&content))
}

/// Split list content into trimmed, non-empty lines.
pub fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
