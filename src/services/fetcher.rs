// src/services/fetcher.rs

//! Page fetcher.
//!
//! One GET per page, no retries: a transport failure or a non-2xx status is
//! returned to the caller, which treats it as fatal for the run.

use std::borrow::Cow;
use std::sync::Arc;

use regex::{NoExpand, Regex};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::error::{AppError, Result};
use crate::models::SourceConfig;
use crate::utils::http::create_async_client;

/// MIME type that gets hostname rewriting and nonce stripping.
pub const HTML_MIME: &str = "text/html";

/// Used when a response carries no Content-Type header.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Replaces every source hostname match in a page with the mirror hostname.
///
/// The pattern is a regex so several historical hostnames, with or without
/// a scheme, can be matched at once. The replacement is inserted literally.
#[derive(Debug, Clone)]
pub struct HostRewriter {
    pattern: Regex,
    replacement: String,
}

impl HostRewriter {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(&config.hostnames_to_find, config.hostname_replace.clone())
    }

    pub fn rewrite<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.pattern
            .replace_all(text, NoExpand(self.replacement.as_str()))
    }
}

/// A fetched and, for HTML, rewritten page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Content-Type header exactly as served
    pub content_type: String,
    /// MIME type: the header up to the first `;`
    pub mime: String,
    /// Bytes to store
    pub body: Vec<u8>,
}

impl FetchedPage {
    pub fn is_html(&self) -> bool {
        self.mime == HTML_MIME
    }
}

/// Extract the MIME type from a Content-Type header value.
pub fn mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Fetches pages with its own HTTP session.
pub struct ContentFetcher {
    client: Client,
    rewriter: Arc<HostRewriter>,
}

impl ContentFetcher {
    /// Create a fetcher with a fresh HTTP client.
    pub fn new(config: &SourceConfig, rewriter: Arc<HostRewriter>) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
            rewriter,
        })
    }

    /// GET a page and prepare its body for storage.
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(url, format!("HTTP status {status}")));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let mime = mime_type(&content_type);

        let body = if mime == HTML_MIME {
            let text = response.text().await?;
            self.rewriter.rewrite(&text).into_owned().into_bytes()
        } else {
            response.bytes().await?.to_vec()
        };

        Ok(FetchedPage {
            content_type,
            mime,
            body,
        })
    }
}
