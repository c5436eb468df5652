// src/utils/url.rs

//! URL to object key mapping.

use url::Url;

use crate::error::{AppError, Result};

/// Document name appended to directory-like paths.
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// Derive the object store key for a page URL.
///
/// The scheme and host are dropped. Paths that look like directories (empty,
/// ending in `/`, or whose last segment has no extension) get
/// [`DEFAULT_DOCUMENT`] appended.
///
/// # Examples
/// ```
/// use site_mirror::utils::url::object_key;
///
/// assert_eq!(object_key("https://host/a/b/").unwrap(), "a/b/index.html");
/// assert_eq!(object_key("https://host/file.pdf").unwrap(), "file.pdf");
/// assert_eq!(object_key("https://host/").unwrap(), "index.html");
/// ```
pub fn object_key(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;
    Ok(key_for_path(parsed.path()))
}

/// Key for an already extracted URL path.
pub fn key_for_path(path: &str) -> String {
    let key = path.trim_start_matches('/');
    if key.is_empty() {
        return DEFAULT_DOCUMENT.to_string();
    }
    if key.ends_with('/') {
        return format!("{key}{DEFAULT_DOCUMENT}");
    }

    let last_segment = key.rsplit('/').next().unwrap_or(key);
    if last_segment.contains('.') {
        key.to_string()
    } else {
        format!("{key}/{DEFAULT_DOCUMENT}")
    }
}

/// CDN path for an object key (always rooted).
pub fn invalidation_path(key: &str) -> String {
    if key.starts_with('/') {
        key.to_string()
    } else {
        format!("/{key}")
    }
}

/// Join a site-relative static path onto the base URL.
pub fn static_url(base: &Url, path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("empty static file path"));
    }
    Ok(base.join(trimmed)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_urls_get_index() {
        assert_eq!(object_key("https://host/a/b/").unwrap(), "a/b/index.html");
        assert_eq!(object_key("https://host/a/b").unwrap(), "a/b/index.html");
        assert_eq!(object_key("https://host").unwrap(), "index.html");
        assert_eq!(object_key("https://host/").unwrap(), "index.html");
    }

    #[test]
    fn test_files_keep_their_path() {
        assert_eq!(object_key("https://host/file.pdf").unwrap(), "file.pdf");
        assert_eq!(
            object_key("https://host/wp-content/themes/site.css?ver=2").unwrap(),
            "wp-content/themes/site.css"
        );
    }

    #[test]
    fn test_dot_in_parent_segment_is_still_a_directory() {
        assert_eq!(
            object_key("https://host/v1.2/docs").unwrap(),
            "v1.2/docs/index.html"
        );
        assert_eq!(
            object_key("https://host/v1.2/").unwrap(),
            "v1.2/index.html"
        );
    }

    #[test]
    fn test_distinct_urls_distinct_keys() {
        let a = object_key("https://host/a/").unwrap();
        let b = object_key("https://host/a/index.html").unwrap();
        let c = object_key("https://host/b/").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalidation_path() {
        assert_eq!(invalidation_path("a/index.html"), "/a/index.html");
        assert_eq!(invalidation_path("/a/index.html"), "/a/index.html");
    }

    #[test]
    fn test_static_url() {
        let base = Url::parse("https://example.org").unwrap();
        assert_eq!(
            static_url(&base, "/assets/app.js").unwrap(),
            "https://example.org/assets/app.js"
        );
        assert!(static_url(&base, "   ").is_err());
    }
}
