//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Upstream site, feed and rewrite settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Worker pool and polling behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Durable object store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// CDN invalidation settings
    #[serde(default)]
    pub cdn: CdnConfig,

    /// Metrics sink settings
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Failure notification settings
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply `SCRAPER_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SCRAPER_SLACK_URL") {
            self.notify.slack_url = Some(url);
        }
        if let Some(pattern) = lookup("SCRAPER_HOSTNAMES_TO_FIND") {
            self.source.hostnames_to_find = pattern;
        }
        if let Some(replace) = lookup("SCRAPER_HOSTNAME_REPLACE") {
            self.source.hostname_replace = replace;
        }
        if let Some(host) = lookup("SCRAPER_HOST_FOR_URLS_AND_PAGES") {
            self.source.base_url = format!("https://{}", host.trim_end_matches('/'));
        }
        if let Some(bucket) = lookup("SCRAPER_S3_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Some(distribution) = lookup("SCRAPER_CLOUDFRONT_DISTRIBUTION") {
            self.cdn.distribution_id = distribution;
        }
        if let Some(max) = lookup("SCRAPER_CLOUDFRONT_MAX_INVALIDATIONS") {
            match max.parse() {
                Ok(n) => self.cdn.max_invalidations = n,
                Err(_) => log::warn!("Ignoring invalid SCRAPER_CLOUDFRONT_MAX_INVALIDATIONS: {max}"),
            }
        }
        if let Some(namespace) = lookup("SCRAPER_CLOUDFRONT_CLOUDWATCH_NAMESPACE") {
            self.metrics.namespace = namespace;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        self.source.base()?;
        regex::Regex::new(&self.source.hostnames_to_find)?;
        if self.crawler.workers == 0 {
            return Err(AppError::validation("crawler.workers must be > 0"));
        }
        if self.crawler.poll_interval_ms == 0 {
            return Err(AppError::validation("crawler.poll_interval_ms must be > 0"));
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.bucket.trim().is_empty() {
            return Err(AppError::validation("storage.bucket is required for the s3 backend"));
        }
        if self.cdn.enabled && self.cdn.distribution_id.trim().is_empty() {
            return Err(AppError::validation(
                "cdn.distribution_id is required when invalidation is enabled",
            ));
        }
        if (self.metrics.publish_stats || self.metrics.heartbeat)
            && self.metrics.namespace.trim().is_empty()
        {
            return Err(AppError::validation(
                "metrics.namespace is required to publish stats or heartbeat",
            ));
        }
        if self.notify.enabled && self.notify.slack_url.is_none() && self.notify.smtp_relay.is_none()
        {
            return Err(AppError::validation(
                "notify needs a slack_url or smtp_relay when enabled",
            ));
        }
        Ok(())
    }
}

/// Upstream content source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Scheme and host every feed link and static path is resolved against
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Path of the "recently updated" feed endpoint
    #[serde(default = "defaults::feed_path")]
    pub feed_path: String,

    /// Newline-delimited list of static asset paths
    #[serde(default = "defaults::static_files")]
    pub static_files: String,

    /// User-Agent header for every request
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Regex matching the hostnames to rewrite in HTML bodies
    #[serde(default = "defaults::hostnames_to_find")]
    pub hostnames_to_find: String,

    /// Literal replacement for every hostname match
    #[serde(default = "defaults::hostname_replace")]
    pub hostname_replace: String,

    /// Skip TLS certificate verification against the source
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Optional request timeout; transport default when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl SourceConfig {
    /// Parsed base URL.
    pub fn base(&self) -> Result<Url> {
        Ok(Url::parse(&self.base_url)?)
    }

    /// Full URL of the feed endpoint.
    pub fn feed_url(&self) -> Result<Url> {
        Ok(self.base()?.join(&self.feed_path)?)
    }

    /// Resolve a feed link or static path against the base URL.
    pub fn resolve(&self, link: &str) -> Result<Url> {
        Ok(self.base()?.join(link)?)
    }

    /// Request timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            feed_path: defaults::feed_path(),
            static_files: defaults::static_files(),
            user_agent: defaults::user_agent(),
            hostnames_to_find: defaults::hostnames_to_find(),
            hostname_replace: defaults::hostname_replace(),
            accept_invalid_certs: false,
            timeout_secs: None,
        }
    }
}

/// Worker pool and feed polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    #[serde(default = "defaults::workers")]
    pub workers: usize,

    /// Pause between incremental feed polls in milliseconds
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,
}

impl CrawlerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: defaults::workers(),
            poll_interval_ms: defaults::poll_interval(),
        }
    }
}

/// Which object store receives the mirrored pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    #[default]
    Local,
}

/// Object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// S3 bucket name
    #[serde(default)]
    pub bucket: String,

    /// Root directory for the local backend
    #[serde(default = "defaults::local_root")]
    pub local_root: String,

    /// Newline-delimited key prefixes `prune` never deletes
    #[serde(default)]
    pub preserve_list: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            bucket: String::new(),
            local_root: defaults::local_root(),
            preserve_list: None,
        }
    }
}

/// CDN invalidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    #[serde(default)]
    pub enabled: bool,

    /// CloudFront distribution id
    #[serde(default)]
    pub distribution_id: String,

    /// Invalidations allowed per run
    #[serde(default = "defaults::max_invalidations")]
    pub max_invalidations: usize,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            distribution_id: String::new(),
            max_invalidations: defaults::max_invalidations(),
        }
    }
}

/// Metrics sink settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    /// CloudWatch namespace
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub publish_stats: bool,

    #[serde(default)]
    pub heartbeat: bool,
}

/// Failure notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Chat webhook receiving `{"text": ...}`
    #[serde(default)]
    pub slack_url: Option<String>,

    /// SMTP relay host used when the webhook fails
    #[serde(default)]
    pub smtp_relay: Option<String>,

    #[serde(default = "defaults::email_from")]
    pub email_from: String,

    #[serde(default)]
    pub email_to: Vec<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            slack_url: None,
            smtp_relay: None,
            email_from: defaults::email_from(),
            email_to: Vec::new(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Source defaults
    pub fn base_url() -> String {
        "https://beta.phila.gov".to_string()
    }
    pub fn feed_path() -> String {
        "/wp-json/last-updated/v1/all".to_string()
    }
    pub fn static_files() -> String {
        "staticfiles.csv".to_string()
    }
    pub fn user_agent() -> String {
        "beta-static-generator/0.0.1".to_string()
    }
    pub fn hostnames_to_find() -> String {
        r"(https?://)?beta\.phila\.gov".to_string()
    }
    pub fn hostname_replace() -> String {
        "https://www.phila.gov".to_string()
    }

    // Crawler defaults
    pub fn workers() -> usize {
        12
    }
    pub fn poll_interval() -> u64 {
        1000
    }

    // Storage defaults
    pub fn local_root() -> String {
        "sitefiles".to_string()
    }

    // CDN defaults
    pub fn max_invalidations() -> usize {
        50
    }

    // Notification defaults
    pub fn email_from() -> String {
        "site-mirror@localhost".to_string()
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.crawler.workers, 12);
        assert_eq!(config.cdn.max_invalidations, 50);
        assert_eq!(config.storage.backend, StorageBackend::Local);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [source]
            base_url = "https://example.org"

            [storage]
            backend = "s3"
            bucket = "mirror-bucket"

            [cdn]
            enabled = true
            distribution_id = "E123"
            max_invalidations = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.source.base_url, "https://example.org");
        assert_eq!(config.source.feed_path, "/wp-json/last-updated/v1/all");
        assert_eq!(config.storage.backend, StorageBackend::S3);
        assert_eq!(config.cdn.max_invalidations, 2);
        assert_eq!(config.crawler.poll_interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feed_and_link_resolution() {
        let source = SourceConfig {
            base_url: "https://example.org".to_string(),
            ..SourceConfig::default()
        };
        assert_eq!(
            source.feed_url().unwrap().as_str(),
            "https://example.org/wp-json/last-updated/v1/all"
        );
        assert_eq!(
            source.resolve("/services/water/").unwrap().as_str(),
            "https://example.org/services/water/"
        );
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|name| match name {
            "SCRAPER_HOST_FOR_URLS_AND_PAGES" => Some("admin.example.org".to_string()),
            "SCRAPER_S3_BUCKET" => Some("static.example.org".to_string()),
            "SCRAPER_CLOUDFRONT_MAX_INVALIDATIONS" => Some("7".to_string()),
            "SCRAPER_SLACK_URL" => Some("https://hooks.example/x".to_string()),
            _ => None,
        });
        assert_eq!(config.source.base_url, "https://admin.example.org");
        assert_eq!(config.storage.bucket, "static.example.org");
        assert_eq!(config.cdn.max_invalidations, 7);
        assert_eq!(
            config.notify.slack_url.as_deref(),
            Some("https://hooks.example/x")
        );
    }

    #[test]
    fn test_validate_rejects_missing_bucket() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::S3;
        assert!(matches!(config.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let mut config = Config::default();
        config.source.hostnames_to_find = "(unclosed".to_string();
        assert!(matches!(config.validate(), Err(AppError::Pattern(_))));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.crawler.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site-mirror.toml");
        std::fs::write(&path, "[crawler]\nworkers = 3\n").unwrap();
        assert_eq!(Config::load(&path).unwrap().crawler.workers, 3);

        std::fs::write(&path, "[crawler\n").unwrap();
        assert!(matches!(Config::load(&path), Err(AppError::Toml(_))));
        assert_eq!(Config::load_or_default(&path).crawler.workers, 12);
    }
}
