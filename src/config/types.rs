use serde::Deserialize;

/// Main configuration structure for Wikisnap
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
}

/// Target site configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Base URL of the wiki, e.g. "http://www.scp-wiki.net/"
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Listing page holding the image whitelist table
    #[serde(rename = "image-whitelist-url")]
    pub image_whitelist_url: Option<String>,

    /// Listing page holding the author override table
    #[serde(rename = "author-overrides-url")]
    pub author_overrides_url: Option<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of parallel fetch workers
    #[serde(rename = "worker-count", default = "default_worker_count")]
    pub worker_count: usize,

    /// Rows per write transaction for bulk inserts
    #[serde(rename = "write-chunk-size", default = "default_write_chunk_size")]
    pub write_chunk_size: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            write_chunk_size: default_write_chunk_size(),
        }
    }
}

fn default_worker_count() -> usize {
    18
}

fn default_write_chunk_size() -> usize {
    500
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite snapshot database
    #[serde(rename = "database-path")]
    pub database_path: String,
}
