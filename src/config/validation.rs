use crate::config::types::{Config, CrawlerConfig, OutputConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_crawler_config(&config.crawler)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates target site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "base-url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if let Some(url) = &config.image_whitelist_url {
        Url::parse(url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid image-whitelist-url: {}", e)))?;
    }

    if let Some(url) = &config.author_overrides_url {
        Url::parse(url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid author-overrides-url: {}", e)))?;
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_count < 1 || config.worker_count > 100 {
        return Err(ConfigError::Validation(format!(
            "worker-count must be between 1 and 100, got {}",
            config.worker_count
        )));
    }

    if config.write_chunk_size < 1 {
        return Err(ConfigError::Validation(format!(
            "write-chunk-size must be >= 1, got {}",
            config.write_chunk_size
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
