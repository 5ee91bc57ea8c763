use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use wikisnap::config::load_config;
///
/// let config = load_config(Path::new("config.toml")).unwrap();
/// println!("Worker pool size: {}", config.crawler.worker_count);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config: Config = toml::from_str(&content)?;

    validate(&config)?;

    // The connector joins relative paths onto the base URL, so it must end
    // with a slash.
    if !config.site.base_url.ends_with('/') {
        config.site.base_url.push('/');
    }

    Ok(config)
}
