use crate::config::types::{CatalogConfig, Config, FetcherConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetcher_config(&config.fetcher)?;
    validate_catalog_config(&config.catalog)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates fetcher delay bounds and retry settings
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.min_delay > config.initial_delay || config.initial_delay > config.max_delay {
        return Err(ConfigError::Validation(format!(
            "delays must satisfy min-delay <= initial-delay <= max-delay, got {} / {} / {}",
            config.min_delay, config.initial_delay, config.max_delay
        )));
    }

    if config.backoff_multiplier.is_nan() || config.backoff_multiplier <= 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff-multiplier must be > 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max-retries must be >= 1".to_string(),
        ));
    }

    if config.request_timeout == 0 || config.connect_timeout == 0 {
        return Err(ConfigError::Validation(
            "request-timeout and connect-timeout must be > 0".to_string(),
        ));
    }

    if let Some(agent) = &config.user_agent {
        if agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user-agent cannot be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates the catalog root and that every seed lives beneath it
fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    let base = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if !base.path().ends_with('/') {
        return Err(ConfigError::Validation(format!(
            "base-url '{}' must end with '/'",
            config.base_url
        )));
    }

    for seed in &config.seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.origin() != base.origin() || !url.path().starts_with(base.path()) {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' is outside base-url '{}'",
                seed, config.base_url
            )));
        }
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

    if config.images_dir.is_empty() {
        return Err(ConfigError::Validation(
            "images-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
