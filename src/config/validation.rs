use crate::config::types::{Config, CrawlerConfig, FetcherConfig, InputConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_input_config(&config.input)?;
    validate_output_config(&config.output)?;
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    Ok(())
}

/// Validates the work-list selector
fn validate_input_config(config: &InputConfig) -> Result<(), ConfigError> {
    if let Some(month) = config.month {
        if !(1..=12).contains(&month) {
            return Err(ConfigError::Validation(format!(
                "month must be 1-12, got {}",
                month
            )));
        }
    }

    if let Some(year) = config.year {
        if year <= 0 {
            return Err(ConfigError::Validation(format!(
                "year must be positive, got {}",
                year
            )));
        }
    }

    let has_path = config
        .path
        .as_ref()
        .is_some_and(|p| !p.as_os_str().is_empty());
    let has_period = config.year.is_some() && config.month.is_some();

    if !has_path && !has_period {
        return Err(ConfigError::MissingInput);
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if let Some(path) = &config.path {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "output path cannot be empty".to_string(),
            ));
        }
    }

    if config.checkpoint_suffix.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_suffix cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawl engine settings
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    if !config.initial_rate.is_finite() || config.initial_rate <= 0.0 {
        return Err(ConfigError::Validation(format!(
            "initial_rate must be > 0 requests/sec, got {}",
            config.initial_rate
        )));
    }

    if !config.base_delay_secs.is_finite() || config.base_delay_secs < 0.0 {
        return Err(ConfigError::Validation(format!(
            "base_delay_secs must be >= 0, got {}",
            config.base_delay_secs
        )));
    }

    if config.progress_every < 1 {
        return Err(ConfigError::Validation(
            "progress_every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.endpoint)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid endpoint: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "endpoint '{}' must use HTTP or HTTPS",
            config.endpoint
        )));
    }

    if config.id_param.is_empty() {
        return Err(ConfigError::Validation(
            "id_param cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    Ok(())
}
