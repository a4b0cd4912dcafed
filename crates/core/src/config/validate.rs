use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one processing worker
/// - Non-zero download batch size and quota
/// - Poll attempts bounded below by one
/// - A resolution and catalog page size that the remote services accept
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.processor.workers == 0 {
        return Err(ConfigError::ValidationError(
            "processor.workers cannot be 0".to_string(),
        ));
    }

    if config.processor.queue_capacity == 0 {
        return Err(ConfigError::ValidationError(
            "processor.queue_capacity cannot be 0".to_string(),
        ));
    }

    if config.processor.poll_attempts == 0 || config.downloader.quota_poll_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "poll attempts must be at least 1".to_string(),
        ));
    }

    if config.processor.resolution.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "processor.resolution cannot be empty".to_string(),
        ));
    }

    if config.downloader.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "downloader.batch_size cannot be 0".to_string(),
        ));
    }

    if config.downloader.quota_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "downloader.quota_bytes cannot be 0".to_string(),
        ));
    }

    if config.catalog.page_size == 0 || config.catalog.page_size > 2000 {
        return Err(ConfigError::ValidationError(
            "catalog.page_size must be between 1 and 2000".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.processor.workers = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_poll_attempts_fails() {
        let mut config = Config::default();
        config.downloader.quota_poll_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_page_size_bounds() {
        let mut config = Config::default();
        config.catalog.page_size = 5000;
        assert!(validate_config(&config).is_err());
    }
}
