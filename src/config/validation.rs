use crate::config::types::{Config, OutputConfig, PortalConfig, SessionConfig, SourceConfig};
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_portal_config(&config.portal)?;
    validate_session_config(&config.session)?;
    validate_source_config(&config.source)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the listing endpoint and the selectors used to read it
fn validate_portal_config(config: &PortalConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.item_param.trim().is_empty() {
        return Err(ConfigError::Validation(
            "item-param cannot be empty".to_string(),
        ));
    }

    if config.no_records_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "no-records-marker cannot be empty".to_string(),
        ));
    }

    if config.page_size_param.is_some() && config.page_size == 0 {
        return Err(ConfigError::Validation(
            "page-size must be >= 1 when page-size-param is set".to_string(),
        ));
    }

    for (name, selector) in [
        ("summary-selector", &config.summary_selector),
        ("indicator-selector", &config.indicator_selector),
        ("next-selector", &config.next_selector),
    ] {
        validate_selector(name, selector)?;
    }

    Ok(())
}

fn validate_selector(name: &str, selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("{} '{}': {:?}", name, selector, e)))
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    if config.navigation_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "navigation-attempts must be >= 1, got {}",
            config.navigation_attempts
        )));
    }

    if config.recycle_every < 1 {
        return Err(ConfigError::Validation(format!(
            "recycle-every must be >= 1, got {}",
            config.recycle_every
        )));
    }

    Ok(())
}

fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    if config.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "source path cannot be empty".to_string(),
        ));
    }

    if config.item_column.trim().is_empty() {
        return Err(ConfigError::Validation(
            "item-column cannot be empty".to_string(),
        ));
    }

    // A filter needs both halves
    if config.filter_column.is_some() != config.filter_value.is_some() {
        return Err(ConfigError::Validation(
            "filter-column and filter-value must be set together".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.ledger_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "ledger-dir cannot be empty".to_string(),
        ));
    }

    if config.artifact_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "artifact-dir cannot be empty".to_string(),
        ));
    }

    if config.ledger_prefix.is_empty()
        || !config
            .ledger_prefix
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "ledger-prefix must be non-empty and contain only alphanumerics, '_' or '-', got '{}'",
            config.ledger_prefix
        )));
    }

    Ok(())
}
