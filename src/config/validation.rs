//! Configuration validation logic.

use crate::config::loader::{Config, DelayRange};
use crate::config::modes::SourceMode;
use crate::error::{Error, Result};

/// Validate the entire configuration.
pub fn validate_config(config: &Config) -> Result<()> {
    validate_concurrency(config)?;
    validate_limits(config)?;
    validate_delays(config)?;
    validate_output(config)?;
    validate_targets(config)?;

    Ok(())
}

fn validate_concurrency(config: &Config) -> Result<()> {
    let pools = [
        ("concurrency.keyword", config.concurrency.keyword),
        ("concurrency.post_detail", config.concurrency.post_detail),
        ("concurrency.comment", config.concurrency.comment),
        ("concurrency.user", config.concurrency.user),
        ("concurrency.media_download", config.concurrency.media_download),
        ("concurrency.global", config.concurrency.global),
    ];

    for (field, value) in pools {
        if value == 0 {
            return Err(Error::ConfigValidation {
                field: field.to_string(),
                message: "Pool size must be at least 1".to_string(),
            });
        }
    }

    Ok(())
}

fn validate_limits(config: &Config) -> Result<()> {
    if config.limits.retries == 0 {
        return Err(Error::ConfigValidation {
            field: "limits.retries".to_string(),
            message: "At least one attempt is required".to_string(),
        });
    }

    if config.limits.timeout_secs == 0 {
        return Err(Error::ConfigValidation {
            field: "limits.timeout_secs".to_string(),
            message: "Timeout must be positive".to_string(),
        });
    }

    if config.limits.max_user_pages == 0 && config.limits.unlimited_user_page_cap == 0 {
        return Err(Error::ConfigValidation {
            field: "limits.unlimited_user_page_cap".to_string(),
            message: "A safety cap is required when max_user_pages is 0".to_string(),
        });
    }

    Ok(())
}

fn validate_delays(config: &Config) -> Result<()> {
    let ranges = [
        ("delays.request", config.delays.request),
        ("delays.search_page", config.delays.search_page),
        ("delays.comment_page", config.delays.comment_page),
        ("delays.user_page", config.delays.user_page),
    ];

    for (field, range) in ranges {
        validate_delay_range(field, range)?;
    }

    Ok(())
}

/// Validate one `[min, max]` delay range.
pub fn validate_delay_range(field: &str, range: DelayRange) -> Result<()> {
    if !range.min().is_finite() || !range.max().is_finite() || range.min() < 0.0 {
        return Err(Error::ConfigValidation {
            field: field.to_string(),
            message: format!("Delays must be non-negative seconds (got {:?})", range),
        });
    }

    if range.max() < range.min() {
        return Err(Error::ConfigValidation {
            field: field.to_string(),
            message: format!(
                "Maximum delay {} is below minimum {}",
                range.max(),
                range.min()
            ),
        });
    }

    Ok(())
}

fn validate_output(config: &Config) -> Result<()> {
    for (field, value) in [
        ("output.text_dir", &config.output.text_dir),
        ("output.media_dir", &config.output.media_dir),
    ] {
        if value.trim().is_empty() || value.contains("..") {
            return Err(Error::ConfigValidation {
                field: field.to_string(),
                message: format!("Invalid directory name: '{}'", value),
            });
        }
    }

    Ok(())
}

fn validate_targets(config: &Config) -> Result<()> {
    let has_targets = config.enabled_modes().iter().any(|mode| match mode {
        SourceMode::Keyword => !config.active_keywords().is_empty(),
        SourceMode::PostUrl => !config.active_post_urls().is_empty(),
        SourceMode::User => !config.active_users().is_empty(),
        SourceMode::Profile => false,
    });

    if !has_targets {
        let modes: Vec<&str> = config.enabled_modes().iter().map(|m| m.as_str()).collect();
        return Err(Error::MissingConfig(format!(
            "targets (no keywords, post links or users for enabled modes: {})",
            modes.join(", ")
        )));
    }

    Ok(())
}
