//! Configuration validation

use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::types::TaskKind;

use super::types::Config;

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!("validating configuration");
    validate_scheduler(config)?;
    validate_stages(config)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_scheduler(config: &Config) -> Result<()> {
    let s = &config.scheduler;

    if s.max_concurrent_tasks == 0 {
        return Err(ConfigError::InvalidValue {
            field: "scheduler.max_concurrent_tasks".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if s.max_attempts == 0 {
        return Err(ConfigError::InvalidValue {
            field: "scheduler.max_attempts".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if s.backoff_cap_secs < s.backoff_base_secs {
        return Err(ConfigError::InvalidValue {
            field: "scheduler.backoff_cap_secs".to_string(),
            message: "must be >= backoff_base_secs".to_string(),
        }
        .into());
    }

    if s.lease_duration_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "scheduler.lease_duration_secs".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if s.default_scenes == 0 {
        return Err(ConfigError::InvalidValue {
            field: "scheduler.default_scenes".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_stages(config: &Config) -> Result<()> {
    for name in config.stages.timeout_secs.keys() {
        if TaskKind::parse(name).is_none() {
            return Err(ConfigError::InvalidValue {
                field: format!("stages.timeout_secs.{name}"),
                message: format!(
                    "unknown stage; expected one of: {}",
                    TaskKind::all()
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            }
            .into());
        }
    }

    if config.stages.default_timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: "stages.default_timeout_secs".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Config;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = Config::default();
        config.scheduler.max_concurrent_tasks = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_backoff_cap_below_base_rejected() {
        let mut config = Config::default();
        config.scheduler.backoff_base_secs = 100;
        config.scheduler.backoff_cap_secs = 50;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_unknown_stage_timeout_rejected() {
        let mut config = Config::default();
        config
            .stages
            .timeout_secs
            .insert("render-hologram".to_string(), 60);
        assert!(validate_config(&config).is_err());
    }
}
