use tierroute_common::config::SystemConfig;
use tierroute_common::types::Thresholds;

use super::loader::ConfigError;

/// Validate the complete system configuration.
///
/// Checks sane ranges on numeric parameters and cross-field consistency.
/// The service refuses to start on validation failure.
pub fn validate(config: &SystemConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_router(config, &mut errors);
    validate_models(config, &mut errors);
    validate_backends(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

fn validate_router(config: &SystemConfig, errors: &mut Vec<String>) {
    let r = &config.router;

    if let Err(e) = Thresholds::new(r.high_threshold, r.medium_threshold, r.low_threshold) {
        errors.push(format!("router.{}", e));
    }
    if r.refresh_seconds == 0 {
        errors.push("router.refresh_seconds must be > 0".into());
    }
    if r.top_k == 0 {
        errors.push("router.top_k must be > 0".into());
    }
    if r.keyword_limit == 0 {
        errors.push("router.keyword_limit must be > 0".into());
    }
}

fn validate_models(config: &SystemConfig, errors: &mut Vec<String>) {
    let m = &config.models;

    for (name, id) in [
        ("local", &m.local),
        ("mid", &m.mid),
        ("advanced", &m.advanced),
        ("frontier", &m.frontier),
    ] {
        if id.is_empty() {
            errors.push(format!("models.{} must not be empty", name));
        }
    }
}

fn validate_backends(config: &SystemConfig, errors: &mut Vec<String>) {
    if config.backends.is_empty() {
        errors.push("at least one embedding backend must be configured".into());
    }

    for (i, b) in config.backends.iter().enumerate() {
        if b.provider != "local" && b.provider != "cloud" {
            errors.push(format!(
                "backends[{}].provider must be \"local\" or \"cloud\", got \"{}\"",
                i, b.provider
            ));
        }
        if b.base_url.is_empty() {
            errors.push(format!("backends[{}].base_url must not be empty", i));
        }
        if b.model.is_empty() {
            errors.push(format!("backends[{}].model must not be empty", i));
        }
        if b.dimensions == 0 {
            errors.push(format!("backends[{}].dimensions must be > 0", i));
        }
        if b.fast_timeout_ms == 0 {
            errors.push(format!("backends[{}].fast_timeout_ms must be > 0", i));
        }
        if b.slow_timeout_ms < b.fast_timeout_ms {
            errors.push(format!(
                "backends[{}].slow_timeout_ms must be >= fast_timeout_ms",
                i
            ));
        }
        if b.provider == "cloud" && b.api_key_env.as_deref().unwrap_or("").is_empty() {
            errors.push(format!(
                "backends[{}].api_key_env is required for cloud providers",
                i
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierroute_common::config::{BackendConfig, ModelsConfig, RouterConfig};

    fn valid_config() -> SystemConfig {
        SystemConfig {
            router: RouterConfig::default(),
            models: ModelsConfig::default(),
            backends: vec![BackendConfig {
                provider: "local".into(),
                base_url: "http://localhost:11434".into(),
                model: "nomic-embed-text".into(),
                dimensions: 768,
                api_key_env: None,
                fast_timeout_ms: 5_000,
                slow_timeout_ms: 30_000,
                max_retries: 3,
                retry_delay_ms: 500,
                cache_enabled: true,
                cache_max_size: 1_000,
                cache_ttl_seconds: 3_600,
                quota_cooldown_seconds: 3_600,
                availability_check_seconds: 60,
                auto_pull: false,
            }],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_rejects_threshold_misordering() {
        let mut config = valid_config();
        config.router.high_threshold = 0.5;
        config.router.medium_threshold = 0.7;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_no_backends() {
        let mut config = valid_config();
        config.backends.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_cloud_without_key_env() {
        let mut config = valid_config();
        config.backends[0].provider = "cloud".into();
        config.backends[0].api_key_env = None;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_slow_shorter_than_fast() {
        let mut config = valid_config();
        config.backends[0].slow_timeout_ms = 1_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = valid_config();
        config.router.top_k = 0;
        config.backends[0].model = String::new();
        let err = validate(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("top_k"));
        assert!(message.contains("model"));
    }
}
