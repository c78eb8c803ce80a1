use anyhow::Result;
use studio_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(&config.level.to_string());

    // Use try_init to avoid panic if global subscriber already set
    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_targets)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Initialize simple tracing for basic console output
pub fn init_simple_tracing(log_level: &str) -> Result<()> {
    let env_filter = build_env_filter(log_level);

    if tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

/// Parse a filter directive, falling back to `RUST_LOG` and then `info`
pub fn build_env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_config::LogLevel;

    #[test]
    fn test_filter_accepts_module_directives() {
        let filter = build_env_filter("info,studio_daemon=debug");
        assert!(filter.to_string().contains("studio_daemon=debug"));
    }

    #[test]
    fn test_repeated_init_does_not_fail() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            include_targets: true,
        };
        assert!(init_logging_from_config(&config).is_ok());
        assert!(init_simple_tracing("warn").is_ok());
    }
}
