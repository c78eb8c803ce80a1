//! Integration tests for studio-config

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use studio_config::*;
use temp_env::with_vars;

#[test]
fn test_default_config_validation() {
    let config = StudioConfig::default();
    assert!(config.validate_all().is_ok());
    assert_eq!(config.queue.max_queue_size, 50);
    assert!(config.daemon.auto_restart);
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("STUDIO_DAEMON_EXECUTABLE", Some("/usr/bin/python3.11")),
        ("STUDIO_DAEMON_SCRIPT", Some("/opt/studio/daemon.py")),
        ("STUDIO_MAX_QUEUE_SIZE", Some("7")),
        ("STUDIO_OUTPUT_DIR", Some("/tmp/renders")),
        ("STUDIO_LOG_LEVEL", Some("debug")),
    ];

    with_vars(vars, || {
        let config = ConfigLoader::new().from_env().unwrap();

        assert_eq!(config.daemon.executable, PathBuf::from("/usr/bin/python3.11"));
        assert_eq!(config.daemon.args, vec!["/opt/studio/daemon.py".to_string()]);
        assert_eq!(config.queue.max_queue_size, 7);
        assert_eq!(config.output.root_dir, PathBuf::from("/tmp/renders"));
        assert_eq!(config.logging.level, LogLevel::Debug);
    });
}

#[test]
fn test_invalid_env_value_is_reported() {
    with_vars(vec![("STUDIO_MAX_QUEUE_SIZE", Some("lots"))], || {
        match ConfigLoader::new().from_env() {
            Err(ConfigError::EnvError(message)) => assert!(message.contains("MAX_QUEUE_SIZE")),
            other => panic!("expected env error, got {:?}", other),
        }
    });
}

#[test]
fn test_zero_queue_size_fails_validation() {
    with_vars(vec![("STUDIO_MAX_QUEUE_SIZE", Some("0"))], || {
        assert!(matches!(
            ConfigLoader::new().from_env(),
            Err(ConfigError::DomainError { .. })
        ));
    });
}

#[test]
fn test_custom_prefix() {
    with_vars(vec![("BENCH_MAX_QUEUE_SIZE", Some("3"))], || {
        let config = ConfigLoader::with_prefix("BENCH").from_env().unwrap();
        assert_eq!(config.queue.max_queue_size, 3);
    });
}

#[test]
fn test_yaml_config_serialization() {
    let yaml = StudioConfig::generate_sample();
    let parsed: StudioConfig = serde_yaml::from_str(&yaml).unwrap();
    assert!(parsed.validate_all().is_ok());
    assert_eq!(parsed.daemon.crash_stability_window, Duration::from_secs(300));
}

#[test]
fn test_partial_yaml_file_with_env_override() {
    let yaml = r#"
daemon:
  executable: "python3"
  args: ["daemon/studio_daemon.py", "--low-vram"]
  max_crashes_before_give_up: 2
  max_restart_delay: 10

queue:
  max_queue_size: 20

logging:
  level: warn
"#;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    with_vars(vec![("STUDIO_LOG_LEVEL", Some("trace"))], || {
        let config = ConfigLoader::new().load(Some(file.path())).unwrap();

        assert_eq!(config.daemon.args.len(), 2);
        assert_eq!(config.daemon.max_crashes_before_give_up, 2);
        assert_eq!(config.daemon.max_restart_delay, Duration::from_secs(10));
        // Unspecified fields keep their defaults
        assert_eq!(config.daemon.crash_stability_window, Duration::from_secs(300));
        assert!(config.queue.auto_save);
        assert_eq!(config.output.root_dir, PathBuf::from("studio-output"));
        assert_eq!(config.logging.level, LogLevel::Trace);
    });
}

#[test]
fn test_missing_file_is_read_error() {
    let result = ConfigLoader::new().from_file("/nonexistent/studio.yaml");
    assert!(matches!(result, Err(ConfigError::FileReadError(_))));
}
