use serial_test::serial;
use std::{fs, path::PathBuf};
use tally_common::observability::LogFormat;
use tally_config::{InvalidConfig, TallyConfigLoader};
use tempfile::TempDir;

/// Write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
twitter:
  batch_size: 50
  pause_secs: 1
logging:
  format: json
  filter: "tally=debug"
  emit_stderr: true
"#;

#[test]
#[serial]
fn credentials_default_to_consumer_env_vars() {
    temp_env::with_vars(
        [
            ("CONSUMER_KEY", Some("ck-from-env")),
            ("CONSUMER_SECRET", Some("cs-from-env")),
        ],
        || {
            let tmp = TempDir::new().unwrap();
            let p = write_yaml(&tmp, "tally.yaml", FILE_YAML);

            let cfg = TallyConfigLoader::new().with_file(p).load().expect("load config");

            assert_eq!(cfg.twitter.consumer_key, "ck-from-env");
            assert_eq!(cfg.twitter.consumer_secret, "cs-from-env");
            assert_eq!(cfg.twitter.batch_size, 50);
            assert_eq!(cfg.twitter.pause_secs, 1);
            assert_eq!(cfg.logging.format, LogFormat::Json);
            assert_eq!(cfg.logging.filter, "tally=debug");
            assert!(cfg.logging.emit_stderr);
            assert!(cfg.validate().is_ok());
        },
    );
}

#[test]
#[serial]
fn missing_credentials_fail_validation() {
    temp_env::with_vars_unset(["CONSUMER_KEY", "CONSUMER_SECRET"], || {
        let cfg = TallyConfigLoader::new().load().expect("defaults load");
        assert_eq!(cfg.twitter.consumer_key, "${CONSUMER_KEY}");
        assert_eq!(
            cfg.validate(),
            Err(InvalidConfig::MissingCredential("consumer_key", "CONSUMER_KEY"))
        );
    });
}

#[test]
#[serial]
fn environment_overrides_file() {
    temp_env::with_vars(
        [
            ("TALLY_TWITTER__BATCH_SIZE", Some("10")),
            ("TALLY_TWITTER__API_BASE", Some("http://127.0.0.1:8080")),
        ],
        || {
            let tmp = TempDir::new().unwrap();
            let p = write_yaml(&tmp, "tally.yaml", FILE_YAML);

            let cfg = TallyConfigLoader::new().with_file(p).load().expect("load config");

            assert_eq!(cfg.twitter.batch_size, 10);
            assert_eq!(cfg.twitter.api_base, "http://127.0.0.1:8080");
            assert_eq!(cfg.twitter.pause_secs, 1);
        },
    );
}

#[test]
#[serial]
fn numeric_credentials_from_env_and_yaml_stay_strings() {
    temp_env::with_vars(
        [
            ("TALLY_TWITTER__CONSUMER_KEY", Some("12345")),
            ("CONSUMER_SECRET", Some("cs-from-env")),
        ],
        || {
            let cfg = TallyConfigLoader::new().load().expect("load config");
            assert_eq!(cfg.twitter.consumer_key, "12345");
            assert!(cfg.validate().is_ok());
        },
    );

    temp_env::with_vars_unset(["TALLY_TWITTER__CONSUMER_KEY"], || {
        let cfg = TallyConfigLoader::new()
            .with_yaml_str("twitter:\n  consumer_key: 12345\n  consumer_secret: 678\n")
            .load()
            .expect("load yaml");
        assert_eq!(cfg.twitter.consumer_key, "12345");
        assert_eq!(cfg.twitter.consumer_secret, "678");
    });
}

#[test]
#[serial]
fn optional_file_may_be_absent() {
    let tmp = TempDir::new().unwrap();
    let cfg = TallyConfigLoader::new()
        .with_optional_file(tmp.path().join("missing.yaml"))
        .load()
        .expect("absent optional file is fine");
    assert_eq!(cfg.twitter.batch_size, 100);
    assert_eq!(cfg.logging.format, LogFormat::Text);
}

#[test]
#[serial]
fn required_file_must_exist() {
    let tmp = TempDir::new().unwrap();
    let result = TallyConfigLoader::new()
        .with_file(tmp.path().join("missing.yaml"))
        .load();
    assert!(result.is_err());
}
