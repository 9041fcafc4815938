//! Loader for Tally configuration with YAML + environment overlays.
//!
//! Precedence, lowest first: built-in defaults, YAML files/snippets in the
//! order they were added, then `TALLY_`-prefixed environment variables
//! (`TALLY_TWITTER__BATCH_SIZE=50`). String values are expanded for
//! `${VAR}` afterwards, so the default credentials resolve from
//! `CONSUMER_KEY` and `CONSUMER_SECRET`.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tally_common::observability::{LogConfig, LogFormat};

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;
const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TallyConfig {
    #[serde(default)]
    pub twitter: TwitterSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Clone, Deserialize)]
pub struct TwitterSettings {
    #[serde(default, deserialize_with = "string_or_number")]
    pub consumer_key: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub consumer_secret: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TwitterSettings {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            api_base: default_api_base(),
            batch_size: default_batch_size(),
            pause_secs: default_pause_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for TwitterSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterSettings")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("batch_size", &self.batch_size)
            .field("pause_secs", &self.pause_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl TwitterSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default = "default_filter")]
    pub filter: String,
    #[serde(default)]
    pub emit_stderr: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
            emit_stderr: false,
            dir: None,
        }
    }
}

impl LoggingSettings {
    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            log_dir: self.dir.clone(),
            emit_stderr: self.emit_stderr,
            format: self.format,
            default_filter: self.filter.clone(),
            ..LogConfig::default()
        }
    }
}

/// Numeric-looking keys arrive as numbers from YAML and from parsed env vars.
fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string, found {other}"
        ))),
    }
}

fn default_api_base() -> String {
    "https://api.twitter.com".into()
}
fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}
fn default_pause_secs() -> u64 {
    3
}
fn default_timeout_secs() -> u64 {
    15
}
fn default_filter() -> String {
    "info".into()
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("twitter.{0} is not set (export {1} or set it in the config file)")]
    MissingCredential(&'static str, &'static str),
    #[error("twitter.batch_size must be within 1..=100, got {0}")]
    BatchSize(usize),
    #[error("twitter.api_base is not an http(s) URL: {0}")]
    ApiBase(String),
}

impl TallyConfig {
    /// Reject settings the lookup cannot run with.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        let tw = &self.twitter;
        for (value, key, env) in [
            (&tw.consumer_key, "consumer_key", "CONSUMER_KEY"),
            (&tw.consumer_secret, "consumer_secret", "CONSUMER_SECRET"),
        ] {
            if value.trim().is_empty() || value.contains("${") {
                return Err(InvalidConfig::MissingCredential(key, env));
            }
        }
        if !(1..=MAX_BATCH_SIZE).contains(&tw.batch_size) {
            return Err(InvalidConfig::BatchSize(tw.batch_size));
        }
        if !(tw.api_base.starts_with("https://") || tw.api_base.starts_with("http://")) {
            return Err(InvalidConfig::ApiBase(tw.api_base.clone()));
        }
        Ok(())
    }
}

fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring.
pub struct TallyConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for TallyConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TallyConfigLoader {
    /// Start from the built-in defaults.
    ///
    /// ```
    /// use tally_config::TallyConfigLoader;
    ///
    /// let cfg = TallyConfigLoader::new()
    ///     .with_yaml_str("twitter:\n  batch_size: 25")
    ///     .load()
    ///     .expect("valid config");
    ///
    /// assert_eq!(cfg.twitter.batch_size, 25);
    /// assert_eq!(cfg.twitter.pause_secs, 3);
    /// assert_eq!(cfg.twitter.api_base, "https://api.twitter.com");
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
        }
    }

    /// Attach a YAML/TOML/JSON file; the format is inferred from the suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Like [`TallyConfigLoader::with_file`], but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Merge all sources, apply environment overrides, expand `${VAR}`, and
    /// deserialize.
    ///
    /// ```
    /// use tally_config::TallyConfigLoader;
    ///
    /// unsafe {
    ///     std::env::set_var("DOC_CONSUMER_KEY", "key-from-env");
    /// }
    ///
    /// let cfg = TallyConfigLoader::new()
    ///     .with_yaml_str(r#"
    /// twitter:
    ///   consumer_key: "${DOC_CONSUMER_KEY}"
    ///   consumer_secret: "literal"
    /// "#)
    ///     .load()
    ///     .expect("valid configuration");
    ///
    /// assert_eq!(cfg.twitter.consumer_key, "key-from-env");
    /// assert!(cfg.validate().is_ok());
    ///
    /// unsafe {
    ///     std::env::remove_var("DOC_CONSUMER_KEY");
    /// }
    /// ```
    pub fn load(self) -> Result<TallyConfig, ConfigError> {
        let cfg = self
            .builder
            .set_default("twitter.consumer_key", "${CONSUMER_KEY}")?
            .set_default("twitter.consumer_secret", "${CONSUMER_SECRET}")?
            .add_source(
                Environment::with_prefix("TALLY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        let typed: TallyConfig =
            serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(typed)
    }
}
