use std::collections::BTreeMap;
use std::env;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dsdist_log::{Level, LogConfig, LogFormat};
use serde::{Deserialize, Serialize};

/// The name of the config file within the config folder.
const CONFIG_FILE_NAME: &str = "config.yml";

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (from file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (overriding field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Box::new(inner)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to serialize the configuration.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The log level.
    pub log_level: Option<String>,
    /// The log format.
    pub log_format: Option<String>,
    /// The address of the statsd server.
    pub statsd: Option<String>,
    /// The path to the event dataset.
    pub dataset: Option<String>,
}

/// Control the metrics.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`, which disables metrics.
    pub statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"dsdist"`.
    pub prefix: String,
    /// Default tags to apply to all metrics.
    pub default_tags: BTreeMap<String, String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    pub sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "dsdist".into(),
            default_tags: BTreeMap::new(),
            sample_rate: 1.0,
        }
    }
}

/// Defaults for sampling report requests that do not specify them.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct ReportDefaults {
    /// Number of root transactions to sample.
    pub sample_size: usize,
    /// The look-back period, for example `"1h"`.
    pub stats_period: String,
    /// Whether the project breakdown of distributed traces is resolved.
    pub distributed_trace: bool,
}

impl Default for ReportDefaults {
    fn default() -> Self {
        Self {
            sample_size: 100,
            stats_period: "1h".into(),
            distributed_trace: true,
        }
    }
}

/// Location of the event dataset served by the in-memory query backend.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct Dataset {
    /// Path to a JSON dataset file.
    pub path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct ConfigValues {
    logging: LogConfig,
    metrics: Metrics,
    report: ReportDefaults,
    dataset: Dataset,
}

impl ConfigValues {
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = base.join(CONFIG_FILE_NAME);

        let f = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path));
            }
        };

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// A missing `config.yml` is not an error, in which case all values are defaults.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        Ok(Config {
            values: ConfigValues::load(&path)?,
            path,
        })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        mut overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(level) = overrides.log_level.take() {
            self.values.logging.level = level
                .parse::<Level>()
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidValue))
                .map_err(|e| e.field("log_level"))?;
        }

        if let Some(format) = overrides.log_format.take() {
            self.values.logging.format =
                serde_json::from_value::<LogFormat>(serde_json::Value::String(format))
                    .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidValue))
                    .map_err(|e| e.field("log_format"))?;
        }

        if let Some(statsd) = overrides.statsd.take() {
            self.values.metrics.statsd = Some(statsd);
        }

        if let Some(dataset) = overrides.dataset.take() {
            self.values.dataset.path = Some(dataset.into());
        }

        if !(0.0..=1.0).contains(&self.values.metrics.sample_rate) {
            return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("metrics.sample_rate"));
        }

        Ok(self)
    }

    /// Serialize the config into a YAML string.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the path to the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the address of the statsd server, if metrics are enabled.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Returns the prefix for all emitted metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the global sample rate for metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }

    /// Returns the default number of root transactions to sample.
    pub fn default_sample_size(&self) -> usize {
        self.values.report.sample_size
    }

    /// Returns the default look-back period.
    pub fn default_stats_period(&self) -> &str {
        &self.values.report.stats_period
    }

    /// Returns whether distributed trace breakdowns are requested by default.
    pub fn default_distributed_trace(&self) -> bool {
        self.values.report.distributed_trace
    }

    /// Returns the path to the event dataset, if configured.
    pub fn dataset_path(&self) -> Option<&Path> {
        self.values.dataset.path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path(dir.path()).unwrap();

        assert_eq!(config.default_sample_size(), 100);
        assert_eq!(config.default_stats_period(), "1h");
        assert!(config.default_distributed_trace());
        assert_eq!(config.statsd_addr(), None);
        assert_eq!(config.metrics_prefix(), "dsdist");
        assert_eq!(config.dataset_path(), None);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "logging:\n  level: debug\nmetrics:\n  statsd: 127.0.0.1:8125\nreport:\n  sample_size: 250\ndataset:\n  path: events.json\n",
        )
        .unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.statsd_addr(), Some("127.0.0.1:8125"));
        assert_eq!(config.default_sample_size(), 250);
        assert_eq!(config.dataset_path(), Some(Path::new("events.json")));
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "report: [oops").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
        assert!(error.to_string().starts_with("could not parse yaml config file (from file"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();
        config
            .apply_override(OverridableConfig {
                log_level: Some("trace".to_owned()),
                log_format: Some("json".to_owned()),
                statsd: Some("localhost:8125".to_owned()),
                dataset: Some("data.json".to_owned()),
            })
            .unwrap();

        assert_eq!(config.logging().level, Level::Trace);
        assert_eq!(config.logging().format, LogFormat::Json);
        assert_eq!(config.statsd_addr(), Some("localhost:8125"));
        assert_eq!(config.dataset_path(), Some(Path::new("data.json")));
    }

    #[test]
    fn test_apply_override_log_level_only() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();
        assert_eq!(config.logging().level, Level::Info);

        config
            .apply_override(OverridableConfig {
                log_level: Some("debug".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.logging().level, Level::Debug);
        assert_eq!(config.logging().format, LogFormat::Auto);
    }

    #[test]
    fn test_apply_override_invalid_level() {
        let mut config = Config::from_json_value(serde_json::json!({})).unwrap();
        let error = config
            .apply_override(OverridableConfig {
                log_level: Some("loud".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(
            error.to_string(),
            "invalid config value (overriding field log_level)"
        );
    }

    #[test]
    fn test_yaml_output() {
        let config = Config::from_json_value(serde_json::json!({
            "report": {"sample_size": 500, "stats_period": "24h"}
        }))
        .unwrap();

        insta::assert_snapshot!(config.to_yaml_string().unwrap(), @r###"
        logging:
          level: info
          format: auto
          enable_backtraces: false
        metrics:
          statsd: null
          prefix: dsdist
          default_tags: {}
          sample_rate: 1.0
        report:
          sample_size: 500
          stats_period: 24h
          distributed_trace: true
        dataset:
          path: null
        "###);
    }
}
