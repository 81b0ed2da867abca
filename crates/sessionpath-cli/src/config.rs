use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sessionpath_pipeline::JobConfig;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(flatten)]
    pub job: JobConfig,

    /// JSON lines IP range snapshot
    #[serde(default)]
    pub geo_dataset: Option<PathBuf>,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Replace an existing output directory instead of refusing to run
    #[serde(default = "default_true")]
    pub overwrite_output: bool,

    /// Prometheus text dump written after the run
    #[serde(default)]
    pub metrics_file: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            job: JobConfig::default(),
            geo_dataset: None,
            output_dir: None,
            overwrite_output: default_true(),
            metrics_file: None,
            logging: LoggingConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from file (YAML or TOML)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml::from_str(&contents)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            // Default to YAML
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Invalid YAML in {}", path.display()))?
        };

        Ok(config)
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Some(val) = env_parsed("SESSIONPATH_PARTITIONS") {
            self.job.partitions = val;
        }
        if let Some(val) = env_parsed("SESSIONPATH_MAX_PARTITION_ATTEMPTS") {
            self.job.max_partition_attempts = val;
        }
        if let Some(val) = env_parsed("SESSIONPATH_MAP_CONCURRENCY") {
            self.job.map_concurrency = val;
        }
        if let Some(val) = env_parsed("SESSIONPATH_REDUCE_CONCURRENCY") {
            self.job.reduce_concurrency = val;
        }
        if let Some(val) = env_parsed("SESSIONPATH_UTC_OFFSET_SECONDS") {
            self.job.parser.utc_offset_seconds = val;
        }

        if let Ok(val) = std::env::var("SESSIONPATH_GEO_DATASET") {
            self.geo_dataset = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("SESSIONPATH_OUTPUT_DIR") {
            self.output_dir = Some(PathBuf::from(val));
        }
        if let Some(val) = env_parsed("SESSIONPATH_OVERWRITE_OUTPUT") {
            self.overwrite_output = val;
        }
        if let Ok(val) = std::env::var("SESSIONPATH_METRICS_FILE") {
            self.metrics_file = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("SESSIONPATH_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.job.validate()?;
        Ok(())
    }
}

fn env_parsed<T: FromStr>(name: &str) -> Option<T> {
    let val = std::env::var(name).ok()?;
    match val.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            // Logging is not initialized yet when the config is loaded
            eprintln!("Warning: Invalid {} '{}', ignoring", name, val);
            None
        }
    }
}
