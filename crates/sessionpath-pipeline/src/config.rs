//! Job tuning knobs

use crate::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};
use sessionpath_ingress::ParserConfig;

/// Settings for one job run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Number of reduce partitions
    #[serde(default = "default_partitions")]
    pub partitions: usize,

    /// Attempts per partition before the job fails
    #[serde(default = "default_max_partition_attempts")]
    pub max_partition_attempts: u32,

    /// Input files parsed concurrently
    #[serde(default = "default_map_concurrency")]
    pub map_concurrency: usize,

    /// Partitions reduced concurrently
    #[serde(default = "default_reduce_concurrency")]
    pub reduce_concurrency: usize,

    /// Line format settings, flattened into the job's keys
    #[serde(flatten)]
    pub parser: ParserConfig,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            max_partition_attempts: default_max_partition_attempts(),
            map_concurrency: default_map_concurrency(),
            reduce_concurrency: default_reduce_concurrency(),
            parser: ParserConfig::default(),
        }
    }
}

impl JobConfig {
    /// Reject settings the runner cannot honour
    pub fn validate(&self) -> JobResult<()> {
        if self.partitions == 0 {
            return Err(JobError::Config("partitions must be at least 1".to_string()));
        }
        if self.max_partition_attempts == 0 {
            return Err(JobError::Config(
                "max_partition_attempts must be at least 1".to_string(),
            ));
        }
        if self.map_concurrency == 0 {
            return Err(JobError::Config(
                "map_concurrency must be at least 1".to_string(),
            ));
        }
        if self.reduce_concurrency == 0 {
            return Err(JobError::Config(
                "reduce_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_partitions() -> usize {
    4
}

fn default_max_partition_attempts() -> u32 {
    4
}

fn default_map_concurrency() -> usize {
    4
}

fn default_reduce_concurrency() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = JobConfig::default();
        assert_eq!(config.partitions, 4);
        assert_eq!(config.max_partition_attempts, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = JobConfig {
            partitions: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(JobError::Config(_))));

        let config = JobConfig {
            max_partition_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(JobError::Config(_))));

        let config = JobConfig {
            reduce_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: JobConfig =
            serde_json::from_str(r#"{"partitions": 2, "utc_offset_seconds": 3600}"#).unwrap();
        assert_eq!(config.partitions, 2);
        assert_eq!(config.parser.utc_offset_seconds, 3600);
        assert_eq!(config.max_partition_attempts, 4);
        assert_eq!(config.parser.delimiter, sessionpath_ingress::DEFAULT_DELIMITER);
    }
}
