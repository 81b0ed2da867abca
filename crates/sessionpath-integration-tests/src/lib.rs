//! Shared fixtures for end-to-end SessionPath tests
//!
//! A [`Fixture`] owns a scratch directory holding a geolocation snapshot,
//! raw input logs and the job output, and runs the real file-based stack:
//! input scan, `GeoTable` load, `JsonlOutput` with atomic commit.

use sessionpath_geo::{GeoEnricher, GeoTable};
use sessionpath_ingress::{DEFAULT_DELIMITER, scan_inputs};
use sessionpath_observability::JobMetrics;
use sessionpath_pipeline::{CancelToken, JobConfig, JobReport, JobResult, JobRunner};
use sessionpath_storage::{JsonlOutput, prepare_output_dir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const GEO_SNAPSHOT: &str = r#"# test ranges
{"start": "1.1.1.0", "end": "1.1.1.255", "country": "US", "province": "CA", "city": "LA"}
{"start": "2.2.2.2", "country": "CN", "province": "GD", "city": "SZ"}
"#;

/// One raw log line
pub fn event_line(timestamp: &str, active_name: &str, json: &str) -> String {
    format!("{timestamp}{DEFAULT_DELIMITER}{active_name}{DEFAULT_DELIMITER}{json}")
}

pub struct Fixture {
    dir: TempDir,
    pub metrics: JobMetrics,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("geo.jsonl"), GEO_SNAPSHOT).expect("geo snapshot");
        std::fs::create_dir_all(dir.path().join("input")).expect("input dir");
        Self {
            dir,
            metrics: JobMetrics::new().expect("metrics"),
        }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    pub fn geo_path(&self) -> PathBuf {
        self.dir.path().join("geo.jsonl")
    }

    /// Write an input file relative to the input directory
    pub fn write_input(&self, name: &str, lines: &[String]) -> PathBuf {
        let path = self.input_dir().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("input subdir");
        }
        std::fs::write(&path, lines.join("\n") + "\n").expect("input file");
        path
    }

    pub async fn run(&self, config: JobConfig) -> JobResult<JobReport> {
        self.run_with_cancel(config, &CancelToken::new()).await
    }

    pub async fn run_with_cancel(
        &self,
        config: JobConfig,
        cancel: &CancelToken,
    ) -> JobResult<JobReport> {
        let table = GeoTable::load(self.geo_path()).expect("geo table");
        let sources = scan_inputs(&[self.input_dir()]).await?;
        prepare_output_dir(&self.output_dir(), true)?;

        let runner = JobRunner::new(
            config,
            GeoEnricher::new(Arc::new(table)),
            Arc::new(JsonlOutput::new(self.output_dir())),
            self.metrics.clone(),
        )?;
        runner.run(sources, cancel).await
    }

    /// Every output record, file by file
    pub fn read_output(&self) -> Vec<serde_json::Value> {
        output_files(&self.output_dir())
            .iter()
            .flat_map(|path| {
                std::fs::read_to_string(path)
                    .expect("output file")
                    .lines()
                    .map(|l| serde_json::from_str(l).expect("json line"))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorted `part-r-*` files in an output directory
pub fn output_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with("part-r-"))
                })
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

/// `action_path` of every record of one session, in output order
pub fn paths_of(records: &[serde_json::Value], session: &str) -> Vec<Vec<String>> {
    records
        .iter()
        .filter(|r| r["session_id"] == session)
        .map(|r| serde_json::from_value(r["action_path"].clone()).expect("action_path"))
        .collect()
}
