use super::*;
use sessionpath_core::Address;
use sessionpath_ingress::DEFAULT_DELIMITER;
use sessionpath_storage::{
    JsonlOutput, MemoryOutput, PartitionWriter, StorageError, StorageResult, SUCCESS_MARKER,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

fn line(ts: &str, active: &str, json: &str) -> String {
    format!("{ts}{DEFAULT_DELIMITER}{active}{DEFAULT_DELIMITER}{json}")
}

fn enricher() -> GeoEnricher {
    let mut table = HashMap::new();
    table.insert("1.1.1.1".to_string(), Address::new("US", "CA", "LA"));
    table.insert("2.2.2.2".to_string(), Address::new("CN", "GD", "SZ"));
    GeoEnricher::new(Arc::new(table))
}

fn write_input(dir: &Path, name: &str, lines: &[String]) -> InputSource {
    let path = dir.join(name);
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();
    InputSource::new(path)
}

fn config(partitions: usize) -> JobConfig {
    JobConfig {
        partitions,
        ..Default::default()
    }
}

fn runner(config: JobConfig, sink: Arc<dyn OutputSink>) -> JobRunner {
    JobRunner::new(config, enricher(), sink, JobMetrics::new().unwrap()).unwrap()
}

fn sample_inputs(dir: &Path) -> Vec<InputSource> {
    // Sessions are deliberately split across files and out of order
    let first = vec![
        line(
            "2024-01-01 00:00:00.200",
            "click",
            r#"{"session_id":"s1","req_url":"/b","ip":"1.1.1.1"}"#,
        ),
        line(
            "2024-01-01 00:00:00.100",
            "pageview",
            r#"{"session_id":"s2","req_url":"/x","ip":"2.2.2.2"}"#,
        ),
        String::new(),
        "not a log line".to_string(),
    ];
    let second = vec![
        line(
            "2024-01-01 00:00:00.100",
            "pageview",
            r#"{"session_id":"s1","req_url":"/a","ip":"1.1.1.1"}"#,
        ),
        line(
            "2024-01-01 00:00:00.300",
            "pageview",
            r#"{"session_id":"s2","req_url":"/y","ip":"9.9.9.9"}"#,
        ),
        line("2024-01-01 00:00:00.400", "pageview", r#"{"session_id":"s1""#),
    ];
    vec![
        write_input(dir, "a.log", &first),
        write_input(dir, "b.log", &second),
    ]
}

fn parse(lines: &[String]) -> Vec<serde_json::Value> {
    lines
        .iter()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn paths_for(records: &[serde_json::Value], session: &str) -> Vec<Vec<String>> {
    records
        .iter()
        .filter(|r| r["session_id"] == session)
        .map(|r| serde_json::from_value(r["action_path"].clone()).unwrap())
        .collect()
}

#[tokio::test]
async fn test_end_to_end_paths_and_addresses() {
    let dir = TempDir::new().unwrap();
    let sink = MemoryOutput::new();
    let runner = runner(config(3), Arc::new(sink.clone()));

    let report = runner
        .run(sample_inputs(dir.path()), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.sources, 2);
    assert_eq!(report.lines_read, 7);
    assert_eq!(report.blank_lines, 1);
    assert_eq!(report.parse_errors, 2);
    assert_eq!(report.records_shuffled, 4);
    assert_eq!(report.records_emitted, 4);
    assert_eq!(report.sessions, 2);
    assert_eq!(report.partition_attempts, 3);
    assert_eq!(report.lookup_misses.get("not_found"), Some(&1));

    let records = parse(&sink.lines());
    assert_eq!(records.len(), 4);

    assert_eq!(
        paths_for(&records, "s1"),
        vec![vec!["/a".to_string()], vec!["/a".to_string(), "click".to_string()]]
    );
    assert_eq!(
        paths_for(&records, "s2"),
        vec![vec!["/x".to_string()], vec!["/x".to_string(), "/y".to_string()]]
    );

    for record in records.iter().filter(|r| r["session_id"] == "s1") {
        assert_eq!(record["address"]["country"], "US");
        assert_eq!(record["address"]["province"], "CA");
        assert_eq!(record["address"]["city"], "LA");
    }
    let s2_last = records
        .iter()
        .find(|r| r["session_id"] == "s2" && r["req_url"] == "/y")
        .unwrap();
    assert_eq!(s2_last["address"]["country"], "unknown");
}

#[tokio::test]
async fn test_session_output_lives_in_one_partition() {
    let dir = TempDir::new().unwrap();
    let sink = MemoryOutput::new();
    let runner = runner(config(8), Arc::new(sink.clone()));
    runner
        .run(sample_inputs(dir.path()), &CancelToken::new())
        .await
        .unwrap();

    for session in ["s1", "s2"] {
        let holding = (0..8)
            .filter(|p| {
                sink.partition(*p)
                    .unwrap_or_default()
                    .iter()
                    .any(|l| l.contains(&format!(r#""session_id":"{session}""#)))
            })
            .count();
        assert_eq!(holding, 1, "{session} spans partitions");
    }
}

#[tokio::test]
async fn test_output_independent_of_partition_count() {
    let dir = TempDir::new().unwrap();
    let inputs = sample_inputs(dir.path());

    let mut outputs = Vec::new();
    for partitions in [1, 2, 5] {
        let sink = MemoryOutput::new();
        runner(config(partitions), Arc::new(sink.clone()))
            .run(inputs.clone(), &CancelToken::new())
            .await
            .unwrap();
        let mut lines = sink.lines();
        lines.sort();
        outputs.push(lines);
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

#[tokio::test]
async fn test_replay_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let inputs = sample_inputs(dir.path());
    let out = dir.path().join("out");

    let mut snapshots = Vec::new();
    for _ in 0..2 {
        sessionpath_storage::prepare_output_dir(&out, true).unwrap();
        runner(config(2), Arc::new(JsonlOutput::new(&out)))
            .run(inputs.clone(), &CancelToken::new())
            .await
            .unwrap();

        let mut files: Vec<(String, Vec<u8>)> = std::fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().path())
            .map(|p| {
                (
                    p.file_name().unwrap().to_string_lossy().to_string(),
                    std::fs::read(&p).unwrap(),
                )
            })
            .collect();
        files.sort();
        snapshots.push(files);
    }

    assert_eq!(snapshots[0], snapshots[1]);
    let names: Vec<&str> = snapshots[0].iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec![SUCCESS_MARKER, "part-r-00000.jsonl", "part-r-00001.jsonl"]
    );
}

/// Fails the first `failures` attempts of every partition
#[derive(Clone)]
struct FlakySink {
    inner: MemoryOutput,
    failures: u32,
    panic: bool,
    opened: Arc<AtomicU32>,
}

impl FlakySink {
    fn new(failures: u32, panic: bool) -> Self {
        Self {
            inner: MemoryOutput::new(),
            failures,
            panic,
            opened: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl OutputSink for FlakySink {
    fn open_partition(
        &self,
        partition: usize,
        attempt: u32,
    ) -> StorageResult<Box<dyn PartitionWriter>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.open_partition(partition, attempt)?;
        Ok(Box::new(FlakyWriter {
            inner,
            fail: attempt <= self.failures,
            panic: self.panic,
        }))
    }
}

struct FlakyWriter {
    inner: Box<dyn PartitionWriter>,
    fail: bool,
    panic: bool,
}

impl PartitionWriter for FlakyWriter {
    fn write_line(&mut self, line: &str) -> StorageResult<()> {
        if self.fail && self.panic {
            panic!("writer exploded");
        }
        self.inner.write_line(line)
    }

    fn commit(self: Box<Self>) -> StorageResult<u64> {
        if self.fail {
            return Err(StorageError::Write("disk on fire".to_string()));
        }
        self.inner.commit()
    }
}

#[tokio::test]
async fn test_failed_attempts_are_retried_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let sink = FlakySink::new(2, false);
    let metrics = JobMetrics::new().unwrap();
    let runner = JobRunner::new(config(1), enricher(), Arc::new(sink.clone()), metrics.clone())
        .unwrap();

    let report = runner
        .run(sample_inputs(dir.path()), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.partition_attempts, 3);
    assert_eq!(sink.opened.load(Ordering::SeqCst), 3);
    assert_eq!(sink.inner.lines().len(), 4);

    let text = metrics.render().unwrap();
    assert!(text.contains(r#"sessionpath_partition_attempts_total{outcome="failed"} 2"#));
    assert!(text.contains(r#"sessionpath_partition_attempts_total{outcome="committed"} 1"#));
    assert!(text.contains("sessionpath_records_emitted_total 4"));
}

#[tokio::test]
async fn test_panicking_attempt_counts_as_failure() {
    let dir = TempDir::new().unwrap();
    let sink = FlakySink::new(1, true);
    let report = runner(config(1), Arc::new(sink.clone()))
        .run(sample_inputs(dir.path()), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.partition_attempts, 2);
    assert_eq!(sink.inner.lines().len(), 4);
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_job() {
    let dir = TempDir::new().unwrap();
    let sink = FlakySink::new(u32::MAX, false);
    let config = JobConfig {
        partitions: 1,
        max_partition_attempts: 3,
        ..Default::default()
    };

    let result = runner(config, Arc::new(sink.clone()))
        .run(sample_inputs(dir.path()), &CancelToken::new())
        .await;

    match result {
        Err(JobError::PartitionFailed {
            partition,
            attempts,
            last_error,
        }) => {
            assert_eq!(partition, 0);
            assert_eq!(attempts, 3);
            assert!(last_error.contains("disk on fire"));
        }
        other => panic!("expected partition failure, got {other:?}"),
    }
    assert_eq!(sink.opened.load(Ordering::SeqCst), 3);
    assert_eq!(sink.inner.committed_partitions(), 0);
}

#[tokio::test]
async fn test_failed_job_writes_no_success_marker() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");

    struct Broken(JsonlOutput);
    impl OutputSink for Broken {
        fn open_partition(&self, _: usize, _: u32) -> StorageResult<Box<dyn PartitionWriter>> {
            Err(StorageError::Write("nope".to_string()))
        }
        fn finalize(&self) -> StorageResult<()> {
            self.0.finalize()
        }
    }

    let config = JobConfig {
        partitions: 2,
        max_partition_attempts: 1,
        ..Default::default()
    };
    let result = runner(config, Arc::new(Broken(JsonlOutput::new(&out))))
        .run(sample_inputs(dir.path()), &CancelToken::new())
        .await;

    assert!(matches!(result, Err(JobError::PartitionFailed { .. })));
    assert!(!out.join(SUCCESS_MARKER).exists());
}

#[tokio::test]
async fn test_cancel_before_run() {
    let dir = TempDir::new().unwrap();
    let sink = MemoryOutput::new();
    let cancel = CancelToken::new();
    cancel.cancel();

    let result = runner(config(2), Arc::new(sink.clone()))
        .run(sample_inputs(dir.path()), &cancel)
        .await;

    assert!(matches!(result, Err(JobError::Cancelled)));
    assert_eq!(sink.committed_partitions(), 0);
}

/// Requests cancellation as soon as a partition starts
struct CancellingSink {
    inner: MemoryOutput,
    cancel: CancelToken,
    opened: Mutex<Vec<usize>>,
}

impl OutputSink for CancellingSink {
    fn open_partition(
        &self,
        partition: usize,
        attempt: u32,
    ) -> StorageResult<Box<dyn PartitionWriter>> {
        self.cancel.cancel();
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(partition);
        }
        self.inner.open_partition(partition, attempt)
    }
}

#[tokio::test]
async fn test_cancel_during_reduce_discards_in_flight_partition() {
    let dir = TempDir::new().unwrap();
    let cancel = CancelToken::new();
    let sink = Arc::new(CancellingSink {
        inner: MemoryOutput::new(),
        cancel: cancel.clone(),
        opened: Mutex::new(Vec::new()),
    });
    let config = JobConfig {
        partitions: 1,
        ..Default::default()
    };

    let result = runner(config, sink.clone())
        .run(sample_inputs(dir.path()), &cancel)
        .await;

    assert!(matches!(result, Err(JobError::Cancelled)));
    assert_eq!(sink.inner.committed_partitions(), 0);
    assert_eq!(*sink.opened.lock().unwrap(), vec![0]);
}

#[tokio::test]
async fn test_missing_input_fails_job() {
    let result = runner(config(1), Arc::new(MemoryOutput::new()))
        .run(
            vec![InputSource::new("/definitely/not/here.log")],
            &CancelToken::new(),
        )
        .await;
    assert!(matches!(result, Err(JobError::Ingress(_))));
}

#[tokio::test]
async fn test_no_inputs_commits_empty_partitions() {
    let sink = MemoryOutput::new();
    let report = runner(config(3), Arc::new(sink.clone()))
        .run(Vec::new(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(report.records_emitted, 0);
    assert_eq!(sink.committed_partitions(), 3);
}

#[test]
fn test_invalid_config_rejected() {
    let config = JobConfig {
        partitions: 0,
        ..Default::default()
    };
    let result = JobRunner::new(
        config,
        enricher(),
        Arc::new(MemoryOutput::new()),
        JobMetrics::new().unwrap(),
    );
    assert!(matches!(result, Err(JobError::Config(_))));
}
