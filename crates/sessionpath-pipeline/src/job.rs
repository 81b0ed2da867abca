//! Job runner: map, shuffle barrier, reduce with retries
//!
//! Each input file is parsed by its own async task (bounded by
//! `map_concurrency`). Once every map task has finished, records are
//! shuffled into sorted partitions. Each partition is then reduced on a
//! blocking thread (bounded by `reduce_concurrency`) and retried from
//! scratch up to `max_partition_attempts` times; a panic counts as a
//! failed attempt. The sink is finalized only after every partition has
//! committed.

use crate::aggregator::AggregatorStats;
use crate::cancel::CancelToken;
use crate::config::JobConfig;
use crate::error::{JobError, JobResult, PartitionError};
use crate::partition::run_attempt;
use crate::shuffle::{MapOutput, Partition, shuffle};
use futures::future::join_all;
use serde::Serialize;
use sessionpath_geo::GeoEnricher;
use sessionpath_ingress::{IngressError, InputSource, LineParser, decode_line};
use sessionpath_observability::{AttemptOutcome, JobMetrics};
use sessionpath_storage::OutputSink;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Summary of a successful run
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobReport {
    pub sources: usize,
    pub lines_read: u64,
    pub blank_lines: u64,
    pub parse_errors: u64,
    pub records_shuffled: u64,
    pub records_emitted: u64,
    pub sessions: u64,
    pub lookup_misses: BTreeMap<&'static str, u64>,
    pub partitions: usize,
    pub partition_attempts: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct MapStats {
    lines_read: u64,
    blank_lines: u64,
    parse_errors: u64,
    records: u64,
}

struct PartitionOutcome {
    attempts: u32,
    stats: AggregatorStats,
}

/// Runs jobs against one dataset and one output sink
pub struct JobRunner {
    config: JobConfig,
    parser: LineParser,
    enricher: GeoEnricher,
    sink: Arc<dyn OutputSink>,
    metrics: JobMetrics,
}

impl JobRunner {
    pub fn new(
        config: JobConfig,
        enricher: GeoEnricher,
        sink: Arc<dyn OutputSink>,
        metrics: JobMetrics,
    ) -> JobResult<Self> {
        config.validate()?;
        let parser = LineParser::new(config.parser.clone())?;
        Ok(Self {
            config,
            parser,
            enricher,
            sink,
            metrics,
        })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn metrics(&self) -> &JobMetrics {
        &self.metrics
    }

    /// Run the job to completion, failure or cancellation
    pub async fn run(&self, sources: Vec<InputSource>, cancel: &CancelToken) -> JobResult<JobReport> {
        let started = Instant::now();
        tracing::info!(
            sources = sources.len(),
            partitions = self.config.partitions,
            "Starting job"
        );

        // Permanent partition failures stop the remaining work without
        // touching the caller's token
        let job_cancel = cancel.child();
        let result = self.run_stages(sources, &job_cancel).await;

        let result = match result {
            Err(_) if cancel.is_cancelled() => Err(JobError::Cancelled),
            other => other,
        };

        match result {
            Ok(mut report) => {
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::info!(
                    records = report.records_emitted,
                    sessions = report.sessions,
                    parse_errors = report.parse_errors,
                    elapsed_ms = report.elapsed_ms,
                    "Job completed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Job failed");
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        sources: Vec<InputSource>,
        cancel: &CancelToken,
    ) -> JobResult<JobReport> {
        let mut report = JobReport {
            sources: sources.len(),
            partitions: self.config.partitions,
            ..Default::default()
        };

        let (outputs, map_stats) = self.map_stage(sources, cancel).await?;
        report.lines_read = map_stats.lines_read;
        report.blank_lines = map_stats.blank_lines;
        report.parse_errors = map_stats.parse_errors;
        report.records_shuffled = map_stats.records;

        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let partitions = shuffle(outputs, self.config.partitions);
        tracing::debug!(
            records = report.records_shuffled,
            sizes = ?partitions.iter().map(Partition::len).collect::<Vec<_>>(),
            "Shuffle complete"
        );

        for outcome in self.reduce_stage(partitions, cancel).await? {
            report.partition_attempts += u64::from(outcome.attempts);
            report.records_emitted += outcome.stats.records;
            report.sessions += outcome.stats.sessions;
            for (reason, count) in outcome.stats.lookup_misses {
                *report.lookup_misses.entry(reason).or_insert(0) += count;
            }
        }

        self.sink.finalize()?;
        Ok(report)
    }

    async fn map_stage(
        &self,
        sources: Vec<InputSource>,
        cancel: &CancelToken,
    ) -> JobResult<(Vec<MapOutput>, MapStats)> {
        let semaphore = Arc::new(Semaphore::new(self.config.map_concurrency));

        let handles: Vec<_> = sources
            .into_iter()
            .map(|source| {
                let semaphore = Arc::clone(&semaphore);
                let parser = self.parser.clone();
                let metrics = self.metrics.clone();
                let cancel = cancel.clone();
                let partitions = self.config.partitions;
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| JobError::Internal(e.to_string()))?;
                    map_source(source, parser, partitions, metrics, cancel).await
                })
            })
            .collect();

        // join_all keeps source order, which keeps the shuffle deterministic
        let mut outputs = Vec::with_capacity(handles.len());
        let mut totals = MapStats::default();
        let mut first_error = None;

        for result in join_all(handles).await {
            match result {
                Ok(Ok((output, stats))) => {
                    totals.lines_read += stats.lines_read;
                    totals.blank_lines += stats.blank_lines;
                    totals.parse_errors += stats.parse_errors;
                    totals.records += stats.records;
                    outputs.push(output);
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(JobError::Internal(format!("map task failed: {e}")));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok((outputs, totals)),
        }
    }

    async fn reduce_stage(
        &self,
        partitions: Vec<Partition>,
        cancel: &CancelToken,
    ) -> JobResult<Vec<PartitionOutcome>> {
        let semaphore = Arc::new(Semaphore::new(self.config.reduce_concurrency));

        let handles: Vec<_> = partitions
            .into_iter()
            .map(|partition| {
                let semaphore = Arc::clone(&semaphore);
                let ctx = ReduceContext {
                    enricher: self.enricher.clone(),
                    sink: Arc::clone(&self.sink),
                    metrics: self.metrics.clone(),
                    cancel: cancel.clone(),
                    max_attempts: self.config.max_partition_attempts,
                };
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| JobError::Internal(e.to_string()))?;
                    reduce_partition(Arc::new(partition), ctx).await
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut failure = None;
        let mut cancelled = false;

        for result in join_all(handles).await {
            match result {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(JobError::Cancelled)) => cancelled = true,
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(JobError::Internal(format!("reduce task failed: {e}")));
                }
            }
        }

        match (failure, cancelled) {
            (Some(e), _) => Err(e),
            (None, true) => Err(JobError::Cancelled),
            (None, false) => Ok(outcomes),
        }
    }
}

async fn map_source(
    source: InputSource,
    parser: LineParser,
    num_partitions: usize,
    metrics: JobMetrics,
    cancel: CancelToken,
) -> JobResult<(MapOutput, MapStats)> {
    let name = source.name();
    let mut lines = source.lines().await?;
    let mut output = MapOutput::new(num_partitions);
    let mut stats = MapStats::default();
    let mut line_number = 0u64;

    while let Some(bytes) = lines.next_segment().await.map_err(IngressError::Io)? {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        line_number += 1;
        stats.lines_read += 1;
        metrics.record_line();

        let parsed = match decode_line(&bytes) {
            Ok(line) if line.trim().is_empty() => {
                stats.blank_lines += 1;
                continue;
            }
            Ok(line) => parser.parse_keyed(line),
            Err(e) => Err(e),
        };

        match parsed {
            Ok((key, record)) => {
                output
                    .push(key, record)
                    .map_err(|e| JobError::Internal(e.to_string()))?;
                stats.records += 1;
            }
            Err(e) => {
                tracing::warn!(
                    source = %name,
                    line = line_number,
                    kind = e.kind(),
                    error = %e,
                    "Skipping malformed line"
                );
                metrics.record_parse_error(e.kind());
                stats.parse_errors += 1;
            }
        }
    }

    tracing::debug!(
        source = %name,
        lines = stats.lines_read,
        records = stats.records,
        "Source parsed"
    );
    Ok((output, stats))
}

struct ReduceContext {
    enricher: GeoEnricher,
    sink: Arc<dyn OutputSink>,
    metrics: JobMetrics,
    cancel: CancelToken,
    max_attempts: u32,
}

async fn reduce_partition(
    partition: Arc<Partition>,
    ctx: ReduceContext,
) -> JobResult<PartitionOutcome> {
    let index = partition.index;
    let mut last_error = String::new();

    for attempt in 1..=ctx.max_attempts {
        if ctx.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let started = Instant::now();
        let task = {
            let partition = Arc::clone(&partition);
            let enricher = ctx.enricher.clone();
            let sink = Arc::clone(&ctx.sink);
            let cancel = ctx.cancel.clone();
            tokio::task::spawn_blocking(move || {
                run_attempt(&partition, &enricher, sink.as_ref(), attempt, &cancel)
            })
        };

        let result = match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(PartitionError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(PartitionError::Panicked(e.to_string())),
        };
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(stats) => {
                ctx.metrics
                    .record_partition_attempt(AttemptOutcome::Committed, elapsed);
                ctx.metrics.record_emitted(stats.records);
                ctx.metrics.record_sessions(stats.sessions);
                for (reason, count) in &stats.lookup_misses {
                    ctx.metrics.record_lookup_misses(reason, *count);
                }
                tracing::info!(
                    partition = index,
                    attempt,
                    records = stats.records,
                    sessions = stats.sessions,
                    "Partition committed"
                );
                return Ok(PartitionOutcome {
                    attempts: attempt,
                    stats,
                });
            }
            Err(PartitionError::Cancelled) => {
                ctx.metrics
                    .record_partition_attempt(AttemptOutcome::Cancelled, elapsed);
                tracing::info!(partition = index, attempt, "Partition cancelled");
                return Err(JobError::Cancelled);
            }
            Err(e) => {
                ctx.metrics
                    .record_partition_attempt(AttemptOutcome::Failed, elapsed);
                tracing::warn!(
                    partition = index,
                    attempt,
                    max_attempts = ctx.max_attempts,
                    error = %e,
                    "Partition attempt failed"
                );
                last_error = e.to_string();
            }
        }
    }

    tracing::error!(
        partition = index,
        attempts = ctx.max_attempts,
        error = %last_error,
        "Partition failed permanently"
    );
    ctx.cancel.cancel();
    Err(JobError::PartitionFailed {
        partition: index,
        attempts: ctx.max_attempts,
        last_error,
    })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests;
