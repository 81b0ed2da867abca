//! One attempt at reducing one partition

use crate::aggregator::{AggregatorStats, SessionAggregator};
use crate::cancel::CancelToken;
use crate::error::PartitionError;
use crate::shuffle::Partition;
use sessionpath_geo::GeoEnricher;
use sessionpath_storage::OutputSink;

/// Aggregate a sorted partition into a fresh writer and commit it
///
/// Runs on a blocking thread. Any error, or cancellation observed before
/// the commit, drops the writer and so discards the attempt's output.
pub fn run_attempt(
    partition: &Partition,
    enricher: &GeoEnricher,
    sink: &dyn OutputSink,
    attempt: u32,
    cancel: &CancelToken,
) -> Result<AggregatorStats, PartitionError> {
    let mut writer = sink.open_partition(partition.index, attempt)?;
    let mut aggregator = SessionAggregator::new(enricher.clone());

    for (key, record) in partition.iter() {
        if cancel.is_cancelled() {
            return Err(PartitionError::Cancelled);
        }
        let enriched = aggregator.process(key, record);
        writer.write_line(&enriched.to_json_line()?)?;
    }

    if cancel.is_cancelled() {
        return Err(PartitionError::Cancelled);
    }

    let lines = writer.commit()?;
    tracing::debug!(partition = partition.index, attempt, lines, "Partition output committed");
    Ok(aggregator.into_stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shuffle::{MapOutput, shuffle};
    use sessionpath_core::record::fields;
    use sessionpath_core::{Address, CompositeKey, Record};
    use sessionpath_storage::MemoryOutput;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn partition() -> Partition {
        let mut output = MapOutput::new(1);
        for (session, time_tag, action) in [("a", 2, "y"), ("a", 1, "x"), ("b", 1, "z")] {
            let mut record = Record::new();
            record.insert(fields::SESSION_ID, session);
            record.insert(fields::TIME_TAG, time_tag);
            record.insert(fields::ACTIVE_NAME, action);
            output
                .push(CompositeKey::new(session, time_tag), record)
                .unwrap();
        }
        shuffle(vec![output], 1).remove(0)
    }

    fn enricher() -> GeoEnricher {
        GeoEnricher::new(Arc::new(HashMap::<String, Address>::new()))
    }

    #[test]
    fn test_attempt_commits_every_record() {
        let sink = MemoryOutput::new();
        let stats = run_attempt(&partition(), &enricher(), &sink, 1, &CancelToken::new()).unwrap();

        assert_eq!(stats.records, 3);
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.lookup_misses.get("absent_ip"), Some(&3));

        let lines = sink.partition(0).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains(r#""action_path":["x","y"]"#));
        assert!(lines[2].contains(r#""action_path":["z"]"#));
    }

    #[test]
    fn test_replayed_attempt_is_byte_identical() {
        let partition = partition();
        let first = MemoryOutput::new();
        let second = MemoryOutput::new();

        run_attempt(&partition, &enricher(), &first, 1, &CancelToken::new()).unwrap();
        run_attempt(&partition, &enricher(), &second, 2, &CancelToken::new()).unwrap();

        assert_eq!(first.partition(0), second.partition(0));
    }

    #[test]
    fn test_cancelled_attempt_publishes_nothing() {
        let sink = MemoryOutput::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = run_attempt(&partition(), &enricher(), &sink, 1, &cancel);
        assert!(matches!(result, Err(PartitionError::Cancelled)));
        assert_eq!(sink.committed_partitions(), 0);
    }
}
