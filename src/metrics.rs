use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::RequestOutcome;

#[derive(Debug)]
enum MetricsEvent {
    Success(RequestOutcome),
    Failure,
}

/// Write side of the aggregator. Clone one per simulated user.
#[derive(Clone, Debug)]
pub struct MetricsSink {
    tx: mpsc::UnboundedSender<MetricsEvent>,
}

impl MetricsSink {
    pub fn submit(&self, outcome: RequestOutcome) -> Result<()> {
        self.tx
            .send(MetricsEvent::Success(outcome))
            .map_err(|_| anyhow!("metrics channel closed before success event"))
    }

    /// Counts a failed attempt. Nothing is stored for it.
    pub fn record_failure(&self) -> Result<()> {
        self.tx
            .send(MetricsEvent::Failure)
            .map_err(|_| anyhow!("metrics channel closed before failure event"))
    }
}

/// Everything the collector saw, read once after every sink is gone.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub outcomes: Vec<RequestOutcome>,
    pub failed_attempts: u64,
}

impl MetricsSnapshot {
    pub fn attempts(&self) -> u64 {
        self.outcomes.len() as u64 + self.failed_attempts
    }
}

/// A single collector task fed by every [`MetricsSink`].
pub struct MetricsAggregator {
    handle: JoinHandle<MetricsSnapshot>,
}

impl MetricsAggregator {
    pub fn spawn() -> (MetricsSink, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(collect_metrics(rx));
        (MetricsSink { tx }, Self { handle })
    }

    /// Resolves once every sink has been dropped.
    pub async fn snapshot(self) -> Result<MetricsSnapshot> {
        self.handle.await.context("metrics collector task failed")
    }
}

async fn collect_metrics(mut rx: mpsc::UnboundedReceiver<MetricsEvent>) -> MetricsSnapshot {
    let mut snapshot = MetricsSnapshot::default();
    while let Some(event) = rx.recv().await {
        match event {
            MetricsEvent::Success(outcome) => snapshot.outcomes.push(outcome),
            MetricsEvent::Failure => snapshot.failed_attempts += 1,
        }
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use tokio::task::JoinSet;

    use super::*;

    fn outcome(chunks: u64) -> RequestOutcome {
        RequestOutcome::from_timings(Duration::from_millis(5), Duration::from_millis(50), chunks)
            .unwrap()
    }

    #[tokio::test]
    async fn empty_run_yields_empty_snapshot() {
        let (sink, aggregator) = MetricsAggregator::spawn();
        drop(sink);
        let snapshot = aggregator.snapshot().await.unwrap();
        assert!(snapshot.outcomes.is_empty());
        assert_eq!(snapshot.attempts(), 0);
    }

    #[tokio::test]
    async fn failures_are_counted_but_not_stored() {
        let (sink, aggregator) = MetricsAggregator::spawn();
        sink.submit(outcome(5)).unwrap();
        sink.record_failure().unwrap();
        sink.record_failure().unwrap();
        drop(sink);

        let snapshot = aggregator.snapshot().await.unwrap();
        assert_eq!(snapshot.outcomes, vec![outcome(5)]);
        assert_eq!(snapshot.failed_attempts, 2);
        assert_eq!(snapshot.attempts(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_submissions_are_neither_lost_nor_duplicated() {
        const TASKS: u64 = 200;
        const PER_TASK: u64 = 50;

        let (sink, aggregator) = MetricsAggregator::spawn();
        let mut join_set = JoinSet::new();
        for task in 0..TASKS {
            let sink = sink.clone();
            join_set.spawn(async move {
                for i in 0..PER_TASK {
                    sink.submit(outcome(task * PER_TASK + i)).unwrap();
                    if i % 10 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            });
        }
        drop(sink);
        while let Some(joined) = join_set.join_next().await {
            joined.unwrap();
        }

        let snapshot = aggregator.snapshot().await.unwrap();
        assert_eq!(snapshot.outcomes.len() as u64, TASKS * PER_TASK);
        let distinct: HashSet<u64> = snapshot.outcomes.iter().map(|o| o.chunk_count()).collect();
        assert_eq!(distinct.len() as u64, TASKS * PER_TASK);
    }
}
