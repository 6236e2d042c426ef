use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use tokio::task::JoinSet;
use tracing::info;

use crate::config::LoadTestConfig;
use crate::metrics::{MetricsAggregator, MetricsSnapshot};
use crate::report::LoadTestReport;
use crate::user::run_user;

/// Drives a whole run and returns the report once every user has stopped.
///
/// Endpoint failures never surface here; an error means the harness itself
/// broke (client construction, a panicked user task, a lost collector).
pub async fn run_load_test(config: LoadTestConfig) -> Result<LoadTestReport> {
    let config = Arc::new(config);
    let (snapshot, total_duration) = simulate(Arc::clone(&config)).await?;

    Ok(LoadTestReport::from_snapshot(
        &snapshot,
        config.thresholds,
        config.user_count,
        total_duration,
    ))
}

/// Spawns every simulated user, waits for all of them, then reads the
/// collected metrics. Returns the snapshot and the wall-clock time taken.
pub async fn simulate(config: Arc<LoadTestConfig>) -> Result<(MetricsSnapshot, Duration)> {
    let start = Instant::now();
    let client = Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to construct HTTP client")?;

    let deadline = start
        .checked_add(config.duration)
        .ok_or_else(|| anyhow!("test duration {:?} is too long", config.duration))?;
    info!(
        users = config.user_count,
        duration_secs = config.duration.as_secs_f64(),
        endpoint = %config.endpoint,
        model = %config.model,
        "starting load test"
    );

    let (sink, aggregator) = MetricsAggregator::spawn();

    let mut join_set = JoinSet::new();
    for user_id in 0..config.user_count {
        let client = client.clone();
        let config = Arc::clone(&config);
        let sink = sink.clone();
        join_set.spawn(async move { run_user(user_id, client, config, deadline, sink).await });
    }
    drop(sink);

    while let Some(join_result) = join_set.join_next().await {
        join_result.context("simulated user task panicked")??;
    }

    let snapshot = aggregator.snapshot().await?;
    let total_duration = start.elapsed();
    info!(
        successes = snapshot.outcomes.len(),
        failures = snapshot.failed_attempts,
        elapsed_secs = total_duration.as_secs_f64(),
        "all users finished"
    );

    Ok((snapshot, total_duration))
}
