use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::client::stream_completion;
use crate::config::LoadTestConfig;
use crate::metrics::MetricsSink;

/// Runs one simulated user: think, prompt, record, until `deadline`.
///
/// The deadline is only checked before each cycle, so a request in flight
/// when it passes still runs to completion and is recorded. Endpoint
/// failures are logged and counted; only a closed metrics channel ends the
/// loop early.
pub async fn run_user(
    user_id: usize,
    client: Client,
    config: Arc<LoadTestConfig>,
    deadline: Instant,
    sink: MetricsSink,
) -> Result<()> {
    info!(user = user_id, "user logged in");
    let body = config.request_body();
    let mut cycles = 0u64;

    while Instant::now() < deadline {
        tokio::time::sleep(config.think_time.sample()).await;
        cycles += 1;

        match stream_completion(&client, &config, &body).await {
            Ok(outcome) => {
                info!(
                    user = user_id,
                    chunks = outcome.chunk_count(),
                    ttft_ms = outcome.time_to_first_chunk_millis(),
                    total_secs = outcome.total_latency_secs(),
                    tps = outcome.throughput_tps(),
                    "request completed"
                );
                sink.submit(outcome)?;
            }
            Err(err) => {
                warn!(user = user_id, error = %format!("{:#}", err), "request failed");
                sink.record_failure()?;
            }
        }
    }

    debug!(user = user_id, cycles, "user finished");
    Ok(())
}
