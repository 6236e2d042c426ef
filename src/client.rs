use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::config::LoadTestConfig;

/// Measurements of one streamed request that completed successfully.
///
/// Only [`RequestOutcome::from_timings`] builds one, so every value in
/// circulation has a positive TTFT and a positive total latency, and its
/// throughput is exactly `chunk_count / total_latency_secs`.
///
/// `chunk_count` counts received stream lines, blank SSE separators
/// included. It approximates the number of generated tokens; an SSE event
/// `data: ..\n\n` counts twice and servers that batch several tokens per
/// event make it undercount.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestOutcome {
    time_to_first_chunk_millis: f64,
    total_latency_secs: f64,
    chunk_count: u64,
    throughput_tps: f64,
}

impl RequestOutcome {
    /// Returns `None` when either timing is not strictly positive.
    pub fn from_timings(
        time_to_first_chunk: Duration,
        total_latency: Duration,
        chunk_count: u64,
    ) -> Option<Self> {
        let time_to_first_chunk_millis = time_to_first_chunk.as_secs_f64() * 1000.0;
        let total_latency_secs = total_latency.as_secs_f64();
        if time_to_first_chunk_millis <= 0.0 || total_latency_secs <= 0.0 {
            return None;
        }
        Some(Self {
            time_to_first_chunk_millis,
            total_latency_secs,
            chunk_count,
            throughput_tps: chunk_count as f64 / total_latency_secs,
        })
    }

    pub fn time_to_first_chunk_millis(&self) -> f64 {
        self.time_to_first_chunk_millis
    }

    pub fn total_latency_secs(&self) -> f64 {
        self.total_latency_secs
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    pub fn throughput_tps(&self) -> f64 {
        self.throughput_tps
    }
}

/// Splits a streamed body into lines and counts them.
///
/// Every terminated line is a chunk, including a bare `\n`. A trailing
/// unterminated line counts at close only if it carries bytes.
#[derive(Debug, Default)]
pub struct ChunkFramer {
    partial: bool,
    count: u64,
}

impl ChunkFramer {
    /// Feeds raw body bytes; returns how many chunks they completed.
    pub fn push(&mut self, bytes: &[u8]) -> u64 {
        let completed = bytes.iter().filter(|b| **b == b'\n').count() as u64;
        if let Some(last) = bytes.last() {
            self.partial = *last != b'\n';
        }
        self.count += completed;
        completed
    }

    /// Flushes an unterminated final line at stream close.
    pub fn finish(&mut self) -> u64 {
        let completed = u64::from(self.partial);
        self.partial = false;
        self.count += completed;
        completed
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Sends one streamed chat completion and measures it.
///
/// Any failure (transport error, non-200 status, broken stream, a stream with
/// no chunks) is returned as an error and no partial outcome survives.
pub async fn stream_completion(
    client: &Client,
    config: &LoadTestConfig,
    body: &Value,
) -> Result<RequestOutcome> {
    let start = Instant::now();
    let mut request = client.post(config.endpoint.clone());
    for (name, value) in config.headers.iter() {
        request = request.header(name, value);
    }
    let response = request
        .json(body)
        .send()
        .await
        .context("failed to send request")?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(anyhow!("endpoint returned status {}", status));
    }

    let mut framer = ChunkFramer::default();
    let mut first_chunk = None;
    let mut stream = response.bytes_stream();
    while let Some(bytes) = stream.next().await {
        let bytes = bytes.context("response stream failed")?;
        if framer.push(&bytes) > 0 && first_chunk.is_none() {
            first_chunk = Some(start.elapsed());
        }
    }
    if framer.finish() > 0 && first_chunk.is_none() {
        first_chunk = Some(start.elapsed());
    }
    let total_latency = start.elapsed();

    let time_to_first_chunk =
        first_chunk.ok_or_else(|| anyhow!("stream closed without any chunk"))?;
    RequestOutcome::from_timings(time_to_first_chunk, total_latency, framer.count())
        .ok_or_else(|| anyhow!("request finished with a non-positive latency"))
}
