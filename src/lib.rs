mod client;
mod config;
mod metrics;
mod report;
mod runner;
mod user;

pub use client::{stream_completion, ChunkFramer, RequestOutcome};
pub use config::{duration_from_secs, LoadTestConfig, SlaThresholds, ThinkTime, DEFAULT_PROMPT};
pub use metrics::{MetricsAggregator, MetricsSink, MetricsSnapshot};
pub use report::{judge, percentile, summarize, LoadTestReport, Summary, Verdict};
pub use reqwest::header::{HeaderName, HeaderValue};
pub use runner::{run_load_test, simulate};
pub use user::run_user;
