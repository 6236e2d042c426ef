use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use userbench_rs::{
    duration_from_secs, run_load_test, HeaderName, HeaderValue, LoadTestConfig, SlaThresholds,
    ThinkTime, DEFAULT_PROMPT,
};

#[derive(Parser, Debug)]
#[command(
    name = "userbench",
    about = "Simulate think-then-prompt users against a streaming chat-completion endpoint"
)]
struct Args {
    /// Host to target (e.g. http://localhost:12001)
    #[arg(long, default_value = "http://localhost:12001")]
    host: String,

    /// Endpoint path or full URL (e.g. /v1/chat/completions)
    #[arg(long, default_value = "/v1/chat/completions")]
    endpoint: String,

    /// Model identifier to embed in each request body
    #[arg(long, default_value = "model")]
    model: String,

    /// Number of concurrent simulated users
    #[arg(long, default_value_t = 35)]
    users: usize,

    /// How long users keep starting new requests, in seconds
    #[arg(long, default_value_t = 60.0)]
    duration_secs: f64,

    /// Shortest pause between a user's requests, in seconds
    #[arg(long, default_value_t = 5.0)]
    min_think_secs: f64,

    /// Longest pause between a user's requests, in seconds
    #[arg(long, default_value_t = 30.0)]
    max_think_secs: f64,

    /// max_tokens sent with each request
    #[arg(long, default_value_t = 150)]
    max_tokens: u32,

    /// Prompt every user sends
    #[arg(long, default_value = DEFAULT_PROMPT)]
    prompt: String,

    /// Fail when the 95th percentile time to first chunk exceeds this many milliseconds
    #[arg(long, default_value_t = 2000.0)]
    ttft_p95_max_ms: f64,

    /// Warn when mean throughput falls below this many chunks per second
    #[arg(long, default_value_t = 15.0)]
    min_mean_tps: f64,

    /// Extra request header as `Name: value`; repeatable
    #[arg(long = "header", value_name = "NAME: VALUE")]
    headers: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    request_timeout_secs: u64,

    /// Also print the report as JSON
    #[arg(long)]
    json: bool,

    /// Exit non-zero on FAIL (1) or NO_DATA (2)
    #[arg(long)]
    exit_code: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;
    let report = run_load_test(config).await?;

    println!();
    println!("{}", report);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if args.exit_code {
        return Ok(ExitCode::from(report.verdict.exit_code()));
    }
    Ok(ExitCode::SUCCESS)
}

fn build_config(args: &Args) -> Result<LoadTestConfig> {
    let duration = duration_from_secs("duration-secs", args.duration_secs)?;
    let think_time = ThinkTime::from_secs_f64(args.min_think_secs, args.max_think_secs)?;

    let mut config = LoadTestConfig::try_new(
        resolve_endpoint(&args.host, &args.endpoint),
        args.model.clone(),
        args.users,
        duration,
        think_time,
    )?
    .with_max_tokens(args.max_tokens)?
    .with_prompt(args.prompt.clone())
    .with_thresholds(SlaThresholds {
        ttft_p95_max_millis: args.ttft_p95_max_ms,
        min_mean_tps: args.min_mean_tps,
    })?
    .with_request_timeout(Duration::from_secs(args.request_timeout_secs));

    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        config = config.add_header(name, value);
    }
    Ok(config)
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("header `{}` is not in `Name: value` form", raw))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("invalid header name in `{}`", raw))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("invalid header value in `{}`", raw))?;
    Ok((name, value))
}

/// A full URL in `endpoint` wins; otherwise it is a path under `host`,
/// which defaults to plain http when it carries no scheme.
fn resolve_endpoint(host: &str, endpoint: &str) -> String {
    if endpoint.contains("://") {
        return endpoint.to_string();
    }
    let base = match host.split_once("://") {
        Some(_) => host.to_string(),
        None => format!("http://{}", host),
    };
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
