use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;
use serde_json::{json, Value};

pub const DEFAULT_PROMPT: &str = "Write a short poem about coding.";

/// Converts a user-supplied number of seconds, rejecting negative, NaN,
/// infinite and out-of-range values.
pub fn duration_from_secs(name: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(anyhow!(
            "{} must be a finite, non-negative number of seconds (got {})",
            name,
            secs
        ));
    }
    Duration::try_from_secs_f64(secs)
        .with_context(|| format!("{} of {} seconds is out of range", name, secs))
}

/// Inclusive bounds of the pause a simulated user takes between requests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThinkTime {
    pub min: Duration,
    pub max: Duration,
}

impl ThinkTime {
    pub fn from_secs_f64(min_secs: f64, max_secs: f64) -> Result<Self> {
        let min = duration_from_secs("think time min", min_secs)?;
        let max = duration_from_secs("think time max", max_secs)?;
        if min > max {
            return Err(anyhow!(
                "think time min ({}s) must not exceed max ({}s)",
                min_secs,
                max_secs
            ));
        }
        Ok(Self { min, max })
    }

    /// Draws a pause uniformly from `[min, max]`.
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

/// Fixed pass/fail limits applied to the final statistics.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SlaThresholds {
    pub ttft_p95_max_millis: f64,
    pub min_mean_tps: f64,
}

impl Default for SlaThresholds {
    fn default() -> Self {
        Self {
            ttft_p95_max_millis: 2000.0,
            min_mean_tps: 15.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoadTestConfig {
    pub endpoint: Url,
    pub model: String,
    pub user_count: usize,
    pub duration: Duration,
    pub think_time: ThinkTime,
    pub max_tokens: u32,
    pub prompt: String,
    pub thresholds: SlaThresholds,
    pub request_timeout: Duration,
    pub headers: HeaderMap,
}

impl LoadTestConfig {
    pub fn try_new(
        endpoint: impl AsRef<str>,
        model: impl Into<String>,
        user_count: usize,
        duration: Duration,
        think_time: ThinkTime,
    ) -> Result<Self> {
        if user_count == 0 {
            return Err(anyhow!("user_count must be greater than zero"));
        }
        if duration.is_zero() {
            return Err(anyhow!("test duration must be greater than zero"));
        }

        let endpoint = Url::parse(endpoint.as_ref())
            .with_context(|| format!("invalid endpoint URL: {}", endpoint.as_ref()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        Ok(Self {
            endpoint,
            model: model.into(),
            user_count,
            duration,
            think_time,
            max_tokens: 150,
            prompt: DEFAULT_PROMPT.to_string(),
            thresholds: SlaThresholds::default(),
            request_timeout: Duration::from_secs(120),
            headers,
        })
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Result<Self> {
        if max_tokens == 0 {
            return Err(anyhow!("max_tokens must be greater than zero"));
        }
        self.max_tokens = max_tokens;
        Ok(self)
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_thresholds(mut self, thresholds: SlaThresholds) -> Result<Self> {
        if !thresholds.ttft_p95_max_millis.is_finite() || thresholds.ttft_p95_max_millis <= 0.0 {
            return Err(anyhow!("p95 TTFT ceiling must be a positive number of milliseconds"));
        }
        if !thresholds.min_mean_tps.is_finite() || thresholds.min_mean_tps < 0.0 {
            return Err(anyhow!("mean throughput floor must be a non-negative number"));
        }
        self.thresholds = thresholds;
        Ok(self)
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        if !request_timeout.is_zero() {
            self.request_timeout = request_timeout;
        }
        self
    }

    pub fn add_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// The chat-completion body every simulated user sends.
    pub fn request_body(&self) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "user",
                    "content": self.prompt,
                }
            ],
            "stream": true,
            "max_tokens": self.max_tokens,
        })
    }
}
