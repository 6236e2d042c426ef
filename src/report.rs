use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::client::RequestOutcome;
use crate::config::SlaThresholds;
use crate::metrics::MetricsSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
    NoData,
}

impl Verdict {
    /// PASS and WARN exit cleanly; FAIL and NO_DATA do not.
    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Pass | Verdict::Warn => 0,
            Verdict::Fail => 1,
            Verdict::NoData => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Warn => "WARN",
            Verdict::Fail => "FAIL",
            Verdict::NoData => "NO_DATA",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean_ttft_millis: f64,
    pub p95_ttft_millis: f64,
    pub mean_tps: f64,
    pub min_tps: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoadTestReport {
    pub user_count: usize,
    pub attempts: u64,
    pub failed_attempts: u64,
    pub total_duration_secs: f64,
    pub thresholds: SlaThresholds,
    pub summary: Option<Summary>,
    pub verdict: Verdict,
}

impl LoadTestReport {
    pub fn from_snapshot(
        snapshot: &MetricsSnapshot,
        thresholds: SlaThresholds,
        user_count: usize,
        total_duration: Duration,
    ) -> Self {
        let summary = summarize(&snapshot.outcomes);
        let verdict = judge(summary.as_ref(), &thresholds);
        Self {
            user_count,
            attempts: snapshot.attempts(),
            failed_attempts: snapshot.failed_attempts,
            total_duration_secs: total_duration.as_secs_f64(),
            thresholds,
            summary,
            verdict,
        }
    }
}

/// Returns `None` for an empty sample; no statistic is computed then.
pub fn summarize(outcomes: &[RequestOutcome]) -> Option<Summary> {
    if outcomes.is_empty() {
        return None;
    }

    let count = outcomes.len();
    let mut ttfts: Vec<f64> = outcomes
        .iter()
        .map(RequestOutcome::time_to_first_chunk_millis)
        .collect();
    ttfts.sort_by(f64::total_cmp);
    let speeds: Vec<f64> = outcomes.iter().map(RequestOutcome::throughput_tps).collect();

    Some(Summary {
        count,
        mean_ttft_millis: ttfts.iter().sum::<f64>() / count as f64,
        p95_ttft_millis: percentile(&ttfts, 0.95)?,
        mean_tps: speeds.iter().sum::<f64>() / count as f64,
        min_tps: speeds.iter().copied().fold(f64::INFINITY, f64::min),
    })
}

/// Linear interpolation between the two nearest ranks of an ascending slice.
pub fn percentile(sorted: &[f64], quantile: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let position = (sorted.len() - 1) as f64 * quantile.clamp(0.0, 1.0);
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

pub fn judge(summary: Option<&Summary>, thresholds: &SlaThresholds) -> Verdict {
    match summary {
        None => Verdict::NoData,
        Some(s) if s.p95_ttft_millis > thresholds.ttft_p95_max_millis => Verdict::Fail,
        Some(s) if s.mean_tps < thresholds.min_mean_tps => Verdict::Warn,
        Some(_) => Verdict::Pass,
    }
}

const RULE: &str = "========================================";
const DIVIDER: &str = "------------------------------";

impl fmt::Display for LoadTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "          LOAD TEST REPORT")?;
        writeln!(f, "{}", RULE)?;
        writeln!(
            f,
            "Users: {}  Wall clock: {:.1} s",
            self.user_count, self.total_duration_secs
        )?;
        writeln!(
            f,
            "Attempts: {} (failed {})",
            self.attempts, self.failed_attempts
        )?;

        let Some(summary) = &self.summary else {
            writeln!(f, "No successful requests.")?;
            return write!(f, "Verdict: {}", self.verdict);
        };

        writeln!(f, "Requests processed: {}", summary.count)?;
        writeln!(f, "{}", DIVIDER)?;
        writeln!(f, "Time to first chunk:")?;
        writeln!(f, "  Mean:      {:.0} ms", summary.mean_ttft_millis)?;
        writeln!(
            f,
            "  p95:       {:.0} ms (limit {:.0} ms)",
            summary.p95_ttft_millis, self.thresholds.ttft_p95_max_millis
        )?;
        writeln!(f, "{}", DIVIDER)?;
        writeln!(f, "Throughput:")?;
        writeln!(
            f,
            "  Mean:      {:.1} t/s (floor {:.1} t/s)",
            summary.mean_tps, self.thresholds.min_mean_tps
        )?;
        writeln!(f, "  Slowest:   {:.1} t/s", summary.min_tps)?;
        writeln!(f, "{}", DIVIDER)?;

        let detail = match self.verdict {
            Verdict::Fail => "p95 time to first chunk is over the limit",
            Verdict::Warn => "mean throughput is below the floor",
            Verdict::Pass => "all thresholds met",
            Verdict::NoData => "no data",
        };
        write!(f, "Verdict: {} ({})", self.verdict, detail)
    }
}
