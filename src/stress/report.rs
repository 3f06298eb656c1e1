//! Stress run results: raw tally, derived metrics, text summary, JSON file.

use super::StressConfig;
use crate::error::KitError;
use crate::output::write_atomic;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Settings echoed into the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfig {
    pub users: usize,
    /// Seconds.
    pub duration: u64,
    /// Seconds.
    pub ramp_up: u64,
    /// Milliseconds.
    pub delay: u64,
    /// Milliseconds.
    pub timeout: u64,
    pub method: String,
}

impl From<&StressConfig> for TestConfig {
    fn from(c: &StressConfig) -> Self {
        TestConfig {
            users: c.users,
            duration: c.duration.as_secs(),
            ramp_up: c.ramp_up.as_secs(),
            delay: c.delay.as_millis() as u64,
            timeout: c.timeout.as_millis() as u64,
            method: c.method.to_string(),
        }
    }
}

/// Why a request did not produce a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Timeout,
    Connection,
    Http(u16),
    Unknown,
}

impl Failure {
    pub fn classify(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Failure::Timeout
        } else if let Some(status) = e.status() {
            Failure::Http(status.as_u16())
        } else if e.is_connect() || e.is_request() || e.is_body() || e.is_decode() {
            Failure::Connection
        } else {
            Failure::Unknown
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Timeout => f.write_str("Timeout"),
            Failure::Connection => f.write_str("Connection Error"),
            Failure::Http(code) => write!(f, "HTTP {code}"),
            Failure::Unknown => f.write_str("Unknown Error"),
        }
    }
}

/// Result of one request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Any HTTP response, whatever the status.
    Response { status: u16, elapsed_ms: f64 },
    Failed(Failure),
}

/// Running counts shared by all users.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub response_times_ms: Vec<f64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<String, u64>,
}

impl Tally {
    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Response { status, elapsed_ms } => {
                self.successful += 1;
                self.response_times_ms.push(elapsed_ms);
                *self.status_codes.entry(status).or_default() += 1;
            }
            Outcome::Failed(failure) => {
                self.failed += 1;
                if let Failure::Http(code) = failure {
                    *self.status_codes.entry(code).or_default() += 1;
                }
                *self.errors.entry(failure.to_string()).or_default() += 1;
            }
        }
    }
}

/// Derived figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_duration_ms: f64,
    pub avg_response_time_ms: f64,
    pub median_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub requests_per_second: f64,
    /// Percent, 0–100.
    pub success_rate: f64,
}

impl Metrics {
    pub fn compute(tally: &Tally, total_duration_ms: f64) -> Self {
        let mut sorted = tally.response_times_ms.clone();
        sorted.sort_by(f64::total_cmp);
        let n = sorted.len();

        let avg = if n > 0 { sorted.iter().sum::<f64>() / n as f64 } else { 0.0 };
        let median = sorted.get(n / 2).copied().unwrap_or(0.0);
        let p95 = sorted
            .get(((n as f64 * 0.95) as usize).min(n.saturating_sub(1)))
            .copied()
            .unwrap_or(0.0);

        let secs = total_duration_ms / 1000.0;
        Metrics {
            total_duration_ms,
            avg_response_time_ms: avg,
            median_response_time_ms: median,
            p95_response_time_ms: p95,
            requests_per_second: if secs > 0.0 { tally.total as f64 / secs } else { 0.0 },
            success_rate: percent(tally.successful, tally.total),
        }
    }
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Everything a stress run measured.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressReport {
    pub url: String,
    pub test_config: TestConfig,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub response_times_ms: Vec<f64>,
    pub status_codes: BTreeMap<u16, u64>,
    pub errors: BTreeMap<String, u64>,
    pub metrics: Metrics,
    /// True when the run was stopped before its duration elapsed.
    pub interrupted: bool,
}

impl StressReport {
    pub fn new(
        config: &StressConfig,
        tally: Tally,
        start_time: DateTime<Local>,
        end_time: DateTime<Local>,
        interrupted: bool,
    ) -> Self {
        let elapsed_ms = (end_time - start_time).num_microseconds().unwrap_or(0) as f64 / 1000.0;
        let metrics = Metrics::compute(&tally, elapsed_ms);
        StressReport {
            url: config.url.to_string(),
            test_config: TestConfig::from(config),
            start_time,
            end_time,
            total_requests: tally.total,
            successful_requests: tally.successful,
            failed_requests: tally.failed,
            response_times_ms: tally.response_times_ms,
            status_codes: tally.status_codes,
            errors: tally.errors,
            metrics,
            interrupted,
        }
    }

    /// Errors, most frequent first; ties by name.
    pub fn errors_by_count(&self) -> Vec<(&str, u64)> {
        let mut errors: Vec<(&str, u64)> =
            self.errors.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        errors
    }

    pub fn to_json(&self) -> Result<String, KitError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| KitError::Internal(format!("report serialisation: {e}")))
    }

    /// Write the JSON report to `path`.
    pub fn save(&self, path: &Path) -> Result<(), KitError> {
        write_atomic(path, self.to_json()?.as_bytes())?;
        info!("Detailed results saved to {}", path.display());
        Ok(())
    }
}

impl fmt::Display for StressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(f, "========== TEST RESULTS ==========")?;
        writeln!(f, "URL: {}", self.url)?;
        writeln!(f, "Duration: {:.2} seconds", m.total_duration_ms / 1000.0)?;
        writeln!(f, "Concurrent Users: {}", self.test_config.users)?;
        writeln!(f, "Total Requests: {}", self.total_requests)?;
        writeln!(
            f,
            "Successful Requests: {} ({:.2}%)",
            self.successful_requests, m.success_rate
        )?;
        writeln!(f, "Failed Requests: {}", self.failed_requests)?;
        writeln!(f, "Requests Per Second: {:.2}", m.requests_per_second)?;
        writeln!(f)?;
        writeln!(f, "Response Times:")?;
        writeln!(f, "  Average: {:.2} ms", m.avg_response_time_ms)?;
        writeln!(f, "  Median: {:.0} ms", m.median_response_time_ms)?;
        writeln!(f, "  95th Percentile: {:.0} ms", m.p95_response_time_ms)?;
        writeln!(f)?;
        writeln!(f, "Status Code Distribution:")?;
        for (code, count) in &self.status_codes {
            writeln!(
                f,
                "  {}: {} ({:.2}%)",
                code,
                count,
                percent(*count, self.total_requests)
            )?;
        }
        if !self.errors.is_empty() {
            writeln!(f)?;
            writeln!(f, "Error Distribution:")?;
            for (error, count) in self.errors_by_count() {
                writeln!(
                    f,
                    "  {}: {} ({:.2}%)",
                    error,
                    count,
                    percent(count, self.total_requests)
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn response(ms: f64) -> Outcome {
        Outcome::Response {
            status: 200,
            elapsed_ms: ms,
        }
    }

    fn sample_report() -> StressReport {
        let config = StressConfig::builder("http://localhost:8080/")
            .users(5)
            .duration_secs(2)
            .build()
            .unwrap();
        let mut tally = Tally::default();
        for ms in [10.0, 30.0, 20.0, 40.0] {
            tally.record(response(ms));
        }
        tally.record(Outcome::Response {
            status: 404,
            elapsed_ms: 50.0,
        });
        tally.record(Outcome::Failed(Failure::Timeout));
        tally.record(Outcome::Failed(Failure::Connection));
        tally.record(Outcome::Failed(Failure::Connection));
        let start = Local::now();
        StressReport::new(&config, tally, start, start + ChronoDuration::seconds(2), false)
    }

    #[test]
    fn tally_counts_responses_and_failures() {
        let r = sample_report();
        assert_eq!(r.total_requests, 8);
        assert_eq!(r.successful_requests, 5);
        assert_eq!(r.failed_requests, 3);
        assert_eq!(r.status_codes.get(&200), Some(&4));
        assert_eq!(r.status_codes.get(&404), Some(&1));
        assert_eq!(r.errors.get("Connection Error"), Some(&2));
    }

    #[test]
    fn http_failure_also_counts_status() {
        let mut t = Tally::default();
        t.record(Outcome::Failed(Failure::Http(502)));
        assert_eq!(t.status_codes.get(&502), Some(&1));
        assert_eq!(t.errors.get("HTTP 502"), Some(&1));
    }

    #[test]
    fn metrics_use_index_percentiles() {
        let m = sample_report().metrics;
        // sorted: 10 20 30 40 50
        assert_eq!(m.median_response_time_ms, 30.0);
        assert_eq!(m.p95_response_time_ms, 50.0);
        assert!((m.avg_response_time_ms - 30.0).abs() < 1e-9);
        assert!((m.requests_per_second - 4.0).abs() < 1e-9);
        assert!((m.success_rate - 62.5).abs() < 1e-9);
        assert!((m.total_duration_ms - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn empty_tally_has_zero_metrics() {
        let m = Metrics::compute(&Tally::default(), 1000.0);
        assert_eq!(m, Metrics { total_duration_ms: 1000.0, ..Default::default() });
    }

    #[test]
    fn errors_sorted_by_count_descending() {
        let r = sample_report();
        assert_eq!(
            r.errors_by_count(),
            vec![("Connection Error", 2), ("Timeout", 1)]
        );
    }

    #[test]
    fn json_uses_camel_case_keys() {
        let json: serde_json::Value = serde_json::from_str(&sample_report().to_json().unwrap()).unwrap();
        assert_eq!(json["testConfig"]["rampUp"], 0);
        assert_eq!(json["testConfig"]["method"], "GET");
        assert_eq!(json["totalRequests"], 8);
        assert_eq!(json["statusCodes"]["200"], 4);
        assert_eq!(json["metrics"]["medianResponseTimeMs"], 30.0);
        assert!(json["startTime"].is_string());
        assert!(json["responseTimesMs"].is_array());
    }

    #[test]
    fn summary_lists_distributions() {
        let text = sample_report().to_string();
        assert!(text.contains("Total Requests: 8"));
        assert!(text.contains("Successful Requests: 5 (62.50%)"));
        assert!(text.contains("  200: 4 (50.00%)"));
        assert!(text.contains("  Median: 30 ms"));
        let conn = text.find("Connection Error").unwrap();
        let timeout = text.find("Timeout: 1").unwrap();
        assert!(conn < timeout);
    }

    #[test]
    fn failure_labels() {
        assert_eq!(Failure::Timeout.to_string(), "Timeout");
        assert_eq!(Failure::Connection.to_string(), "Connection Error");
        assert_eq!(Failure::Http(503).to_string(), "HTTP 503");
        assert_eq!(Failure::Unknown.to_string(), "Unknown Error");
    }
}
