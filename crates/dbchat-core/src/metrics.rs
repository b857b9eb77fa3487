//! Request metrics collection
//!
//! Every chat request produces exactly one [`RequestMetric`], appended to
//! the collector when the request finishes. The log is append-only and
//! lives in process memory for the lifetime of the run; the summary is
//! recomputed from the full log on every call.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Failure classification recorded with a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    Provider,
    NoBackend,
}

/// Outcome of one chat request
#[derive(Debug, Clone)]
pub struct RequestMetric {
    pub request_id: String,
    started: Instant,
    finished: Option<Instant>,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub tools_called: Vec<String>,
}

impl RequestMetric {
    pub fn start(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            started: Instant::now(),
            finished: None,
            success: false,
            error_kind: None,
            tools_called: Vec::new(),
        }
    }

    pub fn record_tool(&mut self, name: &str) {
        self.tools_called.push(name.to_string());
    }

    pub fn finish_success(mut self) -> Self {
        self.finished = Some(Instant::now());
        self.success = true;
        self
    }

    pub fn finish_failure(mut self, kind: ErrorKind) -> Self {
        self.finished = Some(Instant::now());
        self.success = false;
        self.error_kind = Some(kind);
        self
    }

    pub fn duration(&self) -> Option<Duration> {
        self.finished.map(|end| end - self.started)
    }
}

/// Append-only log of request outcomes
#[derive(Debug, Default)]
pub struct MetricsCollector {
    log: Vec<RequestMetric>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, metric: RequestMetric) {
        self.log.push(metric);
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Aggregate the full log. Pure function of the log; no caching.
    pub fn summary(&self) -> MetricsSummary {
        if self.log.is_empty() {
            return MetricsSummary::NoData {
                message: "no metrics recorded".to_string(),
            };
        }

        let total = self.log.len();
        let successful = self.log.iter().filter(|m| m.success).count();
        let failed = total - successful;
        let total_seconds: f64 = self
            .log
            .iter()
            .filter_map(|m| m.duration())
            .map(|d| d.as_secs_f64())
            .sum();
        let avg = total_seconds / total as f64;

        MetricsSummary::Stats {
            total_requests: total,
            successful,
            failed,
            success_rate: format!("{:.1}%", (successful as f64 / total as f64) * 100.0),
            avg_duration_seconds: format!("{:.2}", avg),
        }
    }
}

/// Aggregate view of the metrics log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MetricsSummary {
    NoData {
        message: String,
    },
    Stats {
        total_requests: usize,
        successful: usize,
        failed: usize,
        success_rate: String,
        avg_duration_seconds: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_log_reports_no_data() {
        let collector = MetricsCollector::new();
        assert_eq!(
            collector.summary(),
            MetricsSummary::NoData {
                message: "no metrics recorded".to_string()
            }
        );
    }

    #[test]
    fn summary_counts_and_rates() {
        let mut collector = MetricsCollector::new();
        collector.record(RequestMetric::start("req-1").finish_success());
        collector.record(RequestMetric::start("req-2").finish_success());
        collector.record(RequestMetric::start("req-3").finish_failure(ErrorKind::Timeout));

        match collector.summary() {
            MetricsSummary::Stats {
                total_requests,
                successful,
                failed,
                success_rate,
                ..
            } => {
                assert_eq!(total_requests, 3);
                assert_eq!(successful, 2);
                assert_eq!(failed, 1);
                assert_eq!(success_rate, "66.7%");
            }
            other => panic!("expected stats, got {:?}", other),
        }
    }

    #[test]
    fn summary_is_recomputed_per_call() {
        let mut collector = MetricsCollector::new();
        collector.record(RequestMetric::start("req-1").finish_success());

        let first = collector.summary();
        collector.record(RequestMetric::start("req-2").finish_failure(ErrorKind::Provider));
        let second = collector.summary();

        assert_ne!(first, second);
        match second {
            MetricsSummary::Stats { success_rate, .. } => assert_eq!(success_rate, "50.0%"),
            other => panic!("expected stats, got {:?}", other),
        }
    }

    #[test]
    fn metric_tracks_tools_in_order() {
        let mut metric = RequestMetric::start("req-1");
        metric.record_tool("get_database_schema");
        metric.record_tool("search_users");

        let metric = metric.finish_success();
        assert_eq!(metric.tools_called, vec!["get_database_schema", "search_users"]);
        assert!(metric.success);
        assert!(metric.duration().is_some());
    }

    #[test]
    fn summary_serializes_with_contract_keys() {
        let mut collector = MetricsCollector::new();
        collector.record(RequestMetric::start("req-1").finish_success());

        let value = serde_json::to_value(collector.summary()).unwrap();
        assert_eq!(value["total_requests"], 1);
        assert!(value.get("success_rate").is_some());
        assert!(value.get("avg_duration_seconds").is_some());
    }
}
