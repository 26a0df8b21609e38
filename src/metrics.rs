//! In-process metrics registry exposed as JSON on `GET /metrics`.
//!
//! The registry is built once in `main` and shared through `AppState`.

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::state::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_ERRORS_TOTAL: &str = "http_errors_total";
pub const HTTP_REQUEST_DURATION_MS: &str = "http_request_duration_ms";
pub const ACTIVE_CONNECTIONS: &str = "active_connections";
pub const ACTIVE_SESSIONS: &str = "active_game_sessions";
pub const EVENTS_PUBLISHED_TOTAL: &str = "events_published_total";
pub const RESPONSES_SCORED_TOTAL: &str = "responses_scored_total";
pub const SCORING_FALLBACKS_TOTAL: &str = "scoring_fallbacks_total";
pub const GAMES_COMPLETED_TOTAL: &str = "games_completed_total";
pub const WS_MESSAGES_TOTAL: &str = "ws_messages_total";
pub const CLIENT_ERROR_REPORTS_TOTAL: &str = "client_error_reports_total";

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl HistogramSummary {
    fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, i64>,
    pub histograms: BTreeMap<String, HistogramSummary>,
    pub uptime_secs: u64,
}

#[derive(Debug, Default)]
struct Registry {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, i64>,
    histograms: BTreeMap<String, HistogramSummary>,
}

#[derive(Debug)]
pub struct Metrics {
    inner: Mutex<Registry>,
    started: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Render `name{k="v",..}` so labelled series live side by side in one map
fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, v))
        .collect();
    format!("{}{{{}}}", name, rendered.join(","))
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Registry::default()),
            started: Instant::now(),
        }
    }

    fn with_registry<F: FnOnce(&mut Registry)>(&self, f: F) {
        match self.inner.lock() {
            Ok(mut registry) => f(&mut registry),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        self.add(name, labels, 1);
    }

    pub fn add(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        let key = series_key(name, labels);
        self.with_registry(|r| *r.counters.entry(key).or_insert(0) += value);
    }

    pub fn adjust_gauge(&self, name: &str, delta: i64) {
        self.with_registry(|r| *r.gauges.entry(name.to_string()).or_insert(0) += delta);
    }

    pub fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = series_key(name, labels);
        self.with_registry(|r| r.histograms.entry(key).or_default().observe(value));
    }

    pub fn observe_duration(&self, name: &str, labels: &[(&str, &str)], elapsed: Duration) {
        self.observe(name, labels, elapsed.as_secs_f64() * 1000.0);
    }

    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = series_key(name, labels);
        let mut value = 0;
        self.with_registry(|r| value = r.counters.get(&key).copied().unwrap_or(0));
        value
    }

    pub fn gauge(&self, name: &str) -> i64 {
        let mut value = 0;
        self.with_registry(|r| value = r.gauges.get(name).copied().unwrap_or(0));
        value
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            ..Default::default()
        };
        self.with_registry(|r| {
            snapshot.counters = r.counters.clone();
            snapshot.gauges = r.gauges.clone();
            snapshot.histograms = r.histograms.clone();
        });
        snapshot
    }
}

/// Records request count, error count and latency for every HTTP request
pub async fn track_http(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();

    let status_str = status.as_u16().to_string();
    let metrics = &state.metrics;
    metrics.increment(
        HTTP_REQUESTS_TOTAL,
        &[("method", &method), ("path", &path), ("status", &status_str)],
    );
    metrics.observe_duration(
        HTTP_REQUEST_DURATION_MS,
        &[("method", &method), ("path", &path)],
        start.elapsed(),
    );
    if status.is_client_error() || status.is_server_error() {
        let kind = if status.is_server_error() {
            "server_error"
        } else {
            "client_error"
        };
        metrics.increment(HTTP_ERRORS_TOTAL, &[("type", kind), ("path", &path)]);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_label() {
        let metrics = Metrics::new();
        metrics.increment(HTTP_REQUESTS_TOTAL, &[("path", "/health")]);
        metrics.increment(HTTP_REQUESTS_TOTAL, &[("path", "/health")]);
        metrics.increment(HTTP_REQUESTS_TOTAL, &[("path", "/api")]);

        assert_eq!(metrics.counter(HTTP_REQUESTS_TOTAL, &[("path", "/health")]), 2);
        assert_eq!(metrics.counter(HTTP_REQUESTS_TOTAL, &[("path", "/api")]), 1);
        assert_eq!(metrics.counter(HTTP_REQUESTS_TOTAL, &[]), 0);
    }

    #[test]
    fn test_gauges() {
        let metrics = Metrics::new();
        metrics.adjust_gauge(ACTIVE_CONNECTIONS, 1);
        metrics.adjust_gauge(ACTIVE_CONNECTIONS, 1);
        metrics.adjust_gauge(ACTIVE_CONNECTIONS, -1);
        assert_eq!(metrics.gauge(ACTIVE_CONNECTIONS), 1);
        assert_eq!(metrics.gauge(ACTIVE_SESSIONS), 0);
    }

    #[test]
    fn test_histogram_summary() {
        let metrics = Metrics::new();
        metrics.observe(HTTP_REQUEST_DURATION_MS, &[], 10.0);
        metrics.observe(HTTP_REQUEST_DURATION_MS, &[], 30.0);

        let snapshot = metrics.snapshot();
        let summary = snapshot.histograms[HTTP_REQUEST_DURATION_MS];
        assert_eq!(summary.count, 2);
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 30.0);
        assert_eq!(summary.mean(), 20.0);
    }

    #[test]
    fn test_series_key_format() {
        assert_eq!(series_key("x", &[]), "x");
        assert_eq!(
            series_key("x", &[("a", "1"), ("b", "2")]),
            "x{a=\"1\",b=\"2\"}"
        );
    }
}
