//! Metrics Module
//!
//! This module defines the `MetricsSink` collaborator the pipeline reports to, and
//! an in-memory implementation with bounded histories. The sink is owned and
//! injected by whoever builds the pipeline; there is no process-wide state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const REQUEST_HISTORY: usize = 1000;
const ERROR_HISTORY: usize = 100;
const SAMPLES_PER_METRIC: usize = 100;

pub trait MetricsSink: Send + Sync {
    /// Returns an id to pass back to `record_request_end`.
    fn record_request_start(&self, request_type: &str) -> String;
    fn record_request_end(&self, request_id: &str, success: bool, error: Option<&str>);
    fn record_metric(&self, name: &str, value: f64);
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub id: String,
    pub request_type: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: Option<i64>,
    pub success: Option<bool>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub uptime: String,
    pub active_requests: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub by_type: HashMap<String, u64>,
}

#[derive(Default)]
struct State {
    requests: VecDeque<RequestRecord>,
    errors: VecDeque<ErrorRecord>,
    metrics: HashMap<String, VecDeque<MetricSample>>,
    active: u64,
    total: u64,
    total_errors: u64,
}

pub struct InMemoryMetrics {
    started_at: DateTime<Utc>,
    state: Mutex<State>,
}

impl Default for InMemoryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self { started_at: Utc::now(), state: Mutex::new(State::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic mid-update leaves counters usable, so recover the guard.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn uptime(&self) -> String {
        let elapsed = Utc::now() - self.started_at;
        let days = elapsed.num_days();
        let hours = elapsed.num_hours() % 24;
        let minutes = elapsed.num_minutes() % 60;
        let seconds = elapsed.num_seconds() % 60;
        if days > 0 {
            format!("{}d {}h {}m", days, hours, minutes)
        } else if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else {
            format!("{}m {}s", minutes, seconds)
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let state = self.lock();

        let finished: Vec<&RequestRecord> =
            state.requests.iter().filter(|r| r.success.is_some()).collect();
        let succeeded = finished.iter().filter(|r| r.success == Some(true)).count();
        let success_rate = if finished.is_empty() {
            100.0
        } else {
            succeeded as f64 / finished.len() as f64 * 100.0
        };
        let durations: Vec<i64> = finished.iter().filter_map(|r| r.duration_ms).collect();
        let avg_duration_ms = if durations.is_empty() {
            0.0
        } else {
            durations.iter().sum::<i64>() as f64 / durations.len() as f64
        };

        let mut by_type = HashMap::new();
        for r in &state.requests {
            *by_type.entry(r.request_type.clone()).or_insert(0) += 1;
        }

        MetricsSummary {
            uptime: self.uptime(),
            active_requests: state.active,
            total_requests: state.total,
            total_errors: state.total_errors,
            success_rate,
            avg_duration_ms,
            by_type,
        }
    }

    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.lock().errors.iter().cloned().collect()
    }

    pub fn samples(&self, name: &str) -> Vec<MetricSample> {
        self.lock()
            .metrics
            .get(name)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_request_start(&self, request_type: &str) -> String {
        let id = format!("{}_{}", request_type, Uuid::new_v4().simple());
        let mut state = self.lock();
        if state.requests.len() == REQUEST_HISTORY {
            state.requests.pop_front();
        }
        state.requests.push_back(RequestRecord {
            id: id.clone(),
            request_type: request_type.to_string(),
            started_at: Utc::now(),
            duration_ms: None,
            success: None,
            error: None,
        });
        state.active += 1;
        state.total += 1;
        id
    }

    fn record_request_end(&self, request_id: &str, success: bool, error: Option<&str>) {
        let now = Utc::now();
        let mut state = self.lock();

        if let Some(record) = state.requests.iter_mut().rev().find(|r| r.id == request_id) {
            record.duration_ms = Some((now - record.started_at).num_milliseconds());
            record.success = Some(success);
            record.error = error.map(str::to_string);
        }

        state.active = state.active.saturating_sub(1);
        if !success {
            state.total_errors += 1;
            if state.errors.len() == ERROR_HISTORY {
                state.errors.pop_front();
            }
            state.errors.push_back(ErrorRecord {
                request_id: request_id.to_string(),
                timestamp: now,
                error: error.map(str::to_string),
            });
        }
    }

    fn record_metric(&self, name: &str, value: f64) {
        let mut state = self.lock();
        let samples = state.metrics.entry(name.to_string()).or_default();
        if samples.len() == SAMPLES_PER_METRIC {
            samples.pop_front();
        }
        samples.push_back(MetricSample { timestamp: Utc::now(), value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_lifecycle() {
        let metrics = InMemoryMetrics::new();
        let ok = metrics.record_request_start("optimize");
        let failed = metrics.record_request_start("optimize");
        let pending = metrics.record_request_start("validate");
        assert_ne!(ok, failed);

        metrics.record_request_end(&ok, true, None);
        metrics.record_request_end(&failed, false, Some("boom"));

        let summary = metrics.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.active_requests, 1);
        assert_eq!(summary.total_errors, 1);
        assert_eq!(summary.success_rate, 50.0);
        assert_eq!(summary.by_type["optimize"], 2);
        assert_eq!(summary.by_type["validate"], 1);

        let errors = metrics.recent_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error.as_deref(), Some("boom"));
        assert!(pending.starts_with("validate_"));
    }

    #[test]
    fn test_histories_are_bounded() {
        let metrics = InMemoryMetrics::new();
        for i in 0..150 {
            metrics.record_metric("html_size", i as f64);
        }
        let samples = metrics.samples("html_size");
        assert_eq!(samples.len(), 100);
        assert_eq!(samples[0].value, 50.0);

        for _ in 0..1005 {
            let id = metrics.record_request_start("x");
            metrics.record_request_end(&id, false, None);
        }
        assert_eq!(metrics.recent_errors().len(), 100);
        assert_eq!(metrics.lock().requests.len(), 1000);
        assert_eq!(metrics.summary().total_requests, 1005);
    }

    #[test]
    fn test_empty_summary() {
        let summary = InMemoryMetrics::default().summary();
        assert_eq!(summary.success_rate, 100.0);
        assert_eq!(summary.avg_duration_ms, 0.0);
        assert!(summary.uptime.ends_with('s'));
        assert!(metrics_is_object_safe(&InMemoryMetrics::new()));
    }

    fn metrics_is_object_safe(sink: &dyn MetricsSink) -> bool {
        sink.record_metric("probe", 1.0);
        true
    }
}
