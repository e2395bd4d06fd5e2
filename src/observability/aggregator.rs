//! In-memory request log and rollups for the observability API.
//!
//! Keeps the most recent completed requests in a bounded FIFO and computes
//! summaries on demand. Summaries are read-only over the retained window.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Records retained before the oldest is evicted.
pub const DEFAULT_CAPACITY: usize = 1000;

const TOP_ENDPOINTS: usize = 10;

/// One completed (or short-circuited) request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetricRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub method: String,
    pub path: String,
    /// Empty when no route matched.
    pub service_name: String,
    pub status_code: u16,
    pub duration_ms: u64,
    pub request_bytes: usize,
    pub response_bytes: usize,
    pub error_message: Option<String>,
    pub user_id: Option<String>,
}

/// Inclusive timestamp bounds in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: u64,
    pub end: u64,
}

impl TimeRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        (self.start..=self.end).contains(&timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    /// `METHOD path`.
    pub endpoint: String,
    pub count: usize,
    pub average_latency_ms: f64,
}

/// Rollup over the retained records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub total_requests: usize,
    pub average_latency_ms: f64,
    /// Share of records with status >= 400, as a percentage.
    pub error_rate_percent: f64,
    pub requests_by_service: BTreeMap<String, usize>,
    /// Keys `2xx`, `3xx`, `4xx`, `5xx`, always present.
    pub status_distribution: BTreeMap<String, usize>,
    pub top_endpoints: Vec<EndpointStats>,
}

#[derive(Debug)]
pub struct MetricsAggregator {
    records: Mutex<VecDeque<RequestMetricRecord>>,
    capacity: usize,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a record, evicting the oldest beyond capacity.
    pub fn record(&self, record: RequestMetricRecord) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> Vec<RequestMetricRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().cloned().collect()
    }

    pub fn summarize(&self, range: Option<TimeRange>) -> MetricsSummary {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let selected: Vec<&RequestMetricRecord> = records
            .iter()
            .filter(|r| range.map_or(true, |range| range.contains(r.timestamp)))
            .collect();

        let total = selected.len();
        let total_latency: u64 = selected.iter().map(|r| r.duration_ms).sum();
        let errors = selected.iter().filter(|r| r.status_code >= 400).count();

        let mut requests_by_service = BTreeMap::new();
        let mut status_distribution: BTreeMap<String, usize> = ["2xx", "3xx", "4xx", "5xx"]
            .into_iter()
            .map(|class| (class.to_string(), 0))
            .collect();
        let mut endpoints: HashMap<String, (usize, u64)> = HashMap::new();

        for record in &selected {
            if !record.service_name.is_empty() {
                *requests_by_service.entry(record.service_name.clone()).or_insert(0) += 1;
            }
            if (200..600).contains(&record.status_code) {
                *status_distribution
                    .entry(format!("{}xx", record.status_code / 100))
                    .or_insert(0) += 1;
            }
            let entry = endpoints
                .entry(format!("{} {}", record.method, record.path))
                .or_insert((0, 0));
            entry.0 += 1;
            entry.1 += record.duration_ms;
        }

        let mut top_endpoints: Vec<EndpointStats> = endpoints
            .into_iter()
            .map(|(endpoint, (count, latency))| EndpointStats {
                endpoint,
                count,
                average_latency_ms: latency as f64 / count as f64,
            })
            .collect();
        top_endpoints.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.endpoint.cmp(&b.endpoint)));
        top_endpoints.truncate(TOP_ENDPOINTS);

        MetricsSummary {
            total_requests: total,
            average_latency_ms: ratio(total_latency as f64, total),
            error_rate_percent: ratio(errors as f64 * 100.0, total),
            requests_by_service,
            status_distribution,
            top_endpoints,
        }
    }
}

fn ratio(numerator: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        numerator / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: u64, path: &str, service: &str, status: u16, duration_ms: u64) -> RequestMetricRecord {
        RequestMetricRecord {
            timestamp,
            method: "GET".into(),
            path: path.into(),
            service_name: service.into(),
            status_code: status,
            duration_ms,
            request_bytes: 0,
            response_bytes: 0,
            error_message: None,
            user_id: None,
        }
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let aggregator = MetricsAggregator::new();
        for i in 0..1005 {
            aggregator.record(record(i, "/a", "svc", 200, 1));
        }
        let records = aggregator.records();
        assert_eq!(records.len(), DEFAULT_CAPACITY);
        assert_eq!(records[0].timestamp, 5);
        assert_eq!(records.last().unwrap().timestamp, 1004);
    }

    #[test]
    fn summary_rollups() {
        let aggregator = MetricsAggregator::new();
        aggregator.record(record(1, "/search", "search", 200, 10));
        aggregator.record(record(2, "/search", "search", 200, 30));
        aggregator.record(record(3, "/orders", "orders", 503, 50));
        aggregator.record(record(4, "/missing", "", 404, 2));
        aggregator.record(record(5, "/moved", "orders", 301, 8));

        let summary = aggregator.summarize(None);
        assert_eq!(summary.total_requests, 5);
        assert_eq!(summary.average_latency_ms, 20.0);
        assert_eq!(summary.error_rate_percent, 40.0);
        assert_eq!(summary.requests_by_service["search"], 2);
        assert_eq!(summary.requests_by_service["orders"], 2);
        assert!(!summary.requests_by_service.contains_key(""));
        assert_eq!(summary.status_distribution["2xx"], 2);
        assert_eq!(summary.status_distribution["3xx"], 1);
        assert_eq!(summary.status_distribution["4xx"], 1);
        assert_eq!(summary.status_distribution["5xx"], 1);

        let top = &summary.top_endpoints[0];
        assert_eq!(top.endpoint, "GET /search");
        assert_eq!(top.count, 2);
        assert_eq!(top.average_latency_ms, 20.0);
    }

    #[test]
    fn range_filters_and_empty_summary_is_zero() {
        let aggregator = MetricsAggregator::new();
        aggregator.record(record(100, "/a", "svc", 200, 10));
        aggregator.record(record(200, "/a", "svc", 500, 30));

        let summary = aggregator.summarize(Some(TimeRange::new(150, 250)));
        assert_eq!(summary.total_requests, 1);
        assert_eq!(summary.error_rate_percent, 100.0);

        let empty = aggregator.summarize(Some(TimeRange::new(0, 10)));
        assert_eq!(empty.total_requests, 0);
        assert_eq!(empty.average_latency_ms, 0.0);
        assert_eq!(empty.status_distribution["2xx"], 0);
        assert!(empty.top_endpoints.is_empty());
    }

    #[test]
    fn top_endpoints_capped_at_ten() {
        let aggregator = MetricsAggregator::new();
        for i in 0..15u64 {
            for _ in 0..=i {
                aggregator.record(record(i, &format!("/e{}", i), "svc", 200, 1));
            }
        }
        let top = aggregator.summarize(None).top_endpoints;
        assert_eq!(top.len(), 10);
        assert_eq!(top[0].endpoint, "GET /e14");
        assert_eq!(top[0].count, 15);
    }
}
