use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::admin::AdminState;
use crate::http::ServiceStatus;
use crate::load_balancer::InstanceStatus;
use crate::observability::{MetricsSummary, RequestMetricRecord, TimeRange};
use crate::resilience::CircuitBreakerSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub name: String,
    pub version: &'static str,
    pub status: &'static str,
}

/// Optional `start`/`end` bounds in epoch milliseconds.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl RangeQuery {
    fn to_range(&self) -> Option<TimeRange> {
        match (self.start, self.end) {
            (None, None) => None,
            (start, end) => Some(TimeRange::new(start.unwrap_or(0), end.unwrap_or(u64::MAX))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub endpoint: Url,
    pub status: InstanceStatus,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        name: state.gateway.config().gateway.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

pub async fn get_metrics(
    State(state): State<AdminState>,
    Query(query): Query<RangeQuery>,
) -> Json<MetricsSummary> {
    Json(state.gateway.get_metrics(query.to_range()))
}

pub async fn get_requests(State(state): State<AdminState>) -> Json<Vec<RequestMetricRecord>> {
    Json(state.gateway.recent_requests())
}

pub async fn get_services(State(state): State<AdminState>) -> Json<Vec<ServiceStatus>> {
    Json(state.gateway.get_service_status())
}

pub async fn get_breakers(State(state): State<AdminState>) -> Json<Vec<CircuitBreakerSnapshot>> {
    Json(state.gateway.get_circuit_breaker_status())
}

/// Set an instance's status, e.g. `{"endpoint": "http://10.0.0.5:3000", "status": "draining"}`.
pub async fn set_instance_status(
    State(state): State<AdminState>,
    Path(service): Path<String>,
    Json(update): Json<StatusUpdate>,
) -> StatusCode {
    if state
        .gateway
        .set_instance_status(&service, &update.endpoint, update.status)
    {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_query_fills_open_bounds() {
        assert_eq!(RangeQuery::default().to_range(), None);
        let from = RangeQuery { start: Some(10), end: None };
        assert_eq!(from.to_range(), Some(TimeRange::new(10, u64::MAX)));
    }
}
