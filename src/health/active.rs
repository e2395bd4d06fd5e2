//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every registered instance
//! - Update instance status in the service registry
//!
//! A probe is `GET endpoints[0] + health_check_path`; 2xx and 3xx count as
//! healthy. There are no retries within a cycle and probe failures never
//! propagate. Draining instances are not probed.

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::load_balancer::{InstanceStatus, ServiceInstance, ServiceRegistry};
use crate::observability::metrics;

pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    config: HealthCheckConfig,
    client: Client<HttpConnector, Body>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, config: HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            registry,
            config,
            client,
        }
    }

    /// Probe on a fixed interval until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_ms = self.config.timeout_ms,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        // The first tick fires immediately; registration already marked instances healthy.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one probe cycle over every instance.
    pub async fn check_all(&self) {
        for instance in self.registry.all_instances() {
            if instance.status == InstanceStatus::Draining {
                continue;
            }
            let Some(probed) = instance.endpoints.first() else {
                continue;
            };

            let healthy = self.probe(&instance).await;
            let checked_at = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default();

            if let Some((from, to)) =
                self.registry
                    .record_probe(&instance.service_name, probed, healthy, checked_at)
            {
                if from != to {
                    tracing::info!(
                        service = %instance.service_name,
                        endpoint = %probed,
                        from = ?from,
                        to = ?to,
                        "Instance health changed"
                    );
                }
                metrics::record_instance_health(
                    &instance.service_name,
                    probed.as_str(),
                    to == InstanceStatus::Healthy,
                );
            }
        }
    }

    async fn probe(&self, instance: &ServiceInstance) -> bool {
        let Some(uri) = instance.probe_url() else {
            return false;
        };

        let request = match Request::builder()
            .method("GET")
            .uri(&uri)
            .header("user-agent", "api-gateway-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(uri = %uri, error = %e, "Failed to build health check request");
                return false;
            }
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        match time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => {
                let status = response.status();
                let success = status.is_success() || status.is_redirection();
                if !success {
                    tracing::warn!(uri = %uri, status = %status, "Health check failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(uri = %uri, error = %e, "Health check failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(uri = %uri, timeout_ms = self.config.timeout_ms, "Health check failed: timeout");
                false
            }
        }
    }
}
