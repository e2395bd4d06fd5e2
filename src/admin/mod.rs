//! Admin API.
//!
//! Read-only observability endpoints plus instance status control, served on
//! a separate listener and guarded by a bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::http::Gateway;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub gateway: Arc<Gateway>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(gateway: Arc<Gateway>) -> Router {
    let state = AdminState {
        api_key: Arc::from(gateway.config().admin.api_key.as_str()),
        gateway,
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/metrics", get(get_metrics))
        .route("/admin/requests", get(get_requests))
        .route("/admin/services", get(get_services))
        .route("/admin/services/{service}/status", post(set_instance_status))
        .route("/admin/breakers", get(get_breakers))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
