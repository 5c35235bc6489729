//! Admin diagnostics API.
//!
//! # Responsibilities
//! - Expose cluster, destination and health state as JSON
//! - Trigger an immediate active health check pass
//! - Require a bearer token on every route

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::HealthServices;

#[derive(Clone)]
pub struct AdminState {
    pub services: Arc<HealthServices>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(services: Arc<HealthServices>, api_key: impl Into<Arc<str>>) -> Self {
        Self {
            services,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/clusters", get(get_clusters))
        .route("/admin/clusters/{id}/destinations", get(get_destinations))
        .route("/admin/health/probe", post(post_probe))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
