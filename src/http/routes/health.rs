//! GET /healthz - 存活检查

use axum::{routing::get, Router};

use crate::http::HttpServerState;

pub fn create_route() -> Router<HttpServerState> {
    Router::new().route("/healthz", get(healthz))
}

async fn healthz() -> &'static str {
    "ok"
}
