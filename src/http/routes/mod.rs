//! HTTP 路由模块
//!
//! 路由结构：
//! - `POST /`、`POST /events` - CloudEvents 事件入口（Eventarc 推送）
//! - `GET /healthz` - 健康检查
//! - `GET /metrics` - Prometheus 抓取端点

pub mod events;
pub mod health;
pub mod metrics;

use axum::{routing::get, Router};
use crate::http::HttpServerState;

/// 创建所有路由
pub fn create_routes() -> Router<HttpServerState> {
    Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .merge(health::create_route())
        .merge(events::create_route())
}
