//! GET /metrics - Prometheus 抓取端点

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// 返回 Prometheus 文本格式指标，未初始化时返回 503
pub async fn metrics_handler() -> Response {
    match crate::infra::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}
