//! Prometheus 指标：事件接收量、分发耗时、推送发送量等
//!
//! 通过 `init()` 安装全局 Recorder，通过 HTTP GET `/metrics` 暴露抓取端点。

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::OnceLock;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标名称
const COUNTER_EVENTS_RECEIVED: &str = "pingpal_events_received_total";
const HISTOGRAM_DISPATCH_DURATION: &str = "pingpal_dispatch_duration_seconds";
const COUNTER_NOTIFICATIONS_SENT: &str = "pingpal_notifications_sent_total";
const COUNTER_HANDLER_SKIPPED: &str = "pingpal_handler_skipped_total";
const COUNTER_HANDLER_FAILED: &str = "pingpal_handler_failed_total";
const COUNTER_DUPLICATE_EVENTS: &str = "pingpal_duplicate_events_total";

/// 初始化 Prometheus 指标（安装全局 Recorder，返回 Handle 用于 HTTP 暴露）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 渲染当前指标为 Prometheus 文本格式，供 GET /metrics 使用。
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// 记录收到一个文档事件
pub fn record_event_received(event_kind: &str) {
    metrics::counter!(COUNTER_EVENTS_RECEIVED, "kind" => event_kind.to_string()).increment(1);
}

/// 记录一次分发耗时
pub fn record_dispatch(duration_secs: f64) {
    metrics::histogram!(HISTOGRAM_DISPATCH_DURATION).record(duration_secs);
}

/// 记录发出的通知（按 `type` 区分，多播按令牌数计）
pub fn record_notifications_sent(kind: &str, count: usize) {
    metrics::counter!(COUNTER_NOTIFICATIONS_SENT, "type" => kind.to_string())
        .increment(count as u64);
}

/// 记录 handler 的 no-op 返回
pub fn record_handler_skipped(handler: &'static str, reason: &'static str) {
    metrics::counter!(COUNTER_HANDLER_SKIPPED, "handler" => handler, "reason" => reason)
        .increment(1);
}

/// 记录 handler 失败
pub fn record_handler_failed(handler: &'static str) {
    metrics::counter!(COUNTER_HANDLER_FAILED, "handler" => handler).increment(1);
}

/// 记录被去重拦下的重复事件
pub fn record_duplicate_event(handler: &'static str) {
    metrics::counter!(COUNTER_DUPLICATE_EVENTS, "handler" => handler).increment(1);
}
