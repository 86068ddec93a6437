//! 文档事件入口
//!
//! 路由：POST / 与 POST /events
//!
//! 支持两种 CloudEvents 模式：
//! - binary：`ce-id` / `ce-type` / `ce-subject` 头，body 为 JSON 格式的 `DocumentEventData`
//! - structured：`Content-Type: application/cloudevents+json`，body 为完整事件
//!
//! 成功或 no-op 返回 204；事件格式错误返回 400；handler 失败返回 500，由运行时重投。

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tracing::{debug, info};

use crate::domain::{CloudEventEnvelope, DocumentEvent, DocumentEventData};
use crate::error::{Result, ServerError};
use crate::http::HttpServerState;

const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

/// 创建事件路由
pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/", post(receive_event))
        .route("/events", post(receive_event))
}

async fn receive_event(
    State(state): State<HttpServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let Some(event) = parse_event(&headers, &body)? else {
        debug!("事件没有文档数据，忽略");
        return Ok(StatusCode::NO_CONTENT);
    };

    let report = state.dispatcher.dispatch(event).await?;
    info!(
        "📨 事件 {} ({}) 处理完成: handlers={}, delivered={}",
        report.event_id,
        report.document_path,
        report.handlers.len(),
        report.delivered_count()
    );

    Ok(StatusCode::NO_CONTENT)
}

fn parse_event(headers: &HeaderMap, body: &[u8]) -> Result<Option<DocumentEvent>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with(STRUCTURED_CONTENT_TYPE) {
        let envelope: CloudEventEnvelope = serde_json::from_slice(body)
            .map_err(|e| ServerError::InvalidEvent(format!("invalid cloud event: {}", e)))?;
        return DocumentEvent::from_envelope(envelope);
    }

    if content_type.starts_with("application/protobuf") {
        return Err(ServerError::InvalidEvent(
            "protobuf event data is not supported, configure the trigger for JSON".to_string(),
        ));
    }

    let id = required_header(headers, "ce-id")?;
    let event_type = required_header(headers, "ce-type")?;
    let subject = headers.get("ce-subject").and_then(|v| v.to_str().ok());

    let data = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(
            serde_json::from_slice::<DocumentEventData>(body)
                .map_err(|e| ServerError::InvalidEvent(format!("invalid event data: {}", e)))?,
        )
    };

    DocumentEvent::from_cloud_event(id, event_type, subject, data)
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::InvalidEvent(format!("missing {} header", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use crate::domain::DocumentEventKind;

    fn binary_headers(event_type: &str, subject: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("ce-id", HeaderValue::from_static("evt-1"));
        headers.insert("ce-type", HeaderValue::from_str(event_type).unwrap());
        headers.insert("ce-subject", HeaderValue::from_str(subject).unwrap());
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_parse_binary_event() {
        let headers = binary_headers(
            "google.cloud.firestore.document.v1.created",
            "documents/friend_requests/R1",
        );
        let body = br#"{"value":{"name":"projects/p/databases/(default)/documents/friend_requests/R1","fields":{"receiverId":{"stringValue":"U2"}}}}"#;

        let event = parse_event(&headers, body).unwrap().unwrap();
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.kind, DocumentEventKind::Created);
        assert_eq!(event.document_path, "friend_requests/R1");
        assert_eq!(event.after.unwrap()["receiverId"], "U2");
    }

    #[test]
    fn test_empty_body_is_noop() {
        let headers = binary_headers(
            "google.cloud.firestore.document.v1.updated",
            "documents/friend_requests/R1",
        );
        assert!(parse_event(&headers, b"").unwrap().is_none());
    }

    #[test]
    fn test_missing_headers_are_client_errors() {
        let err = parse_event(&HeaderMap::new(), b"{}").unwrap_err();
        assert!(err.is_client_error());

        let headers = binary_headers("google.cloud.storage.object.v1.finalized", "objects/a");
        let err = parse_event(&headers, b"{}").unwrap_err();
        assert!(err.is_client_error());
    }
}
