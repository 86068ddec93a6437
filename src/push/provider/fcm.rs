use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::auth::AccessTokenSource;
use crate::error::{Result, ServerError};
use crate::push::provider::provider_trait::PushProvider;
use crate::push::types::{
    MulticastSendResult, NotificationPayload, PushPriority, SendResponse,
};

pub const FCM_BASE_URL: &str = "https://fcm.googleapis.com";

/// 多播时同时在途的请求数
const DEFAULT_MULTICAST_CONCURRENCY: usize = 16;

/// FCM (Firebase Cloud Messaging) Provider
///
/// 使用 FCM HTTP v1 API。v1 API 没有批量接口，多播按令牌逐个发送。
pub struct FcmProvider {
    client: Client,
    base_url: String,
    project_id: String,
    token_source: Arc<dyn AccessTokenSource>,
    multicast_concurrency: usize,
    /// 覆盖 payload 中的 Android 通知渠道
    channel_id: Option<String>,
}

impl FcmProvider {
    /// 创建新的 FCM Provider
    ///
    /// # 参数
    /// - project_id: Firebase 项目 ID
    /// - token_source: OAuth 2.0 access token 来源
    pub fn new(
        client: Client,
        project_id: String,
        token_source: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: FCM_BASE_URL.to_string(),
            project_id,
            token_source,
            multicast_concurrency: DEFAULT_MULTICAST_CONCURRENCY,
            channel_id: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_multicast_concurrency(mut self, concurrency: usize) -> Self {
        self.multicast_concurrency = concurrency.max(1);
        self
    }

    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        )
    }

    /// 构建 FCM 消息 payload
    fn build_fcm_payload(
        token: &str,
        payload: &NotificationPayload,
        channel_id: &str,
    ) -> serde_json::Value {
        let apns_priority = match payload.priority {
            PushPriority::High => "10",
            PushPriority::Normal => "5",
        };
        json!({
            "message": {
                "token": token,
                "notification": {
                    "title": payload.title,
                    "body": payload.body
                },
                "data": payload.data,
                "android": {
                    "priority": payload.priority,
                    "notification": {
                        "channel_id": channel_id
                    }
                },
                "apns": {
                    "headers": {
                        "apns-priority": apns_priority
                    }
                }
            }
        })
    }

    async fn post_message(
        &self,
        access_token: &str,
        token: &str,
        payload: &NotificationPayload,
    ) -> Result<String> {
        let response = self
            .client
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&Self::build_fcm_payload(
                token,
                payload,
                self.channel_id.as_deref().unwrap_or(&payload.channel_id),
            ))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let body: serde_json::Value = response.json().await?;
            Ok(body
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(ServerError::Push {
                status: status.as_u16(),
                message: parse_fcm_error(&error_text),
            })
        }
    }
}

/// 从 FCM 错误响应中取出错误码，优先使用 `FcmError.errorCode`
fn parse_fcm_error(error_text: &str) -> String {
    let Ok(error_json) = serde_json::from_str::<serde_json::Value>(error_text) else {
        return error_text.to_string();
    };
    let error = &error_json["error"];
    let code = error["details"]
        .as_array()
        .and_then(|details| {
            details
                .iter()
                .find_map(|d| d.get("errorCode").and_then(|c| c.as_str()))
        })
        .or_else(|| error["status"].as_str())
        .unwrap_or("UNKNOWN");
    let message = error["message"].as_str().unwrap_or_default();
    format!("{} ({})", code, message)
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<String> {
        let access_token = self.token_source.access_token().await?;

        debug!(
            "[FCM] Sending push: type={:?}, title={}",
            payload.kind(),
            payload.title
        );

        match self.post_message(&access_token, token, payload).await {
            Ok(message_id) => {
                info!("[FCM] Push sent successfully: message_id={}", message_id);
                Ok(message_id)
            }
            Err(e) => {
                error!("[FCM] Push failed: {}", e);
                Err(e)
            }
        }
    }

    async fn send_multicast(
        &self,
        tokens: &[String],
        payload: &NotificationPayload,
    ) -> Result<MulticastSendResult> {
        if tokens.is_empty() {
            return Ok(MulticastSendResult::default());
        }

        // 令牌获取失败属于整体失败，直接返回
        let access_token = self.token_source.access_token().await?;

        let access_token = access_token.as_str();
        let sends: Vec<_> = tokens
            .iter()
            .map(|token| async move {
                match self.post_message(access_token, token, payload).await {
                    Ok(message_id) => SendResponse::success(token.as_str(), message_id),
                    Err(e) => SendResponse::failure(token.as_str(), e.to_string()),
                }
            })
            .collect();
        let responses: Vec<SendResponse> = stream::iter(sends)
            .buffer_unordered(self.multicast_concurrency)
            .collect()
            .await;

        let result = MulticastSendResult::from_responses(responses);
        info!(
            "[FCM] Multicast sent: type={:?}, success={}, failed={}",
            payload.kind(),
            result.success_count,
            result.failure_count
        );
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenSource;
    use crate::push::types::NotificationKind;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};

    const UNREGISTERED_BODY: &str = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND","details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;

    /// 模拟 FCM：`stale` 开头的令牌返回 UNREGISTERED，缺少 bearer 返回 401
    async fn fcm_stub(headers: HeaderMap, Json(body): Json<serde_json::Value>) -> Response {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer t") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let token = body["message"]["token"].as_str().unwrap_or_default();
        if token.starts_with("stale") {
            return (StatusCode::NOT_FOUND, UNREGISTERED_BODY).into_response();
        }
        Json(json!({ "name": format!("projects/pingpal/messages/{}", token) })).into_response()
    }

    async fn stub_provider() -> FcmProvider {
        let app = Router::new().route("/v1/projects/pingpal/messages:send", post(fcm_stub));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FcmProvider::new(
            Client::new(),
            "pingpal".to_string(),
            Arc::new(StaticTokenSource::new("t")),
        )
        .with_base_url(format!("http://{}", addr))
        .with_multicast_concurrency(2)
    }

    fn invite_payload() -> NotificationPayload {
        NotificationPayload::new(
            NotificationKind::PingtrailInvite,
            "New Pingtrail Invite",
            "Alice invited you to a Pingtrail",
        )
    }

    #[test]
    fn test_build_fcm_payload() {
        let payload = NotificationPayload::new(
            NotificationKind::PingtrailInvite,
            "New Pingtrail Invite",
            "Alice invited you to a Pingtrail",
        )
        .with_data("pingtrailId", "T1");

        let message = FcmProvider::build_fcm_payload("tok2", &payload, &payload.channel_id);
        assert_eq!(message["message"]["token"], "tok2");
        assert_eq!(message["message"]["notification"]["title"], "New Pingtrail Invite");
        assert_eq!(message["message"]["data"]["type"], "pingtrail_invite");
        assert_eq!(message["message"]["data"]["pingtrailId"], "T1");
        assert_eq!(message["message"]["android"]["priority"], "HIGH");
        assert_eq!(
            message["message"]["android"]["notification"]["channel_id"],
            "default_notification_channel"
        );
    }

    #[test]
    fn test_channel_override() {
        let payload = NotificationPayload::new(
            NotificationKind::FriendRequest,
            "New Friend Request",
            "Alice sent you a friend request",
        );
        let message = FcmProvider::build_fcm_payload("tok", &payload, "friends");
        assert_eq!(message["message"]["android"]["notification"]["channel_id"], "friends");
    }

    #[test]
    fn test_parse_fcm_error() {
        let body = r#"{"error":{"code":404,"message":"Requested entity was not found.","status":"NOT_FOUND","details":[{"@type":"type.googleapis.com/google.firebase.fcm.v1.FcmError","errorCode":"UNREGISTERED"}]}}"#;
        assert_eq!(
            parse_fcm_error(body),
            "UNREGISTERED (Requested entity was not found.)"
        );
        assert_eq!(parse_fcm_error("bad gateway"), "bad gateway");
    }

    #[tokio::test]
    async fn test_send_returns_message_name() {
        let provider = stub_provider().await;

        let message_id = provider.send("tok1", &invite_payload()).await.unwrap();
        assert_eq!(message_id, "projects/pingpal/messages/tok1");
    }

    #[tokio::test]
    async fn test_send_error_carries_status_and_error_code() {
        let provider = stub_provider().await;

        let err = provider.send("stale1", &invite_payload()).await.unwrap_err();
        match err {
            ServerError::Push { status, message } => {
                assert_eq!(status, 404);
                assert!(message.starts_with("UNREGISTERED"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multicast_counts_per_token_failures() {
        let provider = stub_provider().await;

        let tokens = vec![
            "tok1".to_string(),
            "stale1".to_string(),
            "tok2".to_string(),
        ];
        let result = provider.send_multicast(&tokens, &invite_payload()).await.unwrap();

        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        let failed = result.responses.iter().find(|r| !r.is_success()).unwrap();
        assert_eq!(failed.token, "stale1");
        assert!(failed.error.as_deref().unwrap().contains("UNREGISTERED"));
    }

    #[tokio::test]
    async fn test_multicast_empty_tokens_is_noop() {
        let provider = stub_provider().await;

        let result = provider.send_multicast(&[], &invite_payload()).await.unwrap();
        assert_eq!(result.success_count, 0);
        assert_eq!(result.failure_count, 0);
    }
}
