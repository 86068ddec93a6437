use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Android 通知渠道（App 端在启动时创建）
pub const DEFAULT_CHANNEL_ID: &str = "default_notification_channel";

/// 推送优先级（FCM `AndroidMessagePriority`）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PushPriority {
    Normal,
    #[default]
    High,
}

/// 通知类型，写入 data 的 `type` 字段供客户端路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    PingtrailInvite,
    FriendRequest,
    FriendRequestAccepted,
    FriendRequestRejected,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::PingtrailInvite => "pingtrail_invite",
            NotificationKind::FriendRequest => "friend_request",
            NotificationKind::FriendRequestAccepted => "friend_request_accepted",
            NotificationKind::FriendRequestRejected => "friend_request_rejected",
        }
    }
}

/// 推送 Payload（不落库）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    /// 结构化数据（客户端路由用）
    pub data: BTreeMap<String, String>,
    pub priority: PushPriority,
    pub channel_id: String,
}

impl NotificationPayload {
    /// 创建 Payload，并写入 `type` 判别字段
    pub fn new(kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Self {
        let mut data = BTreeMap::new();
        data.insert("type".to_string(), kind.as_str().to_string());
        Self {
            title: title.into(),
            body: body.into(),
            data,
            priority: PushPriority::High,
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// data 中的 `type`
    pub fn kind(&self) -> Option<&str> {
        self.data.get("type").map(String::as_str)
    }
}

/// 单个令牌的发送结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub token: String,
    /// 成功时为 FCM 返回的 message name
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResponse {
    pub fn success(token: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failure(token: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            message_id: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// 多播发送结果
///
/// 调用方只记录日志，不根据单个令牌的结果做决策。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MulticastSendResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub responses: Vec<SendResponse>,
}

impl MulticastSendResult {
    pub fn from_responses(responses: Vec<SendResponse>) -> Self {
        let success_count = responses.iter().filter(|r| r.is_success()).count();
        Self {
            success_count,
            failure_count: responses.len() - success_count,
            responses,
        }
    }
}
