use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::EventContext;
use crate::handler::{EventHandler, HandlerOutcome, SkipReason};
use crate::model::{FriendRequest, FriendRequestStatus, UNKNOWN_USER_NAME};
use crate::push::{NotificationKind, NotificationPayload, PushProvider};
use crate::repository::UserRepository;
use crate::Result;

/// 好友申请状态变更处理器（`friend_requests/{requestId}` 更新）
///
/// `pending → accepted | rejected` 时通知原发送方。
pub struct FriendRequestStatusHandler {
    users: Arc<dyn UserRepository>,
    push: Arc<dyn PushProvider>,
}

impl FriendRequestStatusHandler {
    pub fn new(users: Arc<dyn UserRepository>, push: Arc<dyn PushProvider>) -> Self {
        Self { users, push }
    }

    /// 回应方的展示名：用户资料 → 申请上的 `receiverName` → 占位名
    async fn responder_name(&self, receiver_id: &str, request: &FriendRequest) -> Result<String> {
        let profile = self.users.find_by_id(receiver_id).await?;
        let name = profile
            .as_ref()
            .and_then(|p| p.display_name())
            .or_else(|| request.receiver_name())
            .unwrap_or(UNKNOWN_USER_NAME);
        Ok(name.to_string())
    }
}

fn outcome_copy(kind: NotificationKind, responder: &str) -> (&'static str, String) {
    match kind {
        NotificationKind::FriendRequestRejected => (
            "Friend request rejected",
            format!("{} rejected your friend request", responder),
        ),
        _ => (
            "You are now friends",
            format!("{} accepted your friend request", responder),
        ),
    }
}

#[async_trait]
impl EventHandler for FriendRequestStatusHandler {
    async fn handle(&self, context: &EventContext) -> Result<HandlerOutcome> {
        let before = context.event.decode_before::<FriendRequest>()?;
        let after = context.event.decode_after::<FriendRequest>()?;
        let (Some(before), Some(after)) = (before, after) else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingData));
        };

        // 其他字段的更新不触发通知
        if before.status == after.status {
            return Ok(HandlerOutcome::Skipped(SkipReason::StatusUnchanged));
        }

        let Some(status) = after.status.as_ref().filter(|s| s.is_terminal()) else {
            debug!(
                "[FRIEND REQUEST] {} moved to non-terminal status {:?}",
                context.event.document_path, after.status
            );
            return Ok(HandlerOutcome::Skipped(SkipReason::StatusNotTerminal));
        };
        let kind = match status {
            FriendRequestStatus::Rejected => NotificationKind::FriendRequestRejected,
            _ => NotificationKind::FriendRequestAccepted,
        };

        let (Some(sender_id), Some(receiver_id)) = (after.sender_id(), after.receiver_id()) else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingData));
        };

        let sender = self.users.find_by_id(sender_id).await?;
        let Some(sender_token) = sender.as_ref().and_then(|p| p.push_token()) else {
            return Ok(HandlerOutcome::Skipped(SkipReason::NoPushToken));
        };

        let responder = self.responder_name(receiver_id, &after).await?;
        let (title, body) = outcome_copy(kind, &responder);
        let payload =
            NotificationPayload::new(kind, title, body).with_data("receiverId", receiver_id);

        self.push.send(sender_token, &payload).await?;

        info!(
            "Friend request {} notification sent to {}",
            status.as_str(),
            sender_id
        );

        Ok(HandlerOutcome::Delivered {
            kind,
            recipients: 1,
        })
    }

    fn name(&self) -> &'static str {
        "friend_request_status_changed"
    }
}
