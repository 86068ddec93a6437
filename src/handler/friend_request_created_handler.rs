use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::context::EventContext;
use crate::handler::{EventHandler, HandlerOutcome, SkipReason};
use crate::model::{FriendRequest, UNKNOWN_USER_NAME};
use crate::push::{NotificationKind, NotificationPayload, PushProvider};
use crate::repository::UserRepository;
use crate::Result;

/// 好友申请创建处理器（`friend_requests/{requestId}` 创建）
///
/// 通知接收方有新的好友申请，发送方名字取申请文档上的冗余字段。
pub struct FriendRequestCreatedHandler {
    users: Arc<dyn UserRepository>,
    push: Arc<dyn PushProvider>,
}

impl FriendRequestCreatedHandler {
    pub fn new(users: Arc<dyn UserRepository>, push: Arc<dyn PushProvider>) -> Self {
        Self { users, push }
    }
}

#[async_trait]
impl EventHandler for FriendRequestCreatedHandler {
    async fn handle(&self, context: &EventContext) -> Result<HandlerOutcome> {
        let Some(request) = context.event.decode_after::<FriendRequest>()? else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingData));
        };
        let Some(receiver_id) = request.receiver_id() else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingData));
        };

        let Some(receiver) = self.users.find_by_id(receiver_id).await? else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingData));
        };
        let Some(token) = receiver.push_token() else {
            return Ok(HandlerOutcome::Skipped(SkipReason::NoPushToken));
        };

        let sender_name = request.sender_name().unwrap_or(UNKNOWN_USER_NAME);
        let payload = NotificationPayload::new(
            NotificationKind::FriendRequest,
            "New Friend Request",
            format!("{} sent you a friend request", sender_name),
        )
        .with_data("senderId", request.sender_id().unwrap_or_default());

        self.push.send(token, &payload).await?;

        info!("Friend request notification sent to {}", receiver_id);

        Ok(HandlerOutcome::Delivered {
            kind: NotificationKind::FriendRequest,
            recipients: 1,
        })
    }

    fn name(&self) -> &'static str {
        "friend_request_created"
    }
}
