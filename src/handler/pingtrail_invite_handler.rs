use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::EventContext;
use crate::handler::{EventHandler, HandlerOutcome, SkipReason};
use crate::model::PingTrail;
use crate::push::{NotificationKind, NotificationPayload, PushProvider};
use crate::repository::UserRepository;
use crate::Result;

/// 房主没有资料或名字时的占位名
const HOST_PLACEHOLDER: &str = "A user";

/// PingTrail 邀请处理器（`pingtrails/{pingtrailId}` 创建）
///
/// 给除房主外的每个成员发同一条多播通知。
pub struct PingtrailInviteHandler {
    users: Arc<dyn UserRepository>,
    push: Arc<dyn PushProvider>,
}

impl PingtrailInviteHandler {
    pub fn new(users: Arc<dyn UserRepository>, push: Arc<dyn PushProvider>) -> Self {
        Self { users, push }
    }

    async fn host_name(&self, trail: &PingTrail) -> Result<String> {
        let Some(host_id) = trail.host_id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(HOST_PLACEHOLDER.to_string());
        };
        let profile = self.users.find_by_id(host_id).await?;
        Ok(profile
            .as_ref()
            .map(|p| p.display_name_or(HOST_PLACEHOLDER).to_string())
            .unwrap_or_else(|| HOST_PLACEHOLDER.to_string()))
    }

    async fn invitee_tokens(&self, invitees: &[String]) -> Result<Vec<String>> {
        let profiles = self.users.find_by_ids(invitees).await?;
        Ok(invitees
            .iter()
            .filter_map(|id| profiles.get(id).and_then(|p| p.push_token()))
            .map(String::from)
            .collect())
    }
}

fn invite_body(host_name: &str, trail: &PingTrail) -> String {
    match trail.name() {
        Some(name) => format!("{} invited you to \"{}\"", host_name, name),
        None => format!("{} invited you to a Pingtrail", host_name),
    }
}

#[async_trait]
impl EventHandler for PingtrailInviteHandler {
    async fn handle(&self, context: &EventContext) -> Result<HandlerOutcome> {
        let Some(trail) = context.event.decode_after::<PingTrail>()? else {
            return Ok(HandlerOutcome::Skipped(SkipReason::MissingData));
        };

        let invitees = trail.invitees();
        if invitees.is_empty() {
            debug!(
                "[PINGTRAIL] {} has no members besides the host",
                context.event.document_path
            );
            return Ok(HandlerOutcome::Skipped(SkipReason::NoRecipients));
        }

        let (host_name, tokens) =
            tokio::try_join!(self.host_name(&trail), self.invitee_tokens(&invitees))?;

        if tokens.is_empty() {
            debug!(
                "[PINGTRAIL] none of {} invitees has a push token",
                invitees.len()
            );
            return Ok(HandlerOutcome::Skipped(SkipReason::NoPushToken));
        }

        let pingtrail_id = context.param_or_document_id("pingtrailId");
        let payload = NotificationPayload::new(
            NotificationKind::PingtrailInvite,
            "New Pingtrail Invite",
            invite_body(&host_name, &trail),
        )
        .with_data("pingtrailId", pingtrail_id);

        let result = self.push.send_multicast(&tokens, &payload).await?;

        info!(
            "Pingtrail invite {} sent to {} of {} invitees (success={}, failed={})",
            pingtrail_id,
            tokens.len(),
            invitees.len(),
            result.success_count,
            result.failure_count
        );

        Ok(HandlerOutcome::Delivered {
            kind: NotificationKind::PingtrailInvite,
            recipients: tokens.len(),
        })
    }

    fn name(&self) -> &'static str {
        "pingtrail_invite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_body() {
        let mut trail = PingTrail {
            host_id: Some("U1".to_string()),
            members: vec![],
            name: Some("Morning Walk".to_string()),
        };
        assert_eq!(
            invite_body("Alice", &trail),
            "Alice invited you to \"Morning Walk\""
        );

        trail.name = None;
        assert_eq!(invite_body("A user", &trail), "A user invited you to a Pingtrail");
    }
}
