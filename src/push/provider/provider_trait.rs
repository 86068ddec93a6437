use async_trait::async_trait;

use crate::error::Result;
use crate::push::types::{MulticastSendResult, NotificationPayload};

/// Push Provider Trait（推送提供者接口）
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// 单目标发送，返回提供者的消息 ID
    async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<String>;

    /// 多播发送：同一 Payload 发给多个令牌，单个令牌失败不影响其他令牌
    async fn send_multicast(
        &self,
        tokens: &[String],
        payload: &NotificationPayload,
    ) -> Result<MulticastSendResult>;

    /// Provider 名称（日志用）
    fn name(&self) -> &'static str;
}
