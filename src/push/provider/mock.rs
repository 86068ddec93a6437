use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

use crate::error::{Result, ServerError};
use crate::push::provider::provider_trait::PushProvider;
use crate::push::types::{MulticastSendResult, NotificationPayload, SendResponse};

/// 一次发送调用的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentNotification {
    Single {
        token: String,
        payload: NotificationPayload,
    },
    Multicast {
        tokens: Vec<String>,
        payload: NotificationPayload,
    },
}

impl SentNotification {
    pub fn payload(&self) -> &NotificationPayload {
        match self {
            SentNotification::Single { payload, .. } => payload,
            SentNotification::Multicast { payload, .. } => payload,
        }
    }
}

/// Mock Provider（dry-run 模式和测试使用）
///
/// 不调用真实 API，只打印日志并记录每次调用
#[derive(Default)]
pub struct MockProvider {
    sent: Mutex<Vec<SentNotification>>,
    fail: AtomicBool,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// 之后的调用全部返回错误
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// 已记录的调用
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    fn check_failing(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServerError::Push {
                status: 503,
                message: "UNAVAILABLE (mock provider failure)".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PushProvider for MockProvider {
    async fn send(&self, token: &str, payload: &NotificationPayload) -> Result<String> {
        self.check_failing()?;
        info!(
            "[MOCK PUSH] Sending push: token={}, type={:?}, title={}, body={}",
            token,
            payload.kind(),
            payload.title,
            payload.body
        );

        let mut sent = self.sent.lock();
        sent.push(SentNotification::Single {
            token: token.to_string(),
            payload: payload.clone(),
        });
        Ok(format!("mock/messages/{}", sent.len()))
    }

    async fn send_multicast(
        &self,
        tokens: &[String],
        payload: &NotificationPayload,
    ) -> Result<MulticastSendResult> {
        self.check_failing()?;
        info!(
            "[MOCK PUSH] Sending multicast: tokens={}, type={:?}, title={}, body={}",
            tokens.len(),
            payload.kind(),
            payload.title,
            payload.body
        );

        let mut sent = self.sent.lock();
        sent.push(SentNotification::Multicast {
            tokens: tokens.to_vec(),
            payload: payload.clone(),
        });
        let call = sent.len();
        let responses = tokens
            .iter()
            .enumerate()
            .map(|(i, token)| SendResponse::success(token.as_str(), format!("mock/messages/{}-{}", call, i)))
            .collect();
        Ok(MulticastSendResult::from_responses(responses))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
