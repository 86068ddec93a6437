use async_trait::async_trait;

use crate::context::EventContext;
use crate::push::NotificationKind;
use crate::Result;

/// 事件处理器 trait
///
/// 每个 handler 无状态，依赖通过构造函数注入。
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, context: &EventContext) -> Result<HandlerOutcome>;
    fn name(&self) -> &'static str;
}

/// handler 的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// 已发出一次投递调用
    Delivered {
        kind: NotificationKind,
        /// 投递的令牌数
        recipients: usize,
    },
    /// 数据缺失等预期情况，未发送
    Skipped(SkipReason),
}

impl HandlerOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, HandlerOutcome::Delivered { .. })
    }
}

/// no-op 原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 事件或文档缺少必要字段
    MissingData,
    /// 除房主外没有成员
    NoRecipients,
    /// 接收方没有推送令牌
    NoPushToken,
    /// 状态字段未变化
    StatusUnchanged,
    /// 新状态不是终态
    StatusNotTerminal,
    /// 去重账本中已存在
    DuplicateEvent,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingData => "missing_data",
            SkipReason::NoRecipients => "no_recipients",
            SkipReason::NoPushToken => "no_push_token",
            SkipReason::StatusUnchanged => "status_unchanged",
            SkipReason::StatusNotTerminal => "status_not_terminal",
            SkipReason::DuplicateEvent => "duplicate_event",
        }
    }
}

// 导出所有处理器
pub mod friend_request_created_handler;
pub mod friend_request_status_handler;
pub mod pingtrail_invite_handler;

pub use friend_request_created_handler::FriendRequestCreatedHandler;
pub use friend_request_status_handler::FriendRequestStatusHandler;
pub use pingtrail_invite_handler::PingtrailInviteHandler;
