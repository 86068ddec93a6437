use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::context::EventContext;
use crate::domain::{DocumentEvent, DocumentEventKind};
use crate::handler::{
    EventHandler, FriendRequestCreatedHandler, FriendRequestStatusHandler, HandlerOutcome,
    PingtrailInviteHandler, SkipReason,
};
use crate::infra::metrics;
use crate::model::{FRIEND_REQUESTS_COLLECTION, PINGTRAILS_COLLECTION};
use crate::push::PushProvider;
use crate::repository::UserRepository;
use crate::service::DeliveryLedger;
use crate::Result;

pub mod trigger;
pub use trigger::TriggerPattern;

struct Registration {
    pattern: TriggerPattern,
    kind: DocumentEventKind,
    handler: Arc<dyn EventHandler>,
}

/// 一次分发中单个 handler 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReport {
    pub handler: &'static str,
    pub outcome: HandlerOutcome,
}

/// 分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub event_id: String,
    pub document_path: String,
    pub handlers: Vec<HandlerReport>,
}

impl DispatchReport {
    /// 没有任何触发器匹配
    pub fn is_unmatched(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn delivered_count(&self) -> usize {
        self.handlers
            .iter()
            .filter(|r| r.outcome.is_delivered())
            .count()
    }
}

/// 事件分发器
///
/// 按 (文档路径模式, 事件类型) 注册 handler。handler 的错误不在这里吞掉，
/// 原样返回给调用方，由事件源决定是否重投。
pub struct EventDispatcher {
    registrations: Vec<Registration>,
    ledger: Option<Arc<DeliveryLedger>>,
}

impl EventDispatcher {
    /// 注册 PingPal 的三个通知 handler
    pub fn for_pingpal(
        users: Arc<dyn UserRepository>,
        push: Arc<dyn PushProvider>,
        ledger: Option<Arc<DeliveryLedger>>,
    ) -> Result<Self> {
        let mut builder = EventDispatcherBuilder::new()
            .with_handler(
                &format!("{}/{{pingtrailId}}", PINGTRAILS_COLLECTION),
                DocumentEventKind::Created,
                Arc::new(PingtrailInviteHandler::new(users.clone(), push.clone())),
            )
            .with_handler(
                &format!("{}/{{requestId}}", FRIEND_REQUESTS_COLLECTION),
                DocumentEventKind::Created,
                Arc::new(FriendRequestCreatedHandler::new(users.clone(), push.clone())),
            )
            .with_handler(
                &format!("{}/{{requestId}}", FRIEND_REQUESTS_COLLECTION),
                DocumentEventKind::Updated,
                Arc::new(FriendRequestStatusHandler::new(users, push)),
            );
        if let Some(ledger) = ledger {
            builder = builder.with_ledger(ledger);
        }
        builder.build()
    }

    /// 已注册的触发器（模式, 事件类型, handler 名）
    pub fn triggers(&self) -> Vec<(String, DocumentEventKind, &'static str)> {
        self.registrations
            .iter()
            .map(|r| (r.pattern.to_string(), r.kind, r.handler.name()))
            .collect()
    }

    pub async fn dispatch(&self, event: DocumentEvent) -> Result<DispatchReport> {
        let started = Instant::now();
        metrics::record_event_received(event.kind.as_str());

        let event = Arc::new(event);
        let mut report = DispatchReport {
            event_id: event.id.clone(),
            document_path: event.document_path.clone(),
            handlers: Vec::new(),
        };

        for registration in self
            .registrations
            .iter()
            .filter(|r| r.kind == event.kind)
        {
            let Some(params) = registration.pattern.matches(&event.document_path) else {
                continue;
            };
            let context = EventContext::new(event.clone(), registration.pattern.as_str())
                .with_params(params);
            let outcome = self.run_handler(registration.handler.as_ref(), &context).await?;
            report.handlers.push(HandlerReport {
                handler: registration.handler.name(),
                outcome,
            });
        }

        if report.is_unmatched() {
            debug!(
                "未找到事件 {} {} 的处理器",
                event.kind.as_str(),
                event.document_path
            );
        }

        metrics::record_dispatch(started.elapsed().as_secs_f64());
        Ok(report)
    }

    async fn run_handler(
        &self,
        handler: &dyn EventHandler,
        context: &EventContext,
    ) -> Result<HandlerOutcome> {
        let name = handler.name();
        let key = self
            .ledger
            .as_ref()
            .map(|_| DeliveryLedger::key_for(name, &context.event));

        if let (Some(ledger), Some(key)) = (&self.ledger, &key) {
            if !ledger.try_reserve(key).await {
                info!(
                    "[DISPATCH] {} skipped duplicate event {} for {}",
                    name, context.event.id, context.event.document_path
                );
                metrics::record_duplicate_event(name);
                return Ok(HandlerOutcome::Skipped(SkipReason::DuplicateEvent));
            }
        }

        let result = handler.handle(context).await;

        match &result {
            Ok(HandlerOutcome::Delivered { kind, recipients }) => {
                metrics::record_notifications_sent(kind.as_str(), *recipients);
            }
            Ok(HandlerOutcome::Skipped(reason)) => {
                debug!(
                    "[DISPATCH] {} ({}) no-op for {}: {}",
                    name,
                    context.trigger,
                    context.event.document_path,
                    reason.as_str()
                );
                metrics::record_handler_skipped(name, reason.as_str());
                self.release(key.as_deref()).await;
            }
            Err(e) => {
                error!(
                    "[DISPATCH] {} ({}) failed for {} (event {}): {}",
                    name, context.trigger, context.event.document_path, context.event.id, e
                );
                metrics::record_handler_failed(name);
                self.release(key.as_deref()).await;
            }
        }

        result
    }

    async fn release(&self, key: Option<&str>) {
        if let (Some(ledger), Some(key)) = (&self.ledger, key) {
            ledger.release(key).await;
        }
    }
}

/// 事件分发器构建器
pub struct EventDispatcherBuilder {
    registrations: Vec<(String, DocumentEventKind, Arc<dyn EventHandler>)>,
    ledger: Option<Arc<DeliveryLedger>>,
}

impl EventDispatcherBuilder {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
            ledger: None,
        }
    }

    pub fn with_handler(
        mut self,
        pattern: &str,
        kind: DocumentEventKind,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.registrations.push((pattern.to_string(), kind, handler));
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<DeliveryLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn build(self) -> Result<EventDispatcher> {
        let mut registrations = Vec::with_capacity(self.registrations.len());
        for (pattern, kind, handler) in self.registrations {
            let pattern = TriggerPattern::parse(&pattern)?;
            if registrations
                .iter()
                .any(|r: &Registration| r.pattern == pattern && r.kind == kind && r.handler.name() == handler.name())
            {
                warn!("handler {} 重复注册到 {}，忽略", handler.name(), pattern);
                continue;
            }
            registrations.push(Registration {
                pattern,
                kind,
                handler,
            });
        }
        Ok(EventDispatcher {
            registrations,
            ledger: self.ledger,
        })
    }
}

impl Default for EventDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
