use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::DocumentEvent;

/// 事件上下文
///
/// 由分发器在匹配触发器后构建，携带事件本身和从文档路径中提取的参数
/// （如 `pingtrails/{pingtrailId}` 中的 `pingtrailId`）。
#[derive(Debug, Clone)]
pub struct EventContext {
    pub event: Arc<DocumentEvent>,
    /// 匹配到的触发器模式
    pub trigger: String,
    pub params: HashMap<String, String>,
}

impl EventContext {
    pub fn new(event: Arc<DocumentEvent>, trigger: impl Into<String>) -> Self {
        Self {
            event,
            trigger: trigger.into(),
            params: HashMap::new(),
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// 路径参数，缺失时退回文档 ID
    pub fn param_or_document_id(&self, name: &str) -> &str {
        self.params
            .get(name)
            .map(String::as_str)
            .unwrap_or_else(|| self.event.document_id())
    }
}
