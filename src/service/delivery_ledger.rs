//! 投递去重账本
//!
//! 事件源是至少一次投递，同一个事件可能被重投。账本在发送前按
//! `handler:文档路径:摘要` 预占一个键（摘要覆盖事件类型、文档版本和前后字段），
//! 发送失败时释放，以便运行时重试。

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

use crate::domain::DocumentEvent;

/// 投递去重账本
#[derive(Clone)]
pub struct DeliveryLedger {
    entries: Cache<String, DateTime<Utc>>,
}

impl DeliveryLedger {
    /// 创建账本
    ///
    /// - retention: 记录保留时间
    /// - max_entries: 最大记录数
    pub fn new(retention: Duration, max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(retention)
            .build();
        Self { entries }
    }

    /// 计算事件在某个 handler 下的幂等键
    pub fn key_for(handler: &str, event: &DocumentEvent) -> String {
        let mut hasher = Sha256::new();
        hasher.update(event.kind.as_str().as_bytes());
        hasher.update([0u8]);
        // 同一路径删除后重建、内容相同的两次变更靠版本区分
        hasher.update(event.version.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        for fields in [&event.before, &event.after] {
            match fields {
                Some(fields) => {
                    hasher.update(canonical_json(&Value::Object(fields.clone())).as_bytes())
                }
                None => hasher.update(b"null"),
            }
            hasher.update([0u8]);
        }
        format!(
            "{}:{}:{}",
            handler,
            event.document_path,
            hex::encode(hasher.finalize())
        )
    }

    /// 预占键，返回 `false` 表示已投递过（或正在投递）
    pub async fn try_reserve(&self, key: &str) -> bool {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert(Utc::now())
            .await;
        if !entry.is_fresh() {
            debug!("🔄 重复事件: key={}, first_seen={}", key, entry.value());
        }
        entry.is_fresh()
    }

    /// 释放预占（投递失败或未投递）
    pub async fn release(&self, key: &str) {
        self.entries.invalidate(key).await;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

/// 键排序后的 JSON 文本，保证相同内容得到相同摘要
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(values) => {
            let body: Vec<String> = values.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let ledger = DeliveryLedger::new(Duration::from_secs(60), 100);

        assert!(ledger.try_reserve("k1").await);
        assert!(!ledger.try_reserve("k1").await);
        assert!(ledger.contains("k1"));

        ledger.release("k1").await;
        assert!(ledger.try_reserve("k1").await);

        // 不同的键互不影响
        assert!(ledger.try_reserve("k2").await);
    }

    #[test]
    fn test_key_is_stable_for_same_content() {
        let a = DocumentEvent::created("e1", "pingtrails/T1", fields(json!({"hostId": "U1", "name": "x"})));
        let b = DocumentEvent::created("e2", "pingtrails/T1", fields(json!({"name": "x", "hostId": "U1"})));
        let c = DocumentEvent::created("e3", "pingtrails/T1", fields(json!({"hostId": "U2", "name": "x"})));

        assert_eq!(
            DeliveryLedger::key_for("pingtrail_invite", &a),
            DeliveryLedger::key_for("pingtrail_invite", &b)
        );
        assert_ne!(
            DeliveryLedger::key_for("pingtrail_invite", &a),
            DeliveryLedger::key_for("pingtrail_invite", &c)
        );
        assert!(DeliveryLedger::key_for("pingtrail_invite", &a).starts_with("pingtrail_invite:pingtrails/T1:"));
    }

    #[test]
    fn test_key_differs_by_document_version() {
        let before = fields(json!({"senderId": "A", "status": "pending"}));
        let after = fields(json!({"senderId": "A", "status": "accepted"}));
        let first = DocumentEvent::updated("e1", "friend_requests/R1", before.clone(), after.clone())
            .with_version("2024-05-01T10:00:00Z");
        let redelivered = DocumentEvent::updated("e1", "friend_requests/R1", before.clone(), after.clone())
            .with_version("2024-05-01T10:00:00Z");
        let recreated = DocumentEvent::updated("e2", "friend_requests/R1", before, after)
            .with_version("2024-05-01T11:30:00Z");

        let key = DeliveryLedger::key_for("friend_request_status_changed", &first);
        assert_eq!(key, DeliveryLedger::key_for("friend_request_status_changed", &redelivered));
        assert_ne!(key, DeliveryLedger::key_for("friend_request_status_changed", &recreated));
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        assert_eq!(
            canonical_json(&json!({"b": 1, "a": [ {"d": 2, "c": 3} ]})),
            r#"{"a":[{"c":3,"d":2}],"b":1}"#
        );
    }
}
