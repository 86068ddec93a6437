use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::infra::FirestoreDocument;

/// Firestore CloudEvent 类型前缀
pub const FIRESTORE_EVENT_PREFIX: &str = "google.cloud.firestore.document.v1.";

/// 解码后的文档字段
pub type DocumentFields = Map<String, Value>;

/// 文档生命周期事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentEventKind {
    Created,
    Updated,
    Deleted,
    Written,
}

impl DocumentEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentEventKind::Created => "created",
            DocumentEventKind::Updated => "updated",
            DocumentEventKind::Deleted => "deleted",
            DocumentEventKind::Written => "written",
        }
    }

    /// 解析 CloudEvent `type`，如 `google.cloud.firestore.document.v1.created`
    ///
    /// 带 `.withAuthContext` 后缀的变体按同一类型处理。
    pub fn from_cloud_event_type(event_type: &str) -> Option<Self> {
        let action = event_type.strip_prefix(FIRESTORE_EVENT_PREFIX)?;
        let action = action.strip_suffix(".withAuthContext").unwrap_or(action);
        match action {
            "created" => Some(DocumentEventKind::Created),
            "updated" => Some(DocumentEventKind::Updated),
            "deleted" => Some(DocumentEventKind::Deleted),
            "written" => Some(DocumentEventKind::Written),
            _ => None,
        }
    }
}

/// Eventarc 投递的 `DocumentEventData`（JSON 格式）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEventData {
    #[serde(default)]
    pub value: Option<FirestoreDocument>,
    #[serde(default)]
    pub old_value: Option<FirestoreDocument>,
    #[serde(default)]
    pub update_mask: Option<DocumentMask>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    #[serde(default)]
    pub field_paths: Vec<String>,
}

/// 结构化模式的 CloudEvent（CLI 回放用的文件格式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudEventEnvelope {
    /// 缺省时回放会分配随机 ID
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub data: Option<DocumentEventData>,
}

/// 文档生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvent {
    /// 事件 ID（CloudEvent `id`，重投时不变）
    pub id: String,
    pub kind: DocumentEventKind,
    /// 相对路径，如 `pingtrails/T1`
    pub document_path: String,
    /// 变更前的字段（仅 updated / deleted / written）
    pub before: Option<DocumentFields>,
    /// 变更后的字段（仅 created / updated / written）
    pub after: Option<DocumentFields>,
    /// 文档版本（`updateTime`），删除事件取变更前的版本
    pub version: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl DocumentEvent {
    pub fn created(id: impl Into<String>, document_path: impl Into<String>, data: DocumentFields) -> Self {
        Self {
            id: id.into(),
            kind: DocumentEventKind::Created,
            document_path: document_path.into(),
            before: None,
            after: Some(data),
            version: None,
            received_at: Utc::now(),
        }
    }

    pub fn updated(
        id: impl Into<String>,
        document_path: impl Into<String>,
        before: DocumentFields,
        after: DocumentFields,
    ) -> Self {
        Self {
            id: id.into(),
            kind: DocumentEventKind::Updated,
            document_path: document_path.into(),
            before: Some(before),
            after: Some(after),
            version: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// 从 CloudEvent 构建事件
    ///
    /// `data` 为空时返回 `Ok(None)`，调用方按 no-op 处理。
    pub fn from_cloud_event(
        id: &str,
        event_type: &str,
        subject: Option<&str>,
        data: Option<DocumentEventData>,
    ) -> Result<Option<Self>> {
        let kind = DocumentEventKind::from_cloud_event_type(event_type).ok_or_else(|| {
            ServerError::InvalidEvent(format!("unsupported event type: {}", event_type))
        })?;

        let Some(data) = data else {
            return Ok(None);
        };
        if data.value.is_none() && data.old_value.is_none() {
            return Ok(None);
        }

        let document_path = subject
            .and_then(|s| s.strip_prefix("documents/"))
            .filter(|path| !path.is_empty())
            .or_else(|| data.value.as_ref().and_then(|d| d.relative_path()))
            .or_else(|| data.old_value.as_ref().and_then(|d| d.relative_path()))
            .ok_or_else(|| ServerError::InvalidEvent("missing document path".to_string()))?
            .to_string();

        let before = data
            .old_value
            .as_ref()
            .map(FirestoreDocument::decoded_fields)
            .transpose()?;
        let after = data
            .value
            .as_ref()
            .map(FirestoreDocument::decoded_fields)
            .transpose()?;
        let version = data
            .value
            .as_ref()
            .or(data.old_value.as_ref())
            .and_then(|d| d.update_time.clone());

        Ok(Some(Self {
            id: id.to_string(),
            kind,
            document_path,
            before,
            after,
            version,
            received_at: Utc::now(),
        }))
    }

    /// 从结构化 CloudEvent 构建事件
    pub fn from_envelope(envelope: CloudEventEnvelope) -> Result<Option<Self>> {
        let id = if envelope.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            envelope.id
        };
        Self::from_cloud_event(
            &id,
            &envelope.event_type,
            envelope.subject.as_deref(),
            envelope.data,
        )
    }

    /// 文档 ID（路径最后一段）
    pub fn document_id(&self) -> &str {
        self.document_path.rsplit('/').next().unwrap_or_default()
    }

    /// 将变更后字段解码为模型
    pub fn decode_after<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        decode(self.after.as_ref())
    }

    /// 将变更前字段解码为模型
    pub fn decode_before<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        decode(self.before.as_ref())
    }
}

fn decode<T: DeserializeOwned>(fields: Option<&DocumentFields>) -> Result<Option<T>> {
    fields
        .map(|f| serde_json::from_value(Value::Object(f.clone())))
        .transpose()
        .map_err(ServerError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PingTrail;
    use serde_json::json;

    #[test]
    fn test_event_kind_parsing() {
        assert_eq!(
            DocumentEventKind::from_cloud_event_type("google.cloud.firestore.document.v1.created"),
            Some(DocumentEventKind::Created)
        );
        assert_eq!(
            DocumentEventKind::from_cloud_event_type(
                "google.cloud.firestore.document.v1.updated.withAuthContext"
            ),
            Some(DocumentEventKind::Updated)
        );
        assert_eq!(DocumentEventKind::from_cloud_event_type("com.example.other"), None);
    }

    #[test]
    fn test_from_cloud_event_decodes_fields() {
        let data: DocumentEventData = serde_json::from_value(json!({
            "value": {
                "name": "projects/pingpal/databases/(default)/documents/pingtrails/T1",
                "updateTime": "2024-05-01T10:00:00.123456Z",
                "fields": {
                    "hostId": {"stringValue": "U1"},
                    "members": {"arrayValue": {"values": [{"stringValue": "U1"}, {"stringValue": "U2"}]}},
                    "name": {"stringValue": "Morning Walk"}
                }
            }
        }))
        .unwrap();

        let event = DocumentEvent::from_cloud_event(
            "evt-1",
            "google.cloud.firestore.document.v1.created",
            None,
            Some(data),
        )
        .unwrap()
        .unwrap();

        assert_eq!(event.kind, DocumentEventKind::Created);
        assert_eq!(event.document_path, "pingtrails/T1");
        assert_eq!(event.document_id(), "T1");
        assert_eq!(event.version.as_deref(), Some("2024-05-01T10:00:00.123456Z"));
        let trail: PingTrail = event.decode_after().unwrap().unwrap();
        assert_eq!(trail.host_id.as_deref(), Some("U1"));
        assert_eq!(trail.members, vec!["U1", "U2"]);
    }

    #[test]
    fn test_subject_takes_precedence_and_missing_data_is_noop() {
        let event = DocumentEvent::from_cloud_event(
            "evt-2",
            "google.cloud.firestore.document.v1.updated",
            Some("documents/friend_requests/R1"),
            Some(DocumentEventData {
                value: Some(FirestoreDocument::default()),
                old_value: Some(FirestoreDocument::default()),
                update_mask: None,
            }),
        )
        .unwrap()
        .unwrap();
        assert_eq!(event.document_path, "friend_requests/R1");

        let none = DocumentEvent::from_cloud_event(
            "evt-3",
            "google.cloud.firestore.document.v1.created",
            Some("documents/pingtrails/T1"),
            None,
        )
        .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_unsupported_type_is_invalid() {
        let err = DocumentEvent::from_cloud_event("e", "com.example.thing", None, None).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_envelope_without_id_gets_one() {
        let envelope: CloudEventEnvelope = serde_json::from_value(json!({
            "type": "google.cloud.firestore.document.v1.created",
            "subject": "documents/friend_requests/R1",
            "data": {"value": {"fields": {"receiverId": {"stringValue": "B"}}}}
        }))
        .unwrap();

        let event = DocumentEvent::from_envelope(envelope).unwrap().unwrap();
        assert!(Uuid::parse_str(&event.id).is_ok());
        assert_eq!(event.document_path, "friend_requests/R1");
    }
}
