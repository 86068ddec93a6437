//! Firestore REST 类型化值的解码
//!
//! REST API 和 Eventarc 事件里的字段都是 `{"stringValue": "..."}` 这种带类型标签的形式，
//! 这里统一解成普通 JSON，模型直接用 serde 反序列化。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::error::{Result, ServerError};

/// Firestore 文档（REST `Document`）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirestoreDocument {
    /// 完整资源名：`projects/{p}/databases/{db}/documents/{collection}/{id}`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
}

impl FirestoreDocument {
    /// 文档 ID（资源名最后一段）
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    /// `documents/` 之后的相对路径，如 `pingtrails/T1`
    pub fn relative_path(&self) -> Option<&str> {
        self.name
            .split_once("/documents/")
            .map(|(_, path)| path)
            .filter(|path| !path.is_empty())
    }

    /// 解码后的字段
    pub fn decoded_fields(&self) -> Result<Map<String, Value>> {
        decode_fields(&self.fields)
    }
}

/// 解码 `fields` map
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

/// 解码单个类型化值
pub fn decode_value(value: &Value) -> Result<Value> {
    let Some(object) = value.as_object() else {
        return Err(unsupported(value));
    };
    let Some((tag, inner)) = object.iter().next() else {
        return Err(unsupported(value));
    };

    match tag.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(Value::Bool(inner.as_bool().unwrap_or_default())),
        // int64 在 JSON 中以字符串传输
        "integerValue" => match inner {
            Value::String(s) => s
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .map_err(|e| ServerError::Serialization(format!("invalid integerValue {}: {}", s, e))),
            Value::Number(_) => Ok(inner.clone()),
            _ => Err(unsupported(value)),
        },
        "doubleValue" => match inner {
            Value::Number(_) => Ok(inner.clone()),
            // NaN / Infinity 以字符串传输，JSON 数字无法表示
            Value::String(s) => Ok(s
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(s.clone()))),
            _ => Err(unsupported(value)),
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => Ok(inner.clone()),
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>>>())
                .transpose()?
                .unwrap_or_default();
            Ok(Value::Array(values))
        }
        "mapValue" => {
            let fields = match inner.get("fields").and_then(Value::as_object) {
                Some(fields) => decode_fields(fields)?,
                None => Map::new(),
            };
            Ok(Value::Object(fields))
        }
        _ => Err(unsupported(value)),
    }
}

fn unsupported(value: &Value) -> ServerError {
    ServerError::Serialization(format!("unsupported Firestore value: {}", value))
}
