use serde::{Deserialize, Serialize};
use tracing::debug;

/// 找不到任何名字时的占位名
pub const UNKNOWN_USER_NAME: &str = "Someone";

/// 用户资料（`users/{userId}`）
///
/// 名字字段在 App 历史版本里写法不统一，`name` 为规范字段，
/// 其余字段只作为兼容读取。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// FCM 设备令牌
    #[serde(default)]
    pub fcm_token: Option<String>,
}

impl UserProfile {
    /// 推送令牌（空字符串视为没有）
    pub fn push_token(&self) -> Option<&str> {
        non_empty(&self.fcm_token)
    }

    /// 解析展示名：`name` → `displayName` → `fullName` → `username`
    pub fn display_name(&self) -> Option<&str> {
        if let Some(name) = non_empty(&self.name) {
            return Some(name);
        }

        let legacy = [
            ("displayName", &self.display_name),
            ("fullName", &self.full_name),
            ("username", &self.username),
        ];
        for (field, value) in legacy {
            if let Some(name) = non_empty(value) {
                debug!("[USER] display name resolved from legacy field '{}'", field);
                return Some(name);
            }
        }
        None
    }

    /// 展示名，缺失时使用给定占位名
    pub fn display_name_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.display_name().unwrap_or(placeholder)
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_name_prefers_canonical_field() {
        let profile: UserProfile = serde_json::from_value(json!({
            "name": "Bob",
            "fullName": "Robert",
        }))
        .unwrap();
        assert_eq!(profile.display_name(), Some("Bob"));
    }

    #[test]
    fn test_display_name_falls_back_through_legacy_fields() {
        let profile: UserProfile = serde_json::from_value(json!({
            "name": "",
            "fullName": "Robert",
            "username": "bobby",
        }))
        .unwrap();
        assert_eq!(profile.display_name(), Some("Robert"));

        let profile: UserProfile = serde_json::from_value(json!({ "username": "bobby" })).unwrap();
        assert_eq!(profile.display_name(), Some("bobby"));
    }

    #[test]
    fn test_missing_name_and_token() {
        let profile: UserProfile =
            serde_json::from_value(json!({ "fcmToken": "", "email": "x@y.z" })).unwrap();
        assert_eq!(profile.display_name_or(UNKNOWN_USER_NAME), "Someone");
        assert!(profile.push_token().is_none());
    }
}
