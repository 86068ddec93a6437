use serde::{Deserialize, Serialize};

use super::user::non_empty;

/// 好友申请状态
///
/// `pending` 为初始状态，`accepted` / `rejected` 为终态。
/// 未知的字符串原样保留在 `Other` 中，不视为解码错误。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
    Other(String),
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            FriendRequestStatus::Pending => "pending",
            FriendRequestStatus::Accepted => "accepted",
            FriendRequestStatus::Rejected => "rejected",
            FriendRequestStatus::Other(s) => s,
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FriendRequestStatus::Accepted | FriendRequestStatus::Rejected
        )
    }
}

impl From<String> for FriendRequestStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => FriendRequestStatus::Pending,
            "accepted" => FriendRequestStatus::Accepted,
            "rejected" => FriendRequestStatus::Rejected,
            _ => FriendRequestStatus::Other(s),
        }
    }
}

impl From<FriendRequestStatus> for String {
    fn from(status: FriendRequestStatus) -> Self {
        status.as_str().to_string()
    }
}

/// 好友申请（`friend_requests/{requestId}`）
///
/// 双方名字在创建时冗余写入，之后只有 `status` 会被 App 修改一次。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    #[serde(default)]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub receiver_name: Option<String>,
    #[serde(default)]
    pub status: Option<FriendRequestStatus>,
}

impl FriendRequest {
    pub fn sender_id(&self) -> Option<&str> {
        non_empty(&self.sender_id)
    }

    pub fn receiver_id(&self) -> Option<&str> {
        non_empty(&self.receiver_id)
    }

    pub fn sender_name(&self) -> Option<&str> {
        non_empty(&self.sender_name)
    }

    pub fn receiver_name(&self) -> Option<&str> {
        non_empty(&self.receiver_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_decoding() {
        let request: FriendRequest = serde_json::from_value(json!({
            "senderId": "A",
            "receiverId": "B",
            "senderName": "Alice",
            "status": "accepted",
        }))
        .unwrap();
        assert_eq!(request.status, Some(FriendRequestStatus::Accepted));
        assert!(request.status.as_ref().unwrap().is_terminal());

        let request: FriendRequest =
            serde_json::from_value(json!({ "status": "blocked" })).unwrap();
        assert_eq!(
            request.status,
            Some(FriendRequestStatus::Other("blocked".to_string()))
        );
        assert!(request.receiver_id().is_none());
    }
}
