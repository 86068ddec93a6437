use serde::{Deserialize, Serialize};

use super::user::non_empty;

/// PingTrail（`pingtrails/{pingtrailId}`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingTrail {
    #[serde(default)]
    pub host_id: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl PingTrail {
    pub fn name(&self) -> Option<&str> {
        non_empty(&self.name)
    }

    /// 被邀请的成员：去掉房主、去重，保持原有顺序
    pub fn invitees(&self) -> Vec<String> {
        let host = self.host_id.as_deref();
        let mut invitees: Vec<String> = Vec::with_capacity(self.members.len());
        for member in &self.members {
            if member.is_empty() || Some(member.as_str()) == host {
                continue;
            }
            if !invitees.contains(member) {
                invitees.push(member.clone());
            }
        }
        invitees
    }
}
