use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::UserProfile;

pub mod memory_user_repo;
pub mod user_repo;

pub use memory_user_repo::MemoryUserRepository;
pub use user_repo::FirestoreUserRepository;

/// 用户资料读取接口（`users` 集合）
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 按 ID 读取，不存在时返回 `None`
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// 批量读取，结果只包含存在的用户
    async fn find_by_ids(&self, user_ids: &[String]) -> Result<HashMap<String, UserProfile>>;
}
