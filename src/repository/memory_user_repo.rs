use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{Result, ServerError};
use crate::model::UserProfile;
use crate::repository::UserRepository;

/// 内存用户资料仓库（测试和本地 dry-run 使用）
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<String, UserProfile>>,
    reads: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: impl Into<String>, profile: UserProfile) {
        self.users.write().insert(user_id.into(), profile);
    }

    /// 之后的读取全部返回错误
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// 读取调用次数（单读和批量读各算一次）
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn begin_read(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServerError::Store("memory store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.begin_read()?;
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn find_by_ids(&self, user_ids: &[String]) -> Result<HashMap<String, UserProfile>> {
        self.begin_read()?;
        let users = self.users.read();
        Ok(user_ids
            .iter()
            .filter_map(|id| users.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}
