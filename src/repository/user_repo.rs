use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::infra::FirestoreClient;
use crate::model::{UserProfile, USERS_COLLECTION};
use crate::repository::UserRepository;

/// 基于 Firestore 的用户资料仓库
pub struct FirestoreUserRepository {
    firestore: Arc<FirestoreClient>,
}

impl FirestoreUserRepository {
    pub fn new(firestore: Arc<FirestoreClient>) -> Self {
        Self { firestore }
    }
}

fn to_profile(fields: Map<String, Value>) -> Result<UserProfile> {
    Ok(serde_json::from_value(Value::Object(fields))?)
}

#[async_trait]
impl UserRepository for FirestoreUserRepository {
    async fn find_by_id(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.firestore
            .get_document(USERS_COLLECTION, user_id)
            .await?
            .map(to_profile)
            .transpose()
    }

    async fn find_by_ids(&self, user_ids: &[String]) -> Result<HashMap<String, UserProfile>> {
        self.firestore
            .batch_get(USERS_COLLECTION, user_ids)
            .await?
            .into_iter()
            .map(|(id, fields)| Ok((id, to_profile(fields)?)))
            .collect()
    }
}
