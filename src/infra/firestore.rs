//! Firestore REST v1 客户端（只读）

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::auth::AccessTokenSource;
use crate::error::{Result, ServerError};
use crate::infra::firestore_value::FirestoreDocument;

pub const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com";
pub const DEFAULT_DATABASE_ID: &str = "(default)";

/// 单次 batchGet 的文档数上限
const BATCH_GET_CHUNK: usize = 100;

#[derive(Debug, Deserialize)]
struct BatchGetResponse {
    #[serde(default)]
    found: Option<FirestoreDocument>,
    #[serde(default)]
    missing: Option<String>,
}

/// Firestore REST 客户端
pub struct FirestoreClient {
    client: Client,
    base_url: String,
    project_id: String,
    database_id: String,
    token_source: Arc<dyn AccessTokenSource>,
}

impl FirestoreClient {
    pub fn new(
        client: Client,
        project_id: String,
        database_id: String,
        token_source: Arc<dyn AccessTokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: FIRESTORE_BASE_URL.to_string(),
            project_id,
            database_id,
            token_source,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `projects/{p}/databases/{db}/documents`
    pub fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }

    fn document_url(&self, collection: &str, document_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ServerError::Configuration(format!("invalid Firestore URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| ServerError::Configuration("Firestore URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend([
                "v1",
                "projects",
                self.project_id.as_str(),
                "databases",
                self.database_id.as_str(),
                "documents",
                collection,
                document_id,
            ]);
        Ok(url)
    }

    /// 读取单个文档，不存在时返回 `None`
    pub async fn get_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Option<Map<String, Value>>> {
        let url = self.document_url(collection, document_id)?;
        let access_token = self.token_source.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("[FIRESTORE] {}/{} not found", collection, document_id);
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ServerError::Store(format!(
                "get {}/{} failed: status={}, error={}",
                collection, document_id, status, error_text
            )));
        }

        let document: FirestoreDocument = response.json().await?;
        Ok(Some(document.decoded_fields()?))
    }

    /// 批量读取同一集合下的文档，结果只包含存在的文档（按文档 ID 索引）
    pub async fn batch_get(
        &self,
        collection: &str,
        document_ids: &[String],
    ) -> Result<HashMap<String, Map<String, Value>>> {
        let mut documents = HashMap::with_capacity(document_ids.len());
        if document_ids.is_empty() {
            return Ok(documents);
        }

        let root = self.documents_root();
        let url = format!("{}/v1/{}:batchGet", self.base_url, root);
        let access_token = self.token_source.access_token().await?;

        for chunk in document_ids.chunks(BATCH_GET_CHUNK) {
            let names: Vec<String> = chunk
                .iter()
                .map(|id| format!("{}/{}/{}", root, collection, id))
                .collect();

            let response = self
                .client
                .post(&url)
                .bearer_auth(&access_token)
                .json(&json!({ "documents": names }))
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(ServerError::Store(format!(
                    "batchGet {} failed: status={}, error={}",
                    collection, status, error_text
                )));
            }

            let results: Vec<BatchGetResponse> = response.json().await?;
            for result in results {
                if let Some(document) = result.found {
                    documents.insert(document.id().to_string(), document.decoded_fields()?);
                } else if let Some(missing) = result.missing {
                    debug!("[FIRESTORE] batchGet missing: {}", missing);
                }
            }
        }

        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenSource;
    use axum::http::{Method, Uri};
    use axum::response::{IntoResponse, Response};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ROOT: &str = "/v1/projects/pingpal/databases/(default)/documents";

    /// 在随机端口上启动本地服务，返回其基础 URL
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// 模拟 Firestore：`users/U1` 存在，`users/broken` 返回 500，其余 404；
    /// batchGet 对 `U` 开头的 ID 返回 found，其余返回 missing
    fn firestore_stub(method: Method, uri: Uri, body: String, batch_calls: &AtomicUsize) -> Response {
        let path = uri.path();
        if method == Method::POST && path == format!("{}:batchGet", ROOT) {
            batch_calls.fetch_add(1, Ordering::SeqCst);
            let request: Value = serde_json::from_str(&body).unwrap();
            let results: Vec<Value> = request["documents"]
                .as_array()
                .unwrap()
                .iter()
                .map(|name| {
                    let name = name.as_str().unwrap();
                    let id = name.rsplit('/').next().unwrap();
                    if id.starts_with('U') {
                        json!({ "found": {
                            "name": name,
                            "fields": { "fcmToken": { "stringValue": format!("tok-{}", id) } }
                        }})
                    } else {
                        json!({ "missing": name })
                    }
                })
                .collect();
            return Json(results).into_response();
        }

        match path.strip_prefix(&format!("{}/users/", ROOT)) {
            Some("U1") => Json(json!({
                "name": "projects/pingpal/databases/(default)/documents/users/U1",
                "fields": {
                    "name": { "stringValue": "Alice" },
                    "fcmToken": { "stringValue": "tok1" }
                }
            }))
            .into_response(),
            Some("broken") => (StatusCode::INTERNAL_SERVER_ERROR, "backend unavailable").into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn stub_client() -> (FirestoreClient, Arc<AtomicUsize>) {
        let batch_calls = Arc::new(AtomicUsize::new(0));
        let calls = batch_calls.clone();
        let app = Router::new().fallback(move |method: Method, uri: Uri, body: String| {
            let calls = calls.clone();
            async move { firestore_stub(method, uri, body, &calls) }
        });
        let base_url = serve(app).await;
        (client(&base_url), batch_calls)
    }

    fn client(base_url: &str) -> FirestoreClient {
        FirestoreClient::new(
            Client::new(),
            "pingpal".to_string(),
            DEFAULT_DATABASE_ID.to_string(),
            Arc::new(StaticTokenSource::new("t")),
        )
        .with_base_url(base_url)
    }

    #[test]
    fn test_document_url_escapes_segments() {
        let url = client("https://firestore.googleapis.com/")
            .document_url("users", "a b/c")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/pingpal/databases/(default)/documents/users/a%20b%2Fc"
        );
    }

    #[test]
    fn test_documents_root() {
        assert_eq!(
            client("http://localhost:8080").documents_root(),
            "projects/pingpal/databases/(default)/documents"
        );
    }

    #[tokio::test]
    async fn test_get_document_decodes_fields() {
        let (firestore, _) = stub_client().await;

        let fields = firestore.get_document("users", "U1").await.unwrap().unwrap();
        assert_eq!(fields["name"], "Alice");
        assert_eq!(fields["fcmToken"], "tok1");
    }

    #[tokio::test]
    async fn test_get_document_not_found_is_none() {
        let (firestore, _) = stub_client().await;

        assert!(firestore.get_document("users", "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_document_server_error_is_store_error() {
        let (firestore, _) = stub_client().await;

        let err = firestore.get_document("users", "broken").await.unwrap_err();
        match err {
            ServerError::Store(message) => assert!(message.contains("500")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_get_keeps_found_documents_by_id() {
        let (firestore, batch_calls) = stub_client().await;

        let ids = vec!["U2".to_string(), "X3".to_string(), "U4".to_string()];
        let documents = firestore.batch_get("users", &ids).await.unwrap();

        assert_eq!(documents.len(), 2);
        assert_eq!(documents["U2"]["fcmToken"], "tok-U2");
        assert_eq!(documents["U4"]["fcmToken"], "tok-U4");
        assert!(!documents.contains_key("X3"));
        assert_eq!(batch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_get_splits_into_chunks() {
        let (firestore, batch_calls) = stub_client().await;

        let mut ids: Vec<String> = (0..140).map(|i| format!("U{}", i)).collect();
        ids.extend((0..10).map(|i| format!("X{}", i)));
        let documents = firestore.batch_get("users", &ids).await.unwrap();

        assert_eq!(documents.len(), 140);
        assert_eq!(documents["U139"]["fcmToken"], "tok-U139");
        assert_eq!(batch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_batch_get_empty_ids_sends_nothing() {
        let (firestore, batch_calls) = stub_client().await;

        assert!(firestore.batch_get("users", &[]).await.unwrap().is_empty());
        assert_eq!(batch_calls.load(Ordering::SeqCst), 0);
    }
}
