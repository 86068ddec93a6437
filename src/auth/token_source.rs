use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, ServerError};

/// Firestore + FCM 需要的 OAuth scope
pub const GOOGLE_API_SCOPES: &str =
    "https://www.googleapis.com/auth/datastore https://www.googleapis.com/auth/firebase.messaging";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// 提前刷新的余量（秒）
const REFRESH_MARGIN_SECS: i64 = 60;
/// 自签 JWT 的有效期，Google 允许的上限为 1 小时
const ASSERTION_TTL_SECS: i64 = 3600;

/// OAuth 2.0 access token 来源
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// 固定 token（本地调试或由外部注入）
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    /// Unix 秒
    pub expires_at: i64,
}

impl CachedToken {
    fn is_fresh(&self, now: i64) -> bool {
        now + REFRESH_MARGIN_SECS < self.expires_at
    }
}

/// access token 缓存，过期前 [`REFRESH_MARGIN_SECS`] 秒刷新
#[derive(Default)]
pub struct TokenCache {
    inner: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedToken>>,
    {
        {
            let guard = self.inner.read().await;
            if let Some(cached) = guard.as_ref().filter(|t| t.is_fresh(Utc::now().timestamp())) {
                return Ok(cached.token.clone());
            }
        }

        let mut guard = self.inner.write().await;
        // 等写锁期间可能已被其他任务刷新
        if let Some(cached) = guard.as_ref().filter(|t| t.is_fresh(Utc::now().timestamp())) {
            return Ok(cached.token.clone());
        }

        let fresh = refresh().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

async fn read_token_response(response: reqwest::Response, source: &str) -> Result<CachedToken> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(ServerError::Authentication(format!(
            "{} token request failed: status={}, error={}",
            source, status, error_text
        )));
    }

    let body: TokenResponse = response.json().await?;
    Ok(CachedToken {
        token: body.access_token,
        expires_at: Utc::now().timestamp() + body.expires_in,
    })
}

/// Google 服务账号密钥文件
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ServerError::Configuration(format!(
                "Failed to read service account key {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// 服务账号 Token 来源
///
/// 用私钥签 RS256 JWT，再到 `token_uri` 换取 access token。
pub struct ServiceAccountTokenSource {
    client: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cache: TokenCache,
}

impl ServiceAccountTokenSource {
    pub fn new(client: Client, key: ServiceAccountKey) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            ServerError::Configuration(format!("Failed to parse service account private key: {}", e))
        })?;
        Ok(Self {
            client,
            key,
            encoding_key,
            cache: TokenCache::new(),
        })
    }

    pub fn project_id(&self) -> Option<&str> {
        self.key.project_id.as_deref()
    }

    fn build_assertion(&self, now: i64) -> Result<String> {
        let claims = json!({
            "iss": self.key.client_email,
            "scope": GOOGLE_API_SCOPES,
            "aud": self.key.token_uri,
            "iat": now,
            "exp": now + ASSERTION_TTL_SECS,
        });
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)?)
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let assertion = self.build_assertion(Utc::now().timestamp())?;
        debug!("[AUTH] Exchanging service account assertion for {}", self.key.client_email);

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let token = read_token_response(response, "service account").await?;
        info!("[AUTH] Access token refreshed for {}", self.key.client_email);
        Ok(token)
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<String> {
        self.cache.get_or_refresh(|| self.fetch()).await
    }
}

/// GCE / Cloud Run 元数据服务器 Token 来源
pub struct MetadataTokenSource {
    client: Client,
    url: String,
    cache: TokenCache,
}

impl MetadataTokenSource {
    pub fn new(client: Client) -> Self {
        Self::with_url(client, METADATA_TOKEN_URL)
    }

    pub fn with_url(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            cache: TokenCache::new(),
        }
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("scopes", GOOGLE_API_SCOPES.replace(' ', ","))])
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let token = read_token_response(response, "metadata server").await?;
        info!("[AUTH] Access token refreshed from metadata server");
        Ok(token)
    }
}

#[async_trait]
impl AccessTokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String> {
        self.cache.get_or_refresh(|| self.fetch()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_static_token() {
        let source = StaticTokenSource::new("ya29.static");
        assert_eq!(source.access_token().await.unwrap(), "ya29.static");
    }

    #[tokio::test]
    async fn test_cache_refreshes_once_while_fresh() {
        let cache = TokenCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let token = cache
                .get_or_refresh(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedToken {
                        token: "t1".to_string(),
                        expires_at: Utc::now().timestamp() + 3600,
                    })
                })
                .await
                .unwrap();
            assert_eq!(token, "t1");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_refreshes_near_expiry() {
        let cache = TokenCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            cache
                .get_or_refresh(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(CachedToken {
                        token: "short".to_string(),
                        expires_at: Utc::now().timestamp() + 10,
                    })
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_service_account_key_defaults() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email":"svc@p.iam.gserviceaccount.com","private_key":"---","project_id":"pingpal"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert_eq!(key.project_id.as_deref(), Some("pingpal"));
    }
}
