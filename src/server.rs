use reqwest::Client;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{
    AccessTokenSource, MetadataTokenSource, ServiceAccountKey, ServiceAccountTokenSource,
    StaticTokenSource,
};
use crate::config::ServerConfig;
use crate::dispatcher::{DispatchReport, EventDispatcher};
use crate::domain::DocumentEvent;
use crate::error::{Result, ServerError};
use crate::http::EventHttpServer;
use crate::infra::{metrics, FirestoreClient};
use crate::push::{FcmProvider, MockProvider, PushProvider};
use crate::repository::{FirestoreUserRepository, UserRepository};
use crate::service::DeliveryLedger;

/// 通知服务
///
/// 根据配置装配 token 来源、Firestore 客户端、推送提供者和分发器。
pub struct NotifyServer {
    config: ServerConfig,
    dispatcher: Arc<EventDispatcher>,
}

impl NotifyServer {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        info!("🔧 初始化通知服务...");

        let client = Client::builder()
            .timeout(config.push.request_timeout())
            .build()?;

        let (token_source, key_project_id) = build_token_source(&config, client.clone())?;

        let project_id = config
            .firebase
            .project_id
            .clone()
            .or(key_project_id)
            .ok_or_else(|| {
                ServerError::Configuration(
                    "project id is not configured (firebase.project_id / GOOGLE_CLOUD_PROJECT)"
                        .to_string(),
                )
            })?;
        info!("✅ Firebase 项目: {}", project_id);

        let firestore = Arc::new(
            FirestoreClient::new(
                client.clone(),
                project_id.clone(),
                config.firebase.database_id.clone(),
                token_source.clone(),
            )
            .with_base_url(&config.firebase.firestore_base_url),
        );
        let users: Arc<dyn UserRepository> = Arc::new(FirestoreUserRepository::new(firestore));

        let push: Arc<dyn PushProvider> = if config.push.dry_run {
            warn!("⚠️ 演练模式：通知只记录，不会发送");
            Arc::new(MockProvider::new())
        } else {
            Arc::new(
                FcmProvider::new(client, project_id, token_source)
                    .with_base_url(&config.firebase.fcm_base_url)
                    .with_multicast_concurrency(config.push.multicast_concurrency)
                    .with_channel_id(&config.push.channel_id),
            )
        };
        info!("✅ 推送提供者: {}", push.name());

        let ledger = config.dedup.enabled.then(|| {
            info!(
                "✅ 去重账本已启用: retention={}s, max_entries={}",
                config.dedup.retention_secs, config.dedup.max_entries
            );
            Arc::new(DeliveryLedger::new(
                config.dedup.retention(),
                config.dedup.max_entries,
            ))
        });

        let dispatcher = Arc::new(EventDispatcher::for_pingpal(users, push, ledger)?);
        for (pattern, kind, handler) in dispatcher.triggers() {
            info!("📌 注册触发器: {} [{}] -> {}", pattern, kind.as_str(), handler);
        }

        Ok(Self { config, dispatcher })
    }

    pub fn dispatcher(&self) -> Arc<EventDispatcher> {
        self.dispatcher.clone()
    }

    /// 分发单个事件（CLI 回放）
    pub async fn dispatch_once(&self, event: DocumentEvent) -> Result<DispatchReport> {
        self.dispatcher.dispatch(event).await
    }

    /// 启动 HTTP 入口并阻塞到收到停止信号
    pub async fn run(&self) -> Result<()> {
        if let Err(e) = metrics::init() {
            warn!("⚠️ Prometheus 指标初始化失败: {}", e);
        }

        let addr = self
            .config
            .bind_addr()
            .map_err(|e| ServerError::Configuration(e.to_string()))?;

        EventHttpServer::new(self.dispatcher.clone(), addr)
            .start()
            .await
            .map_err(|e| ServerError::Internal(format!("HTTP 服务器启动失败: {}", e)))
    }
}

/// 选择 access token 来源：固定 token > 服务账号密钥 > 元数据服务器
fn build_token_source(
    config: &ServerConfig,
    client: Client,
) -> Result<(Arc<dyn AccessTokenSource>, Option<String>)> {
    if let Some(token) = &config.firebase.access_token {
        info!("🔑 使用固定 access token");
        return Ok((Arc::new(StaticTokenSource::new(token.clone())), None));
    }

    if let Some(path) = &config.firebase.credentials_file {
        info!("🔑 使用服务账号密钥: {}", path);
        let key = ServiceAccountKey::from_file(path)?;
        let source = ServiceAccountTokenSource::new(client, key)?;
        let project_id = source.project_id().map(String::from);
        return Ok((Arc::new(source), project_id));
    }

    info!("🔑 使用元数据服务器获取 access token");
    let source = match &config.firebase.metadata_token_url {
        Some(url) => MetadataTokenSource::with_url(client, url.clone()),
        None => MetadataTokenSource::new(client),
    };
    Ok((Arc::new(source), None))
}
