use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::infra::{DEFAULT_DATABASE_ID, FIRESTORE_BASE_URL};
use crate::push::{DEFAULT_CHANNEL_ID, FCM_BASE_URL};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP 监听地址
    pub host: String,
    /// HTTP 监听端口
    pub port: u16,
    /// Firebase 项目与凭证
    pub firebase: FirebaseConfig,
    /// 推送配置
    pub push: PushConfig,
    /// 重复事件去重
    pub dedup: DedupConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            firebase: FirebaseConfig::default(),
            push: PushConfig::default(),
            dedup: DedupConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Firebase 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    /// 项目 ID；未配置时尝试从服务账号密钥中读取
    pub project_id: Option<String>,
    /// Firestore 数据库 ID
    pub database_id: String,
    /// 服务账号 JSON 密钥路径
    pub credentials_file: Option<String>,
    /// 固定 access token（本地调试、模拟器）
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// 元数据服务器 token 地址（Cloud Run / GCE）
    pub metadata_token_url: Option<String>,
    pub firestore_base_url: String,
    pub fcm_base_url: String,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            database_id: DEFAULT_DATABASE_ID.to_string(),
            credentials_file: None,
            access_token: None,
            metadata_token_url: None,
            firestore_base_url: FIRESTORE_BASE_URL.to_string(),
            fcm_base_url: FCM_BASE_URL.to_string(),
        }
    }
}

/// 推送配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// 演练模式：只记录，不调用 FCM
    pub dry_run: bool,
    /// Android 通知渠道
    pub channel_id: String,
    /// 多播并发数
    pub multicast_concurrency: usize,
    /// 出站 HTTP 请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            channel_id: DEFAULT_CHANNEL_ID.to_string(),
            multicast_concurrency: 16,
            request_timeout_secs: 10,
        }
    }
}

impl PushConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 去重账本配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    pub enabled: bool,
    /// 记录保留时间（秒）
    pub retention_secs: u64,
    /// 最大记录数
    pub max_entries: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_secs: 3600,
            max_entries: 100_000,
        }
    }
}

impl DedupConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// pretty / json / compact
    pub format: Option<String>,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            file: None,
        }
    }
}

impl ServerConfig {
    /// 创建新的服务器配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本加载配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| "配置文件格式错误")?;
        Ok(toml_config.into())
    }

    /// 从环境变量合并配置（PINGPAL_ 前缀及 Google 标准变量）
    pub fn merge_from_env(&mut self) -> Result<()> {
        self.merge_from_vars(|key| env::var(key).ok())
    }

    /// 从任意键值来源合并配置，`merge_from_env` 的实现
    pub fn merge_from_vars<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("PINGPAL_HOST") {
            self.host = host;
        }
        // Cloud Run 通过 PORT 注入端口，PINGPAL_PORT 优先
        if let Some(port) = var("PINGPAL_PORT").or_else(|| var("PORT")) {
            self.port = port
                .parse()
                .with_context(|| format!("无效的端口: {}", port))?;
        }

        if let Some(project_id) = var("PINGPAL_PROJECT_ID").or_else(|| var("GOOGLE_CLOUD_PROJECT")) {
            self.firebase.project_id = Some(project_id);
        }
        if let Some(database_id) = var("PINGPAL_DATABASE_ID") {
            self.firebase.database_id = database_id;
        }
        if let Some(credentials) = var("GOOGLE_APPLICATION_CREDENTIALS") {
            self.firebase.credentials_file = Some(credentials);
        }
        if let Some(token) = var("FIREBASE_ACCESS_TOKEN") {
            self.firebase.access_token = Some(token);
        }
        if let Some(emulator) = var("FIRESTORE_EMULATOR_HOST") {
            self.firebase.firestore_base_url = format!("http://{}", emulator);
        }

        if let Some(dry_run) = var("PINGPAL_DRY_RUN") {
            self.push.dry_run = parse_bool("PINGPAL_DRY_RUN", &dry_run)?;
        }
        if let Some(enabled) = var("PINGPAL_DEDUP_ENABLED") {
            self.dedup.enabled = parse_bool("PINGPAL_DEDUP_ENABLED", &enabled)?;
        }

        if let Some(level) = var("PINGPAL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("PINGPAL_LOG_FORMAT") {
            self.logging.format = Some(format);
        }
        if let Some(file) = var("PINGPAL_LOG_FILE") {
            self.logging.file = Some(file);
        }

        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(project_id) = &cli.project_id {
            self.firebase.project_id = Some(project_id.clone());
        }
        if let Some(credentials) = &cli.credentials {
            self.firebase.credentials_file = Some(credentials.clone());
        }
        if cli.dry_run {
            self.push.dry_run = true;
        }
        if let Some(level) = cli.get_log_level() {
            self.logging.level = level;
        }
        if let Some(format) = cli.get_log_format() {
            self.logging.format = Some(format);
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = match &cli.config_file {
            Some(config_file) if Path::new(config_file).exists() => {
                info!("📄 从配置文件加载: {}", config_file);
                Self::from_toml_file(config_file)?
            }
            Some(config_file) => {
                tracing::warn!("⚠️ 配置文件不存在: {}", config_file);
                Self::new()
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                info!("📄 从默认配置文件加载: {}", DEFAULT_CONFIG_FILE);
                Self::from_toml_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::new(),
        };

        config.merge_from_env()?;
        config.merge_from_cli(cli);
        config.validate()?;

        Ok(config)
    }

    /// 检查配置的取值范围
    pub fn validate(&self) -> Result<()> {
        if self.push.multicast_concurrency == 0 {
            bail!("push.multicast_concurrency 必须大于 0");
        }
        if self.push.request_timeout_secs == 0 {
            bail!("push.request_timeout_secs 必须大于 0");
        }
        if self.push.channel_id.trim().is_empty() {
            bail!("push.channel_id 不能为空");
        }
        if self.dedup.enabled && (self.dedup.retention_secs == 0 || self.dedup.max_entries == 0) {
            bail!("启用去重时 dedup.retention_secs 与 dedup.max_entries 必须大于 0");
        }
        if let Some(format) = self.logging.format.as_deref() {
            if !matches!(format, "pretty" | "dev" | "json" | "compact") {
                bail!("未知的日志格式: {}", format);
            }
        }
        Ok(())
    }

    /// HTTP 监听地址
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("无效的监听地址: {}:{}", self.host, self.port))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{} 不是有效的布尔值: {}", key, value),
    }
}

/// 启动早期使用的日志配置（完整配置加载之前）
#[derive(Debug, Default)]
pub struct EarlyLoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

/// 只读取配置文件中的 `[logging]` 段，失败时返回空配置
pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLoggingConfig {
    let path = config_file.unwrap_or(DEFAULT_CONFIG_FILE);
    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLoggingConfig::default();
    };
    let Ok(toml_config) = toml::from_str::<TomlConfig>(&content) else {
        return EarlyLoggingConfig::default();
    };
    toml_config
        .logging
        .map(|logging| EarlyLoggingConfig {
            level: logging.level,
            format: logging.format,
            file: logging.file,
        })
        .unwrap_or_default()
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    server: Option<TomlServerConfig>,
    firebase: Option<TomlFirebaseConfig>,
    push: Option<TomlPushConfig>,
    dedup: Option<TomlDedupConfig>,
    logging: Option<TomlLoggingConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlServerConfig {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct TomlFirebaseConfig {
    project_id: Option<String>,
    database_id: Option<String>,
    credentials_file: Option<String>,
    access_token: Option<String>,
    metadata_token_url: Option<String>,
    firestore_base_url: Option<String>,
    fcm_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TomlPushConfig {
    dry_run: Option<bool>,
    channel_id: Option<String>,
    multicast_concurrency: Option<usize>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TomlDedupConfig {
    enabled: Option<bool>,
    retention_secs: Option<u64>,
    max_entries: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TomlLoggingConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

impl From<TomlConfig> for ServerConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(server) = toml.server {
            if let Some(host) = server.host {
                config.host = host;
            }
            if let Some(port) = server.port {
                config.port = port;
            }
        }

        if let Some(firebase) = toml.firebase {
            let target = &mut config.firebase;
            target.project_id = firebase.project_id;
            if let Some(database_id) = firebase.database_id {
                target.database_id = database_id;
            }
            target.credentials_file = firebase.credentials_file;
            target.access_token = firebase.access_token;
            target.metadata_token_url = firebase.metadata_token_url;
            if let Some(url) = firebase.firestore_base_url {
                target.firestore_base_url = url;
            }
            if let Some(url) = firebase.fcm_base_url {
                target.fcm_base_url = url;
            }
        }

        if let Some(push) = toml.push {
            if let Some(dry_run) = push.dry_run {
                config.push.dry_run = dry_run;
            }
            if let Some(channel_id) = push.channel_id {
                config.push.channel_id = channel_id;
            }
            if let Some(concurrency) = push.multicast_concurrency {
                config.push.multicast_concurrency = concurrency;
            }
            if let Some(timeout) = push.request_timeout_secs {
                config.push.request_timeout_secs = timeout;
            }
        }

        if let Some(dedup) = toml.dedup {
            if let Some(enabled) = dedup.enabled {
                config.dedup.enabled = enabled;
            }
            if let Some(retention) = dedup.retention_secs {
                config.dedup.retention_secs = retention;
            }
            if let Some(max_entries) = dedup.max_entries {
                config.dedup.max_entries = max_entries;
            }
        }

        if let Some(logging) = toml.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            config.logging.format = logging.format;
            config.logging.file = logging.file;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.push.channel_id, "default_notification_channel");
        assert!(config.dedup.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = ServerConfig::from_toml_str(
            r#"
[server]
port = 9090

[firebase]
project_id = "pingpal-dev"

[push]
dry_run = true

[dedup]
retention_secs = 60
"#,
        )
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.firebase.project_id.as_deref(), Some("pingpal-dev"));
        assert_eq!(config.firebase.database_id, "(default)");
        assert!(config.push.dry_run);
        assert_eq!(config.push.multicast_concurrency, 16);
        assert_eq!(config.dedup.retention_secs, 60);
        assert_eq!(config.dedup.max_entries, 100_000);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config =
            ServerConfig::from_toml_str("[server]\nport = 9090\n[firebase]\nproject_id = \"file\"\n")
                .unwrap();
        let vars: HashMap<&str, &str> = [
            ("PORT", "7000"),
            ("GOOGLE_CLOUD_PROJECT", "env-project"),
            ("PINGPAL_DRY_RUN", "true"),
            ("FIRESTORE_EMULATOR_HOST", "localhost:8085"),
        ]
        .into_iter()
        .collect();

        config
            .merge_from_vars(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.port, 7000);
        assert_eq!(config.firebase.project_id.as_deref(), Some("env-project"));
        assert!(config.push.dry_run);
        assert_eq!(config.firebase.firestore_base_url, "http://localhost:8085");
    }

    #[test]
    fn test_cli_overrides_env() {
        let mut config = ServerConfig::default();
        config
            .merge_from_vars(|key| (key == "PINGPAL_PORT").then(|| "7000".to_string()))
            .unwrap();

        let cli = crate::cli::Cli {
            port: Some(7100),
            dry_run: true,
            dev: true,
            ..Default::default()
        };
        config.merge_from_cli(&cli);

        assert_eq!(config.port, 7100);
        assert!(config.push.dry_run);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format.as_deref(), Some("pretty"));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ServerConfig::default();
        assert!(config
            .merge_from_vars(|key| (key == "PINGPAL_DRY_RUN").then(|| "maybe".to_string()))
            .is_err());

        config.push.multicast_concurrency = 0;
        assert!(config.validate().is_err());

        assert!(ServerConfig::from_toml_str("[server]\nport = \"x\"\n").is_err());
    }
}
