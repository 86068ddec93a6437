use anyhow::{Context, Result};
use pingpal_notify::{
    cli::{Cli, Commands},
    config::{self, ServerConfig},
    domain::{CloudEventEnvelope, DocumentEvent},
    logging, NotifyServer,
};
use std::fs;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::GenerateConfig { path }) => return generate_config(path),
        Some(Commands::ValidateConfig { path }) => return validate_config(path),
        Some(Commands::ShowConfig) => return show_config(&cli),
        Some(Commands::Dispatch { .. }) | None => {}
    }

    // 快速读取配置文件的 [logging] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > 环境变量 > config.toml > 默认值）
    let log_level = cli
        .get_log_level()
        .or_else(|| std::env::var("PINGPAL_LOG_LEVEL").ok())
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    let log_format = cli
        .get_log_format()
        .or_else(|| std::env::var("PINGPAL_LOG_FORMAT").ok())
        .or(early_log.format);
    let log_file = cli
        .log_file
        .clone()
        .or_else(|| std::env::var("PINGPAL_LOG_FILE").ok())
        .or(early_log.file);

    let _log_guard = logging::init_logging(
        &log_level,
        log_format.as_deref(),
        log_file.as_deref(),
        cli.quiet,
    )?;

    tracing::info!("🚀 PingPal Notify starting...");

    let config = ServerConfig::load(&cli).context("加载配置失败")?;

    if cli.dev {
        tracing::info!("🔧 开发模式已启用");
    }

    tracing::info!("📊 Server Configuration:");
    tracing::info!("  - Listen: {}:{}", config.host, config.port);
    tracing::info!(
        "  - Project: {}",
        config.firebase.project_id.as_deref().unwrap_or("(from credentials)")
    );
    tracing::info!("  - Database: {}", config.firebase.database_id);
    tracing::info!("  - Dry Run: {}", config.push.dry_run);
    tracing::info!("  - Channel: {}", config.push.channel_id);
    tracing::info!(
        "  - Dedup: {} ({}s)",
        config.dedup.enabled,
        config.dedup.retention_secs
    );
    tracing::info!("  - Log Level: {}", config.logging.level);
    tracing::info!(
        "  - Log Format: {:?}",
        log_format.as_deref().unwrap_or("compact")
    );
    if let Some(f) = &log_file {
        tracing::info!("  - Log File: {}", f);
    }

    let server = match NotifyServer::new(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("❌ 服务初始化失败: {}", e);
            tracing::error!("💡 请检查项目 ID 与凭证配置后重试");
            process::exit(1);
        }
    };

    if let Some(Commands::Dispatch { file }) = &cli.command {
        return dispatch_file(&server, file).await;
    }

    if let Err(e) = server.run().await {
        tracing::error!("❌ 服务运行失败: {}", e);
        process::exit(1);
    }

    Ok(())
}

/// 回放文件中的事件
async fn dispatch_file(server: &NotifyServer, path: &str) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("无法读取事件文件: {}", path))?;
    let envelope: CloudEventEnvelope =
        serde_json::from_str(&content).with_context(|| format!("事件文件格式错误: {}", path))?;

    let Some(event) = DocumentEvent::from_envelope(envelope)? else {
        println!("ℹ️ 事件没有文档数据，无需处理");
        return Ok(());
    };

    let report = server.dispatch_once(event).await?;
    if report.is_unmatched() {
        println!("ℹ️ 没有处理器匹配 {}", report.document_path);
    }
    for entry in &report.handlers {
        println!("  - {}: {:?}", entry.handler, entry.outcome);
    }
    println!(
        "✅ 事件 {} 处理完成，发送 {} 次",
        report.event_id,
        report.delivered_count()
    );
    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let default_config = r#"# PingPal Notify 配置文件
# 此文件由 pingpal-notify generate-config 生成

[server]
host = "0.0.0.0"
port = 8080

[firebase]
# project_id = "your-firebase-project"
database_id = "(default)"
# credentials_file = "./service-account.json"

[push]
dry_run = false
channel_id = "default_notification_channel"
multicast_concurrency = 16
request_timeout_secs = 10

[dedup]
enabled = true
retention_secs = 3600
max_entries = 100000

[logging]
level = "info"
format = "compact"
# file = "./logs/pingpal-notify.log"
"#;

    fs::write(path, default_config).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = ServerConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;
    config
        .validate()
        .with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - Listen: {}:{}", config.host, config.port);
    println!(
        "  - Project: {}",
        config.firebase.project_id.as_deref().unwrap_or("(unset)")
    );
    println!("  - Dry Run: {}", config.push.dry_run);
    println!("  - Dedup: {}", config.dedup.enabled);

    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    let _guard = logging::init_logging("info", None, None, false)?;

    let config = ServerConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
