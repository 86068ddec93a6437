use clap::{Parser, Subcommand};

impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// PingPal Notify - Firestore 文档事件推送通知服务
#[derive(Parser, Debug, Default)]
#[command(name = "pingpal-notify")]
#[command(version)]
#[command(about = "接收 Firestore 文档事件并通过 FCM 推送通知", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 服务器监听地址
    #[arg(long, value_name = "ADDRESS", help = "HTTP 监听地址")]
    pub host: Option<String>,

    /// HTTP 端口
    #[arg(long, value_name = "PORT", help = "HTTP 监听端口")]
    pub port: Option<u16>,

    /// Firebase 项目 ID
    #[arg(long, value_name = "ID", help = "Firebase / GCP 项目 ID")]
    pub project_id: Option<String>,

    /// 服务账号密钥文件
    #[arg(long, value_name = "FILE", help = "Google 服务账号 JSON 密钥路径")]
    pub credentials: Option<String>,

    /// 不真正推送，只记录
    #[arg(long, help = "演练模式：通知只记录不发送")]
    pub dry_run: bool,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, value_name = "PATH", help = "日志输出文件路径（按天滚动）")]
    pub log_file: Option<String>,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（只输出错误）")]
    pub quiet: bool,

    /// 开发模式（等同于 --log-level debug --log-format pretty）
    #[arg(long, help = "启用开发模式")]
    pub dev: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 显示最终配置（合并后的配置）
    ShowConfig,
    /// 从 JSON 文件回放一个 CloudEvent（结构化格式）
    Dispatch {
        /// 事件文件路径
        #[arg(long, value_name = "FILE")]
        file: String,
    },
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if self.dev {
            return Some("debug".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        match self.verbose {
            0 => None,
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    /// 获取日志格式
    pub fn get_log_format(&self) -> Option<String> {
        if self.dev {
            return Some("pretty".to_string());
        }
        self.log_format.clone()
    }
}
