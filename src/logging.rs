use anyhow::{anyhow, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const DEFAULT_LOG_FILE_NAME: &str = "pingpal-notify.log";

/// 初始化日志系统
///
/// 指定 `log_file` 时额外写入按天滚动的日志文件，返回的 guard 需要持有到进程退出，
/// 否则缓冲中的日志会丢失。
pub fn init_logging(
    log_level: &str,
    log_format: Option<&str>,
    log_file: Option<&str>,
    quiet: bool,
) -> Result<Option<WorkerGuard>> {
    // 如果静默模式，只输出错误
    let level = if quiet { "error" } else { log_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer> = vec![format_layer(log_format, std::io::stdout, true)];

    let guard = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(DEFAULT_LOG_FILE_NAME);

            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(format_layer(log_format, writer, false));
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("日志系统初始化失败: {}", e))?;

    Ok(guard)
}

fn format_layer<W>(log_format: Option<&str>, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi);
    match log_format {
        // JSON 格式（适合生产环境）
        Some("json") => layer.json().boxed(),
        // Pretty 格式（适合开发环境）
        Some("pretty") | Some("dev") => layer.pretty().boxed(),
        // Compact 格式（默认）
        _ => layer.compact().boxed(),
    }
}
