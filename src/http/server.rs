//! HTTP 服务器 - 使用 Axum 接收 Eventarc 投递的文档事件

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatcher::EventDispatcher;
use crate::http::routes;

/// HTTP 服务器共享状态
#[derive(Clone)]
pub struct HttpServerState {
    pub dispatcher: Arc<EventDispatcher>,
}

/// 构建完整路由（测试中直接驱动）
pub fn create_router(state: HttpServerState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 事件入口 HTTP 服务器
pub struct EventHttpServer {
    state: HttpServerState,
    addr: SocketAddr,
}

impl EventHttpServer {
    pub fn new(dispatcher: Arc<EventDispatcher>, addr: SocketAddr) -> Self {
        Self {
            state: HttpServerState { dispatcher },
            addr,
        }
    }

    /// 启动 HTTP 服务器，收到 Ctrl+C / SIGTERM 后优雅退出
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = create_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!("🌐 事件入口 HTTP 服务器启动在 {}", self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("👋 HTTP 服务器已停止");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 收到停止信号，正在关闭...");
}
