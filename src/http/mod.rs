//! HTTP 服务器模块 - 使用 Axum 接收文档事件
//!
//! 功能包括：
//! - CloudEvents 事件入口
//! - 健康检查
//! - Prometheus 指标

pub mod routes;
pub mod server;

pub use server::{create_router, EventHttpServer, HttpServerState};
