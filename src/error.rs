use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 服务错误类型
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum ServerError {
    /// 内部错误
    #[error("Internal error: {0}")]
    Internal(String),
    /// 认证错误（获取 access token 失败）
    #[error("Authentication error: {0}")]
    Authentication(String),
    /// 文档存储错误
    #[error("Document store error: {0}")]
    Store(String),
    /// 推送提供者错误
    #[error("Push error: status={status}, {message}")]
    Push { status: u16, message: String },
    /// 网络错误
    #[error("Network error: {0}")]
    Network(String),
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// 配置错误
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// 无效的事件
    #[error("Invalid event: {0}")]
    InvalidEvent(String),
    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),
}

impl ServerError {
    /// 是否为入口请求本身的问题（重试也无法成功）
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServerError::InvalidEvent(_))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ServerError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            ServerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_response = ErrorResponse::new(&self);
        (status_code, Json(error_response)).into_response()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for ServerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServerError::Timeout(err.to_string())
        } else {
            ServerError::Network(err.to_string())
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ServerError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ServerError::Authentication(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ServerError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ServerError::Timeout(err.to_string())
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServerError>;

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误消息
    pub message: String,
    /// 时间戳
    pub timestamp: u64,
}

impl ErrorResponse {
    /// 创建错误响应
    pub fn new(error: &ServerError) -> Self {
        Self {
            message: error.to_string(),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}
