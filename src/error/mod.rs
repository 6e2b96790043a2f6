//! 错误处理模块

use thiserror::Error;

/// 可重试的 HTTP 状态码
pub const RETRY_STATUS_CODES: [u16; 4] = [429, 502, 503, 504];

/// 应用程序错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 初始化错误
    #[error("初始化失败: {0}")]
    Initialization(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// HTTP 请求错误
    #[error("HTTP 请求失败: {0}")]
    HttpRequest(String),

    /// 非成功的 HTTP 状态码
    #[error("HTTP 状态码异常: {status}")]
    HttpStatus {
        /// 响应状态码
        status: u16,
    },

    /// 认证错误（401）
    #[error("认证失败: {0}")]
    Auth(String),

    /// 等待 SSE 端点或响应超时
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 连接失败
    #[error("连接失败: {0}")]
    Connection(String),

    /// 客户端已关闭后仍被调用
    #[error("客户端已关闭")]
    ClientClosed,

    /// 缓存锁获取超时
    #[error("无法获取缓存锁: {0}")]
    LockTimeout(String),

    /// SSE 流解析错误
    #[error("解析失败: {0}")]
    Parse(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化/反序列化错误
    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    /// Reqwest 错误
    #[error("HTTP 客户端错误: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl Error {
    /// 是否属于瞬时错误（连接失败、超时、429/5xx 网关错误）
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::Connection(_) => true,
            Error::HttpStatus { status } => RETRY_STATUS_CODES.contains(status),
            Error::Reqwest(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// 是否为认证错误
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// 将 reqwest 错误归类为超时或连接错误
    #[must_use]
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_connect() {
            Error::Connection(err.to_string())
        } else {
            Error::Reqwest(err)
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(Error::Timeout("sse endpoint".to_string()).is_retryable());
        assert!(Error::Connection("refused".to_string()).is_retryable());
        assert!(Error::HttpStatus { status: 503 }.is_retryable());
        assert!(Error::HttpStatus { status: 429 }.is_retryable());

        assert!(!Error::HttpStatus { status: 404 }.is_retryable());
        assert!(!Error::HttpStatus { status: 500 }.is_retryable());
        assert!(!Error::Auth("invalid key".to_string()).is_retryable());
        assert!(!Error::ClientClosed.is_retryable());
        assert!(!Error::Parse("malformed SSE stream".to_string()).is_retryable());
    }

    #[test]
    fn test_auth_classification() {
        assert!(Error::Auth("invalid key".to_string()).is_auth());
        assert!(!Error::Timeout("x".to_string()).is_auth());
    }
}
