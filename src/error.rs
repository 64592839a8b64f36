// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("远程源不可用: {0}")]
    RemoteUnavailable(String),
    #[error("缓存元数据损坏: {0}")]
    CacheCorrupt(String),
    #[error("配置缺失: {0}")]
    ConfigMissing(String),
    #[error("设备离线: {0}")]
    DeviceOffline(String),
    #[error("未配置设备 IP")]
    DeviceNotConfigured,
    #[error("无效的设备命令: {0}")]
    BadCommand(String),
    #[error("服务暂不可用: {0}")]
    ServiceUnavailable(String),
    #[error("未找到: {0}")]
    NotFound(String),
    #[error("{0}")] // 只打印内部信息，不加任何前缀
    BadRequest(String),
    #[error("网络请求失败: {0}")]
    Network(#[from] reqwest::Error),
    #[error("网络中间件错误: {0}")]
    NetworkMiddleware(#[from] reqwest_middleware::Error),
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("临时文件持久化失败: {0}")]
    TempFilePersist(#[from] tempfile::PersistError),
    #[error("JSON 解析错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("URL 解析错误: {0}")]
    Url(#[from] url::ParseError),
    #[error("未知错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// 是否属于与远程源通信时的瞬时失败（可由下一层回退处理）。
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            AppError::RemoteUnavailable(_) | AppError::Network(_) | AppError::NetworkMiddleware(_)
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
