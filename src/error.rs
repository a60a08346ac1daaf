use thiserror::Error;

/// 定义库的统一错误枚举。
#[derive(Debug, Error)]
pub enum BridgeError {
    /// 无法启动后台工作线程。
    ///
    /// 这通常发生在 `std::thread::Builder::spawn` 失败时。
    #[error("无法启动后台工作线程: {0}")]
    WorkerThread(String),

    /// 会话提供者不可用（连接失败、连接被丢弃或尚未连接）。
    #[error("媒体会话提供者不可用")]
    ProviderUnavailable,

    /// 会话提供者的某个调用失败。
    #[error("媒体会话提供者调用失败: {0}")]
    Provider(String),

    /// 音频混音器的某个调用失败。
    #[error("音频混音器调用失败: {0}")]
    Mixer(String),

    /// 异步操作在限定时间内没有完成。
    #[error("异步操作超时")]
    Timeout,

    /// 后台组件已经被取走（上一次工作线程没有归还它们）。
    #[error("没有可用的后台组件，无法启动工作线程")]
    BackendUnavailable,

    /// 另一个线程正在关闭工作线程。
    #[error("工作线程正在关闭，请稍后再试")]
    ShutdownInProgress,

    /// 底层的 Windows API 或 COM 调用失败。
    #[cfg(windows)]
    #[error("Windows API 调用失败: {0}")]
    Windows(#[from] windows::core::Error),

    /// 锁已被毒化。
    #[error("锁已被毒化: {0}")]
    MutexPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for BridgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        BridgeError::MutexPoisoned(err.to_string())
    }
}

/// 本库统一的 `Result` 类型别名。
pub type Result<T> = std::result::Result<T, BridgeError>;
