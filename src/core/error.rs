use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("配置解析失败: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("无法启动工作线程 {name}: {source}")]
    SpawnError {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("工作线程已在运行: {0}")]
    AlreadyRunning(String),

    #[error("工作线程异常退出: {0}")]
    WorkerPanicked(String),

    #[error("解码错误: {0}")]
    DecodeError(String),

    #[error("输出错误: {0}")]
    OutputError(String),
}

pub type Result<T> = std::result::Result<T, StageError>;
