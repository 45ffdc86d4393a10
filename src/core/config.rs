use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 流水线阶段配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    /// 阶段名称（同时作为工作线程名）
    pub name: String,
    /// 包队列容量：阻塞模式下 put() 在达到容量时等待（背压）
    pub queue_capacity: usize,
    /// 包队列阈值：达到后认为缓冲足够
    pub queue_threshold: usize,
    /// 队列为空时 take 的最长等待，用于及时发现 demux 结束 / 停止
    pub take_timeout_ms: u64,
}

impl Default for StageConfig {
    fn default() -> Self {
        // 200 packets ≈ 8秒（25fps），与 Demuxer 侧的有界通道一致
        Self {
            name: "stage".to_string(),
            queue_capacity: 200,
            queue_threshold: 32,
            take_timeout_ms: 50,
        }
    }
}

impl StageConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn take_timeout(&self) -> Duration {
        Duration::from_millis(self.take_timeout_ms)
    }
}
