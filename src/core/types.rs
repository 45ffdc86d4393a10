use serde::{Deserialize, Serialize};

/// 媒体包 - 由上游生产者（Demuxer）提供，流水线阶段只负责搬运
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    pub pts: i64,            // 显示时间戳（毫秒）
    pub duration: i64,       // 持续时间（毫秒）
    pub stream_index: usize,
    pub key_frame: bool,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(pts: i64, data: Vec<u8>) -> Self {
        Self {
            pts,
            data,
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Video,
    Audio,
    Subtitle,
}

/// 解码后的帧数据（与具体编解码器无关）
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub kind: FrameKind,
    pub pts: i64,           // 显示时间戳（毫秒）
    pub duration: i64,      // 帧持续时间（毫秒）
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, pts: i64, data: Vec<u8>) -> Self {
        Self {
            kind,
            pts,
            duration: 0,
            data,
        }
    }
}

/// 阶段生命周期事件（替代线程的 started / paused / stopped 信号）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    Started,
    /// true = 进入暂停等待，false = 被唤醒
    Paused(bool),
    Stopped,
}

/// 阶段状态（由标志位推导，用于日志和外部查询）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Running,
    Paused,
    /// 单步：再处理一个单元后重新暂停
    SteppingThenPaused,
    Stopped,
}
