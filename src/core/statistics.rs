use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// 阶段运行统计（由工作线程写入，任意线程读取）
#[derive(Debug, Default)]
pub struct Statistics {
    packets: AtomicU64,
    frames_decoded: AtomicU64,
    frames_output: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub packets: u64,
    pub frames_decoded: u64,
    pub frames_output: u64,
    pub errors: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_packet(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_decoded(&self, n: u64) {
        self.frames_decoded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_output(&self) {
        self.frames_output.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_output: self.frames_output.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}
