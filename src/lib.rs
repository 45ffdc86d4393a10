//! 播放器流水线阶段核心：可暂停 / 单步 / 取消的工作线程、包队列与输出集合

pub mod core;
pub mod player;

pub use crate::core::{
    Frame, FrameKind, Packet, PlaybackClock, Result, StageConfig, StageError, StageEvent,
    StageState, Statistics,
};
pub use crate::player::{
    DecodeBody, Decoder, OutputSet, OutputSink, PacketQueue, PipelineStage, StageBody,
    StageHandle,
};
