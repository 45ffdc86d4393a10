// 流水线阶段核心模块

pub mod packet_queue;
pub mod decoder;
pub mod filter;
pub mod output;
pub mod stage;
pub mod worker;

pub use packet_queue::PacketQueue;
pub use decoder::{Decoder, PassthroughDecoder, SharedDecoder};
pub use filter::{Filter, FilterContext, PtsOffsetFilter};
pub use output::{BufferedSink, OutputSet, OutputSink, SharedOutput, SubscriptionId};
pub use stage::{PipelineStage, StageHandle, StageLock};
pub use worker::{DecodeBody, StageBody};
