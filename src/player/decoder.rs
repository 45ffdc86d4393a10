use crate::core::{Frame, FrameKind, Packet, Result, StageError};
use parking_lot::Mutex;
use std::sync::Arc;

/// 解码器抽象接口
///
/// 阶段只保存 / 暴露解码器引用，真正的解码由工作循环（StageBody）调用。
pub trait Decoder: Send {
    /// 解码一个数据包，可能产出 0..n 帧
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>>;

    /// 刷新解码器（获取缓冲的帧），demux 结束时调用
    fn flush(&mut self) -> Result<Vec<Frame>> {
        Ok(Vec::new())
    }

    /// 获取描述信息（用于调试）
    fn name(&self) -> String;
}

/// 跨线程共享的解码器句柄（阶段不拥有解码器）
pub type SharedDecoder = Arc<Mutex<dyn Decoder>>;

pub fn shared<D: Decoder + 'static>(decoder: D) -> SharedDecoder {
    Arc::new(Mutex::new(decoder))
}

/// 直通解码器：包数据原样作为帧输出，空包视为损坏
pub struct PassthroughDecoder {
    kind: FrameKind,
}

impl PassthroughDecoder {
    pub fn new(kind: FrameKind) -> Self {
        Self { kind }
    }
}

impl Decoder for PassthroughDecoder {
    fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        if packet.data.is_empty() {
            return Err(StageError::DecodeError(format!("空数据包 pts={}", packet.pts)));
        }
        let mut frame = Frame::new(self.kind, packet.pts, packet.data.clone());
        frame.duration = packet.duration;
        Ok(vec![frame])
    }

    fn name(&self) -> String {
        format!("passthrough({:?})", self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_copies_packet() {
        let mut decoder = PassthroughDecoder::new(FrameKind::Video);
        let frames = decoder.decode(&Packet::new(40, vec![1, 2, 3]).with_duration(40)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].pts, 40);
        assert_eq!(frames[0].duration, 40);
        assert_eq!(frames[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn test_passthrough_rejects_empty_packet() {
        let mut decoder = PassthroughDecoder::new(FrameKind::Audio);
        assert!(matches!(
            decoder.decode(&Packet::new(0, Vec::new())),
            Err(StageError::DecodeError(_))
        ));
    }
}
