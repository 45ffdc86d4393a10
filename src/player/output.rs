use crate::core::{Frame, Result, StageError};
use crossbeam::queue::SegQueue;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 输出端抽象（音频输出 / 视频渲染器等）
///
/// 输出端可以被单独暂停；阶段在 stop / resetState 时会强制解除暂停，
/// 避免工作线程卡在 write() 上观察不到停止。
pub trait OutputSink: Send + Sync {
    fn name(&self) -> String;

    fn pause(&self, paused: bool);

    fn is_paused(&self) -> bool;

    fn write(&self, frame: &Frame) -> Result<()>;

    /// 应用参数更新（尺寸 / 采样率等），由工作循环在下次使用前调用
    fn update_parameters(&self) {}
}

pub type SharedOutput = Arc<dyn OutputSink>;

/// 按对象身份比较两个输出端
pub fn same_output(a: &SharedOutput, b: &SharedOutput) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// 带缓冲的输出端：帧写入无锁队列，暂停时 write() 阻塞直到恢复
///
/// 设置了容量时缓冲满则丢弃新帧并返回 OutputError。
pub struct BufferedSink {
    name: String,
    frames: SegQueue<Frame>,
    capacity: usize,  // 0 = 不限
    paused: Mutex<bool>,
    resumed: Condvar,
    parameter_updates: AtomicU64,
}

impl BufferedSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            frames: SegQueue::new(),
            capacity: 0,
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            parameter_updates: AtomicU64::new(0),
        }
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::new(name)
        }
    }

    pub fn pop_frame(&self) -> Option<Frame> {
        self.frames.pop()
    }

    /// 缓冲中的帧数
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&self) {
        while self.frames.pop().is_some() {}
    }

    pub fn parameter_updates(&self) -> u64 {
        self.parameter_updates.load(Ordering::Relaxed)
    }
}

impl OutputSink for BufferedSink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn pause(&self, paused: bool) {
        let mut state = self.paused.lock();
        if *state == paused {
            return;
        }
        *state = paused;
        if !paused {
            self.resumed.notify_all();
        }
    }

    fn is_paused(&self) -> bool {
        *self.paused.lock()
    }

    fn write(&self, frame: &Frame) -> Result<()> {
        let mut paused = self.paused.lock();
        while *paused {
            self.resumed.wait(&mut paused);
        }
        drop(paused);
        if self.capacity > 0 && self.frames.len() >= self.capacity {
            return Err(StageError::OutputError(format!(
                "{} 缓冲已满（{} 帧），丢弃 pts={}",
                self.name, self.capacity, frame.pts
            )));
        }
        self.frames.push(frame.clone());
        Ok(())
    }

    fn update_parameters(&self) {
        self.parameter_updates.fetch_add(1, Ordering::Relaxed);
    }
}

/// 订阅句柄，用于取消订阅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type UpdateCallback = Arc<dyn Fn(&SharedOutput) + Send + Sync>;

/// 输出集合 - 阶段挂载的输出端注册表
///
/// "参数需要更新" 通知通过显式注册的回调投递给每个订阅的阶段。
#[derive(Default)]
pub struct OutputSet {
    outputs: RwLock<Vec<SharedOutput>>,
    subscribers: Mutex<Vec<(SubscriptionId, UpdateCallback)>>,
    next_id: AtomicU64,
}

impl OutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加输出端，已存在则返回 false
    pub fn add_output(&self, output: SharedOutput) -> bool {
        let mut outputs = self.outputs.write();
        if outputs.iter().any(|o| same_output(o, &output)) {
            return false;
        }
        debug!("输出集合添加输出端: {}", output.name());
        outputs.push(output);
        true
    }

    pub fn remove_output(&self, output: &SharedOutput) -> bool {
        let mut outputs = self.outputs.write();
        let before = outputs.len();
        outputs.retain(|o| !same_output(o, output));
        outputs.len() != before
    }

    pub fn outputs(&self) -> Vec<SharedOutput> {
        self.outputs.read().clone()
    }

    pub fn len(&self) -> usize {
        self.outputs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.read().is_empty()
    }

    /// 暂停 / 恢复所有输出端
    pub fn pause(&self, paused: bool) {
        for output in self.outputs() {
            output.pause(paused);
        }
    }

    /// 把帧广播给所有输出端。单个输出端失败不影响其余输出端，返回最后一个错误
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        let mut result = Ok(());
        for output in self.outputs() {
            if let Err(e) = output.write(frame) {
                warn!("输出端 {} 写入失败: {}", output.name(), e);
                result = Err(e);
            }
        }
        result
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&SharedOutput) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|(sid, _)| *sid != id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// 通知所有订阅者：该输出端需要更新参数
    pub fn request_update_parameters(&self, output: &SharedOutput) {
        // 回调在锁外执行，回调里可以安全地再次访问本集合
        let callbacks: Vec<UpdateCallback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in callbacks {
            callback(output);
        }
    }

    pub fn request_update_all(&self) {
        for output in self.outputs() {
            self.request_update_parameters(&output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FrameKind;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn frame(pts: i64) -> Frame {
        Frame::new(FrameKind::Video, pts, vec![0u8; 2])
    }

    #[test]
    fn test_add_output_dedup_by_identity() {
        let set = OutputSet::new();
        let a: SharedOutput = Arc::new(BufferedSink::new("a"));
        let b: SharedOutput = Arc::new(BufferedSink::new("a"));
        assert!(set.add_output(a.clone()));
        assert!(!set.add_output(a.clone()));
        assert!(set.add_output(b.clone()));
        assert_eq!(set.len(), 2);
        assert!(set.remove_output(&a));
        assert!(!set.remove_output(&a));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_send_frame_reaches_all_outputs() {
        let set = OutputSet::new();
        let a = Arc::new(BufferedSink::new("a"));
        let b = Arc::new(BufferedSink::new("b"));
        set.add_output(a.clone());
        set.add_output(b.clone());
        set.send_frame(&frame(1)).unwrap();
        assert_eq!(a.pop_frame().map(|f| f.pts), Some(1));
        assert_eq!(b.pop_frame().map(|f| f.pts), Some(1));
    }

    #[test]
    fn test_full_sink_rejects_frame_but_set_keeps_broadcasting() {
        let set = OutputSet::new();
        let small = Arc::new(BufferedSink::with_capacity("small", 1));
        let big = Arc::new(BufferedSink::new("big"));
        set.add_output(small.clone());
        set.add_output(big.clone());

        set.send_frame(&frame(1)).unwrap();
        let err = set.send_frame(&frame(2)).unwrap_err();
        assert!(matches!(err, StageError::OutputError(_)));
        assert_eq!(small.len(), 1);
        assert_eq!(big.len(), 2);
    }

    #[test]
    fn test_set_pause_applies_to_every_output() {
        let set = OutputSet::new();
        let a = Arc::new(BufferedSink::new("a"));
        let b = Arc::new(BufferedSink::new("b"));
        set.add_output(a.clone());
        set.add_output(b.clone());

        set.pause(true);
        assert!(a.is_paused() && b.is_paused());
        set.pause(false);
        assert!(!a.is_paused() && !b.is_paused());
    }

    #[test]
    fn test_update_notification_reaches_subscribers_until_unsubscribed() {
        let set = OutputSet::new();
        let sink: SharedOutput = Arc::new(BufferedSink::new("v"));
        let (tx, rx) = mpsc::channel();
        let id = set.subscribe(move |o| tx.send(o.name()).unwrap());

        set.request_update_parameters(&sink);
        assert_eq!(rx.try_recv().unwrap(), "v");

        set.unsubscribe(id);
        assert_eq!(set.subscriber_count(), 0);
        set.request_update_parameters(&sink);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_paused_sink_blocks_write_until_resumed() {
        let sink = Arc::new(BufferedSink::new("a"));
        sink.pause(true);
        let (tx, rx) = mpsc::channel();
        let writer = {
            let sink = sink.clone();
            thread::spawn(move || {
                sink.write(&frame(7)).unwrap();
                tx.send(()).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());
        sink.pause(false);
        rx.recv_timeout(Duration::from_secs(2)).expect("write() 未被释放");
        writer.join().unwrap();
        assert_eq!(sink.len(), 1);
    }
}
