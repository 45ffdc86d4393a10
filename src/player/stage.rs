use crate::core::{Frame, PlaybackClock, StageConfig, StageEvent, StageState, Statistics};
use crate::player::decoder::SharedDecoder;
use crate::player::filter::{self, Filter, FilterContext};
use crate::player::output::{same_output, OutputSet, SharedOutput, SubscriptionId};
use crate::player::packet_queue::PacketQueue;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::ops::Deref;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

// 事件通道容量，满时丢弃新事件
const EVENT_CAPACITY: usize = 64;

pub(crate) fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 暂停相关标志，由阶段互斥锁保护
#[derive(Debug, Default)]
struct PauseState {
    paused: bool,
    next_pause: bool,
    // next_and_pause() 发放的单步许可，try_pause() 消费一次
    step_pending: bool,
}

pub(crate) struct StageShared {
    pub(crate) config: StageConfig,
    state: Mutex<PauseState>,
    cond: Condvar,
    stop: AtomicBool,
    demux_ended: AtomicBool,
    packets: PacketQueue,
    clock: RwLock<Option<PlaybackClock>>,
    decoder: RwLock<Option<SharedDecoder>>,
    output: RwLock<Option<SharedOutput>>,
    output_set: Mutex<Option<(Arc<OutputSet>, SubscriptionId)>>,
    filters: Mutex<Vec<Box<dyn Filter>>>,
    filter_context: Mutex<Option<FilterContext>>,
    update_outputs: Mutex<Vec<SharedOutput>>,
    statistics: RwLock<Option<Arc<Statistics>>>,
    events: Sender<StageEvent>,
}

/// 阶段句柄 - 可在任意线程间克隆传递
///
/// 控制方法（pause / stop / set_decoder ...）可以从任意线程调用；
/// try_pause() 只应由运行解码循环的那个线程调用。
#[derive(Clone)]
pub struct StageHandle {
    pub(crate) shared: Arc<StageShared>,
}

/// 阶段锁守卫，作用域结束自动释放
///
/// 持有期间不要调用 pause / next_and_pause / stop / reset_state，否则会自锁。
pub struct StageLock<'a> {
    guard: MutexGuard<'a, PauseState>,
}

impl StageLock<'_> {
    pub fn is_paused(&self) -> bool {
        self.guard.paused
    }

    pub fn is_next_pause(&self) -> bool {
        self.guard.next_pause
    }
}

impl StageHandle {
    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &StageConfig {
        &self.shared.config
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// 是否处于单步模式（循环处理完一个单元后应重新暂停）
    pub fn is_next_pause(&self) -> bool {
        self.shared.state.lock().next_pause
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    pub fn is_demux_ended(&self) -> bool {
        self.shared.demux_ended.load(Ordering::SeqCst)
    }

    pub fn set_demux_ended(&self, ended: bool) {
        self.shared.demux_ended.store(ended, Ordering::SeqCst);
    }

    pub fn state(&self) -> StageState {
        if self.is_stopped() {
            return StageState::Stopped;
        }
        let state = self.shared.state.lock();
        match (state.paused, state.next_pause) {
            (true, true) => StageState::SteppingThenPaused,
            (true, false) => StageState::Paused,
            _ => StageState::Running,
        }
    }

    /// 暂停 / 恢复。状态未变化时什么也不做（不唤醒、不修改标志）
    pub fn pause(&self, p: bool) {
        let mut state = self.shared.state.lock();
        if state.paused == p {
            return;
        }
        state.paused = p;
        if !p {
            debug!("{} {} 唤醒暂停的线程", log_ctx(), self.name());
            state.next_pause = false;
            state.step_pending = false;
            self.shared.cond.notify_all();
        }
    }

    /// 单步：处理下一帧后再暂停
    pub fn next_and_pause(&self) {
        let mut state = self.shared.state.lock();
        state.next_pause = true;
        state.paused = true;
        state.step_pending = true;
        self.shared.cond.notify_all();
    }

    /// 工作线程的安全挂起点
    ///
    /// 未暂停时立即返回 false；否则等待直到 pause(false)、next_and_pause()
    /// 或销毁将其唤醒，返回 true。等待期间每次醒来都会重新检查条件，
    /// 虚假唤醒不会导致提前返回。
    pub fn try_pause(&self) -> bool {
        let mut state = self.shared.state.lock();
        if !state.paused && !state.next_pause {
            return false;
        }
        self.emit(StageEvent::Paused(true));
        while !state.step_pending
            && (state.paused || state.next_pause)
            && !self.shared.stop.load(Ordering::SeqCst)
        {
            self.shared.cond.wait(&mut state);
        }
        state.step_pending = false;
        drop(state);
        debug!("{} {} 暂停的线程已被唤醒", log_ctx(), self.name());
        self.emit(StageEvent::Paused(false));
        true
    }

    /// 停止。先解除暂停和输出端暂停，再置停止标志，最后让 take() 不再阻塞
    pub fn stop(&self) {
        info!("{} ⏹ {} stop()", log_ctx(), self.name());
        self.pause(false);
        self.release_outputs();
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.packets.set_blocking(false);
        self.shared.packets.clear();
    }

    /// 恢复到可重新播放的初始状态（不销毁滤镜、不重建队列）
    pub fn reset_state(&self) {
        info!("{} 🔄 {} reset_state()", log_ctx(), self.name());
        self.pause(false);
        // 重新播放时必须解除，否则第一帧就会卡住
        self.release_outputs();
        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.demux_ended.store(false, Ordering::SeqCst);
        self.shared.packets.set_blocking(true);
        self.shared.packets.clear();
        *self.shared.filter_context.lock() = None;
    }

    /// 强制解除输出端及输出集合中所有输出端的暂停，工作线程可能正阻塞在它们的 write() 上
    fn release_outputs(&self) {
        if let Some(output) = self.output() {
            output.pause(false);
        }
        if let Some(set) = self.output_set() {
            set.pause(false);
        }
    }

    /// 获取阶段锁，用于和解码循环同步较大的状态切换（例如更换解码器）
    pub fn lock(&self) -> StageLock<'_> {
        StageLock {
            guard: self.shared.state.lock(),
        }
    }

    pub fn packet_queue(&self) -> &PacketQueue {
        &self.shared.packets
    }

    pub fn set_clock(&self, clock: Option<PlaybackClock>) {
        *self.shared.clock.write() = clock;
    }

    pub fn clock(&self) -> Option<PlaybackClock> {
        self.shared.clock.read().clone()
    }

    pub fn set_decoder(&self, decoder: Option<SharedDecoder>) {
        *self.shared.decoder.write() = decoder;
    }

    pub fn decoder(&self) -> Option<SharedDecoder> {
        self.shared.decoder.read().clone()
    }

    pub fn set_output(&self, output: Option<SharedOutput>) {
        *self.shared.output.write() = output;
    }

    pub fn output(&self) -> Option<SharedOutput> {
        self.shared.output.read().clone()
    }

    /// 替换输出集合并订阅其 "参数需要更新" 通知；旧集合的订阅会被取消
    pub fn set_output_set(&self, set: Option<Arc<OutputSet>>) {
        let mut current = self.shared.output_set.lock();
        if let Some((old, id)) = current.take() {
            old.unsubscribe(id);
        }
        *current = set.map(|set| {
            let weak: Weak<StageShared> = Arc::downgrade(&self.shared);
            let id = set.subscribe(move |output| {
                if let Some(shared) = weak.upgrade() {
                    StageHandle { shared }.add_output_to_be_updated(output.clone());
                }
            });
            (set, id)
        });
    }

    pub fn output_set(&self) -> Option<Arc<OutputSet>> {
        self.shared
            .output_set
            .lock()
            .as_ref()
            .map(|(set, _)| set.clone())
    }

    /// 记录需要更新参数的输出端（去重）
    pub fn add_output_to_be_updated(&self, output: SharedOutput) {
        let mut pending = self.shared.update_outputs.lock();
        if pending.iter().any(|o| same_output(o, &output)) {
            return;
        }
        pending.push(output);
    }

    /// 取出并清空待更新的输出端
    pub fn take_outputs_to_update(&self) -> Vec<SharedOutput> {
        std::mem::take(&mut *self.shared.update_outputs.lock())
    }

    pub fn pending_output_updates(&self) -> usize {
        self.shared.update_outputs.lock().len()
    }

    pub fn set_statistics(&self, statistics: Option<Arc<Statistics>>) {
        *self.shared.statistics.write() = statistics;
    }

    pub fn statistics(&self) -> Option<Arc<Statistics>> {
        self.shared.statistics.read().clone()
    }

    /// 替换整个滤镜链，旧滤镜随之销毁
    pub fn set_filters(&self, filters: Vec<Box<dyn Filter>>) {
        *self.shared.filters.lock() = filters;
    }

    /// 追加滤镜，同名滤镜已存在时返回 false
    pub fn install_filter(&self, filter: Box<dyn Filter>) -> bool {
        let mut filters = self.shared.filters.lock();
        if filters.iter().any(|f| f.name() == filter.name()) {
            return false;
        }
        debug!("{} 安装滤镜: {}", self.name(), filter.describe());
        filters.push(filter);
        true
    }

    pub fn uninstall_filter(&self, name: &str) -> Option<Box<dyn Filter>> {
        let mut filters = self.shared.filters.lock();
        let index = filters.iter().position(|f| f.name() == name)?;
        Some(filters.remove(index))
    }

    pub fn filter_names(&self) -> Vec<String> {
        self.shared
            .filters
            .lock()
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    /// 让帧依次通过滤镜链，处理上下文按需创建
    pub fn apply_filters(&self, frame: &mut Frame) {
        let mut filters = self.shared.filters.lock();
        if filters.is_empty() {
            return;
        }
        let mut context = self.shared.filter_context.lock();
        filter::apply_chain(&mut filters, context.get_or_insert_with(FilterContext::default), frame);
    }

    pub fn filter_context(&self) -> Option<FilterContext> {
        self.shared.filter_context.lock().clone()
    }

    pub(crate) fn emit(&self, event: StageEvent) {
        // 通道满时丢弃，不阻塞工作线程
        let _ = self.shared.events.try_send(event);
    }

    /// 强制拆除：唤醒一切等待者后再释放资源
    fn teardown(&self) {
        self.shared.demux_ended.store(true, Ordering::SeqCst);
        self.shared.stop.store(true, Ordering::SeqCst);
        {
            let mut state = self.shared.state.lock();
            if state.paused || state.next_pause {
                debug!("{} {} 销毁时唤醒暂停的线程", log_ctx(), self.name());
            }
            state.paused = false;
            state.next_pause = false;
            state.step_pending = false;
            self.shared.cond.notify_all();
        }
        self.shared.packets.set_blocking(false);
        self.shared.packets.clear();
        *self.shared.filter_context.lock() = None;
        self.shared.filters.lock().clear();
        self.shared.update_outputs.lock().clear();
        if let Some((set, id)) = self.shared.output_set.lock().take() {
            set.unsubscribe(id);
        }
    }
}

/// 流水线阶段 - 拥有包队列、滤镜链和工作线程
///
/// 阶段以组合的方式持有一个工作线程（见 `worker`），drop 时强制拆除并等待线程退出。
pub struct PipelineStage {
    handle: StageHandle,
    pub(crate) worker: Mutex<Option<JoinHandle<()>>>,
    events: Receiver<StageEvent>,
}

impl PipelineStage {
    pub fn new(config: StageConfig) -> Self {
        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        let shared = StageShared {
            packets: PacketQueue::new(config.queue_capacity, config.queue_threshold),
            config,
            state: Mutex::new(PauseState::default()),
            cond: Condvar::new(),
            stop: AtomicBool::new(false),
            demux_ended: AtomicBool::new(false),
            clock: RwLock::new(None),
            decoder: RwLock::new(None),
            output: RwLock::new(None),
            output_set: Mutex::new(None),
            filters: Mutex::new(Vec::new()),
            filter_context: Mutex::new(None),
            update_outputs: Mutex::new(Vec::new()),
            statistics: RwLock::new(None),
            events: events_tx,
        };
        Self {
            handle: StageHandle {
                shared: Arc::new(shared),
            },
            worker: Mutex::new(None),
            events: events_rx,
        }
    }

    pub fn handle(&self) -> StageHandle {
        self.handle.clone()
    }

    /// 生命周期事件流
    pub fn events(&self) -> Receiver<StageEvent> {
        self.events.clone()
    }
}

impl Deref for PipelineStage {
    type Target = StageHandle;

    fn deref(&self) -> &StageHandle {
        &self.handle
    }
}

impl Drop for PipelineStage {
    fn drop(&mut self) {
        // 拆除会解除输出集合的订阅，先释放输出端
        self.handle.release_outputs();
        self.handle.teardown();
        if let Some(worker) = self.worker.get_mut().take() {
            if worker.join().is_err() {
                warn!("{} ⚠ {} 工作线程异常退出", log_ctx(), self.handle.name());
            }
        }
    }
}
