use crate::core::{Frame, Packet, PlaybackClock, Result, StageError, StageEvent};
use crate::player::stage::{log_ctx, PipelineStage, StageHandle};
use log::{debug, error, info, warn};
use std::thread;
use std::time::Duration;

// 按时钟节奏等待的单次上限，保证 stop 能被及时观察到
const MAX_PACING_DELAY: Duration = Duration::from_millis(100);

/// 解码循环的主体：处理一个数据包（一个工作单元）
///
/// 暂停 / 单步 / 停止由循环本身处理，主体只关心数据。
/// 循环只在 try_pause() 挂起；除此之外，主体里唯一可能长时间阻塞的地方是
/// 已暂停输出端的 write()，stop / 销毁会先解除输出端暂停来释放它。
pub trait StageBody: Send + 'static {
    fn process(&mut self, stage: &StageHandle, packet: Packet) -> Result<()>;

    /// demux 结束且队列已取空时调用一次
    fn finish(&mut self, _stage: &StageHandle) -> Result<()> {
        Ok(())
    }
}

/// 标准解码主体：解码器 -> 滤镜链 -> 输出端（或输出集合）
///
/// 设置了时钟时按 pts 分片等待，阶段暂停或停止时立即结束等待。
#[derive(Debug, Default)]
pub struct DecodeBody;

impl DecodeBody {
    fn deliver(stage: &StageHandle, mut frame: Frame) -> Result<()> {
        stage.apply_filters(&mut frame);

        if let Some(clock) = stage.clock() {
            Self::pace(stage, &clock, frame.pts);
        }
        if stage.is_stopped() {
            return Ok(());
        }

        match stage.output_set().filter(|set| !set.is_empty()) {
            Some(set) => set.send_frame(&frame)?,
            None => match stage.output() {
                Some(output) => output.write(&frame)?,
                None => return Ok(()),
            },
        }
        if let Some(stats) = stage.statistics() {
            stats.add_output();
        }
        Ok(())
    }

    fn pace(stage: &StageHandle, clock: &PlaybackClock, pts: i64) {
        loop {
            let delay = clock.delay_until(pts);
            if delay.is_zero() || stage.is_stopped() || stage.is_paused() {
                return;
            }
            thread::sleep(delay.min(MAX_PACING_DELAY));
        }
    }

    fn deliver_all(stage: &StageHandle, frames: Vec<Frame>) -> Result<()> {
        if let Some(stats) = stage.statistics() {
            stats.add_decoded(frames.len() as u64);
        }
        for frame in frames {
            if stage.is_stopped() {
                break;
            }
            Self::deliver(stage, frame)?;
        }
        Ok(())
    }
}

impl StageBody for DecodeBody {
    fn process(&mut self, stage: &StageHandle, packet: Packet) -> Result<()> {
        let decoder = stage
            .decoder()
            .ok_or_else(|| StageError::DecodeError(format!("{} 未设置解码器", stage.name())))?;
        let frames = decoder.lock().decode(&packet)?;
        Self::deliver_all(stage, frames)
    }

    fn finish(&mut self, stage: &StageHandle) -> Result<()> {
        let Some(decoder) = stage.decoder() else {
            return Ok(());
        };
        let frames = decoder.lock().flush()?;
        debug!("{} flush 得到 {} 帧", stage.name(), frames.len());
        Self::deliver_all(stage, frames)
    }
}

impl PipelineStage {
    /// 在独立线程上启动解码循环
    pub fn start<B: StageBody>(&self, body: B) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(StageError::AlreadyRunning(self.name().to_string()));
        }
        if let Some(finished) = worker.take() {
            if finished.join().is_err() {
                warn!("{} ⚠ {} 上一次运行的工作线程异常退出", log_ctx(), self.name());
            }
        }

        let name = self.name().to_string();
        let handle = self.handle();
        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(handle, body))
            .map_err(|source| StageError::SpawnError { name, source })?;
        *worker = Some(join);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// 等待工作线程退出（不会主动停止，需要先 stop() 或 set_demux_ended(true)）
    pub fn wait(&self) -> Result<()> {
        let worker = self.worker.lock().take();
        match worker {
            Some(handle) => handle
                .join()
                .map_err(|_| StageError::WorkerPanicked(self.name().to_string())),
            None => Ok(()),
        }
    }
}

fn run_loop<B: StageBody>(stage: StageHandle, mut body: B) {
    info!("{} 🎬 {} 工作线程启动", log_ctx(), stage.name());
    stage.emit(StageEvent::Started);

    let timeout = stage.config().take_timeout();
    // 单步期间没等到数据包时不能再次进入挂起点，否则会丢掉这一步
    let mut skip_checkpoint = false;
    let mut processed: u64 = 0;

    loop {
        if stage.is_stopped() {
            break;
        }
        if !skip_checkpoint {
            stage.try_pause();
            if stage.is_stopped() {
                break;
            }
        }
        skip_checkpoint = false;

        // 只在取出待更新列表时持锁，回调里可以再访问阶段
        let pending = {
            let _lock = stage.lock();
            stage.take_outputs_to_update()
        };
        for output in pending {
            debug!("{} 更新输出端参数: {}", stage.name(), output.name());
            output.update_parameters();
        }

        let Some(packet) = stage.packet_queue().take_timeout(timeout) else {
            if stage.is_stopped() {
                break;
            }
            if stage.is_demux_ended() && stage.packet_queue().is_empty() {
                info!("{} 📄 {} demux 已结束，队列已取空", log_ctx(), stage.name());
                if let Err(e) = body.finish(&stage) {
                    error!("{} ❌ {} 收尾失败: {}", log_ctx(), stage.name(), e);
                }
                break;
            }
            skip_checkpoint = stage.is_next_pause();
            continue;
        };

        if let Some(stats) = stage.statistics() {
            stats.add_packet();
        }
        processed += 1;
        if let Err(e) = body.process(&stage, packet) {
            warn!("{} {} 处理数据包失败（已跳过）: {}", log_ctx(), stage.name(), e);
            if let Some(stats) = stage.statistics() {
                stats.add_error();
            }
        }
    }

    info!("{} 🛑 {} 工作线程退出（共处理 {} 个包）", log_ctx(), stage.name(), processed);
    stage.emit(StageEvent::Stopped);
}
