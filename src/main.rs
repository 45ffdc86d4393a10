use anyhow::Result;
use log::info;
use myy_pipeline::player::decoder::shared;
use myy_pipeline::player::{BufferedSink, PassthroughDecoder, PtsOffsetFilter};
use myy_pipeline::{
    DecodeBody, FrameKind, OutputSet, Packet, PipelineStage, PlaybackClock, StageConfig,
    StageEvent, Statistics,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    // 可选：第一个参数为阶段配置 JSON 文件
    let config = match std::env::args().nth(1) {
        Some(path) => StageConfig::from_file(&path)?,
        None => StageConfig::named("video"),
    };
    info!("🎬 流水线演示启动: {:?}", config);

    let clock = PlaybackClock::new();
    let stats = Arc::new(Statistics::new());
    let sink = Arc::new(BufferedSink::new("video-out"));
    let outputs = Arc::new(OutputSet::new());
    outputs.add_output(sink.clone());

    let stage = PipelineStage::new(config);
    stage.set_clock(Some(clock.clone()));
    stage.set_decoder(Some(shared(PassthroughDecoder::new(FrameKind::Video))));
    stage.set_output_set(Some(outputs.clone()));
    stage.set_statistics(Some(stats.clone()));
    stage.install_filter(Box::new(PtsOffsetFilter::new(0)));

    let events = stage.events();
    thread::spawn(move || {
        for event in events.iter() {
            info!("📣 阶段事件: {:?}", event);
            if event == StageEvent::Stopped {
                break;
            }
        }
    });

    // 上游生产者：25fps 的 100 个数据包
    let producer = {
        let handle = stage.handle();
        thread::spawn(move || {
            for i in 0..100i64 {
                if handle.is_stopped() {
                    break;
                }
                handle.packet_queue().put(Packet::new(i * 40, vec![i as u8; 16]).with_duration(40));
            }
            handle.set_demux_ended(true);
        })
    };

    clock.play();
    stage.start(DecodeBody)?;

    thread::sleep(Duration::from_millis(500));
    info!("⏸ 暂停，已输出 {} 帧", stats.snapshot().frames_output);
    stage.pause(true);
    clock.pause();

    for _ in 0..3 {
        stage.next_and_pause();
        thread::sleep(Duration::from_millis(100));
        info!("⏭ 单步，已输出 {} 帧", stats.snapshot().frames_output);
    }

    outputs.request_update_all();
    clock.play();
    stage.pause(false);
    info!("▶ 继续播放");

    thread::sleep(Duration::from_millis(500));
    stage.stop();
    stage.wait()?;
    let _ = producer.join();

    info!(
        "✅ 演示结束: {}，缓冲帧 {}，参数更新 {} 次",
        serde_json::to_string(&stats.snapshot())?,
        sink.len(),
        sink.parameter_updates()
    );
    Ok(())
}
