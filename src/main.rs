mod audio;
mod config;
mod controller;
mod error;
mod live_link;
mod protocol;
mod state_machine;
mod tools;
mod ui_bridge;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::mpsc;

use audio::{PlaybackChannel, PlaybackCommand};
use config::Config;
use controller::CoreController;
use live_link::{LinkCommand, LinkEvent, LiveLink};
use ui_bridge::UiBridge;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    env_logger::init();

    // 加载配置
    let config = Config::load();
    if config.session.api_key.is_empty() {
        log::warn!("No API key configured (set GEMINI_API_KEY or voicecal.toml)");
    }

    // 创建通道，用于组件间通信
    let (tx_link_event, mut rx_link_event) = mpsc::channel::<LinkEvent>(100);
    let (tx_link_cmd, rx_link_cmd) = mpsc::channel::<LinkCommand>(100);
    let (playback_tx, playback_rx) = mpsc::channel::<PlaybackCommand>(100);
    let (frame_tx, mut rx_frame) = mpsc::channel::<String>(100);
    let (tx_ui_cmd, mut rx_ui_cmd) = mpsc::channel(100);
    let (refresh_tx, mut rx_refresh) = mpsc::channel::<()>(16);

    // 启动UI桥，与UI进程通信
    let ui_bridge = Arc::new(UiBridge::new(&config, tx_ui_cmd).await?);
    let ui_bridge_clone = ui_bridge.clone();
    tokio::spawn(async move {
        if let Err(e) = ui_bridge_clone.run().await {
            log::error!("UiBridge error: {}", e);
        }
    });

    // 打开扬声器，启动播放线程
    let mut playback = PlaybackChannel::start(&config.audio, playback_rx)?;

    // 注册日历工具，启动会话
    let registry = Arc::new(tools::init_tool_registry(&config.calendar, refresh_tx));
    let link = LiveLink::new(
        config.session.clone(),
        tx_link_event,
        rx_link_cmd,
        playback_tx.clone(),
        registry,
    );
    tokio::spawn(link.run());

    let mut controller = CoreController::new(config, tx_link_cmd, frame_tx, ui_bridge);
    controller.push_initial_state().await;

    log::info!("Voicecal core started");

    // 主事件循环，处理各组件事件
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                break;
            }

            Some(event) = rx_link_event.recv() => {
                controller.handle_link_event(event).await;
            }

            Some(command) = rx_ui_cmd.recv() => {
                if controller.handle_ui_command(command).await {
                    log::info!("Shutdown requested by UI");
                    break;
                }
            }

            Some(frame) = rx_frame.recv() => {
                controller.forward_frame(frame).await;
            }

            Some(()) = rx_refresh.recv() => {
                controller.notify_events_refresh().await;
            }
        }
    }

    controller.shutdown().await;
    playback.stop();
    Ok(())
}
