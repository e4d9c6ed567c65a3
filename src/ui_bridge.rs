use std::sync::Arc;

use serde::Deserialize;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::Config;

/// Commands the UI process can issue.
#[derive(Debug, PartialEq, Eq)]
pub enum UiCommand {
    StartRecording,
    StopRecording,
    Shutdown,
}

#[derive(Deserialize)]
struct UiMessage {
    #[serde(rename = "type")]
    msg_type: String,
}

// UI进程和Core进程通过本地UDP通信，端口在配置中指定
pub struct UiBridge {
    socket: Arc<UdpSocket>,
    target_addr: String,
    tx: mpsc::Sender<UiCommand>,
}

impl UiBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<UiCommand>) -> anyhow::Result<Self> {
        // 绑定本地UDP端口
        let socket = UdpSocket::bind(format!("0.0.0.0:{}", config.ui.local_port)).await?;
        let target_addr = format!("127.0.0.1:{}", config.ui.remote_port);

        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            tx,
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = [0u8; 4096];
        loop {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                continue;
            }
            let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                continue;
            };
            let Some(command) = parse_command(text) else {
                log::debug!("Unhandled UI message: {}", text);
                continue;
            };
            if self.tx.send(command).await.is_err() {
                log::warn!("UI command receiver dropped, stopping bridge");
                break;
            }
        }
        Ok(())
    }

    /// Fire-and-forget JSON datagram to the UI process.
    pub async fn send_message(&self, msg: &str) {
        if let Err(e) = self.socket.send_to(msg.as_bytes(), &self.target_addr).await {
            log::warn!("Failed to send to UI: {}", e);
        }
    }
}

fn parse_command(text: &str) -> Option<UiCommand> {
    let msg: UiMessage = serde_json::from_str(text).ok()?;
    match msg.msg_type.as_str() {
        "start_recording" => Some(UiCommand::StartRecording),
        "stop_recording" => Some(UiCommand::StopRecording),
        "shutdown" => Some(UiCommand::Shutdown),
        _ => None,
    }
}
