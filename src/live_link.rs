//! The live session link: one bidirectional WebSocket to the speech
//! backend, owned together with its lifecycle state machine.
//!
//! Inbound frames are classified once and routed: audio to the playback
//! channel, tool-call batches to the registry (responses written back on
//! the same socket), interruption to playback, transport close/error to
//! the controller. Outbound capture frames are forwarded one message per
//! frame, in arrival order.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::audio::{pcm, PlaybackCommand};
use crate::config::SessionConfig;
use crate::error::VoiceError;
use crate::protocol::{
    classify, RealtimeInputMessage, ServerEvent, SetupMessage, ToolResponseMessage,
};
use crate::state_machine::SessionState;
use crate::tools::ToolRegistry;

/// Lifecycle notifications for the controller.
#[derive(Debug)]
pub enum LinkEvent {
    /// The backend acknowledged the stream; the session is usable.
    Connected,
    /// The session ended. `reason` is set on failure, `None` on a clean
    /// locally requested close.
    Closed { reason: Option<String> },
}

#[derive(Debug)]
pub enum LinkCommand {
    /// One encoded capture frame to transmit.
    SendAudioFrame(String),
    /// Graceful shutdown request. Safe to send at any time.
    Close,
}

pub struct LiveLink {
    config: SessionConfig,
    state: SessionState,
    closing: bool,
    tx: mpsc::Sender<LinkEvent>,
    rx_cmd: mpsc::Receiver<LinkCommand>,
    playback_tx: mpsc::Sender<PlaybackCommand>,
    tools: Arc<ToolRegistry>,
}

impl LiveLink {
    pub fn new(
        config: SessionConfig,
        tx: mpsc::Sender<LinkEvent>,
        rx_cmd: mpsc::Receiver<LinkCommand>,
        playback_tx: mpsc::Sender<PlaybackCommand>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            closing: false,
            tx,
            rx_cmd,
            playback_tx,
            tools,
        }
    }

    /// Connect, run to completion, and report how the session ended.
    /// No automatic reconnect: the controller surfaces the failure and a
    /// fresh link is built for the next session.
    pub async fn run(mut self) {
        let result = self.connect_and_loop().await;
        self.set_state(SessionState::Closed);

        let reason = match result {
            Ok(()) => None,
            Err(e) => {
                log::error!("Session ended with error: {}", e);
                Some(e.to_string())
            }
        };
        let _ = self.tx.send(LinkEvent::Closed { reason }).await;
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition(next) {
            log::warn!("Illegal state transition {:?} -> {:?}", self.state, next);
            return;
        }
        log::debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    async fn connect_and_loop(&mut self) -> Result<(), VoiceError> {
        self.set_state(SessionState::Connecting);

        let endpoint = format!(
            "{}?key={}",
            self.config.ws_url, self.config.api_key
        );
        let url = Url::parse(&endpoint)
            .map_err(|e| VoiceError::Connection(format!("invalid endpoint: {}", e)))?;

        log::info!(
            "Connecting to {}...",
            url.host_str().unwrap_or(&self.config.ws_url)
        );
        let (ws_stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| VoiceError::Connection(format!("handshake failed: {}", e)))?;
        log::info!("Connected, sending setup...");

        let (mut write, mut read) = ws_stream.split();

        // One-time session configuration: system instruction with the
        // current wall clock, response modality and voice, tool schemas.
        let setup = SetupMessage::new(
            &self.config.model,
            &self.config.voice,
            system_instruction(),
            self.tools.declarations(),
        );
        let setup_json = serde_json::to_string(&setup)
            .map_err(|e| VoiceError::Connection(format!("setup serialization: {}", e)))?;
        write
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| VoiceError::Connection(format!("setup send failed: {}", e)))?;

        // 主循环：服务器消息和本地命令
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let events = match classify(&text) {
                                Ok(events) => events,
                                Err(e) => {
                                    log::debug!("Ignoring unparseable frame: {}", e);
                                    continue;
                                }
                            };
                            for event in events {
                                match event {
                                    ServerEvent::SetupComplete => {
                                        if self.state == SessionState::Connecting {
                                            self.set_state(SessionState::Open);
                                            log::info!("Session open");
                                            let _ = self.tx.send(LinkEvent::Connected).await;
                                        }
                                    }
                                    ServerEvent::AudioPayload(data) => {
                                        match pcm::decode_payload(&data) {
                                            Ok(samples) => {
                                                if self
                                                    .playback_tx
                                                    .send(PlaybackCommand::Chunk(samples))
                                                    .await
                                                    .is_err()
                                                {
                                                    log::warn!("Playback channel gone, dropping audio");
                                                }
                                            }
                                            // Drop the bad buffer, keep the stream alive
                                            Err(e) => log::warn!("{}", e),
                                        }
                                    }
                                    ServerEvent::Interrupted => {
                                        log::info!("Barge-in: flushing playback");
                                        if self
                                            .playback_tx
                                            .send(PlaybackCommand::Interrupt)
                                            .await
                                            .is_err()
                                        {
                                            log::warn!("Playback channel gone, interrupt dropped");
                                        }
                                    }
                                    ServerEvent::ToolCalls(calls) => {
                                        for call in calls {
                                            log::info!(
                                                "Tool call: {} (id {:?})",
                                                call.name,
                                                call.id
                                            );
                                            let response = self.tools.dispatch(call).await;
                                            let reply = ToolResponseMessage::single(response);
                                            match serde_json::to_string(&reply) {
                                                Ok(text) => {
                                                    // Best-effort once the socket is going down
                                                    if let Err(e) = write
                                                        .send(Message::Text(text.into()))
                                                        .await
                                                    {
                                                        log::warn!(
                                                            "Tool response not sent: {}",
                                                            e
                                                        );
                                                    }
                                                }
                                                Err(e) => log::error!(
                                                    "Tool response serialization: {}",
                                                    e
                                                ),
                                            }
                                        }
                                    }
                                    ServerEvent::TurnComplete => {
                                        log::debug!("Model turn complete");
                                    }
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            log::info!("Server closed connection: {:?}", frame);
                            if self.closing {
                                return Ok(());
                            }
                            return Err(VoiceError::Connection(
                                "connection closed by server".to_string(),
                            ));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            if self.closing {
                                return Ok(());
                            }
                            return Err(VoiceError::Connection(e.to_string()));
                        }
                        None => {
                            if self.closing {
                                return Ok(());
                            }
                            return Err(VoiceError::Connection(
                                "connection closed".to_string(),
                            ));
                        }
                    }
                }
                Some(cmd) = self.rx_cmd.recv() => {
                    match cmd {
                        LinkCommand::SendAudioFrame(data) => {
                            if !self.state.is_open() || self.closing {
                                log::debug!("Dropping capture frame, session not open");
                                continue;
                            }
                            let msg = RealtimeInputMessage::audio_frame(data);
                            let text = serde_json::to_string(&msg).map_err(|e| {
                                VoiceError::Connection(format!("frame serialization: {}", e))
                            })?;
                            write
                                .send(Message::Text(text.into()))
                                .await
                                .map_err(|e| VoiceError::Connection(e.to_string()))?;
                        }
                        LinkCommand::Close => {
                            if self.closing {
                                continue;
                            }
                            self.closing = true;
                            log::info!("Closing session...");
                            if let Err(e) = write.send(Message::Close(None)).await {
                                log::debug!("Close frame not sent: {}", e);
                                return Ok(());
                            }
                        }
                    }
                }
                else => return Ok(()),
            }
        }
    }
}

fn system_instruction() -> String {
    let now = chrono::Local::now().format("%A %Y-%m-%d %H:%M:%S");
    format!(
        "You are a helpful calendar assistant. The current time is {}. \
         You can help users schedule events and check their existing schedule. \
         When a user wants to schedule something, use the add_calendar_event tool. \
         When a user asks what's on their calendar or asks about their schedule, \
         use the list_calendar_events tool. \
         Always confirm the details before scheduling.",
        now
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalendarConfig;
    use crate::tools::init_tool_registry;

    fn link_for(ws_url: &str) -> (LiveLink, mpsc::Receiver<LinkEvent>, mpsc::Sender<LinkCommand>) {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (playback_tx, _playback_rx) = mpsc::channel(8);
        let (refresh_tx, _refresh_rx) = mpsc::channel(8);
        let registry = Arc::new(init_tool_registry(&CalendarConfig::default(), refresh_tx));
        let config = SessionConfig {
            ws_url: ws_url.to_string(),
            api_key: "test-key".to_string(),
            ..SessionConfig::default()
        };
        (
            LiveLink::new(config, event_tx, cmd_rx, playback_tx, registry),
            event_rx,
            cmd_tx,
        )
    }

    #[tokio::test]
    async fn failed_handshake_surfaces_error_and_never_opens() {
        // Nothing listens on the discard port: the handshake must fail.
        let (link, mut event_rx, _cmd_tx) = link_for("ws://127.0.0.1:9");
        link.run().await;

        match event_rx.recv().await {
            Some(LinkEvent::Closed { reason }) => assert!(reason.is_some()),
            other => panic!("expected Closed with a reason, got {:?}", other),
        }
        // No Connected event was ever emitted
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn invalid_endpoint_is_a_connection_error() {
        let (link, mut event_rx, _cmd_tx) = link_for("not a url");
        link.run().await;

        match event_rx.recv().await {
            Some(LinkEvent::Closed { reason }) => {
                assert!(reason.unwrap().contains("connection error"));
            }
            other => panic!("expected Closed, got {:?}", other),
        }
    }
}
