//! The controller façade: composes capture, playback, link, and UI bridge
//! behind three observable values (connected, recording, error) and the
//! start/stop recording operations.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use crate::audio::CaptureChannel;
use crate::config::Config;
use crate::error::VoiceError;
use crate::live_link::{LinkCommand, LinkEvent};
use crate::ui_bridge::{UiBridge, UiCommand};

pub struct CoreController {
    config: Config,
    connected: bool,
    recording: bool,
    error: Option<String>,
    capture: Option<CaptureChannel>,
    net_tx: mpsc::Sender<LinkCommand>,
    frame_tx: mpsc::Sender<String>,
    ui: Arc<UiBridge>,
}

impl CoreController {
    pub fn new(
        config: Config,
        net_tx: mpsc::Sender<LinkCommand>,
        frame_tx: mpsc::Sender<String>,
        ui: Arc<UiBridge>,
    ) -> Self {
        Self {
            config,
            connected: false,
            recording: false,
            error: None,
            capture: None,
            net_tx,
            frame_tx,
            ui,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Connected => {
                log::info!("Session connected");
                self.connected = true;
                self.error = None;
                self.push_state().await;
            }
            LinkEvent::Closed { reason } => {
                log::info!("Session closed (reason: {:?})", reason);
                self.connected = false;
                self.stop_capture();
                self.error = reason;
                self.push_state().await;
            }
        }
    }

    /// Returns `true` when the UI asked the whole process to exit.
    pub async fn handle_ui_command(&mut self, command: UiCommand) -> bool {
        match command {
            UiCommand::StartRecording => self.start_recording().await,
            UiCommand::StopRecording => self.stop_recording().await,
            UiCommand::Shutdown => return true,
        }
        false
    }

    /// Acquire the microphone and begin streaming. Requires an open
    /// session; device and permission failures land in the observable
    /// error state instead of propagating.
    pub async fn start_recording(&mut self) {
        if self.recording {
            return;
        }
        if !self.connected {
            self.error = Some("session is not open".to_string());
            self.push_state().await;
            return;
        }

        match CaptureChannel::start(&self.config.audio, self.frame_tx.clone()) {
            Ok(capture) => {
                self.capture = Some(capture);
                self.recording = true;
                self.error = None;
            }
            Err(e @ VoiceError::Permission(_)) => {
                log::warn!("{}", e);
                self.error = Some("Microphone access denied.".to_string());
            }
            Err(e) => {
                log::warn!("{}", e);
                self.error = Some(e.to_string());
            }
        }
        self.push_state().await;
    }

    /// Release the microphone. Safe in every state, from failure paths too.
    pub async fn stop_recording(&mut self) {
        let was_recording = self.recording;
        self.stop_capture();
        if was_recording {
            self.push_state().await;
        }
    }

    fn stop_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.recording = false;
    }

    /// Forward one encoded capture frame to the session, in capture order.
    pub async fn forward_frame(&mut self, frame: String) {
        if !self.recording || !self.connected {
            return;
        }
        if let Err(e) = self.net_tx.send(LinkCommand::SendAudioFrame(frame)).await {
            log::warn!("Failed to hand frame to session: {}", e);
        }
    }

    /// One-way notice that the event list changed; the UI re-fetches.
    pub async fn notify_events_refresh(&self) {
        self.ui
            .send_message(&json!({ "type": "events_refresh" }).to_string())
            .await;
    }

    /// Graceful teardown: close the session, then release the microphone.
    pub async fn shutdown(&mut self) {
        let _ = self.net_tx.send(LinkCommand::Close).await;
        self.stop_capture();
        self.push_state().await;
    }

    async fn push_state(&self) {
        let state = json!({
            "type": "state",
            "connected": self.is_connected(),
            "recording": self.is_recording(),
            "error": self.error(),
        });
        self.ui.send_message(&state.to_string()).await;
    }

    /// Initial snapshot so the UI starts from known values.
    pub async fn push_initial_state(&self) {
        self.push_state().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn controller() -> (
        CoreController,
        mpsc::Receiver<LinkCommand>,
        mpsc::Receiver<UiCommand>,
    ) {
        let mut config = Config::default();
        // Ephemeral port; state pushes go nowhere.
        config.ui.local_port = 0;
        let (ui_tx, ui_rx) = mpsc::channel(8);
        let ui = Arc::new(UiBridge::new(&config, ui_tx).await.unwrap());
        let (net_tx, net_rx) = mpsc::channel(8);
        let (frame_tx, _frame_rx) = mpsc::channel(8);
        (
            CoreController::new(config, net_tx, frame_tx, ui),
            net_rx,
            ui_rx,
        )
    }

    #[tokio::test]
    async fn connect_then_close_clears_recording_and_surfaces_reason() {
        let (mut controller, _net_rx, _ui_rx) = controller().await;

        controller.handle_link_event(LinkEvent::Connected).await;
        assert!(controller.is_connected());
        assert!(controller.error().is_none());

        controller
            .handle_link_event(LinkEvent::Closed {
                reason: Some("handshake failed".to_string()),
            })
            .await;
        assert!(!controller.is_connected());
        assert!(!controller.is_recording());
        assert_eq!(controller.error(), Some("handshake failed"));
    }

    #[tokio::test]
    async fn start_recording_requires_an_open_session() {
        let (mut controller, _net_rx, _ui_rx) = controller().await;

        controller.start_recording().await;
        assert!(!controller.is_recording());
        assert_eq!(controller.error(), Some("session is not open"));
    }

    #[tokio::test]
    async fn stop_recording_is_always_safe() {
        let (mut controller, _net_rx, _ui_rx) = controller().await;
        controller.stop_recording().await;
        controller.stop_recording().await;
        assert!(!controller.is_recording());
    }

    #[tokio::test]
    async fn frames_are_dropped_unless_recording_on_an_open_session() {
        let (mut controller, mut net_rx, _ui_rx) = controller().await;

        controller.forward_frame("QUJD".to_string()).await;
        assert!(net_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn shutdown_requests_a_session_close() {
        let (mut controller, mut net_rx, _ui_rx) = controller().await;
        controller.shutdown().await;
        assert!(matches!(net_rx.try_recv(), Ok(LinkCommand::Close)));
    }
}
