//! Microphone capture channel: ALSA capture → PCM codec → session frames.
//!
//! One dedicated OS thread reads fixed-size float blocks on the device's
//! period cadence, encodes each block, and hands it off. There is no
//! buffering: a frame the receiver cannot take immediately is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{alsa_device, pcm};
use crate::config::AudioConfig;
use crate::error::VoiceError;

/// Exclusive owner of the microphone device while recording.
///
/// `start` opens the device and begins delivery; `stop` releases it.
/// `stop` is idempotent and safe to call from failure paths; dropping the
/// channel stops it as well.
pub struct CaptureChannel {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureChannel {
    /// Acquire the microphone and start periodic frame delivery.
    ///
    /// The device is opened on the capture thread, but open errors are
    /// reported back synchronously so a denied microphone surfaces as
    /// `Permission` and a missing device as `Device` right here.
    pub fn start(
        config: &AudioConfig,
        frame_tx: mpsc::Sender<String>,
    ) -> Result<Self, VoiceError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), VoiceError>>();

        let handle = {
            let running = running.clone();
            let device = config.capture_device.clone();
            thread::Builder::new()
                .name("mic-capture".into())
                .spawn(move || capture_thread(&device, frame_tx, &running, &ready_tx))
                .map_err(|e| VoiceError::Device(format!("failed to spawn capture thread: {}", e)))?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                running,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(VoiceError::Device(
                    "capture thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    /// Release the device and halt delivery. No-op when already stopped.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for CaptureChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_thread(
    device: &str,
    frame_tx: mpsc::Sender<String>,
    running: &AtomicBool,
    ready_tx: &std_mpsc::Sender<Result<(), VoiceError>>,
) {
    let (pcm, params) = match alsa_device::open_capture(device) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let io = match pcm.io_f32() {
        Ok(io) => io,
        Err(e) => {
            let _ = ready_tx.send(Err(VoiceError::Device(format!(
                "failed to map capture I/O: {}",
                e
            ))));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    log::info!(
        "Recording started: rate={}, block={} samples",
        params.sample_rate,
        params.period_size,
    );

    let mut block = vec![0f32; params.period_size];

    while running.load(Ordering::Relaxed) {
        // Read one period from ALSA (mono: one sample per frame)
        match io.readi(&mut block) {
            Ok(0) => continue,
            Ok(frames) => {
                let frame = pcm::encode_frame(&block[..frames]);
                match frame_tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        // No backpressure at this layer: drop and move on.
                        log::warn!("Session cannot accept capture frame, dropping it");
                    }
                    Err(TrySendError::Closed(_)) => {
                        log::warn!("Frame receiver dropped, stopping capture");
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                if let Err(e2) = pcm.prepare() {
                    log::error!("Failed to recover PCM capture: {}", e2);
                    break;
                }
            }
        }
    }

    log::info!("Recording stopped");
}
