//! Speaker playback: a FIFO of decoded PCM16 buffers rendered one at a
//! time, in arrival order, with barge-in interruption.
//!
//! The ordering logic lives in [`PlaybackQueue`], a pure idle/playing state
//! machine driven by three external events (enqueue, playback finished,
//! interrupt). A dedicated OS thread owns the ALSA playback device and
//! feeds those events in; interrupts take effect between period-sized
//! writes so a buffer can be cut mid-flight.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use alsa::pcm::{IO, PCM};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::alsa_device;
use crate::config::AudioConfig;
use crate::error::VoiceError;

/// Commands accepted by the playback thread.
#[derive(Debug)]
pub enum PlaybackCommand {
    /// Decoded PCM16 buffer to append to the queue.
    Chunk(Vec<i16>),
    /// Barge-in: discard everything pending and whatever is mid-flight.
    Interrupt,
}

/// Pure FIFO + "currently playing" state machine.
///
/// Mutated only from the playback thread, so no locking — just correct
/// sequencing of the three events. Each transition returns the buffer the
/// device should start rendering next, if any.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    pending: VecDeque<Vec<i16>>,
    playing: bool,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a buffer. Returns the head to start when nothing is playing;
    /// while something plays the buffer just waits its turn.
    pub fn enqueue(&mut self, buffer: Vec<i16>) -> Option<Vec<i16>> {
        self.pending.push_back(buffer);
        if self.playing {
            return None;
        }
        self.playing = true;
        self.pending.pop_front()
    }

    /// Playback-complete event: hand over the next buffer, or go idle.
    /// A stray completion while idle is ignored.
    pub fn finished(&mut self) -> Option<Vec<i16>> {
        if !self.playing {
            return None;
        }
        match self.pending.pop_front() {
            Some(next) => Some(next),
            None => {
                self.playing = false;
                None
            }
        }
    }

    /// Clear all pending buffers and mark nothing as playing. The next
    /// `enqueue` starts a fresh cycle.
    pub fn interrupt(&mut self) {
        self.pending.clear();
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Exclusive owner of the speaker device for the life of the process.
pub struct PlaybackChannel {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackChannel {
    /// Open the playback device and start consuming commands.
    /// Open errors are reported back synchronously.
    pub fn start(
        config: &AudioConfig,
        rx: mpsc::Receiver<PlaybackCommand>,
    ) -> Result<Self, VoiceError> {
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), VoiceError>>();

        let handle = {
            let running = running.clone();
            let device = config.playback_device.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || playback_thread(&device, rx, &running, &ready_tx))
                .map_err(|e| {
                    VoiceError::Device(format!("failed to spawn playback thread: {}", e))
                })?
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
                    "playback thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }

    /// Signal the thread to stop. It is detached here; it exits on the next
    /// command or when the command senders are dropped.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.handle.take();
    }
}

impl Drop for PlaybackChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

fn playback_thread(
    device: &str,
    mut rx: mpsc::Receiver<PlaybackCommand>,
    running: &AtomicBool,
    ready_tx: &std_mpsc::Sender<Result<(), VoiceError>>,
) {
    let (pcm, params) = match alsa_device::open_playback(device) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let io = match pcm.io_i16() {
        Ok(io) => io,
        Err(e) => {
            let _ = ready_tx.send(Err(VoiceError::Device(format!(
                "failed to map playback I/O: {}",
                e
            ))));
            return;
        }
    };

    let _ = ready_tx.send(Ok(()));

    log::info!(
        "Playback started: rate={}, period={}",
        params.sample_rate,
        params.period_size,
    );

    let period = params.period_size.max(256);
    let mut queue = PlaybackQueue::new();

    'outer: while running.load(Ordering::Relaxed) {
        // Idle: block until the next command arrives (or all senders drop)
        let cmd = match rx.blocking_recv() {
            Some(cmd) => cmd,
            None => break,
        };

        let mut current = match cmd {
            PlaybackCommand::Chunk(samples) => queue.enqueue(samples),
            PlaybackCommand::Interrupt => {
                if queue.is_playing() || queue.pending_len() > 0 {
                    log::info!("Interrupt: dropping {} pending buffers", queue.pending_len());
                }
                queue.interrupt();
                None
            }
        };

        // Render until the queue runs dry; completion of one buffer is the
        // event that starts the next.
        while let Some(buffer) = current {
            if !running.load(Ordering::Relaxed) {
                break 'outer;
            }
            match render_buffer(&pcm, &io, &buffer, period, &mut queue, &mut rx) {
                Ok(Rendered::Completed) => current = queue.finished(),
                Ok(Rendered::Interrupted) => {
                    // Flush whatever the hardware still holds
                    let _ = pcm.drop();
                    let _ = pcm.prepare();
                    current = None;
                }
                Err(e) => {
                    log::error!("Playback device failure: {}", e);
                    break 'outer;
                }
            }
        }
    }

    log::info!("Playback stopped");
}

enum Rendered {
    Completed,
    Interrupted,
}

/// Write one buffer to the device in period-sized slices, draining commands
/// between writes so an interrupt lands with at most one period of latency.
/// Chunks arriving mid-buffer simply queue behind it.
fn render_buffer(
    pcm: &PCM,
    io: &IO<i16>,
    buffer: &[i16],
    period: usize,
    queue: &mut PlaybackQueue,
    rx: &mut mpsc::Receiver<PlaybackCommand>,
) -> Result<Rendered, VoiceError> {
    let mut offset = 0;
    let mut recoveries = 0u32;

    while offset < buffer.len() {
        loop {
            match rx.try_recv() {
                Ok(PlaybackCommand::Interrupt) => {
                    queue.interrupt();
                    return Ok(Rendered::Interrupted);
                }
                Ok(PlaybackCommand::Chunk(samples)) => {
                    let _ = queue.enqueue(samples);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let end = (offset + period).min(buffer.len());
        match io.writei(&buffer[offset..end]) {
            Ok(frames) => {
                offset += frames;
                recoveries = 0;
            }
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                recoveries += 1;
                pcm.prepare().map_err(|e2| {
                    VoiceError::Device(format!("failed to recover PCM playback: {}", e2))
                })?;
                if recoveries >= 3 {
                    log::error!(
                        "Max recovery retries reached, dropping {} unwritten samples",
                        buffer.len() - offset
                    );
                    break;
                }
            }
        }
    }

    Ok(Rendered::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(tag: i16) -> Vec<i16> {
        vec![tag; 4]
    }

    #[test]
    fn plays_in_arrival_order() {
        let mut queue = PlaybackQueue::new();

        // First enqueue starts immediately
        assert_eq!(queue.enqueue(buf(1)), Some(buf(1)));
        assert!(queue.is_playing());

        // Later arrivals wait their turn
        assert_eq!(queue.enqueue(buf(2)), None);
        assert_eq!(queue.enqueue(buf(3)), None);
        assert_eq!(queue.pending_len(), 2);

        // Completions drive strictly sequential playback
        assert_eq!(queue.finished(), Some(buf(2)));
        assert_eq!(queue.finished(), Some(buf(3)));
        assert_eq!(queue.finished(), None);
        assert!(!queue.is_playing());
    }

    #[test]
    fn stray_completion_while_idle_is_ignored() {
        let mut queue = PlaybackQueue::new();
        assert_eq!(queue.finished(), None);
        assert!(!queue.is_playing());
        // Still starts cleanly afterwards
        assert_eq!(queue.enqueue(buf(9)), Some(buf(9)));
    }

    #[test]
    fn interrupt_discards_everything() {
        let mut queue = PlaybackQueue::new();
        assert_eq!(queue.enqueue(buf(1)), Some(buf(1)));
        assert_eq!(queue.enqueue(buf(2)), None);

        queue.interrupt();
        assert!(!queue.is_playing());
        assert_eq!(queue.pending_len(), 0);

        // Next enqueue starts a fresh cycle with the new buffer, never B2
        assert_eq!(queue.enqueue(buf(3)), Some(buf(3)));
        assert_eq!(queue.finished(), None);
    }

    #[test]
    fn interrupt_while_idle_is_harmless() {
        let mut queue = PlaybackQueue::new();
        queue.interrupt();
        assert_eq!(queue.enqueue(buf(1)), Some(buf(1)));
    }
}
