//! audio - microphone capture, speaker playback, and the PCM transport codec.
//!
//! Real-time I/O runs on dedicated OS threads (NOT tokio tasks) to avoid
//! contention with the async network path, bridged to it by mpsc channels.
//! ALSA for device I/O; the wire carries raw PCM16 in base64.

mod alsa_device;
mod capture;
mod playback;
pub mod pcm;

pub use capture::CaptureChannel;
pub use playback::{PlaybackChannel, PlaybackCommand};

/// Microphone sample rate mandated by the streaming protocol.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;
/// Sample rate of audio streamed back by the backend.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;
/// Samples per capture block (one encoded frame per block).
pub const CAPTURE_PERIOD_SAMPLES: usize = 4096;
/// Everything is mono.
pub const CHANNEL_COUNT: u32 = 1;
