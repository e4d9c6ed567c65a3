//! ALSA PCM device wrappers for the bridge's two fixed-rate endpoints:
//! float capture at 16 kHz and i16 playback at 24 kHz, both mono.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};

use super::{CAPTURE_PERIOD_SAMPLES, CAPTURE_SAMPLE_RATE, CHANNEL_COUNT, PLAYBACK_SAMPLE_RATE};
use crate::error::VoiceError;

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct DeviceParams {
    /// Actual sample rate after negotiation
    pub sample_rate: u32,
    /// Period size in frames
    pub period_size: usize,
}

/// Open the microphone device for capture.
///
/// Native float samples, one period per capture block. An EACCES/EPERM
/// refusal from the device is a permission error; anything else (missing
/// device, busy device) is a device error.
pub fn open_capture(device: &str) -> Result<(PCM, DeviceParams), VoiceError> {
    open_pcm(
        device,
        Direction::Capture,
        CAPTURE_SAMPLE_RATE,
        Format::FloatLE,
        Some(CAPTURE_PERIOD_SAMPLES),
        "Capture",
    )
}

/// Open the speaker device for playback (S16LE, decoded stream rate).
pub fn open_playback(device: &str) -> Result<(PCM, DeviceParams), VoiceError> {
    open_pcm(
        device,
        Direction::Playback,
        PLAYBACK_SAMPLE_RATE,
        Format::S16LE,
        None,
        "Playback",
    )
}

fn open_pcm(
    device: &str,
    direction: Direction,
    sample_rate: u32,
    format: Format,
    period_size: Option<usize>,
    dir_name: &str,
) -> Result<(PCM, DeviceParams), VoiceError> {
    let pcm = PCM::new(device, direction, false)
        .map_err(|e| classify_open_error(device, direction, &e))?;

    configure(&pcm, sample_rate, format, period_size).map_err(|e| {
        VoiceError::Device(format!(
            "failed to configure PCM device '{}' for {}: {}",
            device, dir_name, e
        ))
    })?;

    // Read back actual negotiated parameters
    let params = {
        let hwp = pcm
            .hw_params_current()
            .map_err(|e| VoiceError::Device(format!("failed to read hw params: {}", e)))?;
        let rate = hwp
            .get_rate()
            .map_err(|e| VoiceError::Device(format!("failed to read rate: {}", e)))?;
        let ps = hwp
            .get_period_size()
            .map_err(|e| VoiceError::Device(format!("failed to read period size: {}", e)))?;
        DeviceParams {
            sample_rate: rate,
            period_size: ps as usize,
        }
    };

    log::info!(
        "ALSA {}: device={}, rate={}, period_size={}",
        dir_name,
        device,
        params.sample_rate,
        params.period_size,
    );

    Ok((pcm, params))
}

fn configure(
    pcm: &PCM,
    sample_rate: u32,
    format: Format,
    period_size: Option<usize>,
) -> alsa::Result<()> {
    let hwp = HwParams::any(pcm)?;
    hwp.set_access(Access::RWInterleaved)?;
    hwp.set_format(format)?;
    hwp.set_channels(CHANNEL_COUNT)?;
    hwp.set_rate_near(sample_rate, ValueOr::Nearest)?;
    if let Some(ps) = period_size {
        hwp.set_period_size_near(ps as alsa::pcm::Frames, ValueOr::Nearest)?;
    }
    pcm.hw_params(&hwp)
}

fn classify_open_error(device: &str, direction: Direction, e: &alsa::Error) -> VoiceError {
    let errno = e.errno();
    if errno == libc::EACCES || errno == libc::EPERM {
        VoiceError::Permission(format!("device '{}': {}", device, e))
    } else {
        let dir_name = match direction {
            Direction::Capture => "capture",
            Direction::Playback => "playback",
        };
        VoiceError::Device(format!(
            "failed to open {} device '{}': {}",
            dir_name, device, e
        ))
    }
}
