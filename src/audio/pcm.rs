//! PCM16 transport codec.
//!
//! The live stream carries mono PCM16 as base64 text: capture-side float
//! samples are quantized to little-endian i16 pairs, playback-side payloads
//! decode back to i16 samples. Both rates are fixed by the protocol, so no
//! resampling happens here.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::VoiceError;

/// Maximum positive 16-bit magnitude used for quantization. Scaling by
/// 0x7FFF (instead of 0x8000) keeps -1.0 inside the i16 range.
const I16_SCALE: f32 = 32767.0;

/// Quantize float samples in [-1.0, 1.0] to PCM16 and return the base64
/// transport encoding. Out-of-range samples are clamped first.
pub fn encode_frame(samples: &[f32]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let quantized = (sample.clamp(-1.0, 1.0) * I16_SCALE) as i16;
        bytes.extend_from_slice(&quantized.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Decode a base64 transport payload back to PCM16 samples.
///
/// The protocol does not produce malformed payloads, but a bad one must
/// never take the playback path down, so both failure modes are errors.
pub fn decode_payload(data: &str) -> Result<Vec<i16>, VoiceError> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| VoiceError::Decode(format!("invalid base64: {}", e)))?;

    if bytes.len() % 2 != 0 {
        return Err(VoiceError::Decode(format!(
            "odd byte count: {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
