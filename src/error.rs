//! Error taxonomy for the voice bridge core.
//!
//! Device, permission, and connection failures surface to the controller's
//! observable error state; tool dispatch failures never leave the registry
//! (they become structured failure responses); decode failures drop the
//! offending buffer. Nothing here terminates the process.

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("microphone access denied: {0}")]
    Permission(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    ToolDispatch(String),

    #[error("malformed audio payload: {0}")]
    Decode(String),
}
