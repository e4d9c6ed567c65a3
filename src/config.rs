use serde::Deserialize;

/// Runtime configuration, loaded from `voicecal.toml` in the working
/// directory. Every section falls back to its default so a missing or
/// partial file still produces a usable config.
pub const CONFIG_PATH: &str = "voicecal.toml";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub calendar: CalendarConfig,
    pub audio: AudioConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Live stream endpoint (bidirectional WebSocket)
    pub ws_url: String,
    /// API key, appended as a query parameter. `GEMINI_API_KEY` overrides.
    pub api_key: String,
    pub model: String,
    /// Prebuilt voice used for spoken responses
    pub voice: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent".to_string(),
            api_key: String::new(),
            model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice: "Zephyr".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Calendar store base URL (events live under `{base_url}/api/events`)
    pub base_url: String,
    /// Per-request timeout for tool HTTP calls, in ms
    pub timeout_ms: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    /// ALSA playback device name
    pub playback_device: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_device: "default".to_string(),
            playback_device: "default".to_string(),
        }
    }
}

// UI进程和Core进程通过本地UDP通信，端口在这里指定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub local_port: u16,
    pub remote_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            local_port: 8990,
            remote_port: 8991,
        }
    }
}

impl Config {
    /// Load from `voicecal.toml` if present, otherwise defaults.
    /// The API key can always be supplied via the environment.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string(CONFIG_PATH) {
            Ok(text) => match toml::from_str(&text) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Invalid {}: {}. Using defaults.", CONFIG_PATH, e);
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        };

        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                config.session.api_key = key;
            }
        }

        config
    }
}
