//! Wire messages of the bidirectional live stream, plus the single routing
//! step that folds an inbound frame into a [`ServerEvent`].
//!
//! The stream is JSON text both ways. Outbound: one `setup` message at
//! connection open, then `realtimeInput` audio frames and `toolResponse`
//! replies. Inbound: `setupComplete`, `serverContent` (inline audio,
//! interruption and turn flags), and `toolCall` batches. Unknown message
//! kinds are ignored, not errors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const CAPTURE_MIME_TYPE: &str = "audio/pcm;rate=16000";

// ======================== Outbound ========================

/// One-time session configuration, sent immediately after connect.
#[derive(Serialize)]
pub struct SetupMessage {
    setup: Setup,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
    tools: Vec<ToolDeclarations>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

/// Declares one callable tool to the backend: name, description, and a
/// JSON schema for its arguments.
#[derive(Serialize, Clone)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl SetupMessage {
    pub fn new(
        model: &str,
        voice: &str,
        system_instruction: String,
        declarations: Vec<FunctionDeclaration>,
    ) -> Self {
        Self {
            setup: Setup {
                model: model.to_string(),
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: voice.to_string(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![TextPart {
                        text: system_instruction,
                    }],
                },
                tools: vec![ToolDeclarations {
                    function_declarations: declarations,
                }],
            },
        }
    }
}

/// One captured audio frame on its way to the backend.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    realtime_input: RealtimeInput,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput {
    media_chunks: Vec<MediaChunk>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk {
    mime_type: String,
    data: String,
}

impl RealtimeInputMessage {
    /// Wrap one base64 PCM frame. Frames are sent individually, in capture
    /// order; there is no batching.
    pub fn audio_frame(data: String) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![MediaChunk {
                    mime_type: CAPTURE_MIME_TYPE.to_string(),
                    data,
                }],
            },
        }
    }
}

/// Correlated reply to a tool call.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseMessage {
    tool_response: ToolResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolResponse {
    function_responses: Vec<FunctionResponse>,
}

#[derive(Serialize, Debug)]
pub struct FunctionResponse {
    /// Echo of the backend-assigned call id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

impl ToolResponseMessage {
    pub fn single(response: FunctionResponse) -> Self {
        Self {
            tool_response: ToolResponse {
                function_responses: vec![response],
            },
        }
    }
}

// ======================== Inbound ========================

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCallBatch>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Deserialize, Debug)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Part {
    inline_data: Option<InlineData>,
}

#[derive(Deserialize, Debug)]
struct InlineData {
    data: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ToolCallBatch {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

/// A named operation the backend asks us to run locally.
#[derive(Deserialize, Debug, Clone)]
pub struct FunctionCall {
    pub id: Option<String>,
    pub name: String,
    pub args: Option<Value>,
}

/// Everything the session loop reacts to, in delivery order.
#[derive(Debug)]
pub enum ServerEvent {
    SetupComplete,
    /// Base64 PCM payload; decoding happens at the playback boundary.
    AudioPayload(String),
    ToolCalls(Vec<FunctionCall>),
    Interrupted,
    TurnComplete,
}

/// Classify one inbound text frame. A single frame may carry several
/// events; audio parts are emitted before the interruption flag, tool
/// calls last.
pub fn classify(text: &str) -> Result<Vec<ServerEvent>, serde_json::Error> {
    let msg: ServerMessage = serde_json::from_str(text)?;
    let mut events = Vec::new();

    if msg.setup_complete.is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(content) = msg.server_content {
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(inline) = part.inline_data {
                    events.push(ServerEvent::AudioPayload(inline.data));
                }
            }
        }
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if let Some(batch) = msg.tool_call {
        if !batch.function_calls.is_empty() {
            events.push(ServerEvent::ToolCalls(batch.function_calls));
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_serializes_with_camel_case_keys() {
        let msg = SetupMessage::new(
            "models/test-model",
            "Zephyr",
            "instruction".to_string(),
            vec![FunctionDeclaration {
                name: "add_calendar_event".to_string(),
                description: "Add an event".to_string(),
                parameters: json!({"type": "OBJECT"}),
            }],
        );
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"setup\""));
        assert!(text.contains("\"responseModalities\":[\"AUDIO\"]"));
        assert!(text.contains("\"voiceName\":\"Zephyr\""));
        assert!(text.contains("\"functionDeclarations\""));
        assert!(text.contains("\"systemInstruction\""));
        assert!(text.contains("add_calendar_event"));
    }

    #[test]
    fn audio_frame_carries_capture_mime_type() {
        let text =
            serde_json::to_string(&RealtimeInputMessage::audio_frame("QUJD".to_string())).unwrap();
        assert!(text.contains("\"realtimeInput\""));
        assert!(text.contains("\"mimeType\":\"audio/pcm;rate=16000\""));
        assert!(text.contains("\"data\":\"QUJD\""));
    }

    #[test]
    fn tool_response_echoes_call_id() {
        let msg = ToolResponseMessage::single(FunctionResponse {
            id: Some("call-7".to_string()),
            name: "list_calendar_events".to_string(),
            response: json!({"success": true}),
        });
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"toolResponse\""));
        assert!(text.contains("\"functionResponses\""));
        assert!(text.contains("\"id\":\"call-7\""));
    }

    #[test]
    fn classifies_setup_complete() {
        let events = classify(r#"{"setupComplete":{}}"#).unwrap();
        assert!(matches!(events.as_slice(), [ServerEvent::SetupComplete]));
    }

    #[test]
    fn classifies_audio_parts_in_order() {
        let text = r#"{"serverContent":{"modelTurn":{"parts":[
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAAA"}},
            {"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"BBBB"}}
        ]}}}"#;
        let events = classify(text).unwrap();
        match events.as_slice() {
            [ServerEvent::AudioPayload(a), ServerEvent::AudioPayload(b)] => {
                assert_eq!(a, "AAAA");
                assert_eq!(b, "BBBB");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn audio_precedes_interruption_in_the_same_frame() {
        let text = r#"{"serverContent":{
            "modelTurn":{"parts":[{"inlineData":{"data":"AAAA"}}]},
            "interrupted":true
        }}"#;
        let events = classify(text).unwrap();
        assert!(matches!(
            events.as_slice(),
            [ServerEvent::AudioPayload(_), ServerEvent::Interrupted]
        ));
    }

    #[test]
    fn classifies_tool_call_batch() {
        let text = r#"{"toolCall":{"functionCalls":[
            {"id":"c1","name":"add_calendar_event","args":{"title":"Standup"}},
            {"id":"c2","name":"list_calendar_events"}
        ]}}"#;
        let events = classify(text).unwrap();
        match events.as_slice() {
            [ServerEvent::ToolCalls(calls)] => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].id.as_deref(), Some("c1"));
                assert_eq!(calls[0].name, "add_calendar_event");
                assert_eq!(calls[1].args, None);
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[test]
    fn unknown_message_kinds_are_ignored() {
        assert!(classify(r#"{"usageMetadata":{"totalTokens":12}}"#)
            .unwrap()
            .is_empty());
        assert!(classify(r#"{}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        assert!(classify("not json").is_err());
    }
}
