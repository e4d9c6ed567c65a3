//! The two calendar operations exposed to the backend, both thin HTTP
//! calls against the calendar store's `/api/events` routes.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::tool::CalendarTool;
use crate::error::VoiceError;

fn required_str<'a>(args: &'a Value, field: &str) -> Result<&'a str, VoiceError> {
    args.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| VoiceError::ToolDispatch(format!("missing required field: {}", field)))
}

/// `add_calendar_event` — create an event, then nudge the UI to re-fetch
/// its list. The nudge fires only on a confirmed create and is not part
/// of the tool response.
pub struct AddCalendarEvent {
    client: reqwest::Client,
    base_url: String,
    refresh_tx: mpsc::Sender<()>,
}

impl AddCalendarEvent {
    pub fn new(client: reqwest::Client, base_url: String, refresh_tx: mpsc::Sender<()>) -> Self {
        Self {
            client,
            base_url,
            refresh_tx,
        }
    }
}

#[async_trait]
impl CalendarTool for AddCalendarEvent {
    fn name(&self) -> &str {
        "add_calendar_event"
    }

    fn description(&self) -> &str {
        "Add an event to the user's calendar"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "title": { "type": "STRING", "description": "The title of the event" },
                "start_time": { "type": "STRING", "description": "The start time in ISO format" },
                "end_time": { "type": "STRING", "description": "The end time in ISO format (optional)" },
                "description": { "type": "STRING", "description": "A brief description (optional)" }
            },
            "required": ["title", "start_time"]
        })
    }

    async fn call(&self, args: Value) -> Result<Value, VoiceError> {
        let title = required_str(&args, "title")?;
        let start_time = required_str(&args, "start_time")?;

        let mut body = json!({
            "title": title,
            "start_time": start_time,
        });
        for optional in ["end_time", "description"] {
            if let Some(value) = args.get(optional).and_then(|v| v.as_str()) {
                body[optional] = json!(value);
            }
        }

        let response = self
            .client
            .post(format!("{}/api/events", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                VoiceError::ToolDispatch(format!("calendar store request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(VoiceError::ToolDispatch(format!(
                "calendar store rejected the event: HTTP {}",
                response.status()
            )));
        }

        if self.refresh_tx.try_send(()).is_err() {
            log::warn!("UI refresh notice dropped, receiver unavailable");
        }

        Ok(json!({
            "success": true,
            "message": "Event scheduled successfully"
        }))
    }
}

/// `list_calendar_events` — fetch the full event list, ordered by start
/// time, and embed it in the response payload.
pub struct ListCalendarEvents {
    client: reqwest::Client,
    base_url: String,
}

impl ListCalendarEvents {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl CalendarTool for ListCalendarEvents {
    fn name(&self) -> &str {
        "list_calendar_events"
    }

    fn description(&self) -> &str {
        "List all events currently on the user's calendar"
    }

    fn parameters(&self) -> Value {
        json!({ "type": "OBJECT", "properties": {} })
    }

    async fn call(&self, _args: Value) -> Result<Value, VoiceError> {
        let response = self
            .client
            .get(format!("{}/api/events", self.base_url))
            .send()
            .await
            .map_err(|e| {
                VoiceError::ToolDispatch(format!("calendar store request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(VoiceError::ToolDispatch(format!(
                "calendar store returned HTTP {}",
                response.status()
            )));
        }

        let events: Value = response.json().await.map_err(|e| {
            VoiceError::ToolDispatch(format!("invalid calendar store response: {}", e))
        })?;

        Ok(json!({
            "success": true,
            "events": events
        }))
    }
}
