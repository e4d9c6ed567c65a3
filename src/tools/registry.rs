use std::collections::HashMap;

use serde_json::json;

use super::tool::CalendarTool;
use crate::protocol::{FunctionCall, FunctionDeclaration, FunctionResponse};

/// Name-keyed tool set. Dispatch never fails outward: every request,
/// including one naming an unknown tool, produces exactly one response
/// echoing the originating call id.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn CalendarTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register_tool(&mut self, tool: Box<dyn CalendarTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool declarations for the session setup message.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.values().map(|t| t.declaration()).collect()
    }

    /// Execute one call and build its correlated response. Failures are
    /// isolated: they become `success:false` payloads and never touch the
    /// connection or any other dispatch.
    pub async fn dispatch(&self, call: FunctionCall) -> FunctionResponse {
        let payload = match self.tools.get(&call.name) {
            Some(tool) => {
                let args = call.args.unwrap_or_else(|| json!({}));
                match tool.call(args).await {
                    Ok(result) => result,
                    Err(e) => {
                        log::warn!("Tool '{}' failed: {}", call.name, e);
                        json!({ "success": false, "error": e.to_string() })
                    }
                }
            }
            None => {
                log::warn!("Unknown tool requested: {}", call.name);
                json!({
                    "success": false,
                    "error": format!("unknown tool: {}", call.name)
                })
            }
        };

        FunctionResponse {
            id: call.id,
            name: call.name,
            response: payload,
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::init_tool_registry;
    use crate::config::CalendarConfig;
    use serde_json::Value;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// One-shot HTTP server answering a canned response.
    async fn canned_server(status_line: &'static str, body: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        addr
    }

    fn registry_for(addr: SocketAddr) -> (ToolRegistry, mpsc::Receiver<()>) {
        let (refresh_tx, refresh_rx) = mpsc::channel(8);
        let config = CalendarConfig {
            base_url: format!("http://{}", addr),
            timeout_ms: 2000,
        };
        (init_tool_registry(&config, refresh_tx), refresh_rx)
    }

    fn call(id: &str, name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            id: Some(id.to_string()),
            name: name.to_string(),
            args: Some(args),
        }
    }

    #[tokio::test]
    async fn add_event_success_notifies_ui_once() {
        let addr = canned_server("200 OK", r#"{"id":1}"#).await;
        let (registry, mut refresh_rx) = registry_for(addr);

        let response = registry
            .dispatch(call(
                "c1",
                "add_calendar_event",
                json!({"title": "Standup", "start_time": "2024-01-01T09:00:00Z"}),
            ))
            .await;

        assert_eq!(response.id.as_deref(), Some("c1"));
        assert_eq!(response.response["success"], json!(true));
        assert!(refresh_rx.try_recv().is_ok());
        assert!(refresh_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn add_event_rejection_is_a_failure_without_notice() {
        let addr = canned_server("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let (registry, mut refresh_rx) = registry_for(addr);

        let response = registry
            .dispatch(call(
                "c2",
                "add_calendar_event",
                json!({"title": "Standup", "start_time": "2024-01-01T09:00:00Z"}),
            ))
            .await;

        assert_eq!(response.response["success"], json!(false));
        assert!(response.response["error"].as_str().unwrap().contains("500"));
        assert!(refresh_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn missing_required_field_never_reaches_the_store() {
        // Unroutable base URL: validation must fail first.
        let (refresh_tx, mut refresh_rx) = mpsc::channel(8);
        let config = CalendarConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 200,
        };
        let registry = init_tool_registry(&config, refresh_tx);

        let response = registry
            .dispatch(call("c3", "add_calendar_event", json!({"title": "no start"})))
            .await;

        assert_eq!(response.response["success"], json!(false));
        assert!(response.response["error"]
            .as_str()
            .unwrap()
            .contains("start_time"));
        assert!(refresh_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn list_events_embeds_the_fetched_collection() {
        let addr = canned_server(
            "200 OK",
            r#"[{"id":1,"title":"Standup","start_time":"2024-01-01T09:00:00Z"}]"#,
        )
        .await;
        let (registry, _refresh_rx) = registry_for(addr);

        let response = registry
            .dispatch(call("c4", "list_calendar_events", json!({})))
            .await;

        assert_eq!(response.response["success"], json!(true));
        assert_eq!(response.response["events"][0]["title"], json!("Standup"));
    }

    #[tokio::test]
    async fn unknown_tool_echoes_id_with_an_error() {
        let (refresh_tx, mut refresh_rx) = mpsc::channel(8);
        let registry = init_tool_registry(&CalendarConfig::default(), refresh_tx);

        let response = registry
            .dispatch(call("c5", "delete_everything", json!({})))
            .await;

        assert_eq!(response.id.as_deref(), Some("c5"));
        assert_eq!(response.name, "delete_everything");
        assert_eq!(response.response["success"], json!(false));
        assert!(response.response["error"]
            .as_str()
            .unwrap()
            .contains("unknown tool"));
        assert!(refresh_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn declarations_cover_the_registered_set() {
        let (refresh_tx, _rx) = mpsc::channel(8);
        let registry = init_tool_registry(&CalendarConfig::default(), refresh_tx);
        let mut names: Vec<String> = registry
            .declarations()
            .into_iter()
            .map(|d| d.name)
            .collect();
        names.sort();
        assert_eq!(names, ["add_calendar_event", "list_calendar_events"]);
    }
}
