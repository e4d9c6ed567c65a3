pub mod calendar;
pub mod registry;
pub mod tool;

pub use registry::ToolRegistry;

use tokio::sync::mpsc;

use crate::config::CalendarConfig;
use calendar::{AddCalendarEvent, ListCalendarEvents};

/// Build the registry with the fixed calendar tool set. `refresh_tx`
/// carries the one-way "event list changed" notice to the UI side.
pub fn init_tool_registry(
    config: &CalendarConfig,
    refresh_tx: mpsc::Sender<()>,
) -> ToolRegistry {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(config.timeout_ms))
        .build()
        .unwrap_or_default();

    let mut registry = ToolRegistry::new();
    for tool in [
        Box::new(AddCalendarEvent::new(
            client.clone(),
            config.base_url.clone(),
            refresh_tx,
        )) as Box<dyn tool::CalendarTool>,
        Box::new(ListCalendarEvents::new(client, config.base_url.clone())),
    ] {
        log::info!("Registered tool: {}", tool.name());
        registry.register_tool(tool);
    }
    registry
}
