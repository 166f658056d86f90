//! Capability implementations for Jarvis.
//!
//! Each capability is a `jarvis_core::Tool` backed by an external service:
//! the weather via Open-Meteo and the user's Google Calendar. Backends sit
//! behind traits so the formatting and error policy can be tested offline.

pub mod calendar;
pub mod google_calendar;
pub mod weather;

use std::sync::Arc;
use std::time::Duration;

use jarvis_config::AppConfig;
use jarvis_core::error::ToolError;
use jarvis_core::tool::ToolRegistry;
use tracing::info;

pub use calendar::{CalendarBackend, CalendarService, CreateEventTool, ViewCalendarTool};
pub use google_calendar::{GoogleCalendarBackend, TokenStore};
pub use weather::{OpenMeteoBackend, WeatherBackend, WeatherTool};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the registry from configuration.
///
/// All collaborators share one HTTP client. The calendar tools are left out
/// when `[calendar] enabled = false`.
pub fn default_registry(config: &AppConfig) -> Result<ToolRegistry, ToolError> {
    let client = http_client()?;

    let weather = Arc::new(OpenMeteoBackend::from_config(client.clone(), &config.weather));

    let calendar = config
        .calendar
        .enabled
        .then(|| calendar_service(client, config));

    let registry = build_registry(weather, calendar);
    info!(tools = ?registry.names(), "Capability catalog ready");
    Ok(registry)
}

/// Only `view_calendar` and `create_event`, for the MCP server.
pub fn calendar_registry(config: &AppConfig) -> Result<ToolRegistry, ToolError> {
    let service = calendar_service(http_client()?, config);
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ViewCalendarTool::new(service.clone())));
    registry.register(Box::new(CreateEventTool::new(service)));
    Ok(registry)
}

fn http_client() -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "registry".into(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

fn calendar_service(client: reqwest::Client, config: &AppConfig) -> Arc<CalendarService> {
    let backend = Arc::new(GoogleCalendarBackend::from_config(client, &config.calendar));
    Arc::new(CalendarService::new(backend, address(config)))
}

/// Assemble the catalog in its fixed order: weather, calendar view, event creation.
pub fn build_registry(
    weather: Arc<dyn WeatherBackend>,
    calendar: Option<Arc<CalendarService>>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WeatherTool::new(weather)));
    if let Some(service) = calendar {
        registry.register(Box::new(ViewCalendarTool::new(service.clone())));
        registry.register(Box::new(CreateEventTool::new(service)));
    }
    registry
}

/// How canned replies address the user.
fn address(config: &AppConfig) -> String {
    config
        .assistant
        .honorifics
        .first()
        .cloned()
        .unwrap_or_else(|| config.assistant.user_name.clone())
}
