//! Calendar capabilities: list today's events, list upcoming events, create an event.
//!
//! [`CalendarService`] owns the user-facing formatting and the recoverable
//! error policy; the wire protocol lives behind [`CalendarBackend`] (see
//! `google_calendar` for the real one). Every listing and confirmation is
//! returned as finished text, since the model only ever sees strings.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use jarvis_core::error::ToolError;
use jarvis_core::tool::{Tool, ToolResult};
use tracing::{info, warn};

/// Default number of events returned by an upcoming-events query.
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Upper bound accepted from the model.
const MAX_RESULTS_CAP: u32 = 50;

/// The start of a calendar event as returned by the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum EventTime {
    /// A timed event, in the offset the calendar reported.
    DateTime(DateTime<FixedOffset>),
    /// An all-day event.
    AllDay(NaiveDate),
    /// Whatever the backend sent when it could not be parsed.
    Unparsed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub summary: Option<String>,
    pub start: EventTime,
}

/// Time range for a listing. `time_max` is exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWindow {
    pub time_min: DateTime<Utc>,
    pub time_max: Option<DateTime<Utc>>,
    pub max_results: Option<u32>,
}

/// An event to insert, in wall-clock time of the configured calendar zone.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedEvent {
    pub id: String,
    pub html_link: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("calendar not authorized: {0}")]
    NotAuthorized(String),

    #[error("calendar API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("token store error: {0}")]
    TokenStore(String),
}

impl CalendarError {
    /// Credential problems cannot be fixed by rephrasing the request.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, CalendarError::NotAuthorized(_) | CalendarError::TokenStore(_))
    }
}

/// Wire-level access to a calendar.
#[async_trait]
pub trait CalendarBackend: Send + Sync {
    async fn list_events(&self, window: EventWindow) -> Result<Vec<CalendarEvent>, CalendarError>;

    async fn insert_event(&self, event: NewEvent) -> Result<CreatedEvent, CalendarError>;
}

/// Calendar operations exposed to the assistant.
pub struct CalendarService {
    backend: Arc<dyn CalendarBackend>,
    /// Form of address used in canned replies ("Jefe").
    address: String,
}

impl CalendarService {
    pub fn new(backend: Arc<dyn CalendarBackend>, address: impl Into<String>) -> Self {
        Self {
            backend,
            address: address.into(),
        }
    }

    /// Events between local midnight today and local midnight tomorrow.
    pub async fn query_today(&self) -> Result<String, ToolError> {
        self.query_today_at(chrono::Local::now().fixed_offset()).await
    }

    pub async fn query_today_at(&self, now: DateTime<FixedOffset>) -> Result<String, ToolError> {
        let (time_min, time_max) = day_bounds(now);
        let window = EventWindow {
            time_min,
            time_max: Some(time_max),
            max_results: None,
        };

        match self.backend.list_events(window).await {
            Ok(events) if events.is_empty() => Ok(format!(
                "No tienes eventos programados para hoy, {}.",
                self.address
            )),
            Ok(events) => Ok(format_today(&events, now.date_naive())),
            Err(e) => self.recover(e),
        }
    }

    /// The next `max_results` events from now on.
    pub async fn query_upcoming(&self, max_results: u32) -> Result<String, ToolError> {
        let window = EventWindow {
            time_min: Utc::now(),
            time_max: None,
            max_results: Some(max_results.clamp(1, MAX_RESULTS_CAP)),
        };

        match self.backend.list_events(window).await {
            Ok(events) if events.is_empty() => Ok(format!(
                "No tienes eventos próximos en tu calendario, {}.",
                self.address
            )),
            Ok(events) => Ok(format_upcoming(&events)),
            Err(e) => self.recover(e),
        }
    }

    /// Create an event. A missing `end` means one hour after `start`.
    pub async fn create_event(
        &self,
        title: &str,
        start: &str,
        end: Option<&str>,
        description: Option<&str>,
        location: Option<&str>,
    ) -> Result<String, ToolError> {
        let Some(start_at) = parse_event_datetime(start) else {
            return Ok(format!(
                "No pude interpretar la fecha de inicio \"{start}\". Usa el formato YYYY-MM-DDTHH:MM:SS."
            ));
        };

        let end_at = match end {
            Some(raw) => match parse_event_datetime(raw) {
                Some(end_at) => end_at,
                None => {
                    return Ok(format!(
                        "No pude interpretar la fecha de fin \"{raw}\". Usa el formato YYYY-MM-DDTHH:MM:SS."
                    ));
                }
            },
            None => match default_end(start_at) {
                Some(end_at) => end_at,
                None => {
                    return Ok(format!(
                        "No pude interpretar la fecha de inicio \"{start}\". Usa el formato YYYY-MM-DDTHH:MM:SS."
                    ));
                }
            },
        };

        if end_at <= start_at {
            return Ok("La fecha de fin debe ser posterior a la de inicio.".to_string());
        }

        let event = NewEvent {
            title: title.to_string(),
            start: start_at,
            end: end_at,
            description: description.map(String::from),
            location: location.map(String::from),
        };

        match self.backend.insert_event(event.clone()).await {
            Ok(created) => {
                info!(event_id = %created.id, title = %event.title, "Calendar event created");
                Ok(format_created(&event, &created))
            }
            Err(e) => self.recover(e),
        }
    }

    /// Credential failures propagate; everything else becomes an apology the model can relay.
    fn recover(&self, error: CalendarError) -> Result<String, ToolError> {
        if error.is_unrecoverable() {
            return Err(ToolError::ExecutionFailed {
                tool_name: "calendar".into(),
                reason: error.to_string(),
            });
        }
        warn!(error = %error, "Calendar request failed");
        Ok(format!(
            "Lo siento, {}. Hubo un error al acceder a su calendario: {error}",
            self.address
        ))
    }
}

/// One hour after `start`, or `None` past the end of the representable range.
pub fn default_end(start: NaiveDateTime) -> Option<NaiveDateTime> {
    start.checked_add_signed(Duration::hours(1))
}

/// Accepts `YYYY-MM-DDTHH:MM[:SS]`, the same with a space, or full RFC 3339
/// (whose wall-clock time is kept).
pub fn parse_event_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// UTC bounds of the local calendar day containing `now`.
fn day_bounds(now: DateTime<FixedOffset>) -> (DateTime<Utc>, DateTime<Utc>) {
    let offset = Duration::seconds(i64::from(now.offset().local_minus_utc()));
    let local_midnight = now.date_naive().and_time(chrono::NaiveTime::MIN);
    let start = Utc.from_utc_datetime(&(local_midnight - offset));
    (start, start + Duration::days(1))
}

fn title_of(event: &CalendarEvent) -> &str {
    event.summary.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or("Sin título")
}

fn format_today(events: &[CalendarEvent], date: NaiveDate) -> String {
    let mut out = format!("📅 Eventos de hoy ({}):\n\n", date.format("%d/%m/%Y"));
    for event in events {
        let hour = match &event.start {
            EventTime::DateTime(dt) => dt.format("%H:%M").to_string(),
            EventTime::AllDay(_) => "Todo el día".to_string(),
            EventTime::Unparsed(raw) => raw.clone(),
        };
        out.push_str(&format!("• {}\n  🕐 {hour}\n\n", title_of(event)));
    }
    out
}

fn format_upcoming(events: &[CalendarEvent]) -> String {
    let mut out = String::from("📅 Tus próximos eventos:\n\n");
    for event in events {
        let when = match &event.start {
            EventTime::DateTime(dt) => dt.format("%d/%m/%Y %H:%M").to_string(),
            EventTime::AllDay(date) => format!("{} (Todo el día)", date.format("%d/%m/%Y")),
            EventTime::Unparsed(raw) => raw.clone(),
        };
        out.push_str(&format!("• {}\n  📍 {when}\n\n", title_of(event)));
    }
    out
}

fn format_created(event: &NewEvent, created: &CreatedEvent) -> String {
    let mut out = format!(
        "✅ Evento creado: {}\n🕐 {} - {}",
        event.title,
        event.start.format("%d/%m/%Y %H:%M"),
        event.end.format("%H:%M"),
    );
    if let Some(location) = &event.location {
        out.push_str(&format!("\n📍 {location}"));
    }
    if let Some(description) = &event.description {
        out.push_str(&format!("\n📝 {description}"));
    }
    if let Some(link) = &created.html_link {
        out.push_str(&format!("\n🔗 {link}"));
    }
    out
}

// --- Tools ---

/// `view_calendar`: today's agenda or the next N events.
pub struct ViewCalendarTool {
    service: Arc<CalendarService>,
}

impl ViewCalendarTool {
    pub fn new(service: Arc<CalendarService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for ViewCalendarTool {
    fn name(&self) -> &str {
        "view_calendar"
    }

    fn description(&self) -> &str {
        "Consulta el calendario de Google del usuario para ver eventos, agenda, citas, reuniones o compromisos. \
         Úsala cuando pregunten: \"¿qué tengo hoy?\", \"¿cuáles son mis próximos eventos?\", \"¿tengo algo en mi agenda?\", \
         \"¿qué reuniones tengo?\", \"muéstrame mi calendario\", \"¿qué eventos tengo programados?\", etc."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "period": {
                    "type": "string",
                    "enum": ["today", "upcoming"],
                    "description": "Periodo a consultar: \"today\" para los eventos de hoy, \"upcoming\" para los próximos eventos"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Número máximo de eventos (solo para \"upcoming\", por defecto 10)",
                    "default": DEFAULT_MAX_RESULTS
                }
            },
            "required": ["period"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let output = match arguments["period"].as_str() {
            Some("today") => self.service.query_today().await?,
            _ => {
                let max_results = arguments["max_results"]
                    .as_u64()
                    .map(|n| n.min(u64::from(MAX_RESULTS_CAP)) as u32)
                    .unwrap_or(DEFAULT_MAX_RESULTS);
                self.service.query_upcoming(max_results).await?
            }
        };
        Ok(ToolResult::text(output))
    }
}

/// `create_event`: insert a new event.
pub struct CreateEventTool {
    service: Arc<CalendarService>,
}

impl CreateEventTool {
    pub fn new(service: Arc<CalendarService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for CreateEventTool {
    fn name(&self) -> &str {
        "create_event"
    }

    fn description(&self) -> &str {
        "Crea un nuevo evento en el calendario de Google. Úsala cuando el usuario pida crear, agendar o programar \
         una reunión, cita o evento. Ejemplos: \"crea una reunión mañana a las 10\", \"agenda una cita con el doctor\", \
         \"programa una llamada\"."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Título o resumen del evento"
                },
                "start": {
                    "type": "string",
                    "description": "Fecha y hora de inicio en formato ISO 8601 (ej: \"2025-12-06T10:00:00\")"
                },
                "end": {
                    "type": "string",
                    "description": "Fecha y hora de fin en formato ISO 8601 (opcional, por defecto 1 hora después)"
                },
                "description": {
                    "type": "string",
                    "description": "Descripción del evento (opcional)"
                },
                "location": {
                    "type": "string",
                    "description": "Ubicación del evento (opcional)"
                }
            },
            "required": ["title", "start"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let title = arguments["title"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'title' must be a string".into()))?;
        let start = arguments["start"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'start' must be a string".into()))?;

        let output = self
            .service
            .create_event(
                title,
                start,
                arguments["end"].as_str(),
                arguments["description"].as_str(),
                arguments["location"].as_str(),
            )
            .await?;
        Ok(ToolResult::text(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records what it is asked to do and replays canned data.
    #[derive(Default)]
    struct RecordingBackend {
        events: Vec<CalendarEvent>,
        windows: Mutex<Vec<EventWindow>>,
        inserted: Mutex<Vec<NewEvent>>,
        fail_with: Mutex<Option<CalendarError>>,
    }

    #[async_trait]
    impl CalendarBackend for RecordingBackend {
        async fn list_events(&self, window: EventWindow) -> Result<Vec<CalendarEvent>, CalendarError> {
            self.windows.lock().unwrap().push(window);
            if let Some(e) = self.fail_with.lock().unwrap().take() {
                return Err(e);
            }
            Ok(self.events.clone())
        }

        async fn insert_event(&self, event: NewEvent) -> Result<CreatedEvent, CalendarError> {
            if let Some(e) = self.fail_with.lock().unwrap().take() {
                return Err(e);
            }
            self.inserted.lock().unwrap().push(event);
            Ok(CreatedEvent {
                id: "evt_1".into(),
                html_link: Some("https://calendar.example/evt_1".into()),
            })
        }
    }

    fn service(backend: Arc<RecordingBackend>) -> CalendarService {
        CalendarService::new(backend, "Jefe")
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[tokio::test]
    async fn missing_end_defaults_to_one_hour_after_start() {
        let backend = Arc::new(RecordingBackend::default());
        let svc = service(backend.clone());

        let text = svc
            .create_event("Reunión con Ana", "2025-12-06T10:00:00", None, None, None)
            .await
            .unwrap();

        let inserted = backend.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].start, at("2025-12-06T10:00:00"));
        assert_eq!(inserted[0].end, at("2025-12-06T11:00:00"));
        assert_eq!(inserted[0].end - inserted[0].start, Duration::hours(1));
        assert!(text.contains("Reunión con Ana"));
        assert!(text.contains("06/12/2025 10:00 - 11:00"));
    }

    #[tokio::test]
    async fn default_end_crosses_midnight() {
        let backend = Arc::new(RecordingBackend::default());
        service(backend.clone())
            .create_event("Guardia", "2025-12-31T23:30", None, None, None)
            .await
            .unwrap();
        assert_eq!(backend.inserted.lock().unwrap()[0].end, at("2026-01-01T00:30:00"));
    }

    #[tokio::test]
    async fn start_at_the_end_of_time_is_reported_not_raised() {
        let backend = Arc::new(RecordingBackend::default());
        let start = "+262142-12-31T23:30:00";
        assert!(parse_event_datetime(start).is_some());

        let text = service(backend.clone())
            .create_event("x", start, None, None, None)
            .await
            .unwrap();

        assert!(text.starts_with("No pude interpretar la fecha de inicio"));
        assert!(backend.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_end_is_respected() {
        let backend = Arc::new(RecordingBackend::default());
        let text = service(backend.clone())
            .create_event(
                "Comida",
                "2025-12-06T14:00:00",
                Some("2025-12-06T16:30:00"),
                Some("Con el equipo"),
                Some("Madrid"),
            )
            .await
            .unwrap();

        let inserted = backend.inserted.lock().unwrap();
        assert_eq!(inserted[0].end, at("2025-12-06T16:30:00"));
        assert_eq!(inserted[0].location.as_deref(), Some("Madrid"));
        assert!(text.contains("📍 Madrid"));
        assert!(text.contains("🔗 https://calendar.example/evt_1"));
    }

    #[tokio::test]
    async fn unparseable_start_is_reported_not_raised() {
        let backend = Arc::new(RecordingBackend::default());
        let text = service(backend.clone())
            .create_event("Algo", "mañana a las 4", None, None, None)
            .await
            .unwrap();
        assert!(text.contains("No pude interpretar la fecha de inicio"));
        assert!(backend.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_before_start_is_reported() {
        let backend = Arc::new(RecordingBackend::default());
        let text = service(backend.clone())
            .create_event("Algo", "2025-12-06T10:00:00", Some("2025-12-06T09:00:00"), None, None)
            .await
            .unwrap();
        assert!(text.contains("posterior"));
        assert!(backend.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn today_window_is_the_local_day() {
        let backend = Arc::new(RecordingBackend::default());
        let now = DateTime::parse_from_rfc3339("2025-12-06T15:45:00+01:00").unwrap();

        let text = service(backend.clone()).query_today_at(now).await.unwrap();
        assert_eq!(text, "No tienes eventos programados para hoy, Jefe.");

        let windows = backend.windows.lock().unwrap();
        assert_eq!(windows[0].time_min.to_rfc3339(), "2025-12-05T23:00:00+00:00");
        assert_eq!(windows[0].time_max.unwrap().to_rfc3339(), "2025-12-06T23:00:00+00:00");
    }

    #[tokio::test]
    async fn today_listing_format() {
        let backend = Arc::new(RecordingBackend {
            events: vec![
                CalendarEvent {
                    summary: Some("Standup".into()),
                    start: EventTime::DateTime(
                        DateTime::parse_from_rfc3339("2025-12-06T09:30:00+01:00").unwrap(),
                    ),
                },
                CalendarEvent {
                    summary: None,
                    start: EventTime::AllDay(NaiveDate::from_ymd_opt(2025, 12, 6).unwrap()),
                },
            ],
            ..Default::default()
        });
        let now = DateTime::parse_from_rfc3339("2025-12-06T08:00:00+01:00").unwrap();
        let text = service(backend).query_today_at(now).await.unwrap();

        assert!(text.starts_with("📅 Eventos de hoy (06/12/2025):"));
        assert!(text.contains("• Standup\n  🕐 09:30"));
        assert!(text.contains("• Sin título\n  🕐 Todo el día"));
    }

    #[tokio::test]
    async fn upcoming_listing_format_and_limit() {
        let backend = Arc::new(RecordingBackend {
            events: vec![CalendarEvent {
                summary: Some("Dentista".into()),
                start: EventTime::DateTime(
                    DateTime::parse_from_rfc3339("2025-12-09T17:00:00+01:00").unwrap(),
                ),
            }],
            ..Default::default()
        });
        let text = service(backend.clone()).query_upcoming(500).await.unwrap();

        assert!(text.starts_with("📅 Tus próximos eventos:"));
        assert!(text.contains("• Dentista\n  📍 09/12/2025 17:00"));
        assert_eq!(backend.windows.lock().unwrap()[0].max_results, Some(MAX_RESULTS_CAP));
    }

    #[tokio::test]
    async fn api_errors_become_apologies() {
        let backend = Arc::new(RecordingBackend::default());
        *backend.fail_with.lock().unwrap() = Some(CalendarError::Api {
            status: 500,
            message: "backend down".into(),
        });
        let text = service(backend).query_upcoming(10).await.unwrap();
        assert!(text.starts_with("Lo siento, Jefe. Hubo un error al acceder a su calendario"));
        assert!(text.contains("backend down"));
    }

    #[tokio::test]
    async fn missing_credentials_propagate() {
        let backend = Arc::new(RecordingBackend::default());
        *backend.fail_with.lock().unwrap() =
            Some(CalendarError::NotAuthorized("no token".into()));
        let err = service(backend).query_upcoming(10).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn view_tool_dispatches_on_period() {
        let backend = Arc::new(RecordingBackend::default());
        let tool = ViewCalendarTool::new(Arc::new(service(backend.clone())));

        let today = tool.execute(serde_json::json!({"period": "today"})).await.unwrap();
        assert!(today.output.contains("para hoy"));

        let upcoming = tool
            .execute(serde_json::json!({"period": "upcoming", "max_results": 3}))
            .await
            .unwrap();
        assert!(upcoming.output.contains("próximos"));

        let windows = backend.windows.lock().unwrap();
        assert!(windows[0].time_max.is_some());
        assert_eq!(windows[1].max_results, Some(3));
        assert!(windows[1].time_max.is_none());
    }

    #[tokio::test]
    async fn create_tool_passes_optional_fields() {
        let backend = Arc::new(RecordingBackend::default());
        let tool = CreateEventTool::new(Arc::new(service(backend.clone())));
        let result = tool
            .execute(serde_json::json!({
                "title": "Llamada",
                "start": "2025-12-06T16:00:00",
                "description": "Revisar presupuesto"
            }))
            .await
            .unwrap();

        assert!(result.output.starts_with("✅ Evento creado: Llamada"));
        let inserted = backend.inserted.lock().unwrap();
        assert_eq!(inserted[0].description.as_deref(), Some("Revisar presupuesto"));
        assert_eq!(inserted[0].end, at("2025-12-06T17:00:00"));
    }

    #[test]
    fn datetime_formats_accepted() {
        assert_eq!(parse_event_datetime("2025-12-06T10:00:00"), Some(at("2025-12-06T10:00:00")));
        assert_eq!(parse_event_datetime("2025-12-06T10:00"), Some(at("2025-12-06T10:00:00")));
        assert_eq!(parse_event_datetime("2025-12-06 10:00"), Some(at("2025-12-06T10:00:00")));
        assert_eq!(
            parse_event_datetime("2025-12-06T10:00:00+01:00"),
            Some(at("2025-12-06T10:00:00"))
        );
        assert_eq!(parse_event_datetime("el martes"), None);
    }

    #[test]
    fn tool_definitions() {
        let backend = Arc::new(RecordingBackend::default());
        let svc = Arc::new(service(backend));
        let view = ViewCalendarTool::new(svc.clone()).to_definition();
        let create = CreateEventTool::new(svc).to_definition();
        assert_eq!(view.name, "view_calendar");
        assert_eq!(create.name, "create_event");
        assert_eq!(create.parameters["required"], serde_json::json!(["title", "start"]));
    }
}
