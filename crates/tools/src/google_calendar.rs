//! Google Calendar v3 backend.
//!
//! Talks to the REST API directly with a bearer token. The token comes from a
//! JSON file produced by the user's OAuth consent flow; when it expires it is
//! refreshed with the stored refresh token and written back.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use jarvis_config::CalendarConfig;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::calendar::{
    CalendarBackend, CalendarError, CalendarEvent, CreatedEvent, EventTime, EventWindow, NewEvent,
};

/// Tokens are refreshed this long before they actually expire.
const REFRESH_SKEW_SECS: i64 = 60;

pub struct GoogleCalendarBackend {
    client: Client,
    api_url: String,
    calendar_id: String,
    timezone: String,
    tokens: TokenStore,
}

impl GoogleCalendarBackend {
    pub fn from_config(client: Client, config: &CalendarConfig) -> Self {
        let tokens = TokenStore::new(
            client.clone(),
            config.token_path(),
            &config.token_url,
            config.client_id.clone(),
            config.client_secret.clone(),
        );
        Self {
            client,
            api_url: config.api_url.clone(),
            calendar_id: config.calendar_id.clone(),
            timezone: config.timezone.clone(),
            tokens,
        }
    }

    /// `{api_url}/calendars/{calendar_id}/events`, with the id percent-encoded.
    fn events_url(&self) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| CalendarError::Api { status: 0, message: format!("invalid api_url: {e}") })?;
        url.path_segments_mut()
            .map_err(|_| CalendarError::Api {
                status: 0,
                message: format!("api_url cannot be a base: {}", self.api_url),
            })?
            .pop_if_empty()
            .extend(["calendars", self.calendar_id.as_str(), "events"]);
        Ok(url)
    }
}

#[async_trait]
impl CalendarBackend for GoogleCalendarBackend {
    async fn list_events(&self, window: EventWindow) -> Result<Vec<CalendarEvent>, CalendarError> {
        let token = self.tokens.access_token().await?;
        let url = self.events_url()?;

        let mut query: Vec<(&str, String)> = vec![
            ("timeMin", window.time_min.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("singleEvents", "true".into()),
            ("orderBy", "startTime".into()),
        ];
        if let Some(time_max) = window.time_max {
            query.push(("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(max) = window.max_results {
            query.push(("maxResults", max.to_string()));
        }

        debug!(url = %url, "Listing calendar events");
        let response = self
            .client
            .get(url)
            .bearer_auth(&token)
            .query(&query)
            .send()
            .await
            .map_err(|e| CalendarError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let body: EventList = response
            .json()
            .await
            .map_err(|e| CalendarError::Api { status: 200, message: format!("bad event list: {e}") })?;
        Ok(body.items.into_iter().map(ApiEvent::into_event).collect())
    }

    async fn insert_event(&self, event: NewEvent) -> Result<CreatedEvent, CalendarError> {
        let token = self.tokens.access_token().await?;
        let url = self.events_url()?;
        let body = insert_body(&event, &self.timezone);

        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CalendarError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let created: InsertedEvent = response
            .json()
            .await
            .map_err(|e| CalendarError::Api { status: 200, message: format!("bad insert response: {e}") })?;
        Ok(CreatedEvent {
            id: created.id,
            html_link: created.html_link,
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    if status.as_u16() == 401 {
        return Err(CalendarError::NotAuthorized(message));
    }
    Err(CalendarError::Api {
        status: status.as_u16(),
        message,
    })
}

fn insert_body(event: &NewEvent, timezone: &str) -> serde_json::Value {
    let mut body = serde_json::json!({
        "summary": event.title,
        "start": { "dateTime": naive_iso(event.start), "timeZone": timezone },
        "end": { "dateTime": naive_iso(event.end), "timeZone": timezone },
    });
    if let Some(description) = &event.description {
        body["description"] = serde_json::Value::String(description.clone());
    }
    if let Some(location) = &event.location {
        body["location"] = serde_json::Value::String(location.clone());
    }
    body
}

fn naive_iso(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

// --- Google Calendar API types ---

#[derive(Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<ApiEvent>,
}

#[derive(Deserialize)]
struct ApiEvent {
    summary: Option<String>,
    #[serde(default)]
    start: ApiEventTime,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ApiEventTime {
    date_time: Option<String>,
    date: Option<String>,
}

impl ApiEvent {
    fn into_event(self) -> CalendarEvent {
        let start = match (self.start.date_time, self.start.date) {
            (Some(raw), _) => DateTime::parse_from_rfc3339(&raw)
                .map(EventTime::DateTime)
                .unwrap_or(EventTime::Unparsed(raw)),
            (None, Some(raw)) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map(EventTime::AllDay)
                .unwrap_or(EventTime::Unparsed(raw)),
            (None, None) => EventTime::Unparsed(String::new()),
        };
        CalendarEvent {
            summary: self.summary,
            start,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertedEvent {
    id: String,
    html_link: Option<String>,
}

// --- OAuth token persistence ---

/// The on-disk token file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Tokens without an expiry are assumed valid.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - Duration::seconds(REFRESH_SKEW_SECS) <= now)
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

/// Loads the token lazily and keeps it fresh.
pub struct TokenStore {
    client: Client,
    path: PathBuf,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    cached: Mutex<Option<StoredToken>>,
}

impl TokenStore {
    pub fn new(
        client: Client,
        path: PathBuf,
        token_url: &str,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            client,
            path,
            token_url: token_url.to_string(),
            client_id,
            client_secret,
            cached: Mutex::new(None),
        }
    }

    /// A currently valid access token, refreshing it if needed.
    pub async fn access_token(&self) -> Result<String, CalendarError> {
        let mut cached = self.cached.lock().await;

        let token = match cached.take() {
            Some(token) => token,
            None => self.load().await?,
        };

        let token = if token.needs_refresh(Utc::now()) {
            let refreshed = self.refresh(&token).await?;
            self.persist(&refreshed).await?;
            refreshed
        } else {
            token
        };

        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }

    async fn load(&self) -> Result<StoredToken, CalendarError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CalendarError::NotAuthorized(format!(
                    "no calendar token at {}",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(CalendarError::TokenStore(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_str(&raw).map_err(|e| {
            CalendarError::TokenStore(format!("cannot parse {}: {e}", self.path.display()))
        })
    }

    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken, CalendarError> {
        let (Some(refresh_token), Some(client_id), Some(client_secret)) =
            (&token.refresh_token, &self.client_id, &self.client_secret)
        else {
            return Err(CalendarError::NotAuthorized(
                "calendar token expired and cannot be refreshed".into(),
            ));
        };

        debug!("Refreshing calendar access token");
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CalendarError::Network(e.to_string()))?;
        let response = check_status(response).await?;

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| CalendarError::TokenStore(format!("bad refresh response: {e}")))?;

        info!("Calendar access token refreshed");
        Ok(StoredToken {
            access_token: body.access_token,
            refresh_token: body.refresh_token.or_else(|| token.refresh_token.clone()),
            expires_at: body.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        })
    }

    async fn persist(&self, token: &StoredToken) -> Result<(), CalendarError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CalendarError::TokenStore(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(token)
            .map_err(|e| CalendarError::TokenStore(e.to_string()))?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| CalendarError::TokenStore(format!("cannot write {}: {e}", self.path.display())))
    }
}
