//! `get_weather`: current conditions for a city via Open-Meteo.

use std::sync::Arc;

use async_trait::async_trait;
use jarvis_config::WeatherConfig;
use jarvis_core::error::ToolError;
use jarvis_core::tool::{Tool, ToolResult};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default)]
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrentConditions {
    #[serde(rename = "temperature_2m")]
    pub temperature: f64,
    pub apparent_temperature: f64,
    #[serde(rename = "relative_humidity_2m")]
    pub humidity: f64,
    pub precipitation: f64,
    pub weather_code: u16,
    #[serde(rename = "wind_speed_10m")]
    pub wind_speed: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Network(String),

    #[error("weather API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected weather response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait WeatherBackend: Send + Sync {
    /// First geocoding match for `city`, if any.
    async fn geocode(&self, city: &str) -> Result<Option<Location>, WeatherError>;

    async fn current(&self, location: &Location) -> Result<CurrentConditions, WeatherError>;
}

/// Open-Meteo geocoding + forecast. No API key needed.
pub struct OpenMeteoBackend {
    client: Client,
    geocoding_url: String,
    forecast_url: String,
    language: String,
}

impl OpenMeteoBackend {
    pub fn from_config(client: Client, config: &WeatherConfig) -> Self {
        Self {
            client,
            geocoding_url: config.geocoding_url.trim_end_matches('/').to_string(),
            forecast_url: config.forecast_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, WeatherError> {
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| WeatherError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(WeatherError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| WeatherError::Decode(e.to_string()))
    }
}

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Location>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[async_trait]
impl WeatherBackend for OpenMeteoBackend {
    async fn geocode(&self, city: &str) -> Result<Option<Location>, WeatherError> {
        let query = [
            ("name", city.to_string()),
            ("count", "1".to_string()),
            ("language", self.language.clone()),
            ("format", "json".to_string()),
        ];
        let body: GeocodingResponse = self
            .get_json(format!("{}/search", self.geocoding_url), &query)
            .await?;
        Ok(body.results.into_iter().next())
    }

    async fn current(&self, location: &Location) -> Result<CurrentConditions, WeatherError> {
        let query = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            (
                "current",
                "temperature_2m,relative_humidity_2m,apparent_temperature,precipitation,weather_code,wind_speed_10m"
                    .to_string(),
            ),
            ("timezone", "auto".to_string()),
        ];
        let body: ForecastResponse = self
            .get_json(format!("{}/forecast", self.forecast_url), &query)
            .await?;
        Ok(body.current)
    }
}

/// Spanish label for a WMO weather code.
pub fn describe_weather_code(code: u16) -> &'static str {
    match code {
        0 => "Despejado",
        1 => "Mayormente despejado",
        2 => "Parcialmente nublado",
        3 => "Nublado",
        45 => "Con niebla",
        48 => "Niebla con escarcha",
        51 => "Llovizna ligera",
        53 => "Llovizna moderada",
        55 => "Llovizna densa",
        61 => "Lluvia ligera",
        63 => "Lluvia moderada",
        65 => "Lluvia intensa",
        71 => "Nevada ligera",
        73 => "Nevada moderada",
        75 => "Nevada intensa",
        80 => "Chubascos ligeros",
        81 => "Chubascos moderados",
        82 => "Chubascos violentos",
        95 => "Tormenta",
        _ => "Condiciones desconocidas",
    }
}

pub fn format_report(location: &Location, current: &CurrentConditions) -> String {
    let place = match location.country.trim() {
        "" => location.name.clone(),
        country => format!("{}, {country}", location.name),
    };
    format!(
        "Clima en {place}:\n\
         - Temperatura: {}°C\n\
         - Sensación térmica: {}°C\n\
         - Condiciones: {}\n\
         - Humedad: {}%\n\
         - Viento: {} km/h\n\
         - Precipitación: {} mm",
        current.temperature,
        current.apparent_temperature,
        describe_weather_code(current.weather_code),
        current.humidity,
        current.wind_speed,
        current.precipitation,
    )
}

pub struct WeatherTool {
    backend: Arc<dyn WeatherBackend>,
}

impl WeatherTool {
    pub fn new(backend: Arc<dyn WeatherBackend>) -> Self {
        Self { backend }
    }

    /// Never fails: every outcome is text the model can relay.
    pub async fn query_weather(&self, city: &str) -> String {
        debug!(city, "Looking up weather");

        let location = match self.backend.geocode(city).await {
            Ok(Some(location)) => location,
            Ok(None) => return not_found(city),
            Err(e) => {
                warn!(city, error = %e, "Geocoding failed");
                return not_found(city);
            }
        };

        match self.backend.current(&location).await {
            Ok(current) => format_report(&location, &current),
            Err(e) => {
                warn!(city, error = %e, "Forecast request failed");
                format!("Lo siento, no pude obtener el clima para \"{city}\".")
            }
        }
    }
}

fn not_found(city: &str) -> String {
    format!("No se pudo encontrar la ciudad \"{city}\". Intenta con otra ciudad.")
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Obtiene el clima actual de una ciudad especificada. Usa esta función cuando el usuario pregunte por el \
         tiempo, clima, temperatura o condiciones meteorológicas de cualquier ciudad."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "El nombre de la ciudad para consultar el clima (ej: \"Madrid\", \"Barcelona\", \"Nueva York\")"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let city = arguments["city"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("'city' must be a string".into()))?;
        Ok(ToolResult::text(self.query_weather(city).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubBackend {
        location: Option<Location>,
        forecast_fails: bool,
    }

    #[async_trait]
    impl WeatherBackend for StubBackend {
        async fn geocode(&self, _city: &str) -> Result<Option<Location>, WeatherError> {
            Ok(self.location.clone())
        }

        async fn current(&self, _location: &Location) -> Result<CurrentConditions, WeatherError> {
            if self.forecast_fails {
                return Err(WeatherError::Api {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            Ok(CurrentConditions {
                temperature: 18.4,
                apparent_temperature: 17.0,
                humidity: 62.0,
                precipitation: 0.0,
                weather_code: 2,
                wind_speed: 11.5,
            })
        }
    }

    fn madrid() -> Location {
        Location {
            name: "Madrid".into(),
            country: "España".into(),
            latitude: 40.4165,
            longitude: -3.70256,
        }
    }

    #[tokio::test]
    async fn report_for_known_city() {
        let tool = WeatherTool::new(Arc::new(StubBackend {
            location: Some(madrid()),
            forecast_fails: false,
        }));
        let report = tool.query_weather("Madrid").await;
        assert_eq!(
            report,
            "Clima en Madrid, España:\n\
             - Temperatura: 18.4°C\n\
             - Sensación térmica: 17°C\n\
             - Condiciones: Parcialmente nublado\n\
             - Humedad: 62%\n\
             - Viento: 11.5 km/h\n\
             - Precipitación: 0 mm"
        );
    }

    #[tokio::test]
    async fn report_without_country_has_no_dangling_comma() {
        let tool = WeatherTool::new(Arc::new(StubBackend {
            location: Some(Location {
                country: String::new(),
                ..madrid()
            }),
            forecast_fails: false,
        }));
        let report = tool.query_weather("Madrid").await;
        assert!(report.starts_with("Clima en Madrid:\n"), "got {report:?}");
    }

    #[tokio::test]
    async fn unknown_city_is_a_message_not_an_error() {
        let tool = WeatherTool::new(Arc::new(StubBackend {
            location: None,
            forecast_fails: false,
        }));
        let result = tool
            .execute(serde_json::json!({"city": "Atlantis"}))
            .await
            .unwrap();
        assert_eq!(
            result.output,
            "No se pudo encontrar la ciudad \"Atlantis\". Intenta con otra ciudad."
        );
    }

    #[tokio::test]
    async fn forecast_failure_apologizes() {
        let tool = WeatherTool::new(Arc::new(StubBackend {
            location: Some(madrid()),
            forecast_fails: true,
        }));
        assert_eq!(
            tool.query_weather("Madrid").await,
            "Lo siento, no pude obtener el clima para \"Madrid\"."
        );
    }

    #[test]
    fn weather_codes() {
        assert_eq!(describe_weather_code(0), "Despejado");
        assert_eq!(describe_weather_code(45), "Con niebla");
        assert_eq!(describe_weather_code(95), "Tormenta");
        assert_eq!(describe_weather_code(96), "Condiciones desconocidas");
    }

    #[test]
    fn parses_geocoding_response() {
        let json = r#"{
            "results": [
                {"id": 3117735, "name": "Madrid", "latitude": 40.4165, "longitude": -3.70256,
                 "country": "España", "admin1": "Madrid"}
            ],
            "generationtime_ms": 0.5
        }"#;
        let body: GeocodingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.results.into_iter().next(), Some(madrid()));

        let empty: GeocodingResponse = serde_json::from_str(r#"{"generationtime_ms": 0.2}"#).unwrap();
        assert!(empty.results.is_empty());
    }

    #[test]
    fn parses_forecast_response() {
        let json = r#"{
            "latitude": 40.4,
            "current_units": {"temperature_2m": "°C"},
            "current": {
                "time": "2025-12-06T10:00", "interval": 900,
                "temperature_2m": 9.8, "relative_humidity_2m": 81,
                "apparent_temperature": 7.9, "precipitation": 0.2,
                "weather_code": 61, "wind_speed_10m": 14.3
            }
        }"#;
        let body: ForecastResponse = serde_json::from_str(json).unwrap();
        assert_eq!(body.current.weather_code, 61);
        assert_eq!(body.current.humidity, 81.0);
        assert_eq!(describe_weather_code(body.current.weather_code), "Lluvia ligera");
    }

    #[test]
    fn tool_definition() {
        let tool = WeatherTool::new(Arc::new(StubBackend {
            location: None,
            forecast_fails: false,
        }));
        let def = tool.to_definition();
        assert_eq!(def.name, "get_weather");
        assert_eq!(def.parameters["required"], serde_json::json!(["city"]));
    }
}
