//! Keyword-based intent classification.
//!
//! Decides, before the first model call, whether a capability must be forced.
//! Rules are evaluated in order and the first one with a matching keyword
//! wins, so event creation beats calendar queries ("agenda" is in both lists)
//! and both beat weather.

use jarvis_core::provider::ToolChoice;

/// A capability the classifier can force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CreateEvent,
    ViewCalendar,
    GetWeather,
}

impl Capability {
    /// Name of the tool implementing this capability.
    pub fn tool_name(self) -> &'static str {
        match self {
            Capability::CreateEvent => "create_event",
            Capability::ViewCalendar => "view_calendar",
            Capability::GetWeather => "get_weather",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tool_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchReason {
    None,
    KeywordMatch { keyword: &'static str },
}

/// Result of classifying one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub forced: Option<Capability>,
    pub reason: MatchReason,
}

impl Classification {
    fn auto() -> Self {
        Self {
            forced: None,
            reason: MatchReason::None,
        }
    }

    /// Tool-selection mode for the first model call.
    pub fn tool_choice(&self) -> ToolChoice {
        match self.forced {
            Some(capability) => ToolChoice::Forced(capability.tool_name().to_string()),
            None => ToolChoice::Auto,
        }
    }
}

const CREATION_KEYWORDS: &[&str] = &[
    "crea", "crear", "creó", "creo", "agenda", "agendar", "agendó", "programa", "programar",
    "programó", "añade", "añadir", "añadió", "agrega", "agregar", "agregó", "nueva reunión",
    "nuevo evento", "nueva cita", "pon", "poner", "apunta", "apuntar",
];

const CALENDAR_QUERY_KEYWORDS: &[&str] = &[
    "evento", "reunión", "reuniones", "agenda", "calendario", "cita", "citas", "tengo hoy",
    "tengo mañana", "qué tengo", "que tengo", "próximo", "proximo", "programado", "compromiso",
];

const WEATHER_KEYWORDS: &[&str] = &[
    "clima", "tiempo", "temperatura", "llueve", "calor", "frío", "frio", "pronóstico",
    "pronostico", "meteorológico",
];

struct IntentRule {
    capability: Capability,
    keywords: &'static [&'static str],
}

impl IntentRule {
    fn matching_keyword(&self, lowered: &str) -> Option<&'static str> {
        self.keywords.iter().copied().find(|kw| lowered.contains(kw))
    }
}

/// Ordered rule list; stateless, so one instance can serve every request.
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        let rules = vec![
            IntentRule {
                capability: Capability::CreateEvent,
                keywords: CREATION_KEYWORDS,
            },
            IntentRule {
                capability: Capability::ViewCalendar,
                keywords: CALENDAR_QUERY_KEYWORDS,
            },
            IntentRule {
                capability: Capability::GetWeather,
                keywords: WEATHER_KEYWORDS,
            },
        ];
        Self { rules }
    }

    /// Case-insensitive substring match, first rule wins.
    pub fn classify(&self, utterance: &str) -> Classification {
        let lowered = utterance.to_lowercase();
        self.rules
            .iter()
            .find_map(|rule| {
                rule.matching_keyword(&lowered).map(|keyword| Classification {
                    forced: Some(rule.capability),
                    reason: MatchReason::KeywordMatch { keyword },
                })
            })
            .unwrap_or_else(Classification::auto)
    }
}
