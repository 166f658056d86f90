//! The two-pass tool-dispatch orchestrator.

use std::sync::Arc;

use chrono::NaiveDateTime;
use futures::future::join_all;
use jarvis_config::{AppConfig, AssistantConfig};
use jarvis_core::error::ToolError;
use jarvis_core::message::{Conversation, Message, MessageToolCall};
use jarvis_core::provider::{Provider, ProviderRequest, ToolChoice};
use jarvis_core::tool::{ToolCall, ToolRegistry};
use tracing::{debug, info, warn};

use crate::intent::{Classification, IntentClassifier};
use crate::prompt::build_system_prompt;

/// Turns one utterance into one reply.
///
/// Per request:
///
/// 1. **Classify** the utterance to decide whether a capability is forced
/// 2. **First call** with the system prompt, the utterance and the full catalog
/// 3. **If no tool calls**: return the text as is
/// 4. **Otherwise**: run every requested tool, append one result turn each
/// 5. **Second call** without the catalog; return its text
///
/// There is no third pass. Nothing is shared between requests except the
/// immutable catalog, so one orchestrator serves concurrent requests.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    assistant: AssistantConfig,
    classifier: IntentClassifier,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        temperature: f32,
        tools: Arc<ToolRegistry>,
        assistant: AssistantConfig,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
            max_tokens: None,
            tools,
            assistant,
            classifier: IntentClassifier::new(),
        }
    }

    /// Model settings and persona taken from the loaded configuration.
    pub fn from_config(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        Self::new(
            provider,
            &config.model,
            config.temperature,
            tools,
            config.assistant.clone(),
        )
        .with_max_tokens(config.max_tokens)
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer `utterance` as of local wall-clock time `now`.
    ///
    /// Tool failures are folded into the conversation as `Error: ...` turns;
    /// only a failed model call is returned as an error.
    pub async fn respond(&self, utterance: &str, now: NaiveDateTime) -> jarvis_core::Result<String> {
        let classification = self.classifier.classify(utterance);
        let tool_choice = self.resolve_tool_choice(&classification);

        let mut conversation = Conversation::new();
        conversation.push(Message::system(build_system_prompt(
            &self.assistant,
            &self.tools.names(),
            now,
        )));
        conversation.push(Message::user(utterance));

        info!(
            conversation_id = %conversation.id,
            tool_choice = %tool_choice,
            reason = ?classification.reason,
            "Processing utterance"
        );

        let first = self
            .provider
            .complete(self.request(&conversation, self.tools.definitions(), tool_choice))
            .await?;
        self.log_usage(&conversation, &first);

        if first.message.tool_calls.is_empty() {
            debug!(conversation_id = %conversation.id, "Answered without tools");
            return Ok(first.message.content);
        }

        let tool_calls = first.message.tool_calls.clone();
        info!(
            conversation_id = %conversation.id,
            tools = ?tool_calls.iter().map(|tc| tc.name.as_str()).collect::<Vec<_>>(),
            "Model requested tools"
        );
        conversation.push(first.message);

        // Independent invocations; results come back in request order.
        let results = join_all(tool_calls.iter().map(|tc| self.invoke(tc))).await;
        for result in results {
            conversation.push(result);
        }
        debug_assert!(conversation.unanswered_tool_calls().is_empty());

        let second = self
            .provider
            .complete(self.request(&conversation, Vec::new(), ToolChoice::Auto))
            .await?;
        self.log_usage(&conversation, &second);

        if !second.message.tool_calls.is_empty() {
            warn!(
                conversation_id = %conversation.id,
                ignored = second.message.tool_calls.len(),
                "Second response requested tools again; ignoring"
            );
        }

        Ok(second.message.content)
    }

    /// A forced capability that is not in the catalog would be rejected by the
    /// endpoint, so it degrades to `auto`.
    fn resolve_tool_choice(&self, classification: &Classification) -> ToolChoice {
        match classification.tool_choice() {
            ToolChoice::Forced(name) if self.tools.get(&name).is_none() => {
                warn!(tool = %name, "Forced tool is not registered; using auto");
                ToolChoice::Auto
            }
            choice => choice,
        }
    }

    fn request(
        &self,
        conversation: &Conversation,
        tools: Vec<jarvis_core::ToolDefinition>,
        tool_choice: ToolChoice,
    ) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: conversation.messages.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools,
            tool_choice,
        }
    }

    /// Run one invocation and turn the outcome into its result turn.
    async fn invoke(&self, tc: &MessageToolCall) -> Message {
        let outcome = match parse_arguments(&tc.arguments) {
            Ok(arguments) => {
                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments,
                };
                self.tools.execute(&call).await
            }
            Err(e) => Err(e),
        };

        let content = match outcome {
            Ok(result) => result.output,
            Err(e) => {
                warn!(tool = %tc.name, call_id = %tc.id, error = %e, "Tool execution failed");
                format!("Error: {e}")
            }
        };
        Message::tool_result(&tc.id, &tc.name, content)
    }

    fn log_usage(&self, conversation: &Conversation, response: &jarvis_core::ProviderResponse) {
        if let Some(usage) = &response.usage {
            debug!(
                conversation_id = %conversation.id,
                model = %response.model,
                tokens = usage.total_tokens,
                "Model call completed"
            );
        }
    }
}

/// Models occasionally send an empty string for a call with no arguments.
fn parse_arguments(raw: &str) -> Result<serde_json::Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jarvis_core::error::ProviderError;
    use jarvis_core::message::Role;
    use jarvis_core::provider::{ProviderResponse, Usage};
    use jarvis_core::tool::{Tool, ToolResult};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted responses and records every request it receives.
    struct MockProvider {
        responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl MockProvider {
        fn new(responses: Vec<Result<Message, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|r| {
                            r.map(|message| ProviderResponse {
                                message,
                                usage: Some(Usage {
                                    prompt_tokens: 10,
                                    completion_tokens: 5,
                                    total_tokens: 15,
                                }),
                                model: "mock-model".into(),
                            })
                        })
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
        }
    }

    /// `get_weather` stand-in: Atlantis does not exist.
    struct StubWeather;

    #[async_trait]
    impl Tool for StubWeather {
        fn name(&self) -> &str {
            "get_weather"
        }
        fn description(&self) -> &str {
            "weather"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            })
        }
        async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let city = arguments["city"].as_str().unwrap_or_default();
            if city == "Atlantis" {
                return Ok(ToolResult::text(
                    "No se pudo encontrar la ciudad \"Atlantis\". Intenta con otra ciudad.",
                ));
            }
            Ok(ToolResult::text(format!("Clima en {city}: 20°C")))
        }
    }

    /// `view_calendar` stand-in that always fails.
    struct BrokenCalendar;

    #[async_trait]
    impl Tool for BrokenCalendar {
        fn name(&self) -> &str {
            "view_calendar"
        }
        fn description(&self) -> &str {
            "calendar"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "calendar".into(),
                reason: "calendar not authorized".into(),
            })
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StubWeather));
        registry.register(Box::new(BrokenCalendar));
        Arc::new(registry)
    }

    fn orchestrator(provider: Arc<MockProvider>) -> Orchestrator {
        Orchestrator::new(provider, "mock-model", 0.7, registry(), AssistantConfig::default())
    }

    fn now() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2025-12-06 10:00", "%Y-%m-%d %H:%M").unwrap()
    }

    fn tool_call_message(calls: &[(&str, &str, &str)]) -> Message {
        let mut msg = Message::assistant("");
        msg.tool_calls = calls
            .iter()
            .map(|(id, name, args)| MessageToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args.to_string(),
            })
            .collect();
        msg
    }

    #[tokio::test]
    async fn direct_answer_is_returned_verbatim() {
        let provider = MockProvider::new(vec![Ok(Message::assistant("Buenos días, Jefe."))]);
        let reply = orchestrator(provider.clone()).respond("Hola", now()).await.unwrap();

        assert_eq!(reply, "Buenos días, Jefe.");
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].tool_choice, ToolChoice::Auto);
        assert_eq!(requests[0].tools.len(), 2);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[0].content.contains("2025-12-06 10:00"));
        assert_eq!(requests[0].messages[1].content, "Hola");
    }

    #[tokio::test]
    async fn classifier_forces_first_call_tool_choice() {
        let provider = MockProvider::new(vec![Ok(Message::assistant("ok"))]);
        orchestrator(provider.clone())
            .respond("¿Qué tiempo hace en Madrid?", now())
            .await
            .unwrap();
        assert_eq!(
            provider.requests()[0].tool_choice,
            ToolChoice::Forced("get_weather".into())
        );
    }

    #[tokio::test]
    async fn unregistered_forced_tool_falls_back_to_auto() {
        // "crea" forces create_event, which this registry lacks.
        let provider = MockProvider::new(vec![Ok(Message::assistant("ok"))]);
        orchestrator(provider.clone())
            .respond("Crea una reunión mañana", now())
            .await
            .unwrap();
        assert_eq!(provider.requests()[0].tool_choice, ToolChoice::Auto);
    }

    #[tokio::test]
    async fn city_not_found_reaches_second_call() {
        let provider = MockProvider::new(vec![
            Ok(tool_call_message(&[("call_1", "get_weather", r#"{"city":"Atlantis"}"#)])),
            Ok(Message::assistant("Lo siento, Jefe, no encuentro Atlantis.")),
        ]);
        let reply = orchestrator(provider.clone())
            .respond("¿Qué clima hace en Atlantis?", now())
            .await
            .unwrap();
        assert_eq!(reply, "Lo siento, Jefe, no encuentro Atlantis.");

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests[1];
        assert!(second.tools.is_empty());
        assert_eq!(second.tool_choice, ToolChoice::Auto);

        let roles: Vec<Role> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool]);

        let tool_turn = &second.messages[3];
        assert_eq!(
            tool_turn.content,
            "No se pudo encontrar la ciudad \"Atlantis\". Intenta con otra ciudad."
        );
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tool_turn.name.as_deref(), Some("get_weather"));
        assert_eq!(second.messages[2].tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn missing_argument_becomes_error_turn() {
        let provider = MockProvider::new(vec![
            Ok(tool_call_message(&[("call_1", "get_weather", "{}")])),
            Ok(Message::assistant("¿De qué ciudad, Jefe?")),
        ]);
        let reply = orchestrator(provider.clone())
            .respond("¿Qué clima hace?", now())
            .await
            .unwrap();
        assert_eq!(reply, "¿De qué ciudad, Jefe?");

        let tool_turn = &provider.requests()[1].messages[3];
        assert!(tool_turn.content.starts_with("Error: "));
        assert!(tool_turn.content.contains("city"));
    }

    #[tokio::test]
    async fn malformed_arguments_become_error_turn() {
        let provider = MockProvider::new(vec![
            Ok(tool_call_message(&[("call_1", "get_weather", "{city: Madrid")])),
            Ok(Message::assistant("ok")),
        ]);
        orchestrator(provider.clone()).respond("clima", now()).await.unwrap();
        let tool_turn = &provider.requests()[1].messages[3];
        assert!(tool_turn.content.starts_with("Error: Invalid tool arguments"));
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_turn() {
        let provider = MockProvider::new(vec![
            Ok(tool_call_message(&[("call_1", "send_email", "{}")])),
            Ok(Message::assistant("No puedo enviar correos, Jefe.")),
        ]);
        let reply = orchestrator(provider.clone()).respond("Envía un correo", now()).await.unwrap();
        assert_eq!(reply, "No puedo enviar correos, Jefe.");
        assert_eq!(
            provider.requests()[1].messages[3].content,
            "Error: Tool not found: send_email"
        );
    }

    #[tokio::test]
    async fn executor_failure_becomes_error_turn() {
        let provider = MockProvider::new(vec![
            Ok(tool_call_message(&[("call_1", "view_calendar", r#"{"period":"today"}"#)])),
            Ok(Message::assistant("No puedo acceder a su calendario, Jefe.")),
        ]);
        let reply = orchestrator(provider.clone()).respond("¿Qué tengo hoy?", now()).await.unwrap();
        assert_eq!(reply, "No puedo acceder a su calendario, Jefe.");

        let tool_turn = &provider.requests()[1].messages[3];
        assert!(tool_turn.content.starts_with("Error: "));
        assert!(tool_turn.content.contains("not authorized"));
    }

    #[tokio::test]
    async fn every_call_gets_one_result_in_order() {
        let provider = MockProvider::new(vec![
            Ok(tool_call_message(&[
                ("call_a", "get_weather", r#"{"city":"Madrid"}"#),
                ("call_b", "view_calendar", "{}"),
                ("call_c", "get_weather", r#"{"city":"Atlantis"}"#),
            ])),
            Ok(Message::assistant("Resumen")),
        ]);
        orchestrator(provider.clone()).respond("clima y agenda", now()).await.unwrap();

        let second = &provider.requests()[1];
        let results: Vec<&Message> = second.messages.iter().filter(|m| m.role == Role::Tool).collect();
        let ids: Vec<&str> = results.iter().filter_map(|m| m.tool_call_id.as_deref()).collect();
        assert_eq!(ids, vec!["call_a", "call_b", "call_c"]);
        assert_eq!(results[0].content, "Clima en Madrid: 20°C");
        assert!(results[1].content.starts_with("Error: "));
        assert!(results[2].content.contains("Atlantis"));
    }

    #[tokio::test]
    async fn second_call_tool_requests_are_ignored() {
        let mut second = tool_call_message(&[("call_2", "get_weather", r#"{"city":"Roma"}"#)]);
        second.content = "Hace buen tiempo en Madrid, Jefe.".into();
        let provider = MockProvider::new(vec![
            Ok(tool_call_message(&[("call_1", "get_weather", r#"{"city":"Madrid"}"#)])),
            Ok(second),
        ]);
        let reply = orchestrator(provider.clone())
            .respond("clima en Madrid", now())
            .await
            .unwrap();
        assert_eq!(reply, "Hace buen tiempo en Madrid, Jefe.");
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let provider = MockProvider::new(vec![Err(ProviderError::RateLimited { retry_after_secs: 5 })]);
        let err = orchestrator(provider.clone()).respond("Hola", now()).await.unwrap_err();
        assert!(matches!(
            err,
            jarvis_core::Error::Provider(ProviderError::RateLimited { .. })
        ));
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn second_call_failure_propagates() {
        let provider = MockProvider::new(vec![
            Ok(tool_call_message(&[("call_1", "get_weather", r#"{"city":"Madrid"}"#)])),
            Err(ProviderError::Network("connection reset".into())),
        ]);
        let err = orchestrator(provider).respond("clima", now()).await.unwrap_err();
        assert!(matches!(err, jarvis_core::Error::Provider(ProviderError::Network(_))));
    }

    /// Echoes the user turn back after a delay, so concurrent runs overlap.
    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let users: Vec<&str> = request
                .messages
                .iter()
                .filter(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .collect();
            Ok(ProviderResponse {
                message: Message::assistant(users.join("|")),
                usage: None,
                model: "echo".into(),
            })
        }
    }

    #[tokio::test]
    async fn concurrent_requests_do_not_share_turns() {
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(EchoProvider),
            "echo",
            0.7,
            registry(),
            AssistantConfig::default(),
        ));

        let a = {
            let o = orchestrator.clone();
            tokio::spawn(async move { o.respond("primero", now()).await })
        };
        let b = {
            let o = orchestrator.clone();
            tokio::spawn(async move { o.respond("segundo", now()).await })
        };

        assert_eq!(a.await.unwrap().unwrap(), "primero");
        assert_eq!(b.await.unwrap().unwrap(), "segundo");
    }

    #[test]
    fn empty_arguments_parse_as_empty_object() {
        assert_eq!(parse_arguments("  ").unwrap(), serde_json::json!({}));
        assert!(parse_arguments("[1,").is_err());
    }

    #[test]
    fn from_config_uses_model_settings() {
        let config = AppConfig::default();
        let provider = MockProvider::new(vec![]);
        let orchestrator = Orchestrator::from_config(provider, registry(), &config);
        assert_eq!(orchestrator.model, "gpt-4o-mini");
        assert_eq!(orchestrator.max_tokens, Some(1024));
        assert_eq!(orchestrator.tools().len(), 2);
    }
}
