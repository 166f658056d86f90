//! System prompt construction.

use chrono::NaiveDateTime;
use jarvis_config::AssistantConfig;

/// Build the persona/rules system turn for a request made at `now`.
///
/// `tool_names` is the registered catalog; rules for capabilities that are
/// not registered are left out so the model is never told to call them.
pub fn build_system_prompt(
    assistant: &AssistantConfig,
    tool_names: &[&str],
    now: NaiveDateTime,
) -> String {
    let date = now.format("%Y-%m-%d");
    let time = now.format("%H:%M");
    let has = |name: &str| tool_names.contains(&name);

    let mut prompt = format!(
        "Eres {name}, el asistente de IA personal de {user}. Tienes acceso COMPLETO a sus herramientas.\n\n\
         FECHA Y HORA ACTUAL: {date} {time} ({region})\n\n\
         INSTRUCCIONES CRÍTICAS:\n\n\
         1. SIEMPRE debes dirigirte al usuario como {honorifics}.\n\
         2. Responde SIEMPRE en {language}.\n\
         3. Sé profesional, eficiente y leal como un mayordomo británico de élite.\n\n\
         HERRAMIENTAS DISPONIBLES:\n",
        name = assistant.name,
        user = assistant.user_name,
        region = assistant.region,
        honorifics = quoted_list(&assistant.honorifics, &assistant.user_name),
        language = assistant.language,
    );

    if has("get_weather") {
        prompt.push_str("- get_weather: Para consultar el clima de cualquier ciudad\n");
    }
    if has("view_calendar") {
        prompt.push_str("- view_calendar: Para consultar el calendario de Google del usuario\n");
    }
    if has("create_event") {
        prompt.push_str("- create_event: Para crear nuevos eventos en el calendario de Google\n");
    }

    prompt.push_str("\nREGLAS OBLIGATORIAS:\n");
    if has("get_weather") {
        prompt.push_str("- Si preguntan por clima/tiempo/temperatura → USA get_weather\n");
    }
    if has("view_calendar") {
        prompt.push_str(
            "- Si preguntan por eventos/reuniones/agenda/calendario/citas/qué tiene → USA view_calendar\n\
             - NUNCA respondas sobre el calendario sin usar las herramientas\n",
        );
    }
    if has("create_event") {
        prompt.push_str(
            "- Si piden crear/agendar/programar un evento/reunión/cita → USA create_event\n\
             - Para crear eventos, DEBES formatear las fechas en ISO 8601 (YYYY-MM-DDTHH:MM:SS)\n",
        );
    }
    let examples = opening_examples(assistant);
    prompt.push_str(&format!(
        "- NUNCA digas que no tienes acceso o que vas a revisar - USA LAS HERRAMIENTAS DIRECTAMENTE\n\
         - IMPORTANTE: La fecha de HOY es {date}. Úsala para calcular fechas como \"hoy\", \"mañana\", \"pasado mañana\"\n\
         - Si dicen \"a las 4\" asume que es 16:00 (4 PM) a menos que digan \"de la mañana\"\n\n\
         Ejemplos de inicio: {examples}."
    ));

    prompt
}

/// `"Jefe", "Boss" o "Santi"`
fn quoted_list(items: &[String], fallback: &str) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("\"{s}\"")).collect();
    match quoted.split_last() {
        None => format!("\"{fallback}\""),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} o {last}", rest.join(", ")),
    }
}

/// Sample openings built from the configured honorifics.
fn opening_examples(assistant: &AssistantConfig) -> String {
    let pick = |i: usize| {
        assistant
            .honorifics
            .get(i)
            .cloned()
            .unwrap_or_else(|| assistant.user_name.clone())
    };
    let last = assistant.honorifics.len().saturating_sub(1);
    format!(
        "\"Por supuesto, {}\", \"Enseguida, {}\", \"A sus órdenes, {}\"",
        pick(0),
        pick(last.saturating_sub(1)),
        pick(last),
    )
}
