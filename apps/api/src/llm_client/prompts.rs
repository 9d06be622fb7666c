// Shared prompt constants. Each service that needs LLM calls defines its own
// prompts.rs alongside it; this file holds cross-cutting fragments.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Persona block appended to scoring prompts when the operator supplied one.
pub fn persona_block(heading: &str, persona: Option<&str>) -> String {
    match persona.map(str::trim).filter(|p| !p.is_empty()) {
        Some(persona) => format!("\n{heading}:\n{persona}\n"),
        None => String::new(),
    }
}
