// Shared prompt fragments.
// Each stage that calls the model keeps its own prompts in generation/prompts.rs.
// This file contains cross-cutting fragments only.

/// Appended to every system prompt that expects structured output.
pub const JSON_ONLY_SYSTEM: &str = "Return strict JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Closing line of every structured user prompt.
pub const JSON_ONLY_FOOTER: &str = "Return only valid JSON, no other text.";

/// Grounding rule shared by every selector.
pub const NO_INVENTION_INSTRUCTION: &str = "\
    CRITICAL: Do NOT invent facts. Every item you return must come from the \
    provided bank items and keep its exact `id`. You may shorten or tailor wording, \
    but never add employers, numbers, dates or achievements that are not in the source.";

/// Joins a system prompt with the JSON-only rule.
pub fn json_system(base: &str) -> String {
    format!("{base} {JSON_ONLY_SYSTEM}")
}
