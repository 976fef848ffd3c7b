// Prompt constants for AI field resolution.
// The template can be replaced at startup (RESOLVER_PROMPT_PATH); it must keep the
// placeholders below.

/// System prompt for field resolution: enforces JSON-only output.
pub const FIELD_RESOLUTION_SYSTEM: &str =
    "You are an expert job application assistant filling in one form field \
    on behalf of a candidate. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Field resolution prompt template.
/// Replace: {truthfulness_instruction}, {job_title}, {company}, {label}, {kind},
///          {options}, {profile}
pub const FIELD_RESOLUTION_PROMPT_TEMPLATE: &str = r#"{truthfulness_instruction}

JOB:
Title: {job_title}
Company: {company}

FORM FIELD:
Label: {label}
Input kind: {kind}
Allowed options: {options}

CANDIDATE FACTS (source of truth, ONLY use facts from these):
{profile}

Return a JSON object with this EXACT schema:
{"answer": "the value to enter"}

HARD RULES:
1. If allowed options are listed, `answer` MUST be copied verbatim from them
2. For yes/no questions, answer honestly from the facts; if the facts are silent, return null
3. For numeric questions, answer with a bare number
4. Keep free-text answers concise and professional (at most 3 sentences)
5. If the facts do not support an answer, return {"answer": null}"#;
