// Shared prompt constants and prompt-building utilities.
// Each module that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

/// Common instruction appended to every prompt that answers on the candidate's behalf.
pub const TRUTHFULNESS_INSTRUCTION: &str = "\
    CRITICAL: Every answer must be supported by the candidate facts provided. \
    Do NOT infer, interpolate, or invent details. \
    If the facts do not support an answer, return null instead of guessing.";
