// Prompt constants for resume-to-profile extraction.

/// System prompt for profile extraction: enforces JSON-only output.
pub const PROFILE_PARSE_SYSTEM: &str = "You are an expert resume analyst. \
    Extract structured candidate facts from resume text. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Profile extraction prompt template. Replace `{resume_text}` before sending.
pub const PROFILE_PARSE_PROMPT_TEMPLATE: &str = r#"Extract the candidate's facts from the resume below.

Return a JSON object with this EXACT schema (no extra fields):
{
  "full_name": "Ada Lovelace",
  "email": "ada@example.com",
  "phone": "+1 555 010 0100",
  "location": "London, UK",
  "years_of_experience": 7,
  "skills": ["Rust", "SQL"],
  "education": [
    {"institution": "University of London", "degree": "BSc Mathematics", "year": "2015"}
  ],
  "work_authorization": true,
  "salary_expectation": null,
  "cover_letter": "Two or three sentences introducing the candidate, written only from resume facts."
}

Rules:
- Use null (or an empty list) for anything the resume does not state. NEVER guess.
- years_of_experience: total professional years, computed from dated roles only.
- work_authorization: only true/false when the resume states it explicitly, otherwise null.
- salary_expectation: only when the resume states it, otherwise null.

RESUME:
{resume_text}"#;
