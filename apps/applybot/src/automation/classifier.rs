//! Field Classifier: assigns a semantic `FieldType` to a raw form field.
//!
//! Pure and rule-first. Labels are folded (lowercase, punctuation to spaces, whitespace
//! collapsed) and checked against an ordered rule table; the first rule with a matching
//! pattern wins, no match is `Unknown`. Patterns match at word starts, so `"proficien"`
//! catches both "proficient" and "proficiency".
//!
//! Default order (most specific first):
//!  1. email:            email, e mail
//!  2. phone:            phone, mobile, cell, telephone
//!  3. cover-letter:     cover letter, why do you want, why are you interested, ...
//!                        (plus "message" / "additional information" on textareas only)
//!  4. salary:           salary, compensation, expected pay, pay expectation, ctc
//!  5. sponsorship:      sponsor, visa
//!  6. work-auth:        authorized, authorised, authorization, work permit, ...
//!  7. experience-years: how many years, years of, years experience, number of years
//!  8. skill:            experience with, experience in, familiar, proficien, skill, ...
//!  9. location:         location, city, address, based in, relocat, commut, zip, postal
//! 10. unknown:          company, employer, school, referrer, manager, ... (someone else's name)
//! 11. name:             full name, first name, last name, your name, name
//! 12. experience-years: experience (catch-all for "Relevant experience" style labels)
//!
//! The table is data: `CLASSIFIER_RULES_PATH` may point at a JSON file replacing it.

use serde::{Deserialize, Serialize};

use crate::automation::models::{FieldType, InputKind, RawField};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRule {
    pub field_type: FieldType,
    pub patterns: Vec<String>,
    /// Restricts the rule to these input kinds. Empty means any kind.
    #[serde(default)]
    pub kinds: Vec<InputKind>,
}

impl ClassifierRule {
    fn new(field_type: FieldType, patterns: &[&str]) -> Self {
        Self {
            field_type,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            kinds: Vec::new(),
        }
    }

    fn only_for(mut self, kinds: &[InputKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    fn matches(&self, folded_label: &str, kind: InputKind) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return false;
        }
        self.patterns.iter().any(|pattern| {
            let pattern = fold_label(pattern);
            !pattern.is_empty() && folded_label.contains(&format!(" {pattern}"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassifierRules {
    rules: Vec<ClassifierRule>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            rules: vec![
                ClassifierRule::new(FieldType::Email, &["email", "e mail"]),
                ClassifierRule::new(FieldType::Phone, &["phone", "mobile", "cell", "telephone"]),
                ClassifierRule::new(
                    FieldType::CoverLetter,
                    &[
                        "cover letter",
                        "why do you want",
                        "why are you interested",
                        "message to the hiring",
                    ],
                ),
                ClassifierRule::new(FieldType::CoverLetter, &["message", "additional information"])
                    .only_for(&[InputKind::Textarea]),
                ClassifierRule::new(
                    FieldType::Salary,
                    &["salary", "compensation", "expected pay", "pay expectation", "ctc"],
                ),
                ClassifierRule::new(FieldType::Sponsorship, &["sponsor", "visa"]),
                ClassifierRule::new(
                    FieldType::WorkAuthorization,
                    &[
                        "authorized",
                        "authorised",
                        "authorization",
                        "work permit",
                        "right to work",
                        "legally",
                    ],
                ),
                ClassifierRule::new(
                    FieldType::ExperienceYears,
                    &["how many years", "years of", "years experience", "number of years"],
                ),
                ClassifierRule::new(
                    FieldType::Skill,
                    &[
                        "experience with",
                        "experience in",
                        "familiar",
                        "proficien",
                        "skill",
                        "knowledge of",
                        "comfortable with",
                    ],
                ),
                ClassifierRule::new(
                    FieldType::Location,
                    &[
                        "location", "city", "address", "based in", "relocat", "commut", "zip",
                        "postal",
                    ],
                ),
                // Names of other people and organisations.
                ClassifierRule::new(
                    FieldType::Unknown,
                    &[
                        "company", "employer", "organi", "school", "university", "referr",
                        "reference", "manager", "recruiter", "emergency", "contact person",
                    ],
                ),
                ClassifierRule::new(
                    FieldType::Name,
                    &["full name", "first name", "last name", "your name", "name"],
                ),
                ClassifierRule::new(FieldType::ExperienceYears, &["experience"]),
            ],
        }
    }
}

impl ClassifierRules {
    pub fn new(rules: Vec<ClassifierRule>) -> Self {
        Self { rules }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldClassifier {
    rules: ClassifierRules,
}

impl FieldClassifier {
    pub fn new(rules: ClassifierRules) -> Self {
        Self { rules }
    }

    pub fn classify(&self, field: &RawField) -> FieldType {
        let folded = format!(" {}", fold_label(&field.label));
        self.rules
            .rules
            .iter()
            .find(|rule| rule.matches(&folded, field.kind))
            .map(|rule| rule.field_type)
            .unwrap_or(FieldType::Unknown)
    }
}

/// Case and punctuation folding: `"E-mail Address*"` → `"e mail address"`.
pub fn fold_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(label: &str, kind: InputKind) -> RawField {
        RawField {
            label: label.to_string(),
            kind,
            required: true,
            options: vec![],
            current_value: None,
        }
    }

    fn classify(label: &str, kind: InputKind) -> FieldType {
        FieldClassifier::default().classify(&raw(label, kind))
    }

    #[test]
    fn test_fold_label() {
        assert_eq!(fold_label("E-mail Address*"), "e mail address");
        assert_eq!(fold_label("  Mobile   phone number? "), "mobile phone number");
    }

    #[test]
    fn test_contact_fields() {
        assert_eq!(classify("Mobile Number", InputKind::Text), FieldType::Phone);
        assert_eq!(classify("Phone country code", InputKind::Select), FieldType::Phone);
        assert_eq!(classify("E-mail address", InputKind::Select), FieldType::Email);
        assert_eq!(classify("First name", InputKind::Text), FieldType::Name);
    }

    #[test]
    fn test_experience_vs_skill_ordering() {
        assert_eq!(
            classify(
                "How many years of experience do you have with Rust?",
                InputKind::Text
            ),
            FieldType::ExperienceYears
        );
        assert_eq!(
            classify("Do you have experience with Kubernetes?", InputKind::Radio),
            FieldType::Skill
        );
        assert_eq!(
            classify("Relevant experience", InputKind::Textarea),
            FieldType::ExperienceYears
        );
    }

    #[test]
    fn test_work_authorization_and_salary() {
        assert_eq!(
            classify(
                "Are you legally authorized to work in the United States?",
                InputKind::Radio
            ),
            FieldType::WorkAuthorization
        );
        assert_eq!(
            classify(
                "Will you now or in the future require sponsorship for employment visa status?",
                InputKind::Radio
            ),
            FieldType::Sponsorship
        );
        assert_eq!(
            classify("Do you need a visa to work in Germany?", InputKind::Radio),
            FieldType::Sponsorship
        );
        assert_eq!(
            classify("Expected salary (USD)", InputKind::Text),
            FieldType::Salary
        );
    }

    #[test]
    fn test_kind_restricted_rule() {
        assert_eq!(
            classify("Message to the team", InputKind::Textarea),
            FieldType::CoverLetter
        );
        assert_eq!(classify("Message to the team", InputKind::Text), FieldType::Unknown);
    }

    #[test]
    fn test_word_start_matching() {
        // "cell" must not match inside "excellent".
        assert_eq!(classify("Rate your excellent-ness", InputKind::Text), FieldType::Unknown);
        assert_eq!(
            classify("Willing to relocate?", InputKind::Radio),
            FieldType::Location
        );
    }

    #[test]
    fn test_other_peoples_names_are_not_the_candidates() {
        for label in ["Current company name", "Referrer name", "Name of your manager"] {
            assert_eq!(classify(label, InputKind::Text), FieldType::Unknown, "{label}");
        }
        assert_eq!(classify("Name", InputKind::Text), FieldType::Name);
        assert_eq!(classify("Full legal name", InputKind::Text), FieldType::Name);
    }

    #[test]
    fn test_unknown_label() {
        assert_eq!(
            classify("What is your favourite colour?", InputKind::Text),
            FieldType::Unknown
        );
    }

    #[test]
    fn test_classification_is_pure() {
        let classifier = FieldClassifier::default();
        let field = raw("Mobile Number", InputKind::Text);
        let first = classifier.classify(&field);
        for _ in 0..10 {
            assert_eq!(classifier.classify(&field), first);
        }
    }

    #[test]
    fn test_rules_load_from_json() {
        let rules = ClassifierRules::from_json(
            r#"[{"field_type": "salary", "patterns": ["rate"]},
                {"field_type": "phone", "patterns": ["whatsapp"], "kinds": ["text"]}]"#,
        )
        .unwrap();
        let classifier = FieldClassifier::new(rules);
        assert_eq!(
            classifier.classify(&raw("Hourly rate", InputKind::Text)),
            FieldType::Salary
        );
        assert_eq!(
            classifier.classify(&raw("WhatsApp", InputKind::Select)),
            FieldType::Unknown
        );
        assert_eq!(
            classifier.classify(&raw("Mobile Number", InputKind::Text)),
            FieldType::Unknown
        );
    }
}
