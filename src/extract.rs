//! Strict structured-data extraction from model output.
//!
//! The registration flow asks the model for an exact five-key JSON object or
//! an exact refusal sentence. All of the brittle text cleanup (code fences,
//! single-quoted pseudo-JSON) lives behind [`parse_extraction`], which returns
//! a tagged outcome instead of ever fabricating a record: anything that does
//! not parse into an object is a [`ExtractionOutcome::ParseFailure`], and the
//! sentinel maps to [`ExtractionOutcome::NeedsConfirmation`].

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use tracing::debug;

/// Exact sentence the extraction prompt instructs the model to reply with
/// when it cannot determine what to register.
pub const REFUSAL_SENTINEL: &str =
    "Necesito que me confirmes qué palabra o frase quieres registrar antes de guardarla.";

/// A complete learning record, ready for the persistence collaborator.
/// Parsing success implies completeness: absent keys become empty strings and
/// an absent or unparsable date becomes today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyRecord {
    pub term: String,
    pub translation: String,
    pub example: String,
    pub language: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Record(VocabularyRecord),
    /// The model answered with the refusal sentinel.
    NeedsConfirmation,
    /// The model output was not a parseable object. Logged, never escalated
    /// to the user as an error.
    ParseFailure(String),
}

/// Wire shape of the model's reply. Spanish aliases accepted because the
/// extraction prompt is bilingual and models occasionally localize keys.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default, alias = "palabra")]
    term: String,
    #[serde(default, alias = "traduccion", alias = "traducción")]
    translation: String,
    #[serde(default, alias = "ejemplo")]
    example: String,
    #[serde(default, alias = "idioma")]
    language: String,
    #[serde(default, alias = "fecha")]
    date: Option<String>,
}

/// Parse raw model text into a tagged extraction outcome. Never panics.
pub fn parse_extraction(raw: &str) -> ExtractionOutcome {
    let cleaned = strip_fences(raw);
    let cleaned = cleaned.trim().trim_matches('"').trim();

    if cleaned == REFUSAL_SENTINEL {
        return ExtractionOutcome::NeedsConfirmation;
    }

    let value = match parse_lenient_json(cleaned) {
        Ok(v) => v,
        Err(reason) => {
            debug!(%reason, "extraction output did not parse");
            return ExtractionOutcome::ParseFailure(reason);
        }
    };

    if !value.is_object() {
        return ExtractionOutcome::ParseFailure("not a JSON object".to_string());
    }

    let raw_record: RawRecord = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => return ExtractionOutcome::ParseFailure(e.to_string()),
    };

    let date = raw_record
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
        .unwrap_or_else(|| Local::now().date_naive());

    ExtractionOutcome::Record(VocabularyRecord {
        term: raw_record.term,
        translation: raw_record.translation,
        example: raw_record.example,
        language: raw_record.language,
        date,
    })
}

/// Remove Markdown code-fence markup around the payload.
fn strip_fences(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strict JSON parse with one retry after normalizing single-quoted
/// pseudo-JSON, which some models emit when shown a quoted example schema.
fn parse_lenient_json(text: &str) -> Result<serde_json::Value, String> {
    match serde_json::from_str(text) {
        Ok(v) => Ok(v),
        Err(first_err) => {
            if text.contains('\'') && !text.contains('"') {
                serde_json::from_str(&text.replace('\'', "\""))
                    .map_err(|e| format!("after quote normalization: {}", e))
            } else {
                Err(first_err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_record(outcome: ExtractionOutcome) -> VocabularyRecord {
        match outcome {
            ExtractionOutcome::Record(r) => r,
            other => panic!("expected Record, got {:?}", other),
        }
    }

    #[test]
    fn parses_a_complete_record() {
        let raw = r#"{"term": "moon", "translation": "luna", "example": "The moon is bright.", "language": "inglés", "date": "2025-10-18"}"#;
        let record = expect_record(parse_extraction(raw));
        assert_eq!(record.term, "moon");
        assert_eq!(record.translation, "luna");
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2025, 10, 18).unwrap());
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"term\": \"hello\", \"translation\": \"hola\"}\n```";
        let record = expect_record(parse_extraction(raw));
        assert_eq!(record.term, "hello");
        assert_eq!(record.translation, "hola");
    }

    #[test]
    fn normalizes_single_quoted_objects() {
        let raw = "{'term': 'moon', 'translation': 'luna', 'example': '', 'language': 'en', 'date': '2025-10-18'}";
        let record = expect_record(parse_extraction(raw));
        assert_eq!(record.term, "moon");
    }

    #[test]
    fn accepts_spanish_key_aliases() {
        let raw = r#"{"palabra": "moon", "traduccion": "luna", "ejemplo": "x", "idioma": "inglés", "fecha": "2025-10-18"}"#;
        let record = expect_record(parse_extraction(raw));
        assert_eq!(record.term, "moon");
        assert_eq!(record.translation, "luna");
        assert_eq!(record.language, "inglés");
    }

    #[test]
    fn missing_keys_default_to_empty_strings_and_today() {
        let record = expect_record(parse_extraction(r#"{"term": "moon"}"#));
        assert_eq!(record.term, "moon");
        assert_eq!(record.translation, "");
        assert_eq!(record.example, "");
        assert_eq!(record.language, "");
        assert_eq!(record.date, Local::now().date_naive());
    }

    #[test]
    fn unparsable_date_defaults_to_today() {
        let raw = r#"{"term": "moon", "date": "next tuesday"}"#;
        let record = expect_record(parse_extraction(raw));
        assert_eq!(record.date, Local::now().date_naive());
    }

    #[test]
    fn refusal_sentinel_needs_confirmation() {
        assert_eq!(
            parse_extraction(REFUSAL_SENTINEL),
            ExtractionOutcome::NeedsConfirmation
        );
        // Models sometimes echo the sentinel quoted, as shown in the prompt.
        let quoted = format!("\"{}\"", REFUSAL_SENTINEL);
        assert_eq!(
            parse_extraction(&quoted),
            ExtractionOutcome::NeedsConfirmation
        );
    }

    #[test]
    fn garbage_is_a_parse_failure_never_a_record() {
        for raw in [
            "I could not figure out what to save, sorry!",
            "[1, 2, 3]",
            "\"just a string\"",
            "{\"term\": ",
            "",
        ] {
            match parse_extraction(raw) {
                ExtractionOutcome::Record(r) => panic!("fabricated a record from {:?}: {:?}", raw, r),
                ExtractionOutcome::NeedsConfirmation | ExtractionOutcome::ParseFailure(_) => {}
            }
        }
    }

    #[test]
    fn scalar_json_is_not_an_object() {
        match parse_extraction("42") {
            ExtractionOutcome::ParseFailure(reason) => {
                assert!(reason.contains("not a JSON object"))
            }
            other => panic!("expected ParseFailure, got {:?}", other),
        }
    }
}
