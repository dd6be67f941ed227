//! Heuristic intent classification and headword extraction.
//!
//! Classification order is a contract, not an accident: definition-query
//! templates are checked before registration keywords, so an utterance that
//! both asks a question and says "save it" is answered first — the question
//! takes precedence over bookkeeping within a single turn.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// "what does X mean" family.
    DefinitionQuery,
    /// "save/record this" family.
    RegistrationRequest,
    /// Anything else: free conversation.
    Generic,
}

/// Best-effort headword guess. `fallback` is true when template stripping
/// emptied the utterance and the last raw token was used instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermGuess {
    pub term: String,
    pub fallback: bool,
}

fn definition_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"qu[eé]\s+significa",
            r"definici[oó]n\s+de",
            r"significado\s+de",
            r"qu[eé]\s+quiere\s+decir",
            r"qu[eé]\s+es\s+\S",
            r"expl[ií]came?\s+la\s+palabra",
            r"dime\s+qu[eé]\s+significa",
            r"what\s+does\s+.+\s+mean",
            r"meaning\s+of",
            r"definition\s+of",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

const REGISTRATION_KEYWORDS: &[&str] = &[
    "registra", "regístra", "guarda", "guárda", "anota", "anóta", "apunta", "apúnta", "save it",
    "save this", "save that", "record it", "record this", "record that",
];

/// Fragments removed from the utterance before picking the headword.
const TEMPLATE_FRAGMENTS: &[&str] = &[
    "dime qué significa",
    "dime que significa",
    "qué significa",
    "que significa",
    "qué quiere decir",
    "que quiere decir",
    "definición de",
    "definicion de",
    "significado de",
    "explícame la palabra",
    "explicame la palabra",
    "explica la palabra",
    "what does",
    "meaning of",
    "definition of",
    "qué es",
    "que es",
];

const STOPWORDS: &[&str] = &[
    "la", "el", "los", "las", "un", "una", "unos", "unas", "de", "del", "en", "es", "palabra",
    "the", "a", "an", "of", "in", "word", "mean", "means", "meaning", "significa",
];

/// Classify one user utterance. Never fails; unmatched input is `Generic`.
pub fn classify(utterance: &str) -> Intent {
    let lowered = utterance.to_lowercase();

    if definition_patterns().iter().any(|re| re.is_match(&lowered)) {
        return Intent::DefinitionQuery;
    }

    if REGISTRATION_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return Intent::RegistrationRequest;
    }

    Intent::Generic
}

/// Isolate the headword from a definition-query utterance.
///
/// Strips the matched template text and a small stopword set, then returns the
/// last remaining alphabetic token. Falls back to the utterance's last
/// whitespace-delimited token when stripping empties the string. Never fails.
pub fn extract_term(utterance: &str) -> TermGuess {
    let mut stripped = utterance.to_lowercase();
    for fragment in TEMPLATE_FRAGMENTS {
        stripped = stripped.replace(fragment, " ");
    }

    let last_token = stripped
        .split(|c: char| !c.is_alphabetic())
        .filter(|t| !t.is_empty())
        .filter(|t| !STOPWORDS.contains(t))
        .next_back();

    if let Some(term) = last_token {
        return TermGuess {
            term: term.to_string(),
            fallback: false,
        };
    }

    let raw_last = utterance
        .split_whitespace()
        .next_back()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_alphanumeric());

    TermGuess {
        term: raw_last.to_lowercase(),
        fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_spanish_definition_queries() {
        assert_eq!(classify("¿Qué significa hello?"), Intent::DefinitionQuery);
        assert_eq!(classify("dame la definición de moon"), Intent::DefinitionQuery);
        assert_eq!(classify("que quiere decir serendipia"), Intent::DefinitionQuery);
    }

    #[test]
    fn classifies_english_definition_queries() {
        assert_eq!(classify("what does snow mean?"), Intent::DefinitionQuery);
        assert_eq!(classify("tell me the meaning of rain"), Intent::DefinitionQuery);
    }

    #[test]
    fn classifies_registration_requests() {
        assert_eq!(classify("guárdalo"), Intent::RegistrationRequest);
        assert_eq!(classify("registra esa palabra"), Intent::RegistrationRequest);
        assert_eq!(classify("anota eso por favor"), Intent::RegistrationRequest);
        assert_eq!(classify("please save it"), Intent::RegistrationRequest);
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(classify("hola, quiero practicar inglés"), Intent::Generic);
        assert_eq!(classify(""), Intent::Generic);
    }

    #[test]
    fn definition_takes_precedence_over_registration() {
        // Contains both a definition template and a registration keyword.
        assert_eq!(
            classify("¿qué significa hello? guárdalo por favor"),
            Intent::DefinitionQuery
        );
    }

    #[test]
    fn extracts_simple_headword() {
        let guess = extract_term("qué significa hello");
        assert_eq!(guess.term, "hello");
        assert!(!guess.fallback);
    }

    #[test]
    fn extracts_through_articles_and_noise_words() {
        let guess = extract_term("what does the word snow mean?");
        assert_eq!(guess.term, "snow");
        assert!(!guess.fallback);
    }

    #[test]
    fn tolerates_punctuation_and_quotes() {
        let guess = extract_term("¿Qué significa 'serendipia'?");
        assert_eq!(guess.term, "serendipia");
        assert!(!guess.fallback);
    }

    #[test]
    fn falls_back_to_last_raw_token() {
        // Everything is template text or stopwords, so stripping empties it.
        let guess = extract_term("qué significa la palabra");
        assert!(guess.fallback);
    }

    #[test]
    fn never_panics_on_pathological_input() {
        for input in ["", "???", "¿¿¿!!!", "   "] {
            let guess = extract_term(input);
            assert!(guess.fallback || !guess.term.is_empty());
        }
    }
}
