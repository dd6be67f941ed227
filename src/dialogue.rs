//! Turn-based dialogue state machine.
//!
//! A session starts in `Greeting`; the first turn returns the fixed greeting
//! and nothing else. Every later turn runs in `Active`: classify the
//! utterance, then answer from retrieved knowledge, attempt a structured
//! registration, or fall back to plain conversation. Oracle failures are
//! converted to apologetic user-facing text here — a turn never surfaces an
//! uncaught fault.

use tracing::{debug, warn};

use crate::extract::{self, ExtractionOutcome, REFUSAL_SENTINEL};
use crate::index::{retrieve, Snippet, VectorStore};
use crate::intent::{self, Intent};
use crate::model::{ChatMessage, ChatModel};
use crate::record_store::RecordStore;
use crate::session::{ConversationSession, GREETING, PERSONA_PROMPT};

/// System instruction for the extraction call. Demands the exact five-key
/// schema or the exact refusal sentence — never prose, never invention.
const EXTRACTION_PROMPT: &str = "Eres la registradora de vocabulario. Analiza el contexto y \
responde EXCLUSIVAMENTE con un objeto JSON válido, sin texto adicional, con exactamente estas \
claves: {\"term\", \"translation\", \"example\", \"language\", \"date\"}. La fecha usa el \
formato YYYY-MM-DD.\n\nEjemplo válido:\n{\"term\": \"moon\", \"translation\": \"luna\", \
\"example\": \"The moon is bright tonight.\", \"language\": \"inglés\", \"date\": \"2025-10-18\"}\n\n\
Si NO puedes determinar con claridad qué palabra o frase se debe registrar, NO inventes nada. \
En su lugar responde exactamente con esta frase:\n\
\"Necesito que me confirmes qué palabra o frase quieres registrar antes de guardarla.\"";

/// Context marker used when a registration arrives with no prior query.
const NO_PRIOR_TERM: &str = "No hay palabra previa registrada.";

const APOLOGY: &str = "Lo siento, en este momento no puedo consultar mis fuentes. \
¿Podemos intentarlo de nuevo en un momento?";

// The clarification shown to the user matches the refusal sentence the
// extraction prompt dictates.
const CLARIFY: &str = REFUSAL_SENTINEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogueState {
    Greeting,
    Active,
}

/// Side effect a turn should perform, decided purely from state and intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnAction {
    Greet,
    AnswerDefinition,
    AttemptRegistration,
    Converse,
}

/// Pure transition function of the dialogue graph. `Greeting` always emits
/// the greeting and moves to `Active`; `Active` never leaves.
pub fn route(state: DialogueState, intent: Intent) -> (DialogueState, TurnAction) {
    match state {
        DialogueState::Greeting => (DialogueState::Active, TurnAction::Greet),
        DialogueState::Active => {
            let action = match intent {
                Intent::DefinitionQuery => TurnAction::AnswerDefinition,
                Intent::RegistrationRequest => TurnAction::AttemptRegistration,
                Intent::Generic => TurnAction::Converse,
            };
            (DialogueState::Active, action)
        }
    }
}

/// What one turn produced.
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// Text shown to the user.
    pub text: String,
    /// Proposed (not persisted) save-string after a definition answer.
    pub candidate_save: Option<String>,
    /// Id returned by the record store when a registration was persisted.
    pub stored_record_id: Option<String>,
}

impl TurnReply {
    fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            candidate_save: None,
            stored_record_id: None,
        }
    }
}

/// Orchestrates one conversation against the three oracles.
pub struct DialogueEngine<'a> {
    model: &'a dyn ChatModel,
    index: &'a dyn VectorStore,
    records: &'a dyn RecordStore,
    top_k: usize,
}

impl<'a> DialogueEngine<'a> {
    pub fn new(
        model: &'a dyn ChatModel,
        index: &'a dyn VectorStore,
        records: &'a dyn RecordStore,
        top_k: usize,
    ) -> Self {
        Self {
            model,
            index,
            records,
            top_k,
        }
    }

    /// Process one user turn. Never returns an error: every oracle failure is
    /// folded into the reply text so the conversation can continue.
    pub async fn handle_turn(
        &self,
        session: &mut ConversationSession,
        utterance: &str,
    ) -> TurnReply {
        let state = if session.greeted {
            DialogueState::Active
        } else {
            DialogueState::Greeting
        };

        let (_, action) = route(state, intent::classify(utterance));

        if action == TurnAction::Greet {
            // The greeting turn does no processing and no history append
            // beyond marking the session greeted.
            session.greeted = true;
            return TurnReply::text_only(GREETING);
        }

        session.push_user(utterance);

        let reply = match action {
            TurnAction::Greet => unreachable!("greet handled above"),
            TurnAction::AnswerDefinition => self.answer_definition(session, utterance).await,
            TurnAction::AttemptRegistration => self.attempt_registration(session, utterance).await,
            TurnAction::Converse => self.converse(session).await,
        };

        session.push_assistant(reply.text.clone());
        reply
    }

    async fn answer_definition(
        &self,
        session: &mut ConversationSession,
        utterance: &str,
    ) -> TurnReply {
        let guess = intent::extract_term(utterance);
        if guess.fallback {
            debug!(term = %guess.term, "term extraction degraded to last-token fallback");
        }

        let snippets = match retrieve(self.index, &guess.term, self.top_k).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "retrieval backend failed");
                return TurnReply::text_only(APOLOGY);
            }
        };

        let prompt = if snippets.is_empty() {
            debug!(term = %guess.term, "no relevant knowledge, answering without corpus context");
            format!(
                "El estudiante preguntó por la palabra '{}', que no aparece en la base de \
                 conocimiento. Explica brevemente su significado, tradúcela al español y da un \
                 ejemplo de uso. Si no conoces la palabra, dilo con claridad.",
                guess.term
            )
        } else {
            format!(
                "El estudiante preguntó por la palabra '{}'. Usa la siguiente información de la \
                 base de conocimiento para responder:\n\n{}\n\nExplica su significado de forma \
                 breve, tradúcela al español y da un ejemplo de uso.",
                guess.term,
                render_snippets(&snippets)
            )
        };

        let messages = vec![ChatMessage::system(PERSONA_PROMPT), ChatMessage::user(prompt)];

        match self.model.complete(&messages).await {
            Ok(answer) => {
                session.last_queried_term = Some(guess.term.clone());
                let candidate = format!("{}: {}", guess.term, answer);
                TurnReply {
                    text: answer,
                    candidate_save: Some(candidate),
                    stored_record_id: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "model oracle failed on definition answer");
                TurnReply::text_only(APOLOGY)
            }
        }
    }

    async fn attempt_registration(
        &self,
        session: &mut ConversationSession,
        utterance: &str,
    ) -> TurnReply {
        let term_context = match &session.last_queried_term {
            Some(term) => format!("La última palabra consultada fue '{}'.", term),
            None => NO_PRIOR_TERM.to_string(),
        };
        let prior_answer = session.last_assistant_text().unwrap_or("").to_string();

        let messages = vec![
            ChatMessage::system(EXTRACTION_PROMPT),
            ChatMessage::user(format!(
                "Usuario dijo: {}\nContexto: {}\nÚltima explicación de la tutora: {}",
                utterance, term_context, prior_answer
            )),
        ];

        // A registration request always consumes the pending term, whatever
        // the outcome.
        session.last_queried_term = None;

        let raw = match self.model.complete(&messages).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "model oracle failed on extraction");
                return TurnReply::text_only(APOLOGY);
            }
        };

        match extract::parse_extraction(&raw) {
            ExtractionOutcome::Record(record) => match self.records.store(&record).await {
                Ok(id) => TurnReply {
                    text: format!(
                        "He registrado \"{}\" ({}) en tu lista de vocabulario.",
                        record.term, record.translation
                    ),
                    candidate_save: None,
                    stored_record_id: Some(id),
                },
                Err(e) => {
                    warn!(error = %e, "record store failed");
                    TurnReply::text_only(format!(
                        "Entendí que quieres registrar \"{}\", pero no pude guardarlo en el \
                         registro externo. Seguimos practicando y lo intentamos más tarde.",
                        record.term
                    ))
                }
            },
            ExtractionOutcome::NeedsConfirmation => TurnReply::text_only(CLARIFY),
            ExtractionOutcome::ParseFailure(reason) => {
                // Logged but never escalated: the user sees the same
                // clarification as for an explicit refusal.
                debug!(%reason, "extraction parse failure");
                TurnReply::text_only(CLARIFY)
            }
        }
    }

    async fn converse(&self, session: &mut ConversationSession) -> TurnReply {
        match self.model.complete(&session.history).await {
            Ok(answer) => TurnReply::text_only(answer),
            Err(e) => {
                warn!(error = %e, "model oracle failed on conversation");
                TurnReply::text_only(APOLOGY)
            }
        }
    }
}

fn render_snippets(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .map(|s| format!("[{}] {}", s.source, s.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
