//! Per-conversation mutable state.

use crate::model::{ChatMessage, Role};

/// Persona instruction carried as the session's system message.
pub const PERSONA_PROMPT: &str = "Eres 'Luna', una profesora de idiomas formal, paciente y \
profesional. Detecta qué idioma el estudiante desea practicar. Responde en ese idioma y siempre \
incluye la traducción al español entre paréntesis.";

/// Fixed text returned on the very first turn, before any processing happens.
pub const GREETING: &str = "¡Hola! Soy Luna, tu asistente de idiomas. Estoy aquí para ayudarte a \
aprender vocabulario, frases y expresiones del idioma que quieras practicar, siempre con su \
traducción al español.\n\nPara empezar, ¿qué idioma te gustaría practicar hoy? (por ejemplo: \
inglés, francés o español)";

/// State for exactly one conversation. Created at process start, mutated
/// turn-by-turn, never persisted.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    pub greeted: bool,
    pub history: Vec<ChatMessage>,
    /// Headword of the most recent definition query, consumed by the next
    /// registration request.
    pub last_queried_term: Option<String>,
}

impl ConversationSession {
    pub fn new() -> Self {
        Self {
            greeted: false,
            history: vec![ChatMessage::system(PERSONA_PROMPT)],
            last_queried_term: None,
        }
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::assistant(text));
    }

    /// Most recent assistant reply, used as extraction context.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.text.as_str())
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}
