use std::sync::Arc;

use crate::brain::{Completion, GenerateOptions, ModelError};
use crate::types::{ChatMessage, Role};

const BREVITY_HINT: &str = "(Answer BRIEFLY and DIRECTLY in at most 2 lines)";
/// Earlier turns replayed into each prompt.
const CONTEXT_TURNS: usize = 4;

/// Ordered chat history for the plain-chat fallback. Lives only in memory.
pub struct ConversationSession {
    model: Arc<dyn Completion>,
    history: Vec<ChatMessage>,
}

impl ConversationSession {
    pub fn new(model: Arc<dyn Completion>) -> Self {
        Self {
            model,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Number of user turns in the history.
    pub fn turns(&self) -> usize {
        self.history.iter().filter(|m| m.role == Role::User).count()
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Send one user message and record the exchange. On failure the unanswered
    /// user message is dropped again so the history stays in pairs.
    pub async fn send(&mut self, message: &str) -> Result<String, ModelError> {
        let prompt = self.render_prompt(message);
        self.history.push(ChatMessage {
            role: Role::User,
            content: message.to_string(),
        });

        match self.model.complete(&prompt, &GenerateOptions::CHAT).await {
            Ok(reply) => {
                let reply = reply.trim().to_string();
                self.history.push(ChatMessage {
                    role: Role::Assistant,
                    content: reply.clone(),
                });
                Ok(reply)
            }
            Err(e) => {
                self.history.pop();
                Err(e)
            }
        }
    }

    fn render_prompt(&self, message: &str) -> String {
        let skip = self.history.len().saturating_sub(CONTEXT_TURNS * 2);
        let mut prompt = String::new();
        for m in &self.history[skip..] {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", speaker, m.content));
        }
        if prompt.is_empty() {
            format!("{}\n\n{}", message, BREVITY_HINT)
        } else {
            format!("{}User: {}\n\n{}", prompt, message, BREVITY_HINT)
        }
    }
}
