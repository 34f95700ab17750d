use std::sync::Arc;

use tokio::sync::broadcast;

use crate::brain::{Completion, ModelError};
use crate::catalog::Catalog;
use crate::dispatch::Dispatcher;
use crate::eyes::Vision;
use crate::hands::Hands;
use crate::intent::IntentClassifier;
use crate::memory::MemoryStore;
use crate::session::ConversationSession;
use crate::task_loop::{LoopEvent, TaskLoop, TaskOutcome};
use crate::types::{Intent, MAX_TASK_ITERATIONS};

const WARM_UP_MESSAGE: &str = "oi";

/// Everything the agent talks to outside its own process.
pub struct Collaborators {
    pub model: Arc<dyn Completion>,
    pub vision: Arc<dyn Vision>,
    pub hands: Hands,
    pub store: MemoryStore,
}

/// Owns one conversation and routes each message to an action or to chat.
pub struct Agent {
    classifier: IntentClassifier,
    dispatcher: Dispatcher,
    session: ConversationSession,
    model: Arc<dyn Completion>,
    store: MemoryStore,
    max_iterations: usize,
}

impl Agent {
    pub fn new(parts: Collaborators) -> Self {
        Self {
            classifier: IntentClassifier::new(Catalog::builtin()),
            dispatcher: Dispatcher::new(parts.hands, parts.vision),
            session: ConversationSession::new(parts.model.clone()),
            model: parts.model,
            store: parts.store,
            max_iterations: MAX_TASK_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn classify(&self, message: &str) -> Intent {
        self.classifier.classify(message)
    }

    /// Handle one user message. Confident intents run directly; the rest
    /// become a chat turn.
    pub async fn process(&mut self, message: &str) -> String {
        let intent = self.classifier.classify(message);
        if intent.is_actionable() {
            tracing::info!(
                "[Agent] {:?} ({:.2}): {}",
                intent.kind(),
                intent.confidence,
                message
            );
            self.dispatcher.dispatch(&intent, &mut self.session).await
        } else {
            tracing::debug!("[Agent] Chat ({:.2}): {}", intent.confidence, message);
            self.dispatcher
                .dispatch(&Intent::chat(message), &mut self.session)
                .await
        }
    }

    pub fn reset_conversation(&mut self) {
        tracing::info!("[Agent] Conversation reset");
        self.session.reset();
    }

    /// Forces the model into memory so the first real message is not the one
    /// that waits for it to load.
    pub async fn warm_up(&mut self) -> Result<(), ModelError> {
        tracing::info!("[Agent] Warming up the model...");
        let result = self.session.send(WARM_UP_MESSAGE).await;
        self.session.reset();
        match result {
            Ok(_) => {
                tracing::info!("[Agent] Model ready");
                Ok(())
            }
            Err(e) => {
                tracing::warn!("[Agent] Warm-up failed: {}", e);
                Err(e)
            }
        }
    }

    /// A fresh loop over the shared memory file.
    pub fn task_loop(&self) -> TaskLoop {
        TaskLoop::new(
            self.model.clone(),
            self.dispatcher.vision().clone(),
            self.dispatcher.hands().clone(),
            self.store.clone(),
        )
        .with_max_iterations(self.max_iterations)
    }

    pub async fn run_task(&self, goal: &str) -> TaskOutcome {
        self.task_loop().run_task(goal).await
    }

    pub async fn run_task_with_events(
        &self,
        goal: &str,
        events: broadcast::Sender<LoopEvent>,
    ) -> TaskOutcome {
        self.task_loop().with_events(events).run_task(goal).await
    }
}
