//! Local desktop assistant: Portuguese commands become OS actions, screen
//! questions go to a vision model, everything else is chat with a local
//! Ollama model. An autonomous loop can also drive the desktop towards a goal.

pub mod agent;
pub mod brain;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod eyes;
pub mod hands;
pub mod intent;
pub mod memory;
pub mod session;
pub mod task_loop;
pub mod types;

#[cfg(test)]
mod testing;

pub use agent::{Agent, Collaborators};
pub use brain::{Completion, GenerateOptions, ModelError, OllamaBrain};
pub use config::Config;
pub use intent::IntentClassifier;
pub use memory::{MemoryStore, TaskMemory};
pub use task_loop::{LoopEvent, LoopState, TaskLoop, TaskOutcome};
pub use types::{Action, ActionKind, Intent, ProposedAction};

/// Install the stderr log subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("obelisk_agent=info,obelisk=info,agent=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
