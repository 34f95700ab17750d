//! Autonomous task loop: look at the screen, ask the model for one step,
//! do it, remember it, repeat until the model says done or the budget runs out.

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::brain::{Completion, GenerateOptions};
use crate::eyes::Vision;
use crate::hands::Hands;
use crate::memory::{MemoryStore, TaskMemory};
use crate::types::{MAX_TASK_ITERATIONS, ProposedAction, Step};

/// The model's reply, decoded. Anything that is not a JSON object we can read
/// lands in `Unparseable` instead of erroring.
#[derive(Debug, Clone, PartialEq)]
pub enum Proposal {
    Action(ProposedAction),
    Unparseable { reason: String },
}

impl Proposal {
    pub fn into_action(self) -> ProposedAction {
        match self {
            Proposal::Action(action) => action,
            Proposal::Unparseable { .. } => ProposedAction::none(),
        }
    }
}

pub fn decode_proposal(response: &str) -> Proposal {
    let Some(object) = first_json_object(response) else {
        return Proposal::Unparseable {
            reason: "no JSON object in response".to_string(),
        };
    };
    match serde_json::from_str::<ProposedAction>(object) {
        Ok(action) => Proposal::Action(action),
        Err(e) => Proposal::Unparseable {
            reason: e.to_string(),
        },
    }
}

/// First brace-balanced `{...}` in `text`. Braces inside JSON strings are ignored.
pub fn first_json_object(text: &str) -> Option<&str> {
    let mut from = 0;
    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        if let Some(len) = balanced_len(&text[start..]) {
            return Some(&text[start..start + len]);
        }
        from = start + 1;
    }
    None
}

fn balanced_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn build_prompt(goal: &str, screen_text: &str) -> String {
    format!(
        "You are an autonomous agent with access to the user's screen.\n\n\
         User request: \"{goal}\"\n\n\
         Text visible on the screen:\n{screen_text}\n\n\
         Reply with the next action to take as ONE JSON object and nothing else:\n\
         {{\n  \"action\": \"click|type|open_url|search|none|done\",\n  \
         \"target\": \"(the target: text, button, field, url, etc)\",\n  \
         \"value\": \"(text to type, url, etc)\",\n  \
         \"x\": (optional, x coordinate),\n  \
         \"y\": (optional, y coordinate)\n}}\n\
         If the task is complete, use action \"done\"."
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Done,
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub state: LoopState,
    pub iterations: usize,
    pub last_result: String,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            LoopState::Done => write!(f, "Task finished! ({} steps)", self.iterations),
            LoopState::BudgetExhausted => {
                write!(f, "Iteration limit reached ({} steps).", self.iterations)
            }
            LoopState::Running => write!(f, "Task still running"),
        }
    }
}

/// Progress notifications for whoever is watching the loop.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    Thinking { iteration: usize },
    Step { iteration: usize, description: String },
    StepError { iteration: usize, message: String },
}

pub struct TaskLoop {
    model: Arc<dyn Completion>,
    vision: Arc<dyn Vision>,
    hands: Hands,
    store: MemoryStore,
    memory: TaskMemory,
    max_iterations: usize,
    events: Option<broadcast::Sender<LoopEvent>>,
}

impl TaskLoop {
    /// Picks up whatever record the store already holds.
    pub fn new(
        model: Arc<dyn Completion>,
        vision: Arc<dyn Vision>,
        hands: Hands,
        store: MemoryStore,
    ) -> Self {
        let memory = store.load();
        Self {
            model,
            vision,
            hands,
            store,
            memory,
            max_iterations: MAX_TASK_ITERATIONS,
            events: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<LoopEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn memory(&self) -> &TaskMemory {
        &self.memory
    }

    /// Drive `goal` until the model reports done or the budget is spent.
    pub async fn run_task(&mut self, goal: &str) -> TaskOutcome {
        tracing::info!("[Loop] Starting task: {}", goal);
        self.memory.current_task = Some(goal.to_string());
        self.memory.finished = false;
        self.persist();

        let mut iterations = 0;
        let mut last_result = String::new();

        while !self.memory.finished && iterations < self.max_iterations {
            iterations += 1;
            self.emit(LoopEvent::Thinking { iteration: iterations });
            last_result = self.decide_and_act(goal, iterations).await;
            tracing::info!("[Loop] Step {}: {}", iterations, last_result);
        }

        self.persist();

        let state = if self.memory.finished {
            LoopState::Done
        } else {
            tracing::warn!("[Loop] Step limit reached ({})", self.max_iterations);
            LoopState::BudgetExhausted
        };
        TaskOutcome {
            state,
            iterations,
            last_result,
        }
    }

    /// Continue an unfinished task left behind by a previous process.
    pub async fn resume(&mut self) -> Option<TaskOutcome> {
        if self.memory.finished {
            return None;
        }
        let goal = self.memory.current_task.clone()?;
        Some(self.run_task(&goal).await)
    }

    /// One perceive, propose, act cycle. Returns what happened as text.
    pub async fn decide_and_act(&mut self, goal: &str, iteration: usize) -> String {
        let screen_text = self.read_screen().await;
        self.memory.last_screen_text = screen_text;

        let prompt = build_prompt(goal, &self.memory.last_screen_text);
        let action = match self.model.complete(&prompt, &GenerateOptions::PLANNER).await {
            Ok(response) => match decode_proposal(&response) {
                Proposal::Action(action) => action,
                unparseable => {
                    tracing::warn!("[Loop] Could not read model reply: {:?}", unparseable);
                    unparseable.into_action()
                }
            },
            Err(e) => {
                tracing::warn!("[Loop] Model call failed: {}", e);
                ProposedAction::none()
            }
        };

        // Recorded before acting so a crash mid-action still leaves the intent
        self.memory.last_action = Some(action.clone());
        self.persist();

        let result = match self.execute(&action).await {
            Ok(text) => {
                self.emit(LoopEvent::Step {
                    iteration,
                    description: text.clone(),
                });
                text
            }
            Err(e) => {
                let text = format!("Error executing action: {}", e);
                self.emit(LoopEvent::StepError {
                    iteration,
                    message: text.clone(),
                });
                text
            }
        };

        self.persist();
        result
    }

    async fn read_screen(&self) -> String {
        let text = async {
            let image = self.vision.capture().await?;
            self.vision.ocr(&image).await
        }
        .await;
        match text {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("[Loop] Could not read the screen: {:#}", e);
                String::new()
            }
        }
    }

    async fn execute(&mut self, action: &ProposedAction) -> anyhow::Result<String> {
        Ok(match action.step() {
            Step::Click { x, y } => {
                self.hands.click(x, y).await?;
                format!("Clicked at ({},{})", x, y)
            }
            Step::Type { text } => {
                self.hands.type_text(&text).await?;
                format!("Typed: {}", text)
            }
            Step::OpenUrl { url } => {
                self.hands.open_url(&url).await?;
                format!("Opened URL: {}", url)
            }
            Step::Search { query } => {
                self.hands.search(&query).await?;
                format!("Google search: {}", query)
            }
            Step::Done => {
                self.memory.finished = true;
                "Task complete!".to_string()
            }
            Step::Insufficient => "Action not recognized or insufficient.".to_string(),
        })
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.memory) {
            tracing::warn!("[Loop] Could not save task memory: {:#}", e);
        }
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
