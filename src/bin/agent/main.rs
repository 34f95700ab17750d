mod face;

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use face::{AgentEvent, Command};
use obelisk_agent::{Agent, Config, LoopEvent, LoopState};
use tokio::sync::broadcast;

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Obelisk web face: chat and autonomous tasks in the browser")]
struct Args {
    #[command(flatten)]
    config: Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    obelisk_agent::init_logging();

    let args = Args::parse();
    tracing::info!("[Agent] Starting Obelisk...");

    // Web face first so the user sees something while the model loads
    let (mut cmd_rx, event_tx) = face::start_server(args.config.bind).await?;

    let mut agent = args.config.build_agent()?;
    if agent.warm_up().await.is_err() {
        tracing::warn!("[Agent] Model not ready yet; it will load on the first message");
    }
    tracing::info!("[Agent] Ready. Waiting for commands...");
    let _ = event_tx.send(AgentEvent::Ready);

    // One command at a time, in arrival order
    while let Some(command) = cmd_rx.recv().await {
        tracing::info!("[Agent] Received command: {:?}", command);
        match command {
            Command::Message(text) => {
                let _ = event_tx.send(AgentEvent::Thinking { iteration: 1 });
                let reply = agent.process(&text).await;
                let _ = event_tx.send(AgentEvent::Reply { text: reply });
            }
            Command::Task(goal) => run_task(&agent, &goal, &event_tx).await,
            Command::Reset => {
                agent.reset_conversation();
                let _ = event_tx.send(AgentEvent::Reply {
                    text: "Conversation cleared.".to_string(),
                });
            }
        }
        let _ = event_tx.send(AgentEvent::Ready);
    }

    Ok(())
}

async fn run_task(agent: &Agent, goal: &str, events: &broadcast::Sender<AgentEvent>) {
    let (loop_tx, mut loop_rx) = broadcast::channel::<LoopEvent>(64);

    let forward_to = events.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            let event = match loop_rx.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("[Agent] Dropped {} loop events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let event = match event {
                LoopEvent::Thinking { iteration } => AgentEvent::Thinking { iteration },
                LoopEvent::Step {
                    iteration,
                    description,
                } => AgentEvent::Step {
                    number: iteration,
                    description,
                },
                LoopEvent::StepError { iteration, message } => AgentEvent::StepError {
                    message: format!("Step {}: {}", iteration, message),
                },
            };
            let _ = forward_to.send(event);
        }
    });

    let outcome = agent.run_task_with_events(goal, loop_tx).await;
    // The loop dropped its sender; wait until every step has been relayed
    if let Err(e) = forwarder.await {
        tracing::warn!("[Agent] Event relay stopped: {}", e);
    }

    tracing::info!("[Agent] {}", outcome);
    let _ = match outcome.state {
        LoopState::Done => events.send(AgentEvent::TaskComplete {
            summary: outcome.to_string(),
        }),
        _ => events.send(AgentEvent::TaskError {
            message: outcome.to_string(),
        }),
    };
}
