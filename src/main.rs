use std::io::Write;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use obelisk_agent::catalog::Catalog;
use obelisk_agent::{Agent, Config, IntentClassifier, MemoryStore};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "obelisk")]
#[command(version)]
#[command(about = "Local desktop assistant backed by Ollama")]
#[command(long_about = r#"
Obelisk turns short Portuguese commands into desktop actions and answers
everything else with a local model.

Examples:
  obelisk ask "abra o youtube"
  obelisk ask "pesquise receita de bolo"
  obelisk task "abrir o gmail e procurar a última fatura"
  obelisk classify "feche o firefox"
  obelisk chat
"#)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle one message: run it as an action or chat about it
    Ask {
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
    /// Let the agent work towards a goal on its own
    Task {
        #[arg(trailing_var_arg = true)]
        goal: Vec<String>,

        /// Continue the unfinished task in the memory file
        #[arg(long, conflicts_with = "goal")]
        resume: bool,
    },
    /// Show how a message would be understood, without running it
    Classify {
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
    /// Print the persisted task memory
    Memory,
    /// Interactive session (/reset, /task <goal>, /quit)
    Chat {
        /// Skip loading the model before the first message
        #[arg(long)]
        no_warm_up: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    obelisk_agent::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask { message } => {
            let mut agent = cli.config.build_agent()?;
            println!("{}", agent.process(&message.join(" ")).await);
        }
        Commands::Task { goal, resume } => {
            let agent = cli.config.build_agent()?;
            let outcome = if resume {
                match agent.task_loop().resume().await {
                    Some(outcome) => outcome,
                    None => {
                        println!("Nothing to resume.");
                        return Ok(());
                    }
                }
            } else {
                anyhow::ensure!(!goal.is_empty(), "a goal is required (or pass --resume)");
                agent.run_task(&goal.join(" ")).await
            };
            println!("{}", outcome);
            if !outcome.last_result.is_empty() {
                println!("Last step: {}", outcome.last_result);
            }
        }
        Commands::Classify { message } => {
            let classifier = IntentClassifier::new(Catalog::builtin());
            let intent = classifier.classify(&message.join(" "));
            println!("{}", serde_json::to_string_pretty(&intent)?);
            println!("{}", intent.explain());
            if !intent.is_actionable() {
                println!("(below threshold, would be sent to chat)");
            }
        }
        Commands::Memory => {
            let store = MemoryStore::new(cli.config.memory_path());
            let memory = store.load();
            println!("{}", store.path().display());
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }
        Commands::Chat { no_warm_up } => {
            let mut agent = cli.config.build_agent()?;
            if !no_warm_up {
                // The model loads on first use anyway
                let _ = agent.warm_up().await;
            }
            chat(&mut agent).await?;
        }
    }

    Ok(())
}

async fn chat(agent: &mut Agent) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Obelisk ready. /reset clears the conversation, /task <goal> runs a task, /quit exits.");

    loop {
        print!("> ");
        std::io::stdout().flush().context("flushing stdout")?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/reset" => {
                agent.reset_conversation();
                println!("Conversation cleared.");
            }
            _ => {
                if let Some(goal) = line.strip_prefix("/task ") {
                    let outcome = agent.run_task(goal.trim()).await;
                    println!("{}", outcome);
                } else {
                    println!("{}", agent.process(line).await);
                }
            }
        }
    }

    Ok(())
}
