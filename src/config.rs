use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use crate::agent::{Agent, Collaborators};
use crate::brain::OllamaBrain;
use crate::eyes::ScreenEyes;
use crate::hands::{CommandRunner, DryRunRunner, Hands, Platform, SystemRunner};
use crate::memory::MemoryStore;

/// Settings shared by both binaries. Every field can come from a flag or
/// from the environment (a `.env` file is loaded first).
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Ollama server URL
    #[arg(long, env = "OBELISK_OLLAMA_URL", default_value = "http://127.0.0.1:11434")]
    pub ollama_url: String,

    /// Model used for chat and for the task loop
    #[arg(long, env = "OBELISK_MODEL", default_value = "llama3.2:latest")]
    pub model: String,

    /// Model used to answer questions about screenshots
    #[arg(long, env = "OBELISK_VISION_MODEL", default_value = "llama3.2-vision:latest")]
    pub vision_model: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "OBELISK_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Task memory file [default: <local data dir>/obelisk/task_memory.json]
    #[arg(long, env = "OBELISK_MEMORY_PATH")]
    pub memory_path: Option<PathBuf>,

    /// Where screenshots are saved [default: <local data dir>/obelisk/screenshots]
    #[arg(long, env = "OBELISK_SCREENSHOT_DIR")]
    pub screenshot_dir: Option<PathBuf>,

    /// Tesseract language code
    #[arg(long, env = "OBELISK_OCR_LANG", default_value = "por")]
    pub ocr_lang: String,

    /// Step budget for autonomous tasks
    #[arg(long, env = "OBELISK_MAX_ITERATIONS", default_value_t = 10)]
    pub max_iterations: usize,

    /// Log OS commands instead of running them
    #[arg(long, env = "OBELISK_DRY_RUN")]
    pub dry_run: bool,

    /// Address for the web face
    #[arg(long, env = "OBELISK_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,
}

impl Config {
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("obelisk")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.memory_path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("task_memory.json"))
    }

    pub fn screenshot_dir(&self) -> PathBuf {
        self.screenshot_dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("screenshots"))
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        if self.dry_run {
            tracing::info!("[Config] Dry run: OS commands will only be logged");
            Arc::new(DryRunRunner::new())
        } else {
            Arc::new(SystemRunner)
        }
    }

    /// Wire up the real collaborators.
    pub fn build_agent(&self) -> Result<Agent> {
        let platform = Platform::current();
        let runner = self.runner();

        let brain = OllamaBrain::new(&self.ollama_url, &self.model, self.timeout_secs)?;
        let vision_brain =
            OllamaBrain::new(&self.ollama_url, &self.vision_model, self.timeout_secs)?;
        let eyes = ScreenEyes::new(
            runner.clone(),
            platform,
            vision_brain,
            self.screenshot_dir(),
            &self.ocr_lang,
        );

        tracing::info!(
            "[Config] model={} vision={} memory={}",
            self.model,
            self.vision_model,
            self.memory_path().display()
        );

        let agent = Agent::new(Collaborators {
            model: Arc::new(brain),
            vision: Arc::new(eyes),
            hands: Hands::new(runner, platform),
            store: MemoryStore::new(self.memory_path()),
        });
        Ok(agent.with_max_iterations(self.max_iterations))
    }
}
