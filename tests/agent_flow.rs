use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use obelisk_agent::eyes::{ScreenImage, Vision};
use obelisk_agent::hands::{DryRunRunner, Hands, Platform};
use obelisk_agent::{
    Agent, Collaborators, Completion, GenerateOptions, LoopState, MemoryStore, ModelError,
};

struct EchoModel {
    prompts: Mutex<Vec<String>>,
    reply: String,
}

impl EchoModel {
    fn replying(reply: &str) -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        }
    }
}

#[async_trait]
impl Completion for EchoModel {
    async fn complete(&self, prompt: &str, _options: &GenerateOptions) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

struct StillScreen;

#[async_trait]
impl Vision for StillScreen {
    async fn capture(&self) -> Result<ScreenImage> {
        Ok(ScreenImage {
            path: PathBuf::from("capture.png"),
            png: Vec::new(),
        })
    }

    async fn save_screenshot(&self, _name: Option<&str>) -> Result<PathBuf> {
        Ok(PathBuf::from("shot.png"))
    }

    async fn ask(&self, _image: &ScreenImage, _question: &str) -> Result<String> {
        Ok("A text editor with an empty document.".to_string())
    }

    async fn ocr(&self, _image: &ScreenImage) -> Result<String> {
        Ok("Arquivo Editar Exibir".to_string())
    }
}

struct Harness {
    agent: Agent,
    runner: Arc<DryRunRunner>,
    model: Arc<EchoModel>,
    _dir: tempfile::TempDir,
}

fn harness(reply: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let runner = Arc::new(DryRunRunner::new());
    let model = Arc::new(EchoModel::replying(reply));
    let agent = Agent::new(Collaborators {
        model: model.clone(),
        vision: Arc::new(StillScreen),
        hands: Hands::new(runner.clone(), Platform::Linux),
        store: MemoryStore::new(dir.path().join("task_memory.json")),
    });
    Harness {
        agent,
        runner,
        model,
        _dir: dir,
    }
}

#[tokio::test]
async fn open_search_and_close_run_commands() {
    let mut h = harness("oi");

    assert_eq!(h.agent.process("abra o youtube").await, "✓ YouTube opened");
    assert!(
        h.agent
            .process("pesquise receita de bolo")
            .await
            .contains("receita de bolo")
    );
    assert_eq!(h.agent.process("feche o firefox").await, "✓ firefox closed");

    let commands = h.runner.commands();
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0].program, "xdg-open");
    assert_eq!(
        commands[1].args,
        vec!["https://www.google.com/search?q=receita%20de%20bolo"]
    );
    assert_eq!(commands[2].program, "pkill");
    assert_eq!(h.model.prompts.lock().unwrap().len(), 0);
}

#[tokio::test]
async fn screen_questions_use_vision() {
    let mut h = harness("oi");
    let out = h.agent.process("descreva o que tem na tela").await;
    assert!(out.contains("A text editor"), "{}", out);
}

#[tokio::test]
async fn small_talk_goes_to_the_model() {
    let mut h = harness("Estou bem, obrigado!");

    assert_eq!(h.agent.process("como vai?").await, "Estou bem, obrigado!");
    assert_eq!(h.agent.session().turns(), 1);

    h.agent.reset_conversation();
    h.agent.process("como vai?").await;
    assert_eq!(h.agent.session().turns(), 1);
    assert!(h.runner.commands().is_empty());
}

#[tokio::test]
async fn autonomous_task_persists_progress() {
    let h = harness(r#"Claro! {"action": "type", "target": "documento", "value": "Olá mundo"}"#);
    let outcome = h.agent.run_task("escrever olá mundo no editor").await;

    assert_eq!(outcome.state, LoopState::BudgetExhausted);
    assert_eq!(outcome.iterations, 10);
    assert_eq!(h.runner.commands().len(), 10);

    let memory = h.agent.store().load();
    assert_eq!(
        memory.current_task.as_deref(),
        Some("escrever olá mundo no editor")
    );
    assert_eq!(memory.last_screen_text, "Arquivo Editar Exibir");
    assert_eq!(memory.last_action.unwrap().value, "Olá mundo");
    assert!(!memory.finished);
}
