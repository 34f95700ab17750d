//! Stub collaborators for unit tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::brain::{Completion, GenerateOptions, ModelError};
use crate::eyes::{ScreenImage, Vision};

#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Timeout,
    Unreachable,
}

/// Plays back scripted replies in order, then repeats the last one.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Self {
        let last = replies
            .last()
            .cloned()
            .unwrap_or_else(|| Reply::Text(String::new()));
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(last),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::new(vec![Reply::Text(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Completion for ScriptedModel {
    async fn complete(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.lock().unwrap().clone());
        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Timeout => Err(ModelError::Timeout(30)),
            Reply::Unreachable => Err(ModelError::Unreachable("http://127.0.0.1:11434".into())),
        }
    }
}

/// Screen that always shows `screen_text` and answers questions by echoing them.
#[derive(Default)]
pub struct FakeVision {
    pub screen_text: String,
    pub broken: bool,
    pub questions: Mutex<Vec<String>>,
}

impl FakeVision {
    pub fn showing(text: &str) -> Self {
        Self {
            screen_text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Vision for FakeVision {
    async fn capture(&self) -> Result<ScreenImage> {
        if self.broken {
            bail!("no display");
        }
        Ok(ScreenImage {
            path: PathBuf::from("capture.png"),
            png: vec![0x89, b'P', b'N', b'G'],
        })
    }

    async fn save_screenshot(&self, name: Option<&str>) -> Result<PathBuf> {
        if self.broken {
            bail!("no display");
        }
        Ok(PathBuf::from("screenshots").join(name.unwrap_or("screenshot-test.png")))
    }

    async fn ask(&self, _image: &ScreenImage, question: &str) -> Result<String> {
        self.questions.lock().unwrap().push(question.to_string());
        Ok(format!("answer to: {}", question))
    }

    async fn ocr(&self, _image: &ScreenImage) -> Result<String> {
        Ok(self.screen_text.clone())
    }
}
