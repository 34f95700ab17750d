use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::brain::{GenerateOptions, OllamaBrain};
use crate::hands::{CommandRunner, Platform};

pub const FIND_ELEMENT_PROMPT: &str = "Locate on the screen: {target}. Describe its exact position \
(top, middle, bottom, left, right, center) and what is around it.";
pub const READ_TEXT_PROMPT: &str = "List all the text visible on this screen, organized by section.";
pub const DESCRIBE_PROMPT: &str = "Describe in detail what you see on the screen: which program is \
open, what the user is doing, and which actions are available.";
pub const GUIDE_CLICK_PROMPT: &str = "The user wants to click on: \"{target}\".\n\
Look at the screen and tell me:\n\
1. Where is this element? (approximate coordinates or a description of its position)\n\
2. Is the element visible and clickable?\n\
3. Step-by-step instructions to click it.";

/// A captured frame of the screen.
#[derive(Debug, Clone)]
pub struct ScreenImage {
    pub path: PathBuf,
    pub png: Vec<u8>,
}

impl ScreenImage {
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.png)
    }
}

/// Screen capture and understanding.
#[async_trait]
pub trait Vision: Send + Sync {
    async fn capture(&self) -> Result<ScreenImage>;
    /// Capture and keep the file. Returns where it was written.
    async fn save_screenshot(&self, name: Option<&str>) -> Result<PathBuf>;
    async fn ask(&self, image: &ScreenImage, question: &str) -> Result<String>;
    async fn ocr(&self, image: &ScreenImage) -> Result<String>;
}

/// Captures with the platform screenshot tool, reads text with tesseract and
/// answers questions with a local vision model.
pub struct ScreenEyes {
    runner: Arc<dyn CommandRunner>,
    platform: Platform,
    model: OllamaBrain,
    screenshot_dir: PathBuf,
    ocr_lang: String,
}

impl ScreenEyes {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        platform: Platform,
        model: OllamaBrain,
        screenshot_dir: PathBuf,
        ocr_lang: &str,
    ) -> Self {
        Self {
            runner,
            platform,
            model,
            screenshot_dir,
            ocr_lang: ocr_lang.to_string(),
        }
    }

    async fn grab(&self, path: &Path) -> Result<ScreenImage> {
        tokio::fs::create_dir_all(&self.screenshot_dir)
            .await
            .with_context(|| format!("creating {}", self.screenshot_dir.display()))?;

        self.runner
            .run(&self.platform.screenshot(path))
            .await
            .context("screen capture failed")?;

        let png = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading capture {}", path.display()))?;

        Ok(ScreenImage {
            path: path.to_path_buf(),
            png,
        })
    }
}

pub fn screenshot_file_name() -> String {
    format!(
        "screenshot-{}.png",
        chrono::Local::now().format("%Y-%m-%dT%H-%M-%S-%3f")
    )
}

#[async_trait]
impl Vision for ScreenEyes {
    async fn capture(&self) -> Result<ScreenImage> {
        self.grab(&self.screenshot_dir.join("capture.png")).await
    }

    async fn save_screenshot(&self, name: Option<&str>) -> Result<PathBuf> {
        let file = name.map(str::to_string).unwrap_or_else(screenshot_file_name);
        let image = self.grab(&self.screenshot_dir.join(file)).await?;
        tracing::info!("[Eyes] Screenshot saved to {}", image.path.display());
        Ok(image.path)
    }

    async fn ask(&self, image: &ScreenImage, question: &str) -> Result<String> {
        let answer = self
            .model
            .generate(question, &[image.to_base64()], &GenerateOptions::VISION)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        Ok(answer)
    }

    async fn ocr(&self, image: &ScreenImage) -> Result<String> {
        let text = self
            .runner
            .run(&self.platform.ocr(&image.path, &self.ocr_lang))
            .await
            .context("OCR failed")?;
        Ok(text.trim().to_string())
    }
}

pub fn fill(template: &str, target: &str) -> String {
    template.replace("{target}", target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hands::DryRunRunner;

    #[test]
    fn test_fill_template() {
        let q = fill(GUIDE_CLICK_PROMPT, "Salvar");
        assert!(q.contains("\"Salvar\""));
        assert!(!q.contains("{target}"));
    }

    #[test]
    fn test_screenshot_name_shape() {
        let name = screenshot_file_name();
        assert!(name.starts_with("screenshot-"));
        assert!(name.ends_with(".png"));
        assert!(!name.contains(':'));
    }

    #[tokio::test]
    async fn test_ocr_goes_through_runner() {
        let runner = Arc::new(DryRunRunner::with_stdout("  Arquivo  Editar \n"));
        let dir = tempfile::tempdir().unwrap();
        let model = OllamaBrain::new("http://127.0.0.1:11434", "vision", 5).unwrap();
        let eyes = ScreenEyes::new(
            runner.clone(),
            Platform::Linux,
            model,
            dir.path().to_path_buf(),
            "por",
        );
        let image = ScreenImage {
            path: dir.path().join("capture.png"),
            png: Vec::new(),
        };

        assert_eq!(eyes.ocr(&image).await.unwrap(), "Arquivo  Editar");
        let commands = runner.commands();
        let cmd = &commands[0];
        assert_eq!(cmd.program, "tesseract");
        assert_eq!(cmd.args[1..], ["stdout", "-l", "por"]);
    }

    #[tokio::test]
    async fn test_capture_without_output_file_fails() {
        // The dry run never writes the image, so reading it back must fail
        let dir = tempfile::tempdir().unwrap();
        let model = OllamaBrain::new("http://127.0.0.1:11434", "vision", 5).unwrap();
        let eyes = ScreenEyes::new(
            Arc::new(DryRunRunner::new()),
            Platform::Linux,
            model,
            dir.path().to_path_buf(),
            "por",
        );
        assert!(eyes.capture().await.is_err());
    }
}
