//! Action dispatcher - one intent in, one user-facing string out.
//!
//! Every failure is caught here and rendered as `Error: <reason>`; nothing
//! raised by a collaborator crosses this boundary.

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use crate::eyes::{self, Vision};
use crate::hands::Hands;
use crate::session::ConversationSession;
use crate::types::{Action, Intent, google_search_url};

pub struct Dispatcher {
    hands: Hands,
    vision: Arc<dyn Vision>,
}

impl Dispatcher {
    pub fn new(hands: Hands, vision: Arc<dyn Vision>) -> Self {
        Self { hands, vision }
    }

    pub fn hands(&self) -> &Hands {
        &self.hands
    }

    pub fn vision(&self) -> &Arc<dyn Vision> {
        &self.vision
    }

    /// Execute the intent. Chat goes through `session`, everything else
    /// through the OS or vision collaborators.
    pub async fn dispatch(&self, intent: &Intent, session: &mut ConversationSession) -> String {
        tracing::info!("[Dispatch] {}", intent.explain());

        match self.execute(&intent.action, session).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("[Dispatch] {:?} failed: {:#}", intent.kind(), e);
                format!("Error: {:#}", e)
            }
        }
    }

    async fn execute(&self, action: &Action, session: &mut ConversationSession) -> Result<String> {
        match action {
            Action::Chat { user_message } => session
                .send(user_message)
                .await
                .map_err(|e| anyhow!(e.user_message())),
            Action::OpenBrowser { url, name } => self.open_url(url, name).await,
            Action::Search { query } => {
                self.open_url(&google_search_url(query), &format!("Search: {}", query))
                    .await
            }
            Action::OpenApp { command, name } => {
                self.hands
                    .launch_program(command)
                    .await
                    .with_context(|| format!("could not open {}", name))?;
                Ok(format!("✓ {} opened", name))
            }
            Action::CloseApp { key } => {
                // The raw catalog key doubles as the process name
                self.hands
                    .kill_program(key)
                    .await
                    .with_context(|| format!("could not close {}", key))?;
                Ok(format!("✓ {} closed", key))
            }
            Action::Screenshot => {
                let path = self
                    .vision
                    .save_screenshot(None)
                    .await
                    .context("could not capture the screen")?;
                Ok(format!("✓ Screenshot saved to: {}", path.display()))
            }
            Action::AnalyzeScreen { question } => {
                let answer = self
                    .look(question)
                    .await
                    .context("could not analyze the screen")?;
                Ok(format!("🔍 Screen analysis:\n{}", answer))
            }
            Action::FindElement { description } => {
                let answer = self
                    .look(&eyes::fill(eyes::FIND_ELEMENT_PROMPT, description))
                    .await
                    .context("could not look for the element")?;
                Ok(format!("📍 {}:\n{}", description, answer))
            }
            Action::ReadScreen => {
                let answer = self
                    .look(eyes::READ_TEXT_PROMPT)
                    .await
                    .context("could not read the screen")?;
                Ok(format!("📖 Text on screen:\n{}", answer))
            }
            Action::DescribeScreen { question } => {
                let prompt = format!("{}\nThe user asked: {}", eyes::DESCRIBE_PROMPT, question);
                let answer = self
                    .look(&prompt)
                    .await
                    .context("could not describe the screen")?;
                Ok(format!("🖥️ Description:\n{}", answer))
            }
            Action::ClickElement { description } => {
                let answer = self
                    .look(&eyes::fill(eyes::GUIDE_CLICK_PROMPT, description))
                    .await
                    .context("could not guide the click")?;
                Ok(format!("👆 How to click \"{}\":\n{}", description, answer))
            }
        }
    }

    async fn open_url(&self, url: &str, name: &str) -> Result<String> {
        self.hands
            .open_url(url)
            .await
            .with_context(|| format!("could not open {}", name))?;
        Ok(format!("✓ {} opened", name))
    }

    async fn look(&self, question: &str) -> Result<String> {
        let image = self.vision.capture().await?;
        self.vision.ask(&image, question).await
    }
}
