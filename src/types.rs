use serde::{Deserialize, Serialize};

/// Intents scoring above this are executed directly instead of going to chat.
pub const CONFIDENCE_THRESHOLD: f64 = 0.8;
/// Confidence of the universal chat fallback. Always below the threshold.
pub const CHAT_CONFIDENCE: f64 = 0.5;
pub const MAX_TASK_ITERATIONS: usize = 10;
pub const GOOGLE_SEARCH_URL: &str = "https://www.google.com/search?q=";

/// Closed set of action tags the classifier can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    OpenBrowser,
    Search,
    OpenApp,
    CloseApp,
    Screenshot,
    AnalyzeScreen,
    FindElement,
    ReadScreen,
    DescribeScreen,
    ClickElement,
    Chat,
}

/// A classified action together with its kind-specific parameters.
///
/// Serializes as `{"kind": "OPEN_BROWSER", "params": {"url": ..., "name": ...}}`.
/// Parameters a kind does not use simply do not exist on its variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    OpenBrowser { url: String, name: String },
    Search { query: String },
    OpenApp { command: String, name: String },
    /// `key` is the raw catalog key and is used as the OS process name.
    CloseApp { key: String },
    Screenshot,
    AnalyzeScreen { question: String },
    FindElement { description: String },
    ReadScreen,
    DescribeScreen { question: String },
    ClickElement { description: String },
    Chat {
        #[serde(rename = "userMessage")]
        user_message: String,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::OpenBrowser { .. } => ActionKind::OpenBrowser,
            Action::Search { .. } => ActionKind::Search,
            Action::OpenApp { .. } => ActionKind::OpenApp,
            Action::CloseApp { .. } => ActionKind::CloseApp,
            Action::Screenshot => ActionKind::Screenshot,
            Action::AnalyzeScreen { .. } => ActionKind::AnalyzeScreen,
            Action::FindElement { .. } => ActionKind::FindElement,
            Action::ReadScreen => ActionKind::ReadScreen,
            Action::DescribeScreen { .. } => ActionKind::DescribeScreen,
            Action::ClickElement { .. } => ActionKind::ClickElement,
            Action::Chat { .. } => ActionKind::Chat,
        }
    }
}

/// Result of classifying one utterance. Built once, consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(flatten)]
    pub action: Action,
    pub confidence: f64,
}

impl Intent {
    pub fn new(action: Action, confidence: f64) -> Self {
        Self { action, confidence }
    }

    pub fn chat(message: &str) -> Self {
        Self::new(
            Action::Chat {
                user_message: message.to_string(),
            },
            CHAT_CONFIDENCE,
        )
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn is_actionable(&self) -> bool {
        self.confidence > CONFIDENCE_THRESHOLD
    }

    /// Short sentence telling the user what is about to happen.
    pub fn explain(&self) -> String {
        match &self.action {
            Action::OpenBrowser { name, .. } => format!("Opening {}", name),
            Action::Search { query } => format!("Searching Google for '{}'", query),
            Action::OpenApp { name, .. } => format!("Launching {}", name),
            Action::CloseApp { key } => format!("Closing {}", key),
            Action::Screenshot => "Taking a screenshot".to_string(),
            Action::AnalyzeScreen { .. } => "Analyzing the screen".to_string(),
            Action::FindElement { description } => format!("Looking for '{}' on screen", description),
            Action::ReadScreen => "Reading the text on screen".to_string(),
            Action::DescribeScreen { .. } => "Describing the screen".to_string(),
            Action::ClickElement { description } => format!("Working out how to click '{}'", description),
            Action::Chat { .. } => "Passing your message to the model".to_string(),
        }
    }
}

/// A message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Next-step instruction as the model wrote it. Untrusted: every field is
/// optional on the wire and only validated when turned into a [`Step`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    #[serde(default = "none_action", deserialize_with = "lenient::string")]
    pub action: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub target: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::coord")]
    pub x: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient::coord")]
    pub y: Option<i32>,
}

fn none_action() -> String {
    "none".to_string()
}

impl ProposedAction {
    pub fn none() -> Self {
        Self {
            action: none_action(),
            target: String::new(),
            value: String::new(),
            x: None,
            y: None,
        }
    }

    /// Validate the proposal into something executable.
    pub fn step(&self) -> Step {
        let value = self.value.trim();
        match self.action.trim().to_lowercase().as_str() {
            "click" => match (self.x, self.y) {
                (Some(x), Some(y)) => Step::Click { x, y },
                _ => Step::Insufficient,
            },
            // Typed verbatim: whitespace and newlines are keystrokes too
            "type" if !self.value.is_empty() => Step::Type {
                text: self.value.clone(),
            },
            "open_url" if !value.is_empty() => Step::OpenUrl {
                url: value.to_string(),
            },
            "search" if !value.is_empty() => Step::Search {
                query: value.to_string(),
            },
            "done" => Step::Done,
            _ => Step::Insufficient,
        }
    }
}

impl Default for ProposedAction {
    fn default() -> Self {
        Self::none()
    }
}

/// An executable step derived from a [`ProposedAction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Click { x: i32, y: i32 },
    Type { text: String },
    OpenUrl { url: String },
    Search { query: String },
    Done,
    /// Unknown action, `none`, or missing the fields the action needs.
    Insufficient,
}

pub fn google_search_url(query: &str) -> String {
    format!("{}{}", GOOGLE_SEARCH_URL, urlencoding::encode(query))
}

/// Deserializers that accept whatever shape a language model happens to emit.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn coord<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
        let parsed = match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(parsed
            .filter(|v| v.is_finite() && *v >= i32::MIN as f64 && *v <= i32::MAX as f64)
            .map(|v| v.round() as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_serializes_kind_and_params() {
        let intent = Intent::new(
            Action::OpenBrowser {
                url: "https://www.youtube.com".into(),
                name: "YouTube".into(),
            },
            0.95,
        );
        let json = serde_json::to_value(&intent).unwrap();
        assert_eq!(json["kind"], "OPEN_BROWSER");
        assert_eq!(json["params"]["name"], "YouTube");
        assert_eq!(json["confidence"], 0.95);
    }

    #[test]
    fn test_unit_kinds_carry_no_params() {
        let json = serde_json::to_value(Intent::new(Action::Screenshot, 0.9)).unwrap();
        assert_eq!(json["kind"], "SCREENSHOT");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_chat_uses_user_message_key() {
        let json = serde_json::to_value(Intent::chat("oi")).unwrap();
        assert_eq!(json["params"]["userMessage"], "oi");
        assert!(!Intent::chat("oi").is_actionable());
    }

    #[test]
    fn test_proposal_tolerates_loose_types() {
        let raw = r#"{"action":"CLICK","target":null,"x":"120","y":45.6}"#;
        let p: ProposedAction = serde_json::from_str(raw).unwrap();
        assert_eq!(p.target, "");
        assert_eq!(p.step(), Step::Click { x: 120, y: 46 });
    }

    #[test]
    fn test_click_without_coordinates_is_insufficient() {
        let p: ProposedAction = serde_json::from_str(r#"{"action":"click","x":10}"#).unwrap();
        assert_eq!(p.step(), Step::Insufficient);
    }

    #[test]
    fn test_type_needs_value() {
        let p: ProposedAction = serde_json::from_str(r#"{"action":"type","value":""}"#).unwrap();
        assert_eq!(p.step(), Step::Insufficient);
        let p: ProposedAction = serde_json::from_str(r#"{"action":"type","value":"ola"}"#).unwrap();
        assert_eq!(p.step(), Step::Type { text: "ola".into() });
    }

    #[test]
    fn test_type_keeps_whitespace_value() {
        let p: ProposedAction = serde_json::from_str(r#"{"action":"type","value":"\n"}"#).unwrap();
        assert_eq!(p.step(), Step::Type { text: "\n".into() });
        let p: ProposedAction = serde_json::from_str(r#"{"action":"type","value":" ola "}"#).unwrap();
        assert_eq!(p.step(), Step::Type { text: " ola ".into() });
    }

    #[test]
    fn test_url_and_search_values_are_trimmed() {
        let p: ProposedAction =
            serde_json::from_str(r#"{"action":"open_url","value":" https://a.com \n"}"#).unwrap();
        assert_eq!(p.step(), Step::OpenUrl { url: "https://a.com".into() });
        let p: ProposedAction = serde_json::from_str(r#"{"action":"search","value":"  "}"#).unwrap();
        assert_eq!(p.step(), Step::Insufficient);
    }

    #[test]
    fn test_missing_action_defaults_to_none() {
        let p: ProposedAction = serde_json::from_str(r#"{"target":"x"}"#).unwrap();
        assert_eq!(p.action, "none");
        assert_eq!(p.step(), Step::Insufficient);
    }

    #[test]
    fn test_search_url_is_percent_encoded() {
        assert_eq!(
            google_search_url("receita de bolo"),
            "https://www.google.com/search?q=receita%20de%20bolo"
        );
    }
}
