//! Intent classifier - maps a free-text utterance to one typed action.
//!
//! Classification is a fixed pipeline of stages tried in priority order. A
//! stage either commits a fully-formed [`Intent`] or passes; the first commit
//! wins and chat is the fallback when every stage passes.

use regex::Regex;

use crate::catalog::{Catalog, contains_any, triggers};
use crate::types::{Action, Intent};

pub const OPEN_SITE_CONFIDENCE: f64 = 0.95;
pub const SEARCH_CONFIDENCE: f64 = 0.9;
pub const OPEN_APP_CONFIDENCE: f64 = 0.9;
pub const CLOSE_APP_CONFIDENCE: f64 = 0.85;
pub const SCREENSHOT_CONFIDENCE: f64 = 0.9;
pub const ANALYZE_CONFIDENCE: f64 = 0.85;
pub const FIND_CONFIDENCE: f64 = 0.85;
pub const READ_CONFIDENCE: f64 = 0.9;
pub const DESCRIBE_CONFIDENCE: f64 = 0.88;
pub const CLICK_CONFIDENCE: f64 = 0.85;

/// One utterance in the shapes the stages need.
struct Utterance<'a> {
    raw: &'a str,
    trimmed: &'a str,
    lower: String,
}

impl<'a> Utterance<'a> {
    fn new(raw: &'a str) -> Self {
        let trimmed = raw.trim();
        Self {
            raw,
            trimmed,
            lower: trimmed.to_lowercase(),
        }
    }
}

type Stage = fn(&IntentClassifier, &Utterance<'_>) -> Option<Intent>;

/// Stage order is part of the contract: trigger lists overlap ("abre" opens
/// both sites and programs) and the earlier stage must win.
const STAGES: &[Stage] = &[
    IntentClassifier::open_site,
    IntentClassifier::search,
    IntentClassifier::open_program,
    IntentClassifier::close_program,
    IntentClassifier::screenshot,
    IntentClassifier::analyze_screen,
    IntentClassifier::find_element,
    IntentClassifier::read_screen,
    IntentClassifier::describe_screen,
    IntentClassifier::click_element,
];

/// Trigger phrase compiled for removal from the case-preserved user text.
struct Stripper {
    phrase: &'static str,
    pattern: Regex,
}

impl Stripper {
    fn compile(phrases: &[&'static str]) -> Vec<Self> {
        phrases
            .iter()
            .map(|phrase| Self {
                phrase,
                pattern: Regex::new(&format!("(?i){}", regex::escape(phrase)))
                    .expect("Invalid regex pattern"),
            })
            .collect()
    }
}

pub struct IntentClassifier {
    catalog: Catalog,
    search_prefixes: Vec<Regex>,
    find_strippers: Vec<Stripper>,
    click_strippers: Vec<Stripper>,
    url_pattern: Regex,
}

impl IntentClassifier {
    pub fn new(catalog: Catalog) -> Self {
        // Compile regex patterns once - escaped literals never fail
        let search_prefixes = triggers::SEARCH
            .iter()
            .map(|phrase| {
                Regex::new(&format!(r"(?i)^{}\s+", regex::escape(phrase)))
                    .expect("Invalid regex pattern")
            })
            .collect();

        // Bare domains must end at a word boundary so "notas.braindump" is not a URL
        let url_pattern = Regex::new(
            r"(?i)https?://\S+|www\.\S+|(?:[a-z0-9-]+\.)+(?:com|org|net|br|gov|edu|io|dev|app)\b(?:[/:?#]\S*)?",
        )
        .expect("Invalid regex pattern");

        Self {
            catalog,
            search_prefixes,
            find_strippers: Stripper::compile(triggers::FIND_ELEMENT),
            click_strippers: Stripper::compile(triggers::CLICK_ELEMENT),
            url_pattern,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Classify an utterance. Never fails: unmatched text becomes chat,
    /// carrying the message exactly as given.
    pub fn classify(&self, text: &str) -> Intent {
        let utterance = Utterance::new(text);
        let intent = STAGES
            .iter()
            .find_map(|stage| stage(self, &utterance))
            .unwrap_or_else(|| Intent::chat(text));
        tracing::debug!(
            "Classified {:?} as {:?} ({:.2})",
            text,
            intent.kind(),
            intent.confidence
        );
        intent
    }

    fn open_site(&self, u: &Utterance<'_>) -> Option<Intent> {
        if !contains_any(&u.lower, triggers::OPEN_SITE) {
            return None;
        }

        if let Some(site) = self.catalog.find_site(&u.lower) {
            return Some(Intent::new(
                Action::OpenBrowser {
                    url: site.url.to_string(),
                    name: site.name.to_string(),
                },
                OPEN_SITE_CONFIDENCE,
            ));
        }

        // Unregistered but explicit address
        let found = self
            .url_pattern
            .find(u.trimmed)?
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
        if found.is_empty() {
            return None;
        }
        let url = if found.to_lowercase().starts_with("http") {
            found.to_string()
        } else {
            format!("https://{}", found)
        };
        Some(Intent::new(
            Action::OpenBrowser {
                name: url.clone(),
                url,
            },
            OPEN_SITE_CONFIDENCE,
        ))
    }

    fn search(&self, u: &Utterance<'_>) -> Option<Intent> {
        self.search_prefixes.iter().find_map(|prefix| {
            let m = prefix.find(u.trimmed)?;
            let query = u.trimmed[m.end()..].trim();
            (!query.is_empty()).then(|| {
                Intent::new(
                    Action::Search {
                        query: query.to_string(),
                    },
                    SEARCH_CONFIDENCE,
                )
            })
        })
    }

    fn open_program(&self, u: &Utterance<'_>) -> Option<Intent> {
        if !contains_any(&u.lower, triggers::OPEN_PROGRAM) {
            return None;
        }
        let program = self.catalog.find_program(&u.lower)?;
        Some(Intent::new(
            Action::OpenApp {
                command: program.command.to_string(),
                name: program.name.to_string(),
            },
            OPEN_APP_CONFIDENCE,
        ))
    }

    fn close_program(&self, u: &Utterance<'_>) -> Option<Intent> {
        if !contains_any(&u.lower, triggers::CLOSE) {
            return None;
        }
        let program = self.catalog.find_program(&u.lower)?;
        Some(Intent::new(
            Action::CloseApp {
                key: program.key.to_string(),
            },
            CLOSE_APP_CONFIDENCE,
        ))
    }

    fn screenshot(&self, u: &Utterance<'_>) -> Option<Intent> {
        contains_any(&u.lower, triggers::SCREENSHOT)
            .then(|| Intent::new(Action::Screenshot, SCREENSHOT_CONFIDENCE))
    }

    fn analyze_screen(&self, u: &Utterance<'_>) -> Option<Intent> {
        contains_any(&u.lower, triggers::ANALYZE_SCREEN).then(|| {
            Intent::new(
                Action::AnalyzeScreen {
                    question: u.raw.to_string(),
                },
                ANALYZE_CONFIDENCE,
            )
        })
    }

    fn find_element(&self, u: &Utterance<'_>) -> Option<Intent> {
        let description = strip_first(&self.find_strippers, u)?;
        Some(Intent::new(
            Action::FindElement { description },
            FIND_CONFIDENCE,
        ))
    }

    fn read_screen(&self, u: &Utterance<'_>) -> Option<Intent> {
        contains_any(&u.lower, triggers::READ_SCREEN)
            .then(|| Intent::new(Action::ReadScreen, READ_CONFIDENCE))
    }

    fn describe_screen(&self, u: &Utterance<'_>) -> Option<Intent> {
        contains_any(&u.lower, triggers::DESCRIBE_SCREEN).then(|| {
            Intent::new(
                Action::DescribeScreen {
                    question: u.raw.to_string(),
                },
                DESCRIBE_CONFIDENCE,
            )
        })
    }

    fn click_element(&self, u: &Utterance<'_>) -> Option<Intent> {
        let description = strip_first(&self.click_strippers, u)?;
        Some(Intent::new(
            Action::ClickElement { description },
            CLICK_CONFIDENCE,
        ))
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(Catalog::builtin())
    }
}

/// For the first trigger present, remove every occurrence of it and return
/// what is left. An empty remainder does not commit; the next trigger is tried.
fn strip_first(strippers: &[Stripper], u: &Utterance<'_>) -> Option<String> {
    strippers
        .iter()
        .filter(|s| u.lower.contains(s.phrase))
        .find_map(|s| {
            let rest = s.pattern.replace_all(u.trimmed, "");
            let rest = rest.trim();
            (!rest.is_empty()).then(|| rest.to_string())
        })
}
