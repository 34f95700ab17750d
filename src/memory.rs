use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::ProposedAction;

/// Progress of the autonomous loop, persisted so a restarted process can see
/// what was last attempted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default)]
    pub last_screen_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<ProposedAction>,
    #[serde(default)]
    pub finished: bool,
}

/// Whole-record JSON file. Assumes a single writer; two loops sharing one
/// file will clobber each other.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    path: PathBuf,
}

impl MemoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable or corrupt files all yield an empty record.
    pub fn load(&self) -> TaskMemory {
        if !self.path.exists() {
            return TaskMemory::default();
        }
        match self.try_load() {
            Ok(memory) => memory,
            Err(e) => {
                tracing::warn!(
                    "[Memory] Ignoring unreadable {}: {:#}",
                    self.path.display(),
                    e
                );
                TaskMemory::default()
            }
        }
    }

    fn try_load(&self) -> Result<TaskMemory> {
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let memory = serde_json::from_reader(reader)?;
        Ok(memory)
    }

    /// Overwrite the file with `memory`, pretty-printed.
    pub fn save(&self, memory: &TaskMemory) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;

        serde_json::to_writer_pretty(file, memory)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("task_memory.json"));
        assert_eq!(store.load(), TaskMemory::default());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("nested").join("task_memory.json"));
        let memory = TaskMemory {
            current_task: Some("abrir o gmail".into()),
            last_screen_text: "Caixa de entrada".into(),
            last_action: Some(ProposedAction {
                action: "click".into(),
                target: "Escrever".into(),
                value: String::new(),
                x: Some(40),
                y: Some(200),
            }),
            finished: true,
        };

        store.save(&memory).unwrap();
        assert_eq!(store.load(), memory);
    }

    #[test]
    fn test_corrupt_file_degrades_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task_memory.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(MemoryStore::new(&path).load(), TaskMemory::default());
    }

    #[test]
    fn test_file_uses_camel_case_and_is_pretty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("task_memory.json"));
        store
            .save(&TaskMemory {
                current_task: Some("x".into()),
                ..Default::default()
            })
            .unwrap();

        let text = std::fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"currentTask\""));
        assert!(text.contains("\"lastScreenText\""));
        assert!(text.contains('\n'));
    }

    #[test]
    fn test_save_overwrites_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path().join("task_memory.json"));
        store
            .save(&TaskMemory {
                last_screen_text: "a much longer piece of screen text".into(),
                ..Default::default()
            })
            .unwrap();
        store.save(&TaskMemory::default()).unwrap();
        assert_eq!(store.load(), TaskMemory::default());
    }
}
