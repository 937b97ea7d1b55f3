//! File-backed storage for playbook definitions and workflow history
//!
//! Layout under the storage root:
//!
//! ```text
//! playbooks/<name>.json        playbook definitions
//! state/history/<uuid>.json    terminal workflow instances
//! ```
//!
//! Writes go through a temp file and an atomic rename, so readers never see
//! a partially written document.

use crate::error::{EngineError, Result};
use crate::playbook::PlaybookDefinition;
use crate::workflow::WorkflowInstance;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

pub struct PlaybookStore {
    root: PathBuf,
}

impl PlaybookStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn playbooks_dir(&self) -> PathBuf {
        self.root.join("playbooks")
    }

    fn history_dir(&self) -> PathBuf {
        self.root.join("state").join("history")
    }

    fn playbook_path(&self, name: &str) -> Result<PathBuf> {
        // Playbook names become file names; reject anything that would
        // escape the playbooks directory
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(EngineError::Storage(format!(
                "invalid playbook name '{name}'"
            )));
        }
        Ok(self.playbooks_dir().join(format!("{name}.json")))
    }

    pub fn save_playbook(&self, definition: &PlaybookDefinition) -> Result<()> {
        let path = self.playbook_path(&definition.name)?;
        let json = serde_json::to_string_pretty(definition)?;
        write_atomic(&path, &json)?;
        debug!(playbook = %definition.name, path = %path.display(), "playbook saved");
        Ok(())
    }

    pub fn load_playbook(&self, name: &str) -> Result<PlaybookDefinition> {
        let path = self.playbook_path(name)?;
        if !path.exists() {
            return Err(EngineError::PlaybookNotFound(name.to_string()));
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Names of every stored playbook, sorted
    pub fn list_playbooks(&self) -> Result<Vec<String>> {
        let mut names = list_json_stems(&self.playbooks_dir())?;
        names.sort();
        Ok(names)
    }

    pub fn save_instance(&self, instance: &WorkflowInstance) -> Result<()> {
        let path = self.history_dir().join(format!("{}.json", instance.id));
        let json = serde_json::to_string_pretty(instance)?;
        write_atomic(&path, &json)?;
        debug!(workflow_id = %instance.id, "workflow history saved");
        Ok(())
    }

    pub fn load_instance(&self, id: Uuid) -> Result<WorkflowInstance> {
        let path = self.history_dir().join(format!("{id}.json"));
        if !path.exists() {
            return Err(EngineError::WorkflowNotFound(id.to_string()));
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Every persisted instance, most recently started first
    pub fn list_history(&self) -> Result<Vec<WorkflowInstance>> {
        let dir = self.history_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut instances = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let json = fs::read_to_string(&path)?;
                match serde_json::from_str(&json) {
                    Ok(instance) => instances.push(instance),
                    Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable history entry"),
                }
            }
        }
        instances.sort_by(|a: &WorkflowInstance, b: &WorkflowInstance| {
            b.started_at.cmp(&a.started_at)
        });
        Ok(instances)
    }
}

/// Write through a sibling temp file and rename into place
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| EngineError::Storage(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(parent)?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn list_json_stems(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut stems = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::Step;
    use crate::workflow::{WorkflowContext, WorkflowStatus};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn definition(name: &str) -> PlaybookDefinition {
        PlaybookDefinition {
            name: name.to_string(),
            description: String::new(),
            version: "1.0".to_string(),
            parameters: HashMap::new(),
            steps: vec![Step::Script {
                name: "only".to_string(),
                command: "true".to_string(),
                shell: "sh".to_string(),
                condition: None,
            }],
            required_modules: Vec::new(),
        }
    }

    #[test]
    fn save_load_and_list_playbooks() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path());

        store.save_playbook(&definition("deploy")).unwrap();
        store.save_playbook(&definition("backup")).unwrap();

        assert_eq!(store.load_playbook("deploy").unwrap().name, "deploy");
        assert_eq!(
            store.list_playbooks().unwrap(),
            vec!["backup".to_string(), "deploy".to_string()]
        );
    }

    #[test]
    fn missing_playbook_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path());
        assert!(matches!(
            store.load_playbook("ghost"),
            Err(EngineError::PlaybookNotFound(_))
        ));
    }

    #[test]
    fn path_escaping_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path());
        assert!(store.load_playbook("../etc/passwd").is_err());
        assert!(store.load_playbook("a/b").is_err());
    }

    #[test]
    fn saving_overwrites_atomically() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path());

        let mut def = definition("deploy");
        store.save_playbook(&def).unwrap();
        def.version = "2.0".to_string();
        store.save_playbook(&def).unwrap();

        assert_eq!(store.load_playbook("deploy").unwrap().version, "2.0");
        // No temp file left behind
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("playbooks"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn history_round_trip_sorted_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(dir.path());

        let mut first = WorkflowInstance::new(
            Uuid::new_v4(),
            "deploy",
            "1.0",
            WorkflowContext::default(),
            false,
        );
        first.finalize(WorkflowStatus::Completed);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut second = WorkflowInstance::new(
            Uuid::new_v4(),
            "deploy",
            "1.0",
            WorkflowContext::default(),
            false,
        );
        second.finalize(WorkflowStatus::Failed);

        store.save_instance(&first).unwrap();
        store.save_instance(&second).unwrap();

        let loaded = store.load_instance(first.id).unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Completed);

        let history = store.list_history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
    }
}
