// Onboarding drafts: one JSON file per session under {data_dir}/drafts/

use super::{ensure_dir, read_json, validate_key, write_json, StoreError, StoreResult};
use crate::models::OnboardingSession;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DraftStore {
    dir: PathBuf,
}

impl DraftStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("drafts"),
        }
    }

    fn draft_path(&self, session_id: &str) -> StoreResult<PathBuf> {
        let key = validate_key(session_id)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }

    pub fn save(&self, session: &OnboardingSession) -> StoreResult<()> {
        let path = self.draft_path(&session.id)?;
        write_json(&path, session)?;
        log::debug!("Saved onboarding draft {}", session.id);
        Ok(())
    }

    pub fn load(&self, session_id: &str) -> StoreResult<Option<OnboardingSession>> {
        let path = self.draft_path(session_id)?;
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    /// Remove a draft. Clearing a missing draft is not an error.
    pub fn clear(&self, session_id: &str) -> StoreResult<()> {
        let path = self.draft_path(session_id)?;
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                StoreError::Io(format!("Failed to remove draft {:?}: {}", path, e))
            })?;
            log::debug!("Cleared onboarding draft {}", session_id);
        }
        Ok(())
    }

    /// Ids of every stored draft
    pub fn list(&self) -> StoreResult<Vec<String>> {
        ensure_dir(&self.dir)?;
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| StoreError::Io(format!("Failed to read drafts directory: {}", e)))?;

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == "json").unwrap_or(false))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Conversation, InputChannel, PromptMode};
    use tempfile::TempDir;

    fn session(id: &str) -> OnboardingSession {
        let mut conversation = Conversation::new("persona");
        conversation.push_assistant("Hi!");
        conversation.push_user("Hello, I'm Sam");
        OnboardingSession::new(
            id.to_string(),
            PromptMode::Playful,
            InputChannel::Text,
            conversation,
        )
    }

    #[test]
    fn test_save_load_clear() {
        let temp = TempDir::new().unwrap();
        let drafts = DraftStore::new(temp.path());

        drafts.save(&session("s1")).unwrap();
        let loaded = drafts.load("s1").unwrap().unwrap();
        assert_eq!(loaded.mode, PromptMode::Playful);
        assert_eq!(loaded.conversation.answer_count(), 1);
        assert_eq!(drafts.list().unwrap(), vec!["s1".to_string()]);

        drafts.clear("s1").unwrap();
        assert!(drafts.load("s1").unwrap().is_none());
        drafts.clear("s1").unwrap();
    }

    #[test]
    fn test_list_empty_dir() {
        let temp = TempDir::new().unwrap();
        let drafts = DraftStore::new(temp.path());
        assert!(drafts.list().unwrap().is_empty());
    }
}
