// Live onboarding sessions, each behind its own lock, backed by on-disk drafts

use crate::models::{OnboardingSession, OnboardingState};
use crate::storage::{DraftStore, StoreResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// A session shared between requests. Holding the lock is what serializes
/// turns within one session.
pub type SharedSession = Arc<Mutex<OnboardingSession>>;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SharedSession>>,
    drafts: Option<DraftStore>,
}

impl SessionRegistry {
    pub fn new(drafts: Option<DraftStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            drafts,
        }
    }

    /// Register a new session and write its first draft
    pub async fn insert(&self, session: OnboardingSession) -> SharedSession {
        self.save_draft(&session);
        let id = session.id.clone();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, shared.clone());
        shared
    }

    /// Look up a session, reviving it from its draft after a restart
    pub async fn get(&self, session_id: &str) -> StoreResult<Option<SharedSession>> {
        if let Some(shared) = self.sessions.read().await.get(session_id) {
            return Ok(Some(shared.clone()));
        }

        let Some(drafts) = &self.drafts else {
            return Ok(None);
        };
        let Some(session) = drafts.load(session_id)? else {
            return Ok(None);
        };

        log::info!("Restored onboarding session {} from draft", session_id);
        let mut sessions = self.sessions.write().await;
        let shared = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(session)))
            .clone();
        Ok(Some(shared))
    }

    /// Write the session's draft. Persisted sessions no longer keep one.
    pub fn save_draft(&self, session: &OnboardingSession) {
        let Some(drafts) = &self.drafts else {
            return;
        };
        if session.state == (OnboardingState::Complete { persisted: true }) {
            return;
        }
        if let Err(e) = drafts.save(session) {
            log::warn!("Failed to save draft for session {}: {}", session.id, e);
        }
    }

    /// Write drafts for every live session, returning how many were written
    pub async fn flush_drafts(&self) -> usize {
        let sessions: Vec<SharedSession> = self.sessions.read().await.values().cloned().collect();
        let mut saved = 0;
        for shared in sessions {
            let session = shared.lock().await;
            if session.state != (OnboardingState::Complete { persisted: true }) {
                self.save_draft(&session);
                saved += 1;
            }
        }
        saved
    }

    /// Forget a session whose profile is stored, along with its draft.
    /// Returns false while the session still has work left.
    pub async fn retire(&self, session: &OnboardingSession) -> bool {
        if session.state != (OnboardingState::Complete { persisted: true }) {
            return false;
        }
        self.sessions.write().await.remove(&session.id);
        if let Some(drafts) = &self.drafts {
            if let Err(e) = drafts.clear(&session.id) {
                log::warn!("Failed to clear draft for session {}: {}", session.id, e);
            }
        }
        log::debug!("Retired onboarding session {}", session.id);
        true
    }

    /// Drop sessions idle for longer than `max_idle`, keeping their drafts so
    /// a later request can revive them. Sessions mid-turn are skipped.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let max_idle =
            chrono::Duration::from_std(max_idle).unwrap_or_else(|_| chrono::Duration::hours(1));
        let cutoff = Utc::now() - max_idle;

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, shared| {
            let Ok(session) = shared.try_lock() else {
                return true;
            };
            if !idle_since(&session.updated_at, cutoff) {
                return true;
            }
            self.save_draft(&session);
            log::debug!("Evicted idle onboarding session {}", id);
            false
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Unreadable timestamps count as idle
fn idle_since(updated_at: &str, cutoff: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(updated_at)
        .map(|t| t.with_timezone(&Utc) < cutoff)
        .unwrap_or(true)
}
