use std::sync::Arc;

use storage::repository::{SlotStore, StorageError};
use tracing::{debug, warn};
use yle_core::model::TestSession;

use crate::error::SessionError;

/// Slot holding the single in-flight session.
pub const CURRENT_SESSION_SLOT: &str = "yle_test_session";
/// Slot holding the JSON array of completed sessions.
pub const SESSION_HISTORY_SLOT: &str = "yle_sessions_history";
/// Number of completed sessions kept in history.
pub const HISTORY_LIMIT: usize = 50;

/// JSON codec for the two durable session slots.
#[derive(Clone)]
pub struct SessionPersistence {
    store: Arc<dyn SlotStore>,
}

impl SessionPersistence {
    #[must_use]
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self { store }
    }

    /// Overwrite the current-session slot with `session`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Encode` or `SessionError::Storage`.
    pub async fn save_current(&self, session: &TestSession) -> Result<(), SessionError> {
        let json = serde_json::to_string(session)?;
        self.store.set(CURRENT_SESSION_SLOT, &json).await?;
        debug!(session_id = %session.id(), status = %session.status(), "persisted session");
        Ok(())
    }

    /// Read the current-session slot.
    ///
    /// A slot that does not decode is erased and reported as `None`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only when the backend itself fails.
    pub async fn load_current(&self) -> Result<Option<TestSession>, StorageError> {
        let Some(raw) = self.store.get(CURRENT_SESSION_SLOT).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<TestSession>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!(error = %err, "discarding corrupt persisted session");
                self.store.remove(CURRENT_SESSION_SLOT).await?;
                Ok(None)
            }
        }
    }

    /// Erase the current-session slot. History is untouched.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    pub async fn clear_current(&self) -> Result<(), StorageError> {
        self.store.remove(CURRENT_SESSION_SLOT).await
    }

    /// Read the history slot, oldest first. Corrupt history reads as empty.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` only when the backend itself fails.
    pub async fn load_history(&self) -> Result<Vec<TestSession>, StorageError> {
        let Some(raw) = self.store.get(SESSION_HISTORY_SLOT).await? else {
            return Ok(Vec::new());
        };

        Ok(serde_json::from_str(&raw).unwrap_or_else(|err| {
            warn!(error = %err, "session history is corrupt; treating as empty");
            Vec::new()
        }))
    }

    /// Append a copy of `session` to history, keeping the newest [`HISTORY_LIMIT`].
    ///
    /// The whole array is rewritten.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Encode` or `SessionError::Storage`.
    pub async fn append_history(&self, session: &TestSession) -> Result<usize, SessionError> {
        let mut history = self.load_history().await?;
        history.push(session.clone());
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }

        let json = serde_json::to_string(&history)?;
        self.store.set(SESSION_HISTORY_SLOT, &json).await?;
        debug!(session_id = %session.id(), len = history.len(), "archived session");
        Ok(history.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::repository::InMemoryStore;
    use yle_core::model::{AssessmentId, SessionId, SessionMetadata, StudentId};
    use yle_core::time::fixed_now;

    fn build_session(suffix: &str) -> TestSession {
        TestSession::new(
            SessionId::from_parts(1, suffix),
            StudentId::new("s1"),
            AssessmentId::new("starters-practice-001"),
            30,
            SessionMetadata::default(),
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn corrupt_current_slot_is_discarded() {
        let store = InMemoryStore::new();
        store.set(CURRENT_SESSION_SLOT, "{not json").await.unwrap();
        let persistence = SessionPersistence::new(Arc::new(store.clone()));

        assert!(persistence.load_current().await.unwrap().is_none());
        assert_eq!(store.get(CURRENT_SESSION_SLOT).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_history_is_replaced_on_append() {
        let store = InMemoryStore::new();
        store.set(SESSION_HISTORY_SLOT, "oops").await.unwrap();
        let persistence = SessionPersistence::new(Arc::new(store));

        assert!(persistence.load_history().await.unwrap().is_empty());
        let len = persistence.append_history(&build_session("a")).await.unwrap();
        assert_eq!(len, 1);
        assert_eq!(persistence.load_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_keeps_newest_entries() {
        let persistence = SessionPersistence::new(Arc::new(InMemoryStore::new()));
        for i in 0..(HISTORY_LIMIT + 3) {
            persistence
                .append_history(&build_session(&i.to_string()))
                .await
                .unwrap();
        }

        let history = persistence.load_history().await.unwrap();
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].id(), &SessionId::from_parts(1, "3"));
        assert_eq!(
            history[HISTORY_LIMIT - 1].id(),
            &SessionId::from_parts(1, &(HISTORY_LIMIT + 2).to_string())
        );
    }
}
