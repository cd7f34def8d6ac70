use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::catalog::AssessmentProvider;
use crate::error::AppServicesError;
use crate::sessions::{EnvironmentProbe, SessionHistoryService, SessionManager};

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    storage: Storage,
    environment: EnvironmentProbe,
    catalog: Arc<dyn AssessmentProvider>,
    history: Arc<SessionHistoryService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        catalog: Arc<dyn AssessmentProvider>,
        environment: EnvironmentProbe,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(storage, clock, catalog, environment))
    }

    #[must_use]
    pub fn in_memory(clock: Clock, catalog: Arc<dyn AssessmentProvider>) -> Self {
        Self::from_storage(
            Storage::in_memory(),
            clock,
            catalog,
            EnvironmentProbe::default(),
        )
    }

    fn from_storage(
        storage: Storage,
        clock: Clock,
        catalog: Arc<dyn AssessmentProvider>,
        environment: EnvironmentProbe,
    ) -> Self {
        let history = Arc::new(SessionHistoryService::new(Arc::clone(&storage.slots)));
        Self {
            clock,
            storage,
            environment,
            catalog,
            history,
        }
    }

    /// A fresh manager over the shared slots. It recovers any persisted
    /// session on its first `current_session` call.
    #[must_use]
    pub fn session_manager(&self) -> SessionManager {
        SessionManager::new(self.clock, Arc::clone(&self.storage.slots))
            .with_environment(self.environment.clone())
    }

    #[must_use]
    pub fn history(&self) -> Arc<SessionHistoryService> {
        Arc::clone(&self.history)
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<dyn AssessmentProvider> {
        Arc::clone(&self.catalog)
    }
}
