use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::dashboard::DashboardService;
use crate::error::AppServicesError;
use crate::history::HistoryService;
use crate::test_session::TestSessionService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    dashboard: Arc<DashboardService>,
    test_sessions: Arc<TestSessionService>,
    history: Arc<HistoryService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Build services over a fresh in-memory backend.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let dashboard = Arc::new(DashboardService::new(
            clock,
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.license_types),
            Arc::clone(&storage.questions),
            Arc::clone(&storage.statistics),
        ));
        let test_sessions = Arc::new(TestSessionService::new(
            clock,
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.license_types),
            Arc::clone(&storage.questions),
            Arc::clone(&storage.statistics),
        ));
        let history = Arc::new(HistoryService::new(
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.license_types),
        ));

        Self {
            dashboard,
            test_sessions,
            history,
        }
    }

    #[must_use]
    pub fn dashboard(&self) -> Arc<DashboardService> {
        Arc::clone(&self.dashboard)
    }

    #[must_use]
    pub fn test_sessions(&self) -> Arc<TestSessionService> {
        Arc::clone(&self.test_sessions)
    }

    #[must_use]
    pub fn history(&self) -> Arc<HistoryService> {
        Arc::clone(&self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use exam_core::model::UserId;
    use exam_core::time::fixed_clock;

    #[tokio::test]
    async fn sqlite_and_memory_backends_start_empty() {
        let sqlite = AppServices::new_sqlite(
            "sqlite:file:memdb_app_services?mode=memory&cache=shared",
            fixed_clock(),
        )
        .await
        .unwrap();
        let memory = AppServices::in_memory(fixed_clock());

        for services in [sqlite, memory] {
            let dashboard = services.dashboard().load(UserId::new(1), None).await.unwrap();
            assert_eq!(dashboard.stats.total_tests, 0);
            assert!(dashboard.license_types.is_empty());

            let stats = services.history().stats(UserId::new(1)).await.unwrap();
            assert_eq!(stats.total, 0);
        }
    }
}
