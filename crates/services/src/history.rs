use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use exam_core::model::{
    AnswerId, AnsweredQuestion, AttemptStatus, LicenseTypeId, LicenseTypeSummary, QuestionId,
    TestAttempt, TestAttemptId, TestConfiguration, TestKind, UserId,
};
use exam_core::stats::HistoryStats;
use serde::{Deserialize, Serialize};
use storage::repository::{AttemptFilter, AttemptRepository, LicenseTypeRepository, StorageError};

use crate::error::HistoryError;

/// Results shown per history page.
pub const HISTORY_PAGE_SIZE: u32 = 20;

const COMPLETED: [AttemptStatus; 3] = [
    AttemptStatus::Completed,
    AttemptStatus::Passed,
    AttemptStatus::Failed,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatusFilter {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub status: Option<HistoryStatusFilter>,
    pub kind: Option<TestKind>,
}

impl HistoryFilter {
    fn attempt_filter(self, page: u32) -> AttemptFilter {
        let statuses = match self.status {
            Some(HistoryStatusFilter::Passed) => vec![AttemptStatus::Passed],
            Some(HistoryStatusFilter::Failed) => vec![AttemptStatus::Failed],
            None => COMPLETED.to_vec(),
        };
        AttemptFilter {
            statuses,
            kind: self.kind,
            limit: Some(HISTORY_PAGE_SIZE),
            offset: page.saturating_sub(1).saturating_mul(HISTORY_PAGE_SIZE),
        }
    }
}

/// One row of the history list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    pub id: TestAttemptId,
    pub test_type: TestKind,
    pub status: AttemptStatus,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub total_questions: u32,
    pub score_percentage: f64,
    pub time_taken_seconds: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub license_type: Option<LicenseTypeSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryPage {
    pub items: Vec<HistoryItem>,
    pub page: u32,
    pub per_page: u32,
    pub total: u32,
    pub last_page: u32,
}

/// Full view of a finished attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryDetail {
    pub id: TestAttemptId,
    pub test_type: TestKind,
    pub status: AttemptStatus,
    pub configuration: TestConfiguration,
    pub questions: Vec<AnsweredQuestion>,
    pub answers_given: BTreeMap<QuestionId, AnswerId>,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub total_questions: u32,
    pub score_percentage: f64,
    pub time_taken_seconds: Option<i64>,
    pub allowed_wrong: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub license_type_id: Option<LicenseTypeId>,
    pub license_type: Option<LicenseTypeSummary>,
}

/// Lists, shows and deletes finished attempts.
#[derive(Clone)]
pub struct HistoryService {
    attempts: Arc<dyn AttemptRepository>,
    license_types: Arc<dyn LicenseTypeRepository>,
}

impl HistoryService {
    #[must_use]
    pub fn new(
        attempts: Arc<dyn AttemptRepository>,
        license_types: Arc<dyn LicenseTypeRepository>,
    ) -> Self {
        Self {
            attempts,
            license_types,
        }
    }

    /// One page (1-based) of completed attempts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` if repository access fails.
    pub async fn list(
        &self,
        user_id: UserId,
        filter: HistoryFilter,
        page: u32,
    ) -> Result<HistoryPage, HistoryError> {
        let page = page.max(1);
        let attempt_filter = filter.attempt_filter(page);
        let attempts = self
            .attempts
            .list_attempts_for_user(user_id, &attempt_filter)
            .await?;
        let total = self
            .attempts
            .count_attempts_for_user(user_id, &attempt_filter.unpaged())
            .await?;

        let summaries: HashMap<LicenseTypeId, LicenseTypeSummary> = self
            .license_types
            .list_license_types()
            .await?
            .iter()
            .map(|lt| (lt.id, lt.summary()))
            .collect();

        let items = attempts
            .iter()
            .map(|a| HistoryItem {
                id: a.id(),
                test_type: a.kind(),
                status: a.status(),
                correct_count: a.correct_count(),
                wrong_count: a.wrong_count(),
                total_questions: a.total_questions(),
                score_percentage: a.score_percentage(),
                time_taken_seconds: a.time_taken_seconds(),
                started_at: a.started_at(),
                finished_at: a.finished_at(),
                license_type: a.license_type_id().and_then(|id| summaries.get(&id).cloned()),
            })
            .collect();

        tracing::debug!(%user_id, page, total, "history page loaded");
        Ok(HistoryPage {
            items,
            page,
            per_page: HISTORY_PAGE_SIZE,
            total,
            last_page: total.div_ceil(HISTORY_PAGE_SIZE).max(1),
        })
    }

    /// Completed/passed/failed counters.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::Storage` if repository access fails.
    pub async fn stats(&self, user_id: UserId) -> Result<HistoryStats, HistoryError> {
        let completed = self
            .attempts
            .list_attempts_for_user(user_id, &AttemptFilter::with_statuses(&COMPLETED))
            .await?;
        Ok(HistoryStats::from_attempts(&completed))
    }

    /// Detail of a finished attempt.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::NotFound` for unknown or still running attempts,
    /// `HistoryError::Forbidden` for attempts of another user.
    pub async fn detail(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
    ) -> Result<HistoryDetail, HistoryError> {
        let attempt = self.load_owned(user_id, attempt_id).await?;
        if !attempt.status().is_finished() {
            return Err(HistoryError::NotFound);
        }

        let license_type = match attempt.license_type_id() {
            Some(id) => match self.license_types.get_license_type(id).await {
                Ok(lt) => Some(lt.summary()),
                Err(StorageError::NotFound) => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        Ok(HistoryDetail {
            id: attempt.id(),
            test_type: attempt.kind(),
            status: attempt.status(),
            configuration: *attempt.configuration(),
            questions: attempt.questions().to_vec(),
            answers_given: attempt.answers_given().clone(),
            correct_count: attempt.correct_count(),
            wrong_count: attempt.wrong_count(),
            total_questions: attempt.total_questions(),
            score_percentage: attempt.score_percentage(),
            time_taken_seconds: attempt.time_taken_seconds(),
            allowed_wrong: attempt.allowed_wrong(),
            started_at: attempt.started_at(),
            finished_at: attempt.finished_at(),
            license_type_id: attempt.license_type_id(),
            license_type,
        })
    }

    /// Remove an attempt from the history.
    ///
    /// # Errors
    ///
    /// Returns `HistoryError::NotFound` or `HistoryError::Forbidden` as for `detail`.
    pub async fn delete(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
    ) -> Result<(), HistoryError> {
        self.load_owned(user_id, attempt_id).await?;
        self.attempts.delete_attempt(attempt_id).await?;
        tracing::info!(%user_id, %attempt_id, "test result deleted");
        Ok(())
    }

    async fn load_owned(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
    ) -> Result<TestAttempt, HistoryError> {
        let attempt = match self.attempts.get_attempt(attempt_id).await {
            Ok(attempt) => attempt,
            Err(StorageError::NotFound) => return Err(HistoryError::NotFound),
            Err(e) => return Err(e.into()),
        };
        if attempt.user_id() != user_id {
            return Err(HistoryError::Forbidden);
        }
        Ok(attempt)
    }
}
