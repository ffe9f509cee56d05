use std::sync::Arc;

use exam_core::mastery::{PassChance, mastery_pass_chance};
use exam_core::model::{
    LicenseTypeFamily, LicenseTypeId, LicenseTypeSummary, UserId, UserStatistics,
};
use exam_core::performance::{LicensePerformance, license_performance};
use exam_core::stats::{
    ActiveTestSummary, DailyActivity, RECENT_TESTS_LIMIT, RecentTest, StudyProgress, TestStats,
    recent_tests, weekly_activity,
};
use serde::Serialize;
use storage::repository::{
    AttemptFilter, AttemptRepository, LicenseTypeRepository, ProgressRepository,
    QuestionRepository, StatisticsRepository, StorageError,
};

use crate::Clock;
use crate::error::DashboardError;

/// Streak and study-time counters shown next to the test statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifetimeSummary {
    pub current_streak_days: u32,
    pub best_streak_days: u32,
    pub overall_accuracy: f64,
    pub study_time: String,
}

impl From<&UserStatistics> for LifetimeSummary {
    fn from(stats: &UserStatistics) -> Self {
        Self {
            current_streak_days: stats.current_streak_days,
            best_streak_days: stats.best_streak_days,
            overall_accuracy: stats.overall_accuracy(),
            study_time: stats.formatted_study_time(),
        }
    }
}

/// Everything the dashboard shows for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub stats: TestStats,
    pub progress: StudyProgress,
    pub active_test: Option<ActiveTestSummary>,
    pub license_performance: Vec<LicensePerformance>,
    pub recent_tests: Vec<RecentTest>,
    pub weekly_activity: Vec<DailyActivity>,
    pub default_license_type: Option<LicenseTypeSummary>,
    pub license_types: Vec<LicenseTypeFamily>,
    pub pass_chance: Option<PassChance>,
    pub lifetime: LifetimeSummary,
}

/// Loads dashboard data from the repositories.
#[derive(Clone)]
pub struct DashboardService {
    clock: Clock,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn ProgressRepository>,
    license_types: Arc<dyn LicenseTypeRepository>,
    questions: Arc<dyn QuestionRepository>,
    statistics: Arc<dyn StatisticsRepository>,
}

impl DashboardService {
    #[must_use]
    pub fn new(
        clock: Clock,
        attempts: Arc<dyn AttemptRepository>,
        progress: Arc<dyn ProgressRepository>,
        license_types: Arc<dyn LicenseTypeRepository>,
        questions: Arc<dyn QuestionRepository>,
        statistics: Arc<dyn StatisticsRepository>,
    ) -> Self {
        Self {
            clock,
            attempts,
            progress,
            license_types,
            questions,
            statistics,
        }
    }

    /// Build the dashboard of `user_id`.
    ///
    /// The mastery pass chance is computed for `default_license_type` and its
    /// children; it is `None` when no default is set or the license type no
    /// longer exists.
    ///
    /// # Errors
    ///
    /// Returns `DashboardError::Storage` if repository access fails.
    pub async fn load(
        &self,
        user_id: UserId,
        default_license_type: Option<LicenseTypeId>,
    ) -> Result<Dashboard, DashboardError> {
        let now = self.clock.now();
        tracing::debug!(%user_id, ?default_license_type, "loading dashboard");

        let graded = self
            .attempts
            .list_attempts_for_user(user_id, &AttemptFilter::graded())
            .await?;

        let studied = self.progress.count_studied(user_id).await?;
        let total_questions = self.questions.count_active().await?;

        let active_test = match self.attempts.active_attempt_for_user(user_id).await? {
            Some(attempt) => {
                let family = match attempt.license_type_id() {
                    Some(id) => self.family_if_exists(id).await?,
                    None => None,
                };
                Some(ActiveTestSummary::new(&attempt, family.as_ref()))
            }
            None => None,
        };

        let all_license_types = self.license_types.list_license_types().await?;

        let default_family = match default_license_type {
            Some(id) => self.family_if_exists(id).await?,
            None => None,
        };
        let pass_chance = match &default_family {
            Some(family) => {
                let question_ids = self.questions.active_question_ids(&family.ids(), &[]).await?;
                let progress = self
                    .progress
                    .progress_for_questions(user_id, &question_ids)
                    .await?;
                Some(mastery_pass_chance(&question_ids, &progress))
            }
            None => None,
        };

        let statistics = self.statistics.get_statistics(user_id).await?;

        Ok(Dashboard {
            stats: TestStats::from_attempts(&graded),
            progress: StudyProgress::new(studied, total_questions),
            active_test,
            license_performance: license_performance(&graded, &all_license_types),
            recent_tests: recent_tests(&graded, RECENT_TESTS_LIMIT),
            weekly_activity: weekly_activity(&graded, now),
            default_license_type: default_family.as_ref().map(|f| f.license_type.summary()),
            license_types: self.license_types.list_parent_families().await?,
            pass_chance,
            lifetime: LifetimeSummary::from(&statistics),
        })
    }

    async fn family_if_exists(
        &self,
        id: LicenseTypeId,
    ) -> Result<Option<LicenseTypeFamily>, StorageError> {
        match self.license_types.get_family(id).await {
            Ok(family) => Ok(Some(family)),
            Err(StorageError::NotFound) => {
                tracing::warn!(license_type_id = %id, "license type not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
