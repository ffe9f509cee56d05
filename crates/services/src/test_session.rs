use std::collections::BTreeSet;
use std::sync::Arc;

use exam_core::model::{
    AnswerId, AttemptDraft, CategoryId, LicenseTypeId, QuestionId, QuestionProgress, TestAttempt,
    TestAttemptId, TestConfiguration, TestKind, TestTemplate, UserId,
};
use rand::rng;
use rand::seq::SliceRandom;
use storage::repository::{
    AttemptRepository, LicenseTypeRepository, ProgressRepository, QuestionRepository,
    StatisticsRepository, StorageError,
};

use crate::Clock;
use crate::error::TestSessionError;

/// Parameters for starting a new attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTest {
    pub kind: TestKind,
    pub license_type_id: Option<LicenseTypeId>,
    pub configuration: TestConfiguration,
    /// Explicit question list. When empty, questions are drawn at random
    /// from the active questions of the license type family.
    pub question_ids: Vec<QuestionId>,
}

/// Drives the lifecycle of test attempts: start, answer, pause, finish.
#[derive(Clone)]
pub struct TestSessionService {
    clock: Clock,
    attempts: Arc<dyn AttemptRepository>,
    progress: Arc<dyn ProgressRepository>,
    license_types: Arc<dyn LicenseTypeRepository>,
    questions: Arc<dyn QuestionRepository>,
    statistics: Arc<dyn StatisticsRepository>,
}

impl TestSessionService {
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

    /// Start a new attempt for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::NoQuestions` if no question could be selected.
    /// Returns `TestSessionError::Storage` if repository access fails.
    pub async fn start(
        &self,
        user_id: UserId,
        request: StartTest,
    ) -> Result<TestAttempt, TestSessionError> {
        let question_ids = if request.question_ids.is_empty() {
            let pool = self.question_pool(request.license_type_id, &[]).await?;
            draw_questions(pool, &BTreeSet::new(), &request.configuration)
        } else {
            dedup_in_order(request.question_ids)
        };

        self.insert(AttemptDraft {
            user_id,
            license_type_id: request.license_type_id,
            template_id: None,
            kind: request.kind,
            configuration: request.configuration,
            question_ids,
            started_at: self.clock.now(),
        })
        .await
    }

    /// Start an attempt from a saved template, leaving out its excluded questions.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::Forbidden` if the template belongs to another user.
    /// Returns `TestSessionError::NoQuestions` if no question could be selected.
    /// Returns `TestSessionError::Storage` if repository access fails.
    pub async fn start_from_template(
        &self,
        user_id: UserId,
        template: &TestTemplate,
    ) -> Result<TestAttempt, TestSessionError> {
        if template.user_id() != user_id {
            return Err(TestSessionError::Forbidden);
        }
        let configuration = template.configuration();
        let excluded: BTreeSet<QuestionId> =
            template.excluded_question_ids().iter().copied().collect();
        let pool = self
            .question_pool(template.license_type_id(), template.category_ids())
            .await?;

        self.insert(AttemptDraft {
            user_id,
            license_type_id: template.license_type_id(),
            template_id: Some(template.id()),
            kind: TestKind::Template,
            configuration,
            question_ids: draw_questions(pool, &excluded, &configuration),
            started_at: self.clock.now(),
        })
        .await
    }

    /// Record an answer and update the question's progress row.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` if the attempt is not in
    /// progress, or the question is not part of it or was already answered.
    /// Returns `NotFound`/`Forbidden` for unknown or foreign attempts.
    pub async fn answer(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
        question_id: QuestionId,
        answer_id: AnswerId,
        is_correct: bool,
    ) -> Result<TestAttempt, TestSessionError> {
        let mut attempt = self.load_owned(user_id, attempt_id).await?;
        if !attempt.record_answer(question_id, answer_id, is_correct) {
            return Err(rejected("answer", &attempt));
        }

        let now = self.clock.now();
        let mut progress = self
            .progress
            .get_progress(user_id, question_id)
            .await?
            .unwrap_or_else(|| QuestionProgress::untouched(user_id, question_id));
        progress.record_answer(is_correct, now);
        self.progress.upsert_progress(&progress).await?;
        self.attempts.save_attempt(&attempt).await?;

        tracing::debug!(
            %attempt_id,
            %question_id,
            is_correct,
            wrong = attempt.wrong_count(),
            allowed_wrong = attempt.allowed_wrong(),
            "answer recorded"
        );
        Ok(attempt)
    }

    /// Defer a question to the end of the attempt.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` if the question cannot be skipped.
    pub async fn skip(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
        question_id: QuestionId,
    ) -> Result<TestAttempt, TestSessionError> {
        let mut attempt = self.load_owned(user_id, attempt_id).await?;
        if !attempt.skip_question(question_id) {
            return Err(rejected("skip", &attempt));
        }
        self.attempts.save_attempt(&attempt).await?;
        Ok(attempt)
    }

    /// Pause the attempt, keeping the client's remaining seconds.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` unless the attempt is in progress.
    pub async fn pause(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
        remaining_seconds: i64,
    ) -> Result<TestAttempt, TestSessionError> {
        let mut attempt = self.load_owned(user_id, attempt_id).await?;
        if !attempt.pause(self.clock.now(), remaining_seconds) {
            return Err(rejected("pause", &attempt));
        }
        self.attempts.save_attempt(&attempt).await?;
        tracing::info!(%attempt_id, remaining_seconds, "test paused");
        Ok(attempt)
    }

    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` unless the attempt is paused.
    pub async fn resume(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
    ) -> Result<TestAttempt, TestSessionError> {
        let mut attempt = self.load_owned(user_id, attempt_id).await?;
        if !attempt.resume(self.clock.now()) {
            return Err(rejected("resume", &attempt));
        }
        self.attempts.save_attempt(&attempt).await?;
        tracing::info!(%attempt_id, "test resumed");
        Ok(attempt)
    }

    /// Grade the attempt as passed or failed and update the user's statistics.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::InvalidTransition` if the attempt already finished.
    pub async fn finish(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
        remaining_seconds: Option<i64>,
    ) -> Result<TestAttempt, TestSessionError> {
        let mut attempt = self.load_owned(user_id, attempt_id).await?;
        if !attempt.finish(self.clock.now(), remaining_seconds) {
            return Err(rejected("finish", &attempt));
        }
        self.attempts.save_attempt(&attempt).await?;
        self.record_statistics(&attempt).await?;
        tracing::info!(
            %attempt_id,
            status = %attempt.status(),
            score = attempt.score_percentage(),
            "test finished"
        );
        Ok(attempt)
    }

    /// Abandon an active attempt.
    ///
    /// Returns `Ok(false)` without changes when the attempt already finished.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`/`Forbidden` for unknown or foreign attempts, or
    /// `TestSessionError::Storage` if repository access fails.
    pub async fn abandon(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
    ) -> Result<bool, TestSessionError> {
        let mut attempt = self.load_owned(user_id, attempt_id).await?;
        if !attempt.abandon(self.clock.now()) {
            tracing::warn!(%attempt_id, status = %attempt.status(), "abandon ignored");
            return Ok(false);
        }
        self.attempts.save_attempt(&attempt).await?;
        self.record_statistics(&attempt).await?;
        tracing::info!(%attempt_id, "test abandoned");
        Ok(true)
    }

    async fn insert(&self, draft: AttemptDraft) -> Result<TestAttempt, TestSessionError> {
        if draft.question_ids.is_empty() {
            return Err(TestSessionError::NoQuestions);
        }
        let attempt = self.attempts.insert_attempt(draft).await?;
        tracing::info!(
            attempt_id = %attempt.id(),
            user_id = %attempt.user_id(),
            kind = %attempt.kind(),
            questions = attempt.total_questions(),
            "test started"
        );
        Ok(attempt)
    }

    async fn load_owned(
        &self,
        user_id: UserId,
        attempt_id: TestAttemptId,
    ) -> Result<TestAttempt, TestSessionError> {
        let attempt = match self.attempts.get_attempt(attempt_id).await {
            Ok(attempt) => attempt,
            Err(StorageError::NotFound) => return Err(TestSessionError::NotFound),
            Err(e) => return Err(e.into()),
        };
        if attempt.user_id() != user_id {
            return Err(TestSessionError::Forbidden);
        }
        Ok(attempt)
    }

    /// Active questions of the license family, or of every license type.
    /// An empty `category_ids` takes every category.
    async fn question_pool(
        &self,
        license_type_id: Option<LicenseTypeId>,
        category_ids: &[CategoryId],
    ) -> Result<Vec<QuestionId>, TestSessionError> {
        let license_ids = match license_type_id {
            Some(id) => match self.license_types.get_family(id).await {
                Ok(family) => family.ids(),
                Err(StorageError::NotFound) => return Err(TestSessionError::NoQuestions),
                Err(e) => return Err(e.into()),
            },
            None => self
                .license_types
                .list_license_types()
                .await?
                .into_iter()
                .map(|lt| lt.id)
                .collect(),
        };
        Ok(self
            .questions
            .active_question_ids(&license_ids, category_ids)
            .await?)
    }

    async fn record_statistics(&self, attempt: &TestAttempt) -> Result<(), TestSessionError> {
        let mut statistics = self.statistics.get_statistics(attempt.user_id()).await?;
        statistics.record_attempt(attempt);
        self.statistics.save_statistics(&statistics).await?;
        Ok(())
    }
}

fn rejected(action: &'static str, attempt: &TestAttempt) -> TestSessionError {
    tracing::warn!(attempt_id = %attempt.id(), status = %attempt.status(), action, "transition rejected");
    TestSessionError::InvalidTransition {
        action,
        status: attempt.status(),
    }
}

fn dedup_in_order(ids: Vec<QuestionId>) -> Vec<QuestionId> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn draw_questions(
    mut pool: Vec<QuestionId>,
    excluded: &BTreeSet<QuestionId>,
    configuration: &TestConfiguration,
) -> Vec<QuestionId> {
    pool.retain(|id| !excluded.contains(id));
    pool.shuffle(&mut rng());
    let count = usize::try_from(configuration.effective_question_count(None)).unwrap_or(usize::MAX);
    pool.truncate(count);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use exam_core::model::{AttemptStatus, LicenseType, TemplateId};
    use exam_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn service_at(repo: &InMemoryRepository, clock: Clock) -> TestSessionService {
        TestSessionService::new(
            clock,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    async fn seeded_repo() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        repo.upsert_license_type(&LicenseType {
            id: LicenseTypeId::new(1),
            code: "B".into(),
            name: "Cars".into(),
            parent_id: None,
            is_parent: true,
        })
        .await
        .unwrap();
        for q in 1..=10 {
            let category = CategoryId::new(if q <= 5 { 1 } else { 2 });
            repo.upsert_question(
                QuestionId::new(q),
                Some(category),
                true,
                &[LicenseTypeId::new(1)],
            )
            .await
            .unwrap();
        }
        repo
    }

    fn explicit(ids: &[u64]) -> StartTest {
        StartTest {
            kind: TestKind::Custom,
            license_type_id: Some(LicenseTypeId::new(1)),
            configuration: TestConfiguration::new(4, 60, 25),
            question_ids: ids.iter().copied().map(QuestionId::new).collect(),
        }
    }

    #[tokio::test]
    async fn start_draws_configured_number_of_questions() {
        let repo = seeded_repo().await;
        let svc = service_at(&repo, Clock::fixed(fixed_now()));
        let attempt = svc
            .start(
                UserId::new(1),
                StartTest {
                    kind: TestKind::Quick,
                    license_type_id: Some(LicenseTypeId::new(1)),
                    configuration: TestConfiguration::new(5, 60, 10),
                    question_ids: Vec::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(attempt.total_questions(), 5);
        let unique: BTreeSet<QuestionId> =
            attempt.questions().iter().map(|q| q.question_id).collect();
        assert_eq!(unique.len(), 5);
        assert!(unique.iter().all(|q| (1..=10).contains(&q.value())));
    }

    #[tokio::test]
    async fn start_without_questions_fails() {
        let repo = InMemoryRepository::new();
        let svc = service_at(&repo, Clock::fixed(fixed_now()));
        let err = svc
            .start(
                UserId::new(1),
                StartTest {
                    kind: TestKind::Quick,
                    license_type_id: None,
                    configuration: TestConfiguration::default(),
                    question_ids: Vec::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TestSessionError::NoQuestions));
    }

    #[tokio::test]
    async fn answer_updates_attempt_and_progress() {
        let repo = seeded_repo().await;
        let svc = service_at(&repo, Clock::fixed(fixed_now()));
        let user = UserId::new(1);
        let attempt = svc.start(user, explicit(&[1, 2, 2, 3])).await.unwrap();
        assert_eq!(attempt.total_questions(), 3);

        let attempt = svc
            .answer(user, attempt.id(), QuestionId::new(2), AnswerId::new(7), false)
            .await
            .unwrap();
        assert_eq!(attempt.wrong_count(), 1);

        let progress = repo
            .get_progress(user, QuestionId::new(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.times_wrong, 1);
        assert_eq!(progress.last_answered_at, Some(fixed_now()));

        let err = svc
            .answer(user, attempt.id(), QuestionId::new(2), AnswerId::new(8), true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TestSessionError::InvalidTransition {
                action: "answer",
                ..
            }
        ));
    }

    /// Progress store whose writes always fail.
    struct ReadOnlyProgress(InMemoryRepository);

    #[async_trait::async_trait]
    impl ProgressRepository for ReadOnlyProgress {
        async fn upsert_progress(&self, _progress: &QuestionProgress) -> Result<(), StorageError> {
            Err(StorageError::Connection("read-only".into()))
        }

        async fn get_progress(
            &self,
            user_id: UserId,
            question_id: QuestionId,
        ) -> Result<Option<QuestionProgress>, StorageError> {
            self.0.get_progress(user_id, question_id).await
        }

        async fn progress_for_questions(
            &self,
            user_id: UserId,
            question_ids: &[QuestionId],
        ) -> Result<Vec<QuestionProgress>, StorageError> {
            self.0.progress_for_questions(user_id, question_ids).await
        }

        async fn count_studied(&self, user_id: UserId) -> Result<u32, StorageError> {
            self.0.count_studied(user_id).await
        }
    }

    #[tokio::test]
    async fn failed_progress_write_leaves_attempt_unanswered() {
        let repo = seeded_repo().await;
        let user = UserId::new(1);
        let svc = TestSessionService::new(
            Clock::fixed(fixed_now()),
            Arc::new(repo.clone()),
            Arc::new(ReadOnlyProgress(repo.clone())),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        let attempt = svc.start(user, explicit(&[1, 2])).await.unwrap();

        let err = svc
            .answer(user, attempt.id(), QuestionId::new(1), AnswerId::new(3), true)
            .await
            .unwrap_err();
        assert!(matches!(err, TestSessionError::Storage(_)));

        let stored = repo.get_attempt(attempt.id()).await.unwrap();
        assert_eq!(stored.answered_count(), 0);
        assert!(repo.get_progress(user, QuestionId::new(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn foreign_and_missing_attempts_are_rejected() {
        let repo = seeded_repo().await;
        let svc = service_at(&repo, Clock::fixed(fixed_now()));
        let attempt = svc.start(UserId::new(1), explicit(&[1])).await.unwrap();

        assert!(matches!(
            svc.abandon(UserId::new(2), attempt.id()).await,
            Err(TestSessionError::Forbidden)
        ));
        assert!(matches!(
            svc.abandon(UserId::new(1), TestAttemptId::new(99)).await,
            Err(TestSessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn pause_resume_finish_flow() {
        let repo = seeded_repo().await;
        let user = UserId::new(1);
        let svc = service_at(&repo, Clock::fixed(fixed_now()));
        let attempt = svc.start(user, explicit(&[1, 2, 3, 4])).await.unwrap();

        svc.answer(user, attempt.id(), QuestionId::new(1), AnswerId::new(1), true)
            .await
            .unwrap();
        let paused = svc.pause(user, attempt.id(), 180).await.unwrap();
        assert_eq!(paused.status(), AttemptStatus::Paused);
        assert!(matches!(
            svc.answer(user, attempt.id(), QuestionId::new(2), AnswerId::new(1), true)
                .await,
            Err(TestSessionError::InvalidTransition { .. })
        ));

        svc.resume(user, attempt.id()).await.unwrap();
        svc.answer(user, attempt.id(), QuestionId::new(2), AnswerId::new(1), false)
            .await
            .unwrap();

        let later = service_at(&repo, Clock::fixed(fixed_now() + Duration::minutes(2)));
        let finished = later.finish(user, attempt.id(), Some(100)).await.unwrap();
        // allowed_wrong = floor(4 * 25 / 100) = 1
        assert_eq!(finished.status(), AttemptStatus::Passed);
        assert_eq!(finished.time_taken_seconds(), Some(240 - 100));
        assert_eq!(finished.score_percentage(), 25.0);

        let stats = repo.get_statistics(user).await.unwrap();
        assert_eq!(stats.total_tests_taken, 1);
        assert_eq!(stats.total_tests_passed, 1);
        assert_eq!(stats.total_questions_answered, 2);

        assert!(matches!(
            later.finish(user, attempt.id(), None).await,
            Err(TestSessionError::InvalidTransition {
                action: "finish",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn abandon_returns_false_once_finished() {
        let repo = seeded_repo().await;
        let user = UserId::new(1);
        let svc = service_at(&repo, Clock::fixed(fixed_now()));
        let attempt = svc.start(user, explicit(&[1, 2])).await.unwrap();

        assert!(svc.abandon(user, attempt.id()).await.unwrap());
        assert!(!svc.abandon(user, attempt.id()).await.unwrap());

        let stored = repo.get_attempt(attempt.id()).await.unwrap();
        assert_eq!(stored.status(), AttemptStatus::Abandoned);
        // 4 questions * 60s with no remaining snapshot
        assert_eq!(stored.time_taken_seconds(), Some(240));
    }

    #[tokio::test]
    async fn template_start_skips_excluded_questions() {
        let repo = seeded_repo().await;
        let user = UserId::new(1);
        let svc = service_at(&repo, Clock::fixed(fixed_now()));
        let mut template = TestTemplate::new(
            TemplateId::new(3),
            user,
            "Evening drill",
            Some(LicenseTypeId::new(1)),
            10,
            45,
            20,
            Vec::new(),
            fixed_now(),
        )
        .unwrap();
        template.exclude_question(QuestionId::new(4));
        template.exclude_question(QuestionId::new(5));

        let attempt = svc.start_from_template(user, &template).await.unwrap();
        assert_eq!(attempt.kind(), TestKind::Template);
        assert_eq!(attempt.template_id(), Some(TemplateId::new(3)));
        assert_eq!(attempt.total_questions(), 8);
        assert!(attempt
            .questions()
            .iter()
            .all(|q| q.question_id != QuestionId::new(4) && q.question_id != QuestionId::new(5)));
        assert_eq!(attempt.allowed_wrong(), 2);

        assert!(matches!(
            svc.start_from_template(UserId::new(2), &template).await,
            Err(TestSessionError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn template_categories_limit_the_drawn_questions() {
        let repo = seeded_repo().await;
        let user = UserId::new(1);
        let svc = service_at(&repo, Clock::fixed(fixed_now()));
        let template = TestTemplate::new(
            TemplateId::new(4),
            user,
            "Priority rules",
            Some(LicenseTypeId::new(1)),
            10,
            45,
            20,
            vec![CategoryId::new(2)],
            fixed_now(),
        )
        .unwrap();

        let attempt = svc.start_from_template(user, &template).await.unwrap();
        let mut drawn: Vec<u64> = attempt.questions().iter().map(|q| q.question_id.value()).collect();
        drawn.sort_unstable();
        assert_eq!(drawn, vec![6, 7, 8, 9, 10]);

        let unknown = TestTemplate::new(
            TemplateId::new(5),
            user,
            "Empty topic",
            Some(LicenseTypeId::new(1)),
            10,
            45,
            20,
            vec![CategoryId::new(9)],
            fixed_now(),
        )
        .unwrap();
        assert!(matches!(
            svc.start_from_template(user, &unknown).await,
            Err(TestSessionError::NoQuestions)
        ));
    }
}
