use async_trait::async_trait;
use exam_core::model::{
    AttemptDraft, AttemptStatus, CategoryId, LicenseType, LicenseTypeFamily, LicenseTypeId, QuestionId,
    QuestionProgress, TestAttempt, TestAttemptId, TestKind, UserId, UserStatistics,
};
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Which attempts of a user to list.
///
/// An empty `statuses` list matches every status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptFilter {
    pub statuses: Vec<AttemptStatus>,
    pub kind: Option<TestKind>,
    pub limit: Option<u32>,
    pub offset: u32,
}

impl AttemptFilter {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_statuses(statuses: &[AttemptStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn graded() -> Self {
        Self::with_statuses(&[AttemptStatus::Passed, AttemptStatus::Failed])
    }

    /// Same filter without paging, used for counting.
    #[must_use]
    pub fn unpaged(&self) -> Self {
        Self {
            statuses: self.statuses.clone(),
            kind: self.kind,
            limit: None,
            offset: 0,
        }
    }

    #[must_use]
    pub fn matches(&self, attempt: &TestAttempt) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&attempt.status()))
            && self.kind.is_none_or(|kind| kind == attempt.kind())
    }
}

/// Repository contract for test attempts.
///
/// Listings are ordered newest finished first (`finished_at` desc, then id
/// desc); attempts that have not finished sort last.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Store a new attempt and assign its id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn insert_attempt(&self, draft: AttemptDraft) -> Result<TestAttempt, StorageError>;

    /// Overwrite an existing attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn save_attempt(&self, attempt: &TestAttempt) -> Result<(), StorageError>;

    /// Fetch an attempt by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_attempt(&self, id: TestAttemptId) -> Result<TestAttempt, StorageError>;

    /// List a user's attempts matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempts cannot be loaded.
    async fn list_attempts_for_user(
        &self,
        user_id: UserId,
        filter: &AttemptFilter,
    ) -> Result<Vec<TestAttempt>, StorageError>;

    /// Number of attempts matching `filter`, ignoring its paging.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempts cannot be counted.
    async fn count_attempts_for_user(
        &self,
        user_id: UserId,
        filter: &AttemptFilter,
    ) -> Result<u32, StorageError>;

    /// The most recently started in-progress or paused attempt, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn active_attempt_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<TestAttempt>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn delete_attempt(&self, id: TestAttemptId) -> Result<(), StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist or update a progress row keyed by user and question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn upsert_progress(&self, progress: &QuestionProgress) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_progress(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<QuestionProgress>, StorageError>;

    /// Progress rows of `user_id` for the given questions; missing rows are
    /// simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be loaded.
    async fn progress_for_questions(
        &self,
        user_id: UserId,
        question_ids: &[QuestionId],
    ) -> Result<Vec<QuestionProgress>, StorageError>;

    /// Questions the user answered at least once.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be counted.
    async fn count_studied(&self, user_id: UserId) -> Result<u32, StorageError>;
}

#[async_trait]
pub trait LicenseTypeRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the license type cannot be stored.
    async fn upsert_license_type(&self, license_type: &LicenseType) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_license_type(&self, id: LicenseTypeId) -> Result<LicenseType, StorageError>;

    /// A license type together with its direct children.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_family(&self, id: LicenseTypeId) -> Result<LicenseTypeFamily, StorageError>;

    /// Top-level license types with their children, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the license types cannot be loaded.
    async fn list_parent_families(&self) -> Result<Vec<LicenseTypeFamily>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the license types cannot be loaded.
    async fn list_license_types(&self) -> Result<Vec<LicenseType>, StorageError>;
}

/// Question bank membership; question content lives outside this workspace.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Register a question and replace its category and license type links.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(
        &self,
        id: QuestionId,
        category_id: Option<CategoryId>,
        is_active: bool,
        license_type_ids: &[LicenseTypeId],
    ) -> Result<(), StorageError>;

    /// Active questions linked to any of `license_type_ids`, ascending.
    ///
    /// A non-empty `category_ids` keeps only questions of those categories.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the questions cannot be loaded.
    async fn active_question_ids(
        &self,
        license_type_ids: &[LicenseTypeId],
        category_ids: &[CategoryId],
    ) -> Result<Vec<QuestionId>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the questions cannot be counted.
    async fn count_active(&self) -> Result<u32, StorageError>;
}

#[async_trait]
pub trait StatisticsRepository: Send + Sync {
    /// Lifetime counters of a user; zeroed when nothing was recorded yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_statistics(&self, user_id: UserId) -> Result<UserStatistics, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn save_statistics(&self, statistics: &UserStatistics) -> Result<(), StorageError>;
}

fn lock_err<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn count_u32(n: usize) -> Result<u32, StorageError> {
    u32::try_from(n).map_err(|_| StorageError::Serialization(format!("count overflow: {n}")))
}

#[derive(Debug, Clone)]
struct QuestionRecord {
    category_id: Option<CategoryId>,
    is_active: bool,
    license_type_ids: BTreeSet<LicenseTypeId>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    attempts: Arc<Mutex<HashMap<TestAttemptId, TestAttempt>>>,
    progress: Arc<Mutex<HashMap<(UserId, QuestionId), QuestionProgress>>>,
    license_types: Arc<Mutex<HashMap<LicenseTypeId, LicenseType>>>,
    questions: Arc<Mutex<HashMap<QuestionId, QuestionRecord>>>,
    statistics: Arc<Mutex<HashMap<UserId, UserStatistics>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted_license_types(&self) -> Result<Vec<LicenseType>, StorageError> {
        let guard = self.license_types.lock().map_err(lock_err)?;
        let mut all: Vec<LicenseType> = guard.values().cloned().collect();
        all.sort_by_key(|lt| lt.id);
        Ok(all)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn insert_attempt(&self, draft: AttemptDraft) -> Result<TestAttempt, StorageError> {
        let mut guard = self.attempts.lock().map_err(lock_err)?;
        let next = guard.keys().map(TestAttemptId::value).max().unwrap_or(0) + 1;
        let attempt = draft
            .assign_id(TestAttemptId::new(next))
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        guard.insert(attempt.id(), attempt.clone());
        Ok(attempt)
    }

    async fn save_attempt(&self, attempt: &TestAttempt) -> Result<(), StorageError> {
        let mut guard = self.attempts.lock().map_err(lock_err)?;
        let slot = guard.get_mut(&attempt.id()).ok_or(StorageError::NotFound)?;
        *slot = attempt.clone();
        Ok(())
    }

    async fn get_attempt(&self, id: TestAttemptId) -> Result<TestAttempt, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_attempts_for_user(
        &self,
        user_id: UserId,
        filter: &AttemptFilter,
    ) -> Result<Vec<TestAttempt>, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        let mut matching: Vec<&TestAttempt> = guard
            .values()
            .filter(|a| a.user_id() == user_id && filter.matches(a))
            .collect();
        matching.sort_by_key(|a| Reverse((a.finished_at(), a.id())));

        let offset = usize::try_from(filter.offset).unwrap_or(usize::MAX);
        let limit = filter
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_attempts_for_user(
        &self,
        user_id: UserId,
        filter: &AttemptFilter,
    ) -> Result<u32, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        count_u32(
            guard
                .values()
                .filter(|a| a.user_id() == user_id && filter.matches(a))
                .count(),
        )
    }

    async fn active_attempt_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<TestAttempt>, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        Ok(guard
            .values()
            .filter(|a| a.user_id() == user_id && a.status().is_active())
            .max_by_key(|a| (a.started_at(), a.id()))
            .cloned())
    }

    async fn delete_attempt(&self, id: TestAttemptId) -> Result<(), StorageError> {
        let mut guard = self.attempts.lock().map_err(lock_err)?;
        guard.remove(&id).map(|_| ()).ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_progress(&self, progress: &QuestionProgress) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        guard.insert((progress.user_id, progress.question_id), progress.clone());
        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<QuestionProgress>, StorageError> {
        let guard = self.progress.lock().map_err(lock_err)?;
        Ok(guard.get(&(user_id, question_id)).cloned())
    }

    async fn progress_for_questions(
        &self,
        user_id: UserId,
        question_ids: &[QuestionId],
    ) -> Result<Vec<QuestionProgress>, StorageError> {
        let guard = self.progress.lock().map_err(lock_err)?;
        let wanted: BTreeSet<QuestionId> = question_ids.iter().copied().collect();
        Ok(wanted
            .into_iter()
            .filter_map(|q| guard.get(&(user_id, q)).cloned())
            .collect())
    }

    async fn count_studied(&self, user_id: UserId) -> Result<u32, StorageError> {
        let guard = self.progress.lock().map_err(lock_err)?;
        count_u32(
            guard
                .values()
                .filter(|p| p.user_id == user_id && p.is_studied())
                .count(),
        )
    }
}

#[async_trait]
impl LicenseTypeRepository for InMemoryRepository {
    async fn upsert_license_type(&self, license_type: &LicenseType) -> Result<(), StorageError> {
        let mut guard = self.license_types.lock().map_err(lock_err)?;
        guard.insert(license_type.id, license_type.clone());
        Ok(())
    }

    async fn get_license_type(&self, id: LicenseTypeId) -> Result<LicenseType, StorageError> {
        let guard = self.license_types.lock().map_err(lock_err)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn get_family(&self, id: LicenseTypeId) -> Result<LicenseTypeFamily, StorageError> {
        let all = self.sorted_license_types()?;
        let parent = all
            .iter()
            .find(|lt| lt.id == id)
            .cloned()
            .ok_or(StorageError::NotFound)?;
        Ok(LicenseTypeFamily::from_flat(parent, &all))
    }

    async fn list_parent_families(&self) -> Result<Vec<LicenseTypeFamily>, StorageError> {
        let all = self.sorted_license_types()?;
        Ok(all
            .iter()
            .filter(|lt| lt.parent_id.is_none())
            .map(|parent| LicenseTypeFamily::from_flat(parent.clone(), &all))
            .collect())
    }

    async fn list_license_types(&self) -> Result<Vec<LicenseType>, StorageError> {
        self.sorted_license_types()
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(
        &self,
        id: QuestionId,
        category_id: Option<CategoryId>,
        is_active: bool,
        license_type_ids: &[LicenseTypeId],
    ) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(lock_err)?;
        guard.insert(
            id,
            QuestionRecord {
                category_id,
                is_active,
                license_type_ids: license_type_ids.iter().copied().collect(),
            },
        );
        Ok(())
    }

    async fn active_question_ids(
        &self,
        license_type_ids: &[LicenseTypeId],
        category_ids: &[CategoryId],
    ) -> Result<Vec<QuestionId>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        let mut ids: Vec<QuestionId> = guard
            .iter()
            .filter(|(_, q)| {
                q.is_active
                    && license_type_ids.iter().any(|lt| q.license_type_ids.contains(lt))
                    && (category_ids.is_empty()
                        || q.category_id.is_some_and(|c| category_ids.contains(&c)))
            })
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn count_active(&self) -> Result<u32, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        count_u32(guard.values().filter(|q| q.is_active).count())
    }
}

#[async_trait]
impl StatisticsRepository for InMemoryRepository {
    async fn get_statistics(&self, user_id: UserId) -> Result<UserStatistics, StorageError> {
        let guard = self.statistics.lock().map_err(lock_err)?;
        Ok(guard.get(&user_id).cloned().unwrap_or_else(|| UserStatistics {
            user_id,
            ..UserStatistics::default()
        }))
    }

    async fn save_statistics(&self, statistics: &UserStatistics) -> Result<(), StorageError> {
        let mut guard = self.statistics.lock().map_err(lock_err)?;
        guard.insert(statistics.user_id, statistics.clone());
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub attempts: Arc<dyn AttemptRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub license_types: Arc<dyn LicenseTypeRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub statistics: Arc<dyn StatisticsRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            attempts: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            license_types: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            statistics: Arc::new(repo),
        }
    }
}
