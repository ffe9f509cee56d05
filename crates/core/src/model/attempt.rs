use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AnswerId, LicenseTypeId, QuestionId, TemplateId, TestAttemptId, UserId};
use crate::time::seconds_between;

/// Question count assumed when neither the configuration nor the attempt has one.
pub const DEFAULT_QUESTION_COUNT: u32 = 30;
/// Seconds per question assumed when the configuration omits it.
pub const DEFAULT_TIME_PER_QUESTION: u32 = 60;
/// Failure threshold (percent of questions) assumed when the configuration omits it.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("correct ({correct}) + wrong ({wrong}) exceeds total questions ({total})")]
    CountOverflow { correct: u32, wrong: u32, total: u32 },

    #[error("attempt with status {0} has no finished_at timestamp")]
    MissingFinishedAt(AttemptStatus),

    #[error("unknown test kind: {0}")]
    UnknownKind(String),

    #[error("unknown attempt status: {0}")]
    UnknownStatus(String),

    #[error("too many questions for a single attempt: {0}")]
    TooManyQuestions(usize),
}

//
// ─── KIND & STATUS ─────────────────────────────────────────────────────────────
//

/// How the questions of an attempt were selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Quick,
    Thematic,
    Custom,
    Template,
    Bookmarked,
}

impl TestKind {
    pub const ALL: [TestKind; 5] = [
        TestKind::Quick,
        TestKind::Thematic,
        TestKind::Custom,
        TestKind::Template,
        TestKind::Bookmarked,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TestKind::Quick => "quick",
            TestKind::Thematic => "thematic",
            TestKind::Custom => "custom",
            TestKind::Template => "template",
            TestKind::Bookmarked => "bookmarked",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestKind {
    type Err = AttemptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AttemptError::UnknownKind(s.to_owned()))
    }
}

/// Lifecycle state of an attempt.
///
/// `InProgress ⇄ Paused → {Completed, Passed, Failed, Abandoned}`.
/// Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Paused,
    Completed,
    Passed,
    Failed,
    Abandoned,
}

impl AttemptStatus {
    pub const ALL: [AttemptStatus; 6] = [
        AttemptStatus::InProgress,
        AttemptStatus::Paused,
        AttemptStatus::Completed,
        AttemptStatus::Passed,
        AttemptStatus::Failed,
        AttemptStatus::Abandoned,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Paused => "paused",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Passed => "passed",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    /// The attempt can still receive answers, pauses or an abandon.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, AttemptStatus::InProgress | AttemptStatus::Paused)
    }

    /// Terminal state; `finished_at` must be set.
    #[must_use]
    pub fn is_finished(self) -> bool {
        !self.is_active()
    }

    /// Reached through grading, i.e. counted by pass-rate statistics.
    #[must_use]
    pub fn is_graded(self) -> bool {
        matches!(self, AttemptStatus::Passed | AttemptStatus::Failed)
    }

    /// Shown in the test history (abandoned attempts are not).
    #[must_use]
    pub fn is_completed(self) -> bool {
        matches!(
            self,
            AttemptStatus::Completed | AttemptStatus::Passed | AttemptStatus::Failed
        )
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = AttemptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AttemptError::UnknownStatus(s.to_owned()))
    }
}

//
// ─── CONFIGURATION ─────────────────────────────────────────────────────────────
//

/// Settings an attempt was started with.
///
/// Stored as loose JSON, so every field may be missing; the accessors apply
/// the documented defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_per_question: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
}

impl TestConfiguration {
    #[must_use]
    pub fn new(question_count: u32, time_per_question: u32, failure_threshold: u32) -> Self {
        Self {
            question_count: Some(question_count),
            time_per_question: Some(time_per_question),
            failure_threshold: Some(failure_threshold),
        }
    }

    /// Configured question count, else `fallback`, else 30.
    #[must_use]
    pub fn effective_question_count(&self, fallback: Option<u32>) -> u32 {
        self.question_count
            .or(fallback)
            .unwrap_or(DEFAULT_QUESTION_COUNT)
    }

    #[must_use]
    pub fn time_per_question(&self) -> u32 {
        self.time_per_question.unwrap_or(DEFAULT_TIME_PER_QUESTION)
    }

    #[must_use]
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold.unwrap_or(DEFAULT_FAILURE_THRESHOLD)
    }

    /// Allotted time for the whole test in seconds.
    #[must_use]
    pub fn total_time_seconds(&self) -> i64 {
        i64::from(self.effective_question_count(None)) * i64::from(self.time_per_question())
    }

    /// Largest number of wrong answers that still passes.
    #[must_use]
    pub fn allowed_wrong(&self, fallback_question_count: Option<u32>) -> u32 {
        let count = u64::from(self.effective_question_count(fallback_question_count));
        let threshold = u64::from(self.failure_threshold());
        // integer division floors for non-negative operands
        u32::try_from(count * threshold / 100).unwrap_or(u32::MAX)
    }
}

//
// ─── QUESTIONS ─────────────────────────────────────────────────────────────────
//

/// One question of an attempt together with the answer recorded for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question_id: QuestionId,
    #[serde(default)]
    pub answer_id: Option<AnswerId>,
    #[serde(default)]
    pub is_correct: Option<bool>,
}

impl AnsweredQuestion {
    #[must_use]
    pub fn unanswered(question_id: QuestionId) -> Self {
        Self {
            question_id,
            answer_id: None,
            is_correct: None,
        }
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// A freshly started attempt that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptDraft {
    pub user_id: UserId,
    pub license_type_id: Option<LicenseTypeId>,
    pub template_id: Option<TemplateId>,
    pub kind: TestKind,
    pub configuration: TestConfiguration,
    pub question_ids: Vec<QuestionId>,
    pub started_at: DateTime<Utc>,
}

impl AttemptDraft {
    /// Turn the draft into an in-progress attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::TooManyQuestions` if the question list does not fit in `u32`.
    pub fn assign_id(self, id: TestAttemptId) -> Result<TestAttempt, AttemptError> {
        let total_questions = u32::try_from(self.question_ids.len())
            .map_err(|_| AttemptError::TooManyQuestions(self.question_ids.len()))?;

        Ok(TestAttempt {
            id,
            user_id: self.user_id,
            license_type_id: self.license_type_id,
            template_id: self.template_id,
            kind: self.kind,
            configuration: self.configuration,
            questions: self
                .question_ids
                .into_iter()
                .map(AnsweredQuestion::unanswered)
                .collect(),
            correct_count: 0,
            wrong_count: 0,
            total_questions,
            score_percentage: 0.0,
            status: AttemptStatus::InProgress,
            started_at: self.started_at,
            finished_at: None,
            time_taken_seconds: None,
            current_question_index: 0,
            answers_given: BTreeMap::new(),
            skipped_question_ids: Vec::new(),
            paused_at: None,
            remaining_time_seconds: None,
        })
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// Persisted shape of an attempt, used to rehydrate a `TestAttempt`.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedAttempt {
    pub id: TestAttemptId,
    pub user_id: UserId,
    pub license_type_id: Option<LicenseTypeId>,
    pub template_id: Option<TemplateId>,
    pub kind: TestKind,
    pub configuration: TestConfiguration,
    pub questions: Vec<AnsweredQuestion>,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub total_questions: u32,
    pub score_percentage: f64,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub time_taken_seconds: Option<i64>,
    pub current_question_index: u32,
    pub answers_given: BTreeMap<QuestionId, AnswerId>,
    pub skipped_question_ids: Vec<QuestionId>,
    pub paused_at: Option<DateTime<Utc>>,
    pub remaining_time_seconds: Option<i64>,
}

/// One practice-test session of a user.
#[derive(Debug, Clone, PartialEq)]
pub struct TestAttempt {
    id: TestAttemptId,
    user_id: UserId,
    license_type_id: Option<LicenseTypeId>,
    template_id: Option<TemplateId>,
    kind: TestKind,
    configuration: TestConfiguration,
    questions: Vec<AnsweredQuestion>,
    correct_count: u32,
    wrong_count: u32,
    total_questions: u32,
    score_percentage: f64,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    time_taken_seconds: Option<i64>,
    current_question_index: u32,
    answers_given: BTreeMap<QuestionId, AnswerId>,
    skipped_question_ids: Vec<QuestionId>,
    paused_at: Option<DateTime<Utc>>,
    remaining_time_seconds: Option<i64>,
}

impl TestAttempt {
    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::CountOverflow` if `correct + wrong > total`, or
    /// `AttemptError::MissingFinishedAt` for a terminal status without a finish time.
    pub fn from_persisted(p: PersistedAttempt) -> Result<Self, AttemptError> {
        if u64::from(p.correct_count) + u64::from(p.wrong_count) > u64::from(p.total_questions) {
            return Err(AttemptError::CountOverflow {
                correct: p.correct_count,
                wrong: p.wrong_count,
                total: p.total_questions,
            });
        }
        if p.status.is_finished() && p.finished_at.is_none() {
            return Err(AttemptError::MissingFinishedAt(p.status));
        }

        Ok(Self {
            id: p.id,
            user_id: p.user_id,
            license_type_id: p.license_type_id,
            template_id: p.template_id,
            kind: p.kind,
            configuration: p.configuration,
            questions: p.questions,
            correct_count: p.correct_count,
            wrong_count: p.wrong_count,
            total_questions: p.total_questions,
            score_percentage: p.score_percentage,
            status: p.status,
            started_at: p.started_at,
            finished_at: p.finished_at,
            time_taken_seconds: p.time_taken_seconds,
            current_question_index: p.current_question_index,
            answers_given: p.answers_given,
            skipped_question_ids: p.skipped_question_ids,
            paused_at: p.paused_at,
            remaining_time_seconds: p.remaining_time_seconds,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> TestAttemptId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn license_type_id(&self) -> Option<LicenseTypeId> {
        self.license_type_id
    }

    #[must_use]
    pub fn template_id(&self) -> Option<TemplateId> {
        self.template_id
    }

    #[must_use]
    pub fn kind(&self) -> TestKind {
        self.kind
    }

    #[must_use]
    pub fn configuration(&self) -> &TestConfiguration {
        &self.configuration
    }

    #[must_use]
    pub fn questions(&self) -> &[AnsweredQuestion] {
        &self.questions
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn wrong_count(&self) -> u32 {
        self.wrong_count
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn score_percentage(&self) -> f64 {
        self.score_percentage
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn time_taken_seconds(&self) -> Option<i64> {
        self.time_taken_seconds
    }

    #[must_use]
    pub fn current_question_index(&self) -> u32 {
        self.current_question_index
    }

    #[must_use]
    pub fn answers_given(&self) -> &BTreeMap<QuestionId, AnswerId> {
        &self.answers_given
    }

    #[must_use]
    pub fn skipped_question_ids(&self) -> &[QuestionId] {
        &self.skipped_question_ids
    }

    #[must_use]
    pub fn paused_at(&self) -> Option<DateTime<Utc>> {
        self.paused_at
    }

    #[must_use]
    pub fn remaining_time_seconds(&self) -> Option<i64> {
        self.remaining_time_seconds
    }

    //
    // ─── TIMING & THRESHOLDS ──────────────────────────────────────────────────
    //

    #[must_use]
    pub fn total_time_seconds(&self) -> i64 {
        self.configuration.total_time_seconds()
    }

    /// Seconds left on the clock. Negative once the attempt runs overtime.
    ///
    /// A stored snapshot (taken on pause or by the client) wins over the
    /// value derived from `started_at`.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        if let Some(remaining) = self.remaining_time_seconds {
            return remaining;
        }
        self.total_time_seconds() - seconds_between(self.started_at, now)
    }

    /// `floor(question_count * failure_threshold / 100)`.
    #[must_use]
    pub fn allowed_wrong(&self) -> u32 {
        self.configuration.allowed_wrong(Some(self.total_questions))
    }

    #[must_use]
    pub fn has_exceeded_mistakes(&self) -> bool {
        self.wrong_count > self.allowed_wrong()
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers_given.len()
    }

    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped_question_ids.len()
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percentage(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        self.answered_count() as f64 / f64::from(self.total_questions) * 100.0
    }

    #[must_use]
    pub fn is_overtime(&self) -> bool {
        self.time_taken_seconds.is_some_and(|t| t < 0)
    }

    #[must_use]
    pub fn can_be_resumed(&self) -> bool {
        self.status.is_active()
    }

    fn correct_ratio_percentage(&self) -> f64 {
        if self.total_questions == 0 {
            return 0.0;
        }
        f64::from(self.correct_count) / f64::from(self.total_questions) * 100.0
    }

    //
    // ─── TRANSITIONS ──────────────────────────────────────────────────────────
    //

    /// Give up on an active attempt.
    ///
    /// Returns `false` without touching the attempt unless it is in progress
    /// or paused.
    pub fn abandon(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.is_active() {
            return false;
        }

        self.time_taken_seconds =
            Some(self.total_time_seconds() - self.remaining_time_seconds.unwrap_or(0));
        self.status = AttemptStatus::Abandoned;
        self.finished_at = Some(now);
        self.score_percentage = self.correct_ratio_percentage();
        true
    }

    /// Stop the timer, keeping the remaining seconds reported by the client.
    pub fn pause(&mut self, now: DateTime<Utc>, remaining_seconds: i64) -> bool {
        if self.status != AttemptStatus::InProgress {
            return false;
        }
        self.status = AttemptStatus::Paused;
        self.paused_at = Some(now);
        self.remaining_time_seconds = Some(remaining_seconds);
        true
    }

    /// Continue a paused attempt from its remaining-seconds snapshot.
    ///
    /// `started_at` moves forward so the clock keeps running from `now`
    /// with the snapshot's remaining seconds, and the snapshot is dropped.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != AttemptStatus::Paused {
            return false;
        }
        if let Some(remaining) = self.remaining_time_seconds.take() {
            self.started_at = now - Duration::seconds(self.total_time_seconds() - remaining);
        }
        self.status = AttemptStatus::InProgress;
        self.paused_at = None;
        true
    }

    /// Record the answer for one question of the attempt.
    ///
    /// Rejected when the attempt is not in progress, the question is not part
    /// of it, or the question was already answered.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        answer_id: AnswerId,
        is_correct: bool,
    ) -> bool {
        if self.status != AttemptStatus::InProgress
            || self.answers_given.contains_key(&question_id)
        {
            return false;
        }
        let Some(position) = self
            .questions
            .iter()
            .position(|q| q.question_id == question_id)
        else {
            return false;
        };

        let slot = &mut self.questions[position];
        slot.answer_id = Some(answer_id);
        slot.is_correct = Some(is_correct);

        self.answers_given.insert(question_id, answer_id);
        self.skipped_question_ids.retain(|id| *id != question_id);
        if is_correct {
            self.correct_count = self.correct_count.saturating_add(1);
        } else {
            self.wrong_count = self.wrong_count.saturating_add(1);
        }
        self.current_question_index = u32::try_from(position + 1).unwrap_or(u32::MAX);
        true
    }

    /// Defer an unanswered question to the end of the attempt.
    pub fn skip_question(&mut self, question_id: QuestionId) -> bool {
        if self.status != AttemptStatus::InProgress
            || self.answers_given.contains_key(&question_id)
            || self.skipped_question_ids.contains(&question_id)
            || !self.questions.iter().any(|q| q.question_id == question_id)
        {
            return false;
        }
        self.skipped_question_ids.push(question_id);
        true
    }

    /// Grade an active attempt as passed or failed.
    ///
    /// `remaining_seconds` replaces the stored snapshot when given.
    pub fn finish(&mut self, now: DateTime<Utc>, remaining_seconds: Option<i64>) -> bool {
        if !self.status.is_active() {
            return false;
        }
        if remaining_seconds.is_some() {
            self.remaining_time_seconds = remaining_seconds;
        }

        self.time_taken_seconds = Some(self.total_time_seconds() - self.remaining_seconds(now));
        self.status = if self.has_exceeded_mistakes() {
            AttemptStatus::Failed
        } else {
            AttemptStatus::Passed
        };
        self.finished_at = Some(now);
        self.paused_at = None;
        self.score_percentage = self.correct_ratio_percentage();
        true
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn persisted(status: AttemptStatus) -> PersistedAttempt {
        let now = fixed_now();
        PersistedAttempt {
            id: TestAttemptId::new(1),
            user_id: UserId::new(1),
            license_type_id: Some(LicenseTypeId::new(2)),
            template_id: None,
            kind: TestKind::Quick,
            configuration: TestConfiguration::new(30, 60, 10),
            questions: (1..=30)
                .map(|i| AnsweredQuestion::unanswered(QuestionId::new(i)))
                .collect(),
            correct_count: 0,
            wrong_count: 0,
            total_questions: 30,
            score_percentage: 0.0,
            status,
            started_at: now,
            finished_at: status.is_finished().then_some(now),
            time_taken_seconds: None,
            current_question_index: 0,
            answers_given: BTreeMap::new(),
            skipped_question_ids: Vec::new(),
            paused_at: None,
            remaining_time_seconds: None,
        }
    }

    fn attempt(status: AttemptStatus) -> TestAttempt {
        TestAttempt::from_persisted(persisted(status)).unwrap()
    }

    fn draft(question_ids: Vec<QuestionId>) -> AttemptDraft {
        AttemptDraft {
            user_id: UserId::new(1),
            license_type_id: None,
            template_id: None,
            kind: TestKind::Custom,
            configuration: TestConfiguration::new(3, 60, 34),
            question_ids,
            started_at: fixed_now(),
        }
    }

    #[test]
    fn status_and_kind_parse_round_trip() {
        for status in AttemptStatus::ALL {
            assert_eq!(status.as_str().parse::<AttemptStatus>().unwrap(), status);
        }
        for kind in TestKind::ALL {
            assert_eq!(kind.as_str().parse::<TestKind>().unwrap(), kind);
        }
        assert!(matches!(
            "done".parse::<AttemptStatus>(),
            Err(AttemptError::UnknownStatus(_))
        ));
    }

    #[test]
    fn from_persisted_rejects_count_overflow() {
        let mut p = persisted(AttemptStatus::InProgress);
        p.correct_count = 20;
        p.wrong_count = 11;
        let err = TestAttempt::from_persisted(p).unwrap_err();
        assert!(matches!(err, AttemptError::CountOverflow { .. }));
    }

    #[test]
    fn from_persisted_requires_finished_at_for_terminal_status() {
        let mut p = persisted(AttemptStatus::Passed);
        p.finished_at = None;
        let err = TestAttempt::from_persisted(p).unwrap_err();
        assert_eq!(err, AttemptError::MissingFinishedAt(AttemptStatus::Passed));
    }

    #[test]
    fn allowed_wrong_floors_threshold() {
        assert_eq!(attempt(AttemptStatus::InProgress).allowed_wrong(), 3);

        let mut p = persisted(AttemptStatus::InProgress);
        p.configuration = TestConfiguration::new(25, 60, 10);
        assert_eq!(TestAttempt::from_persisted(p).unwrap().allowed_wrong(), 2);
    }

    #[test]
    fn allowed_wrong_falls_back_to_total_and_default_threshold() {
        let mut p = persisted(AttemptStatus::InProgress);
        p.configuration = TestConfiguration::default();
        p.total_questions = 40;
        assert_eq!(TestAttempt::from_persisted(p).unwrap().allowed_wrong(), 4);

        assert_eq!(TestConfiguration::default().allowed_wrong(None), 3);
    }

    #[test]
    fn has_exceeded_mistakes_is_strict() {
        let mut p = persisted(AttemptStatus::InProgress);
        p.wrong_count = 3;
        assert!(!TestAttempt::from_persisted(p.clone()).unwrap().has_exceeded_mistakes());
        p.wrong_count = 4;
        assert!(TestAttempt::from_persisted(p).unwrap().has_exceeded_mistakes());
    }

    #[test]
    fn remaining_seconds_prefers_snapshot() {
        let mut p = persisted(AttemptStatus::Paused);
        p.remaining_time_seconds = Some(123);
        let a = TestAttempt::from_persisted(p).unwrap();
        assert_eq!(a.remaining_seconds(fixed_now() + Duration::hours(5)), 123);
    }

    #[test]
    fn remaining_seconds_goes_negative_when_overtime() {
        let a = attempt(AttemptStatus::InProgress);
        assert_eq!(a.remaining_seconds(fixed_now() + Duration::seconds(600)), 1200);
        assert_eq!(a.remaining_seconds(fixed_now() + Duration::seconds(2000)), -200);
    }

    #[test]
    fn progress_percentage_handles_zero_total() {
        let mut p = persisted(AttemptStatus::InProgress);
        p.total_questions = 0;
        p.questions.clear();
        let a = TestAttempt::from_persisted(p).unwrap();
        assert_eq!(a.progress_percentage(), 0.0);
        assert!(a.progress_percentage().is_finite());
    }

    #[test]
    fn progress_percentage_counts_answers() {
        let mut a = attempt(AttemptStatus::InProgress);
        for i in 1..=6 {
            assert!(a.record_answer(QuestionId::new(i), AnswerId::new(i * 10), i % 2 == 0));
        }
        assert_eq!(a.answered_count(), 6);
        assert!((a.progress_percentage() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn abandon_rejects_terminal_status_without_mutation() {
        let mut a = attempt(AttemptStatus::Passed);
        let before = a.clone();
        assert!(!a.abandon(fixed_now() + Duration::minutes(1)));
        assert_eq!(a, before);
    }

    #[test]
    fn abandon_in_progress_computes_time_and_score() {
        let mut p = persisted(AttemptStatus::InProgress);
        p.remaining_time_seconds = Some(300);
        p.correct_count = 15;
        let mut a = TestAttempt::from_persisted(p).unwrap();
        let later = fixed_now() + Duration::minutes(25);

        assert!(a.abandon(later));
        assert_eq!(a.status(), AttemptStatus::Abandoned);
        assert_eq!(a.time_taken_seconds(), Some(1500));
        assert!((a.score_percentage() - 50.0).abs() < 1e-9);
        assert_eq!(a.finished_at(), Some(later));
    }

    #[test]
    fn abandon_is_idempotent_in_effect() {
        let mut a = attempt(AttemptStatus::Paused);
        assert!(a.abandon(fixed_now()));
        let after_first = a.clone();
        assert!(!a.abandon(fixed_now() + Duration::hours(1)));
        assert_eq!(a, after_first);
    }

    #[test]
    fn abandon_without_snapshot_counts_full_time() {
        let mut a = attempt(AttemptStatus::InProgress);
        assert!(a.abandon(fixed_now()));
        assert_eq!(a.time_taken_seconds(), Some(1800));
    }

    #[test]
    fn abandon_with_zero_total_scores_zero() {
        let mut p = persisted(AttemptStatus::InProgress);
        p.total_questions = 0;
        p.questions.clear();
        let mut a = TestAttempt::from_persisted(p).unwrap();
        assert!(a.abandon(fixed_now()));
        assert_eq!(a.score_percentage(), 0.0);
    }

    #[test]
    fn pause_and_resume_toggle_status() {
        let mut a = attempt(AttemptStatus::InProgress);
        assert!(!a.resume(fixed_now()));
        assert!(a.pause(fixed_now(), 900));
        assert_eq!(a.status(), AttemptStatus::Paused);
        assert_eq!(a.remaining_time_seconds(), Some(900));
        assert!(!a.pause(fixed_now(), 800));

        assert!(a.resume(fixed_now()));
        assert_eq!(a.status(), AttemptStatus::InProgress);
        assert_eq!(a.paused_at(), None);
        assert_eq!(a.remaining_time_seconds(), None);
        assert_eq!(a.remaining_seconds(fixed_now()), 900);
    }

    #[test]
    fn clock_keeps_running_after_resume() {
        let question_ids = (1..=30).map(QuestionId::new).collect();
        let mut draft = draft(question_ids);
        draft.configuration = TestConfiguration::new(30, 60, 10);
        let mut a = draft.assign_id(TestAttemptId::new(8)).unwrap();

        let resumed_at = fixed_now() + Duration::minutes(10);
        assert!(a.pause(fixed_now(), 900));
        assert!(a.resume(resumed_at));
        assert_eq!(a.remaining_seconds(resumed_at), 900);

        let later = resumed_at + Duration::seconds(2000);
        assert_eq!(a.remaining_seconds(later), -1100);

        assert!(a.finish(later, None));
        assert_eq!(a.time_taken_seconds(), Some(2900));
        assert!(a.time_taken_seconds().unwrap() >= 2000);
        assert!(!a.is_overtime());
    }

    #[test]
    fn paused_attempt_rejects_answers() {
        let mut a = attempt(AttemptStatus::InProgress);
        a.pause(fixed_now(), 100);
        assert!(!a.record_answer(QuestionId::new(1), AnswerId::new(1), true));
        assert!(!a.skip_question(QuestionId::new(1)));
    }

    #[test]
    fn record_answer_rejects_unknown_and_repeated_questions() {
        let mut a = TestAttempt::from_persisted(persisted(AttemptStatus::InProgress)).unwrap();
        assert!(!a.record_answer(QuestionId::new(99), AnswerId::new(1), true));
        assert!(a.record_answer(QuestionId::new(1), AnswerId::new(1), true));
        assert!(!a.record_answer(QuestionId::new(1), AnswerId::new(2), false));
        assert_eq!(a.correct_count(), 1);
        assert_eq!(a.wrong_count(), 0);
        assert_eq!(a.questions()[0].is_correct, Some(true));
        assert_eq!(a.current_question_index(), 1);
    }

    #[test]
    fn answering_a_skipped_question_clears_skip() {
        let mut a = attempt(AttemptStatus::InProgress);
        assert!(a.skip_question(QuestionId::new(2)));
        assert!(!a.skip_question(QuestionId::new(2)));
        assert_eq!(a.skipped_count(), 1);

        assert!(a.record_answer(QuestionId::new(2), AnswerId::new(5), false));
        assert_eq!(a.skipped_count(), 0);
        assert!(!a.skip_question(QuestionId::new(2)));
    }

    #[test]
    fn finish_grades_against_threshold() {
        let mut a = draft(vec![QuestionId::new(1), QuestionId::new(2), QuestionId::new(3)])
            .assign_id(TestAttemptId::new(9))
            .unwrap();
        assert_eq!(a.allowed_wrong(), 1);
        a.record_answer(QuestionId::new(1), AnswerId::new(1), true);
        a.record_answer(QuestionId::new(2), AnswerId::new(2), false);
        a.record_answer(QuestionId::new(3), AnswerId::new(3), true);

        let later = fixed_now() + Duration::seconds(100);
        assert!(a.finish(later, None));
        assert_eq!(a.status(), AttemptStatus::Passed);
        assert_eq!(a.time_taken_seconds(), Some(100));
        assert!((a.score_percentage() - 200.0 / 3.0).abs() < 1e-9);
        assert!(!a.finish(later, None));
    }

    #[test]
    fn finish_fails_when_mistakes_exceeded_and_flags_overtime() {
        let mut a = draft(vec![QuestionId::new(1), QuestionId::new(2), QuestionId::new(3)])
            .assign_id(TestAttemptId::new(9))
            .unwrap();
        a.record_answer(QuestionId::new(1), AnswerId::new(1), false);
        a.record_answer(QuestionId::new(2), AnswerId::new(2), false);

        assert!(a.finish(fixed_now(), Some(-30)));
        assert_eq!(a.status(), AttemptStatus::Failed);
        assert_eq!(a.time_taken_seconds(), Some(210));
        assert!(!a.is_overtime());
    }

    #[test]
    fn negative_time_taken_is_overtime() {
        let mut p = persisted(AttemptStatus::Failed);
        p.time_taken_seconds = Some(-45);
        assert!(TestAttempt::from_persisted(p).unwrap().is_overtime());
        assert!(!attempt(AttemptStatus::Passed).is_overtime());
    }

    #[test]
    fn draft_starts_in_progress() {
        let a = draft(vec![QuestionId::new(4), QuestionId::new(5)])
            .assign_id(TestAttemptId::new(3))
            .unwrap();
        assert_eq!(a.status(), AttemptStatus::InProgress);
        assert_eq!(a.total_questions(), 2);
        assert!(a.can_be_resumed());
        assert_eq!(a.questions()[1], AnsweredQuestion::unanswered(QuestionId::new(5)));
    }

    #[test]
    fn configuration_json_tolerates_missing_fields() {
        let cfg: TestConfiguration = serde_json::from_str(r#"{"question_count": 20}"#).unwrap();
        assert_eq!(cfg.question_count, Some(20));
        assert_eq!(cfg.time_per_question(), 60);
        assert_eq!(cfg.total_time_seconds(), 1200);
    }
}
