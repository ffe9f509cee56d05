use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::attempt::TestConfiguration;
use crate::model::ids::{CategoryId, LicenseTypeId, QuestionId, TemplateId, UserId};

pub const QUESTION_COUNT_RANGE: RangeInclusive<u32> = 5..=100;
pub const TIME_PER_QUESTION_RANGE: RangeInclusive<u32> = 30..=180;
pub const FAILURE_THRESHOLD_RANGE: RangeInclusive<u32> = 1..=50;
const MAX_NAME_LEN: usize = 255;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateError {
    #[error("template name cannot be empty")]
    EmptyName,

    #[error("template name is longer than 255 characters")]
    NameTooLong,

    #[error("question count must be between 5 and 100, got {0}")]
    InvalidQuestionCount(u32),

    #[error("time per question must be between 30 and 180 seconds, got {0}")]
    InvalidTimePerQuestion(u32),

    #[error("failure threshold must be between 1 and 50 percent, got {0}")]
    InvalidFailureThreshold(u32),
}

//
// ─── TEMPLATE ──────────────────────────────────────────────────────────────────
//

/// A saved test setup a user can start again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestTemplate {
    id: TemplateId,
    user_id: UserId,
    name: String,
    license_type_id: Option<LicenseTypeId>,
    question_count: u32,
    time_per_question: u32,
    failure_threshold: u32,
    category_ids: Vec<CategoryId>,
    excluded_question_ids: Vec<QuestionId>,
    created_at: DateTime<Utc>,
}

impl TestTemplate {
    /// Creates a validated template.
    ///
    /// # Errors
    ///
    /// Returns `TemplateError` if the name is blank or too long, or a numeric
    /// setting lies outside its allowed range.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TemplateId,
        user_id: UserId,
        name: impl Into<String>,
        license_type_id: Option<LicenseTypeId>,
        question_count: u32,
        time_per_question: u32,
        failure_threshold: u32,
        category_ids: Vec<CategoryId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, TemplateError> {
        let name = name.into().trim().to_owned();
        if name.is_empty() {
            return Err(TemplateError::EmptyName);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(TemplateError::NameTooLong);
        }
        if !QUESTION_COUNT_RANGE.contains(&question_count) {
            return Err(TemplateError::InvalidQuestionCount(question_count));
        }
        if !TIME_PER_QUESTION_RANGE.contains(&time_per_question) {
            return Err(TemplateError::InvalidTimePerQuestion(time_per_question));
        }
        if !FAILURE_THRESHOLD_RANGE.contains(&failure_threshold) {
            return Err(TemplateError::InvalidFailureThreshold(failure_threshold));
        }

        Ok(Self {
            id,
            user_id,
            name,
            license_type_id,
            question_count,
            time_per_question,
            failure_threshold,
            category_ids,
            excluded_question_ids: Vec::new(),
            created_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> TemplateId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn license_type_id(&self) -> Option<LicenseTypeId> {
        self.license_type_id
    }

    /// Categories questions are drawn from; empty means every category.
    #[must_use]
    pub fn category_ids(&self) -> &[CategoryId] {
        &self.category_ids
    }

    #[must_use]
    pub fn excluded_question_ids(&self) -> &[QuestionId] {
        &self.excluded_question_ids
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Keep a question out of future tests started from this template.
    pub fn exclude_question(&mut self, question_id: QuestionId) {
        if !self.excluded_question_ids.contains(&question_id) {
            self.excluded_question_ids.push(question_id);
        }
    }

    #[must_use]
    pub fn total_time_seconds(&self) -> i64 {
        self.configuration().total_time_seconds()
    }

    #[must_use]
    pub fn max_allowed_wrong(&self) -> u32 {
        self.configuration().allowed_wrong(None)
    }

    /// Configuration recorded on attempts started from this template.
    #[must_use]
    pub fn configuration(&self) -> TestConfiguration {
        TestConfiguration::new(
            self.question_count,
            self.time_per_question,
            self.failure_threshold,
        )
    }
}
