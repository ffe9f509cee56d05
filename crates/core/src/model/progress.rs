use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{QuestionId, UserId};

/// Per-user answer history for a single question.
///
/// Counters only grow; resetting progress is handled elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionProgress {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub times_correct: u32,
    pub times_wrong: u32,
    pub is_bookmarked: bool,
    pub is_learned: bool,
    pub first_answered_at: Option<DateTime<Utc>>,
    pub last_answered_at: Option<DateTime<Utc>>,
}

impl QuestionProgress {
    /// Progress row for a question the user has never seen.
    #[must_use]
    pub fn untouched(user_id: UserId, question_id: QuestionId) -> Self {
        Self {
            user_id,
            question_id,
            times_correct: 0,
            times_wrong: 0,
            is_bookmarked: false,
            is_learned: false,
            first_answered_at: None,
            last_answered_at: None,
        }
    }

    /// Count one more answer.
    pub fn record_answer(&mut self, is_correct: bool, at: DateTime<Utc>) {
        if is_correct {
            self.times_correct = self.times_correct.saturating_add(1);
        } else {
            self.times_wrong = self.times_wrong.saturating_add(1);
        }
        self.first_answered_at.get_or_insert(at);
        self.last_answered_at = Some(at);
    }

    #[must_use]
    pub fn times_answered(&self) -> u32 {
        self.times_correct.saturating_add(self.times_wrong)
    }

    /// Answered at least once, correctly or not.
    #[must_use]
    pub fn is_studied(&self) -> bool {
        self.times_answered() > 0
    }

    /// Share of correct answers, rounded to two decimals.
    #[must_use]
    pub fn accuracy_percentage(&self) -> f64 {
        let total = self.times_answered();
        if total == 0 {
            return 0.0;
        }
        let raw = f64::from(self.times_correct) / f64::from(total) * 100.0;
        (raw * 100.0).round() / 100.0
    }
}
