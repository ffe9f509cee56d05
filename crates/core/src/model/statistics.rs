use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::attempt::{AttemptStatus, TestAttempt};
use crate::model::ids::UserId;
use crate::time::{seconds_between, utc_day};

/// Lifetime counters kept per user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserStatistics {
    pub user_id: UserId,
    pub total_tests_taken: u32,
    pub total_tests_passed: u32,
    pub total_tests_failed: u32,
    pub total_questions_answered: u32,
    pub total_correct_answers: u32,
    pub current_streak_days: u32,
    pub best_streak_days: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub total_study_time_seconds: u64,
}

impl UserStatistics {
    /// Passed tests as a percentage of all tests, rounded to two decimals.
    #[must_use]
    pub fn pass_rate(&self) -> f64 {
        if self.total_tests_taken == 0 {
            return 0.0;
        }
        let raw = f64::from(self.total_tests_passed) / f64::from(self.total_tests_taken) * 100.0;
        (raw * 100.0).round() / 100.0
    }

    /// Share of correct answers over all answered questions, two decimals.
    #[must_use]
    pub fn overall_accuracy(&self) -> f64 {
        if self.total_questions_answered == 0 {
            return 0.0;
        }
        let raw = f64::from(self.total_correct_answers)
            / f64::from(self.total_questions_answered)
            * 100.0;
        (raw * 100.0).round() / 100.0
    }

    /// Study time as `"{h}h {m}m"`, or `"{m}m"` below one hour.
    #[must_use]
    pub fn formatted_study_time(&self) -> String {
        let hours = self.total_study_time_seconds / 3600;
        let minutes = (self.total_study_time_seconds % 3600) / 60;
        if hours > 0 {
            format!("{hours}h {minutes}m")
        } else {
            format!("{minutes}m")
        }
    }

    /// Fold a finished attempt into the counters.
    ///
    /// Only graded attempts count as taken tests; abandoned ones still add
    /// their answers and the wall time between start and abandonment.
    /// Negative (overtime) durations add nothing.
    pub fn record_attempt(&mut self, attempt: &TestAttempt) {
        let Some(finished_at) = attempt.finished_at() else {
            return;
        };
        match attempt.status() {
            AttemptStatus::Passed => {
                self.total_tests_taken = self.total_tests_taken.saturating_add(1);
                self.total_tests_passed = self.total_tests_passed.saturating_add(1);
            }
            AttemptStatus::Failed => {
                self.total_tests_taken = self.total_tests_taken.saturating_add(1);
                self.total_tests_failed = self.total_tests_failed.saturating_add(1);
            }
            _ => {}
        }
        let answered = attempt.correct_count().saturating_add(attempt.wrong_count());
        self.total_questions_answered = self.total_questions_answered.saturating_add(answered);
        self.total_correct_answers = self
            .total_correct_answers
            .saturating_add(attempt.correct_count());
        let taken = if attempt.status() == AttemptStatus::Abandoned {
            Some(seconds_between(attempt.started_at(), finished_at))
        } else {
            attempt.time_taken_seconds()
        };
        let spent = taken.and_then(|t| u64::try_from(t).ok()).unwrap_or(0);
        self.total_study_time_seconds = self.total_study_time_seconds.saturating_add(spent);
        self.touch_activity(utc_day(finished_at));
    }

    /// Register activity on `day`, extending or restarting the streak.
    pub fn touch_activity(&mut self, day: NaiveDate) {
        match self.last_activity_date {
            Some(last) if last == day => return,
            Some(last) if last.succ_opt() == Some(day) => {
                self.current_streak_days = self.current_streak_days.saturating_add(1);
            }
            _ => self.current_streak_days = 1,
        }
        self.best_streak_days = self.best_streak_days.max(self.current_streak_days);
        self.last_activity_date = Some(day);
    }
}
