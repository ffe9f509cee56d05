//! Dashboard and history statistics derived from attempts.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    AttemptStatus, LicenseTypeFamily, LicenseTypeId, LicenseTypeSummary, TestAttempt,
    TestAttemptId, TestKind,
};
use crate::performance::rounded_percentage;
use crate::time::utc_day;

/// Graded attempts listed on the dashboard.
pub const RECENT_TESTS_LIMIT: usize = 10;
/// Days covered by the weekly activity chart.
pub const ACTIVITY_WINDOW_DAYS: i64 = 7;

/// Totals over a user's graded attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStats {
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    pub pass_rate: u32,
    pub total_correct: u64,
    pub total_wrong: u64,
}

impl TestStats {
    #[must_use]
    pub fn from_attempts(attempts: &[TestAttempt]) -> Self {
        let mut stats = Self::default();
        for attempt in attempts.iter().filter(|a| a.status().is_graded()) {
            stats.total_tests += 1;
            match attempt.status() {
                AttemptStatus::Passed => stats.passed += 1,
                _ => stats.failed += 1,
            }
            stats.total_correct += u64::from(attempt.correct_count());
            stats.total_wrong += u64::from(attempt.wrong_count());
        }
        if stats.total_tests > 0 {
            stats.pass_rate = rounded_percentage(
                f64::from(stats.passed) / f64::from(stats.total_tests) * 100.0,
            );
        }
        stats
    }
}

/// How much of the question bank a user has touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyProgress {
    pub studied: u32,
    pub total: u32,
    pub percentage: u32,
}

impl StudyProgress {
    #[must_use]
    pub fn new(studied: u32, total: u32) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            rounded_percentage(f64::from(studied) / f64::from(total) * 100.0)
        };
        Self {
            studied,
            total,
            percentage,
        }
    }
}

/// Compact row for the recent-results chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTest {
    pub id: TestAttemptId,
    pub status: AttemptStatus,
    pub score_percentage: f64,
    pub finished_at: Option<DateTime<Utc>>,
    pub license_type_id: Option<LicenseTypeId>,
}

/// The `limit` most recently finished graded attempts, oldest first.
#[must_use]
pub fn recent_tests(attempts: &[TestAttempt], limit: usize) -> Vec<RecentTest> {
    let mut graded: Vec<&TestAttempt> = attempts
        .iter()
        .filter(|a| a.status().is_graded())
        .collect();
    graded.sort_by_key(|a| (a.finished_at(), a.id()));

    let skip = graded.len().saturating_sub(limit);
    graded
        .into_iter()
        .skip(skip)
        .map(|a| RecentTest {
            id: a.id(),
            status: a.status(),
            score_percentage: a.score_percentage(),
            finished_at: a.finished_at(),
            license_type_id: a.license_type_id(),
        })
        .collect()
}

/// Graded attempts finished on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub count: u32,
    pub passed: u32,
}

/// Graded attempts of the last seven days grouped by UTC day, oldest first.
/// Days without attempts are omitted.
#[must_use]
pub fn weekly_activity(attempts: &[TestAttempt], now: DateTime<Utc>) -> Vec<DailyActivity> {
    let since = now - Duration::days(ACTIVITY_WINDOW_DAYS);
    let mut days: BTreeMap<NaiveDate, DailyActivity> = BTreeMap::new();

    for attempt in attempts.iter().filter(|a| a.status().is_graded()) {
        let Some(finished_at) = attempt.finished_at() else {
            continue;
        };
        if finished_at < since {
            continue;
        }
        let date = utc_day(finished_at);
        let entry = days.entry(date).or_insert(DailyActivity {
            date,
            count: 0,
            passed: 0,
        });
        entry.count += 1;
        if attempt.status() == AttemptStatus::Passed {
            entry.passed += 1;
        }
    }

    days.into_values().collect()
}

/// Counters shown above the test history list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
}

impl HistoryStats {
    #[must_use]
    pub fn from_attempts(attempts: &[TestAttempt]) -> Self {
        let mut stats = Self::default();
        for attempt in attempts {
            let status = attempt.status();
            if status.is_completed() {
                stats.total += 1;
            }
            match status {
                AttemptStatus::Passed => stats.passed += 1,
                AttemptStatus::Failed => stats.failed += 1,
                _ => {}
            }
        }
        stats
    }
}

/// License type of an active attempt, with child codes for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLicense {
    #[serde(flatten)]
    pub license_type: LicenseTypeSummary,
    pub children: Vec<LicenseTypeSummary>,
}

/// The attempt a user can continue from the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTestSummary {
    pub id: TestAttemptId,
    pub test_type: TestKind,
    pub status: AttemptStatus,
    pub total_questions: u32,
    pub answered_count: usize,
    pub correct_count: u32,
    pub wrong_count: u32,
    pub remaining_time_seconds: Option<i64>,
    pub license_type: Option<ActiveLicense>,
}

impl ActiveTestSummary {
    #[must_use]
    pub fn new(attempt: &TestAttempt, family: Option<&LicenseTypeFamily>) -> Self {
        Self {
            id: attempt.id(),
            test_type: attempt.kind(),
            status: attempt.status(),
            total_questions: attempt.total_questions(),
            answered_count: attempt.answered_count(),
            correct_count: attempt.correct_count(),
            wrong_count: attempt.wrong_count(),
            remaining_time_seconds: attempt.remaining_time_seconds(),
            license_type: family.map(|f| ActiveLicense {
                license_type: f.license_type.summary(),
                children: f.children.iter().map(|c| c.summary()).collect(),
            }),
        }
    }
}
