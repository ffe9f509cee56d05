//! Attempt-history based performance per license type.
//!
//! Every graded attempt (passed or failed) contributes to the group of its
//! license type. Each group yields pass rates, a blended pass chance and a
//! score trend.

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::{AttemptStatus, LicenseType, LicenseTypeId, LicenseTypeSummary, TestAttempt};

/// Number of most recent attempts that make up the "recent" window.
pub const RECENT_WINDOW: usize = 5;
/// Fewer attempts than this always yield a stable trend.
pub const TREND_MIN_SAMPLES: usize = 3;
/// Average score difference (percentage points) needed to call a trend.
pub const TREND_DELTA: f64 = 5.0;

const RECENT_PASS_WEIGHT: f64 = 0.4;
const OVERALL_PASS_WEIGHT: f64 = 0.3;
const RECENT_SCORE_WEIGHT: f64 = 0.3;

//
// ─── TREND ─────────────────────────────────────────────────────────────────────
//

/// Direction of a score series over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Classify scores given in chronological order (oldest first).
///
/// The series is split at `floor(n / 2)`; the later half is compared with
/// the earlier one.
#[must_use]
pub fn classify_trend(scores: &[f64]) -> Trend {
    if scores.len() < TREND_MIN_SAMPLES {
        return Trend::Stable;
    }
    let (earlier, later) = scores.split_at(scores.len() / 2);
    let diff = mean(later) - mean(earlier);

    if diff > TREND_DELTA {
        Trend::Improving
    } else if diff < -TREND_DELTA {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

/// Round a percentage to a whole number clamped to `0..=100`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rounded_percentage(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u32
}

/// `round(0.4 * recent_pass_rate + 0.3 * overall_pass_rate + 0.3 * recent_avg_score)`,
/// clamped to `0..=100`.
#[must_use]
pub fn blended_pass_chance(recent_pass_rate: f64, overall_pass_rate: f64, recent_avg_score: f64) -> u32 {
    rounded_percentage(
        RECENT_PASS_WEIGHT * recent_pass_rate
            + OVERALL_PASS_WEIGHT * overall_pass_rate
            + RECENT_SCORE_WEIGHT * recent_avg_score,
    )
}

//
// ─── GROUP PERFORMANCE ─────────────────────────────────────────────────────────
//

/// Raw figures for one group of graded attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPerformance {
    pub total: usize,
    pub passed: usize,
    pub overall_pass_rate: f64,
    pub recent_pass_rate: f64,
    pub recent_avg_score: f64,
    pub avg_score: f64,
    pub pass_chance: u32,
    pub trend: Trend,
}

impl GroupPerformance {
    /// Compute the figures for a group of graded attempts in any order.
    #[must_use]
    pub fn from_attempts(attempts: &[&TestAttempt]) -> Self {
        let mut chronological: Vec<&TestAttempt> = attempts.to_vec();
        chronological.sort_by_key(|a| (a.finished_at(), a.id()));

        let total = chronological.len();
        let passed = chronological
            .iter()
            .filter(|a| a.status() == AttemptStatus::Passed)
            .count();

        let recent: Vec<&TestAttempt> = chronological.iter().rev().take(RECENT_WINDOW).copied().collect();
        let recent_passed = recent
            .iter()
            .filter(|a| a.status() == AttemptStatus::Passed)
            .count();
        let recent_scores: Vec<f64> = recent.iter().map(|a| a.score_percentage()).collect();
        let scores: Vec<f64> = chronological.iter().map(|a| a.score_percentage()).collect();

        let overall_pass_rate = rate(passed, total);
        let recent_pass_rate = rate(recent_passed, recent.len());
        let recent_avg_score = mean(&recent_scores);

        Self {
            total,
            passed,
            overall_pass_rate,
            recent_pass_rate,
            recent_avg_score,
            avg_score: mean(&scores),
            pass_chance: blended_pass_chance(recent_pass_rate, overall_pass_rate, recent_avg_score),
            trend: classify_trend(&scores),
        }
    }
}

/// Performance card for one license type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensePerformance {
    pub license_type: LicenseTypeSummary,
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    pub pass_rate: u32,
    pub avg_score: u32,
    pub pass_chance: u32,
    pub trend: Trend,
}

impl LicensePerformance {
    fn new(license_type: LicenseTypeSummary, group: &GroupPerformance) -> Self {
        let total = u32::try_from(group.total).unwrap_or(u32::MAX);
        let passed = u32::try_from(group.passed).unwrap_or(u32::MAX);
        Self {
            license_type,
            total_tests: total,
            passed,
            failed: total - passed,
            pass_rate: rounded_percentage(group.overall_pass_rate),
            avg_score: rounded_percentage(group.avg_score),
            pass_chance: group.pass_chance,
            trend: group.trend,
        }
    }
}

/// Performance per license type, most practised first.
///
/// Only graded attempts with a license type are counted. Groups whose license
/// type is not in `license_types` are skipped.
#[must_use]
pub fn license_performance(
    attempts: &[TestAttempt],
    license_types: &[LicenseType],
) -> Vec<LicensePerformance> {
    let mut groups: HashMap<LicenseTypeId, Vec<&TestAttempt>> = HashMap::new();
    for attempt in attempts.iter().filter(|a| a.status().is_graded()) {
        if let Some(license_type_id) = attempt.license_type_id() {
            groups.entry(license_type_id).or_default().push(attempt);
        }
    }

    let by_id: HashMap<LicenseTypeId, &LicenseType> =
        license_types.iter().map(|lt| (lt.id, lt)).collect();

    let mut out: Vec<LicensePerformance> = groups
        .into_iter()
        .filter_map(|(id, group)| {
            let license_type = by_id.get(&id)?;
            Some(LicensePerformance::new(
                license_type.summary(),
                &GroupPerformance::from_attempts(&group),
            ))
        })
        .collect();

    out.sort_by_key(|p| (Reverse(p.total_tests), p.license_type.id));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AttemptDraft, PersistedAttempt, QuestionId, TestAttemptId, TestConfiguration, TestKind,
        UserId,
    };
    use crate::time::fixed_now;
    use chrono::Duration;
    use std::collections::BTreeMap;

    fn graded(id: u64, license: Option<u64>, passed: bool, score: f64, day: i64) -> TestAttempt {
        let finished = fixed_now() + Duration::days(day);
        TestAttempt::from_persisted(PersistedAttempt {
            id: TestAttemptId::new(id),
            user_id: UserId::new(1),
            license_type_id: license.map(LicenseTypeId::new),
            template_id: None,
            kind: TestKind::Quick,
            configuration: TestConfiguration::new(30, 60, 10),
            questions: Vec::new(),
            correct_count: 0,
            wrong_count: 0,
            total_questions: 30,
            score_percentage: score,
            status: if passed {
                AttemptStatus::Passed
            } else {
                AttemptStatus::Failed
            },
            started_at: finished - Duration::minutes(20),
            finished_at: Some(finished),
            time_taken_seconds: Some(1200),
            current_question_index: 30,
            answers_given: BTreeMap::new(),
            skipped_question_ids: Vec::new(),
            paused_at: None,
            remaining_time_seconds: None,
        })
        .unwrap()
    }

    fn license(id: u64, code: &str) -> LicenseType {
        LicenseType {
            id: LicenseTypeId::new(id),
            code: code.to_owned(),
            name: code.to_owned(),
            parent_id: None,
            is_parent: true,
        }
    }

    #[test]
    fn blended_pass_chance_matches_weights() {
        assert_eq!(blended_pass_chance(80.0, 70.0, 82.0), 78);
        assert_eq!(blended_pass_chance(0.0, 0.0, 0.0), 0);
        assert_eq!(blended_pass_chance(100.0, 100.0, 100.0), 100);
    }

    #[test]
    fn group_with_ten_attempts() {
        // Older five: 3 passed. Recent five: 4 passed, scores averaging 82.
        let older = [(true, 60.0), (false, 50.0), (true, 70.0), (false, 40.0), (true, 65.0)];
        let recent = [(true, 90.0), (true, 85.0), (false, 60.0), (true, 88.0), (true, 87.0)];
        let attempts: Vec<TestAttempt> = older
            .iter()
            .chain(recent.iter())
            .enumerate()
            .map(|(i, (passed, score))| graded(i as u64 + 1, Some(1), *passed, *score, i as i64))
            .collect();
        let refs: Vec<&TestAttempt> = attempts.iter().collect();

        let group = GroupPerformance::from_attempts(&refs);
        assert_eq!(group.total, 10);
        assert_eq!(group.passed, 7);
        assert!((group.overall_pass_rate - 70.0).abs() < 1e-9);
        assert!((group.recent_pass_rate - 80.0).abs() < 1e-9);
        assert!((group.recent_avg_score - 82.0).abs() < 1e-9);
        assert_eq!(group.pass_chance, 78);
        assert_eq!(group.trend, Trend::Improving);
    }

    #[test]
    fn recent_window_uses_finish_time_not_input_order() {
        let attempts = vec![
            graded(1, Some(1), true, 100.0, 10),
            graded(2, Some(1), false, 0.0, 1),
            graded(3, Some(1), false, 0.0, 2),
            graded(4, Some(1), false, 0.0, 3),
            graded(5, Some(1), false, 0.0, 4),
            graded(6, Some(1), false, 0.0, 5),
            graded(7, Some(1), false, 0.0, 0),
        ];
        let refs: Vec<&TestAttempt> = attempts.iter().collect();
        let group = GroupPerformance::from_attempts(&refs);
        // window = days 10, 5, 4, 3, 2
        assert!((group.recent_pass_rate - 20.0).abs() < 1e-9);
        assert!((group.recent_avg_score - 20.0).abs() < 1e-9);
    }

    #[test]
    fn empty_group_is_zero() {
        let group = GroupPerformance::from_attempts(&[]);
        assert_eq!(group.total, 0);
        assert_eq!(group.pass_chance, 0);
        assert_eq!(group.trend, Trend::Stable);
        assert!(license_performance(&[], &[]).is_empty());
    }

    #[test]
    fn trend_needs_three_samples() {
        assert_eq!(classify_trend(&[]), Trend::Stable);
        assert_eq!(classify_trend(&[10.0, 90.0]), Trend::Stable);
    }

    #[test]
    fn trend_is_symmetric() {
        assert_eq!(classify_trend(&[40.0, 60.0, 70.0]), Trend::Improving);
        assert_eq!(classify_trend(&[70.0, 60.0, 40.0]), Trend::Declining);
        assert_eq!(classify_trend(&[50.0, 52.0, 55.0, 54.0]), Trend::Stable);
        // exactly five points apart is still stable
        assert_eq!(classify_trend(&[50.0, 55.0, 55.0]), Trend::Stable);
    }

    #[test]
    fn trend_splits_odd_series_with_larger_later_half() {
        // halves: [50] and [50, 62] -> diff 6
        assert_eq!(classify_trend(&[50.0, 50.0, 62.0]), Trend::Improving);
    }

    #[test]
    fn license_performance_groups_and_sorts() {
        let attempts = vec![
            graded(1, Some(1), true, 90.0, 0),
            graded(2, Some(2), true, 95.0, 1),
            graded(3, Some(2), false, 70.0, 2),
            graded(4, Some(2), true, 92.0, 3),
            graded(5, None, true, 99.0, 4),
            graded(6, Some(9), true, 99.0, 5),
        ];
        let types = vec![license(1, "A"), license(2, "B")];

        let perf = license_performance(&attempts, &types);
        assert_eq!(perf.len(), 2);
        assert_eq!(perf[0].license_type.code, "B");
        assert_eq!(perf[0].total_tests, 3);
        assert_eq!(perf[0].passed, 2);
        assert_eq!(perf[0].failed, 1);
        assert_eq!(perf[0].pass_rate, 67);
        assert_eq!(perf[0].avg_score, 86);
        assert_eq!(perf[1].license_type.code, "A");
        assert_eq!(perf[1].pass_chance, 97);
    }

    #[test]
    fn ungraded_attempts_are_ignored() {
        let draft = || AttemptDraft {
            user_id: UserId::new(1),
            license_type_id: Some(LicenseTypeId::new(1)),
            template_id: None,
            kind: TestKind::Quick,
            configuration: TestConfiguration::default(),
            question_ids: vec![QuestionId::new(1)],
            started_at: fixed_now(),
        };
        let in_progress = draft().assign_id(TestAttemptId::new(1)).unwrap();
        let mut abandoned = draft().assign_id(TestAttemptId::new(2)).unwrap();
        assert!(abandoned.abandon(fixed_now()));
        let passed = graded(3, Some(1), true, 80.0, 1);

        let perf = license_performance(&[in_progress, abandoned, passed], &[license(1, "A")]);
        assert_eq!(perf.len(), 1);
        assert_eq!(perf[0].total_tests, 1);
        assert_eq!(perf[0].pass_rate, 100);
    }

    #[test]
    fn trend_serializes_lowercase() {
        let json = serde_json::to_string(&Trend::Improving).unwrap();
        assert_eq!(json, "\"improving\"");
    }
}
