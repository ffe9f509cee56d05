//! Question-mastery based pass chance.
//!
//! Each question of a license family scores between 0 and 1 from the user's
//! answer history; the pass chance is the average score as a percentage.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::{QuestionId, QuestionProgress};
use crate::performance::rounded_percentage;

/// Answer history of one question, classified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuestionMastery {
    /// Never answered correctly.
    Unproven,
    /// Exactly one correct answer and no wrong ones.
    PartiallyProven,
    /// Two or more correct answers and no wrong ones.
    Mastered,
    /// Both correct and wrong answers; carries `correct / (correct + wrong)`.
    Mixed(f64),
}

impl QuestionMastery {
    #[must_use]
    pub fn classify(correct: u32, wrong: u32) -> Self {
        match (correct, wrong) {
            (0, _) => Self::Unproven,
            (1, 0) => Self::PartiallyProven,
            (_, 0) => Self::Mastered,
            (c, w) => Self::Mixed(f64::from(c) / (f64::from(c) + f64::from(w))),
        }
    }

    #[must_use]
    pub fn score(self) -> f64 {
        match self {
            Self::Unproven => 0.0,
            Self::PartiallyProven => 0.5,
            Self::Mastered => 1.0,
            Self::Mixed(ratio) => ratio,
        }
    }

    #[must_use]
    pub fn is_studied(self) -> bool {
        !matches!(self, Self::Unproven)
    }

    #[must_use]
    pub fn is_mastered(self) -> bool {
        matches!(self, Self::Mastered)
    }
}

/// Score of a single question from its counters.
#[must_use]
pub fn question_score(correct: u32, wrong: u32) -> f64 {
    QuestionMastery::classify(correct, wrong).score()
}

/// Mastery-based pass chance for a set of questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassChance {
    pub percentage: u32,
    pub total_questions: u32,
    pub studied_questions: u32,
    pub mastered_questions: u32,
}

/// Pass chance over `question_ids` given the user's progress rows.
///
/// Questions without a progress row count as never answered. Progress rows
/// for questions outside `question_ids` are ignored, as are duplicate ids.
#[must_use]
pub fn mastery_pass_chance(question_ids: &[QuestionId], progress: &[QuestionProgress]) -> PassChance {
    let questions: BTreeSet<QuestionId> = question_ids.iter().copied().collect();
    if questions.is_empty() {
        return PassChance::default();
    }

    let by_question: HashMap<QuestionId, &QuestionProgress> =
        progress.iter().map(|p| (p.question_id, p)).collect();

    let mut total_score = 0.0;
    let mut studied = 0_u32;
    let mut mastered = 0_u32;

    for question_id in &questions {
        let (correct, wrong) = by_question
            .get(question_id)
            .map_or((0, 0), |p| (p.times_correct, p.times_wrong));
        let mastery = QuestionMastery::classify(correct, wrong);

        if mastery.is_studied() {
            studied += 1;
        }
        if mastery.is_mastered() {
            mastered += 1;
        }
        total_score += mastery.score();
    }

    let total = u32::try_from(questions.len()).unwrap_or(u32::MAX);
    PassChance {
        percentage: rounded_percentage(total_score / f64::from(total) * 100.0),
        total_questions: total,
        studied_questions: studied,
        mastered_questions: mastered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;

    fn progress(question: u64, correct: u32, wrong: u32) -> QuestionProgress {
        let mut p = QuestionProgress::untouched(UserId::new(1), QuestionId::new(question));
        p.times_correct = correct;
        p.times_wrong = wrong;
        p
    }

    #[test]
    fn per_question_scores() {
        assert_eq!(question_score(2, 0), 1.0);
        assert_eq!(question_score(1, 0), 0.5);
        assert!((question_score(3, 1) - 0.75).abs() < 1e-12);
        assert_eq!(question_score(0, 5), 0.0);
        assert_eq!(question_score(0, 0), 0.0);
    }

    #[test]
    fn classification_flags() {
        assert!(QuestionMastery::classify(2, 0).is_mastered());
        assert!(QuestionMastery::classify(1, 0).is_studied());
        assert!(!QuestionMastery::classify(1, 0).is_mastered());
        assert!(QuestionMastery::classify(3, 1).is_studied());
        assert!(!QuestionMastery::classify(3, 1).is_mastered());
        assert!(!QuestionMastery::classify(0, 5).is_studied());
    }

    #[test]
    fn aggregates_over_questions() {
        let ids: Vec<QuestionId> = (1..=5).map(QuestionId::new).collect();
        let rows = vec![
            progress(1, 2, 0),
            progress(2, 1, 0),
            progress(3, 3, 1),
            progress(4, 0, 5),
            progress(42, 9, 0),
        ];

        let chance = mastery_pass_chance(&ids, &rows);
        // (1 + 0.5 + 0.75 + 0 + 0) / 5 = 0.45
        assert_eq!(
            chance,
            PassChance {
                percentage: 45,
                total_questions: 5,
                studied_questions: 3,
                mastered_questions: 1,
            }
        );
    }

    #[test]
    fn no_questions_is_zero() {
        let chance = mastery_pass_chance(&[], &[progress(1, 5, 0)]);
        assert_eq!(chance, PassChance::default());
    }

    #[test]
    fn untouched_questions_score_zero() {
        let ids: Vec<QuestionId> = (1..=4).map(QuestionId::new).collect();
        let chance = mastery_pass_chance(&ids, &[progress(1, 2, 0)]);
        assert_eq!(chance.percentage, 25);
        assert_eq!(chance.studied_questions, 1);
    }

    #[test]
    fn duplicate_ids_counted_once() {
        let ids = vec![QuestionId::new(1), QuestionId::new(1), QuestionId::new(2)];
        let chance = mastery_pass_chance(&ids, &[progress(1, 2, 0)]);
        assert_eq!(chance.total_questions, 2);
        assert_eq!(chance.percentage, 50);
    }
}
