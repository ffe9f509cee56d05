use exam_core::model::{UserId, UserStatistics};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ser, u32_from_i64};
use crate::repository::{StatisticsRepository, StorageError};

fn map_statistics_row(
    user_id: UserId,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<UserStatistics, StorageError> {
    let counter = |field: &'static str| -> Result<u32, StorageError> {
        u32_from_i64(field, row.try_get::<i64, _>(field).map_err(ser)?)
    };
    let study_time: i64 = row.try_get("total_study_time_seconds").map_err(ser)?;

    Ok(UserStatistics {
        user_id,
        total_tests_taken: counter("total_tests_taken")?,
        total_tests_passed: counter("total_tests_passed")?,
        total_tests_failed: counter("total_tests_failed")?,
        total_questions_answered: counter("total_questions_answered")?,
        total_correct_answers: counter("total_correct_answers")?,
        current_streak_days: counter("current_streak_days")?,
        best_streak_days: counter("best_streak_days")?,
        last_activity_date: row.try_get("last_activity_date").map_err(ser)?,
        total_study_time_seconds: u64::try_from(study_time).map_err(|_| {
            StorageError::Serialization(format!("invalid total_study_time_seconds: {study_time}"))
        })?,
    })
}

#[async_trait::async_trait]
impl StatisticsRepository for SqliteRepository {
    async fn get_statistics(&self, user_id: UserId) -> Result<UserStatistics, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    total_tests_taken, total_tests_passed, total_tests_failed,
                    total_questions_answered, total_correct_answers,
                    current_streak_days, best_streak_days, last_activity_date,
                    total_study_time_seconds
                FROM user_statistics
                WHERE user_id = ?1
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => map_statistics_row(user_id, &row),
            None => Ok(UserStatistics {
                user_id,
                ..UserStatistics::default()
            }),
        }
    }

    async fn save_statistics(&self, statistics: &UserStatistics) -> Result<(), StorageError> {
        let study_time = i64::try_from(statistics.total_study_time_seconds)
            .map_err(|_| StorageError::Serialization("total_study_time_seconds overflow".into()))?;

        sqlx::query(
            r"
                INSERT INTO user_statistics (
                    user_id, total_tests_taken, total_tests_passed, total_tests_failed,
                    total_questions_answered, total_correct_answers,
                    current_streak_days, best_streak_days, last_activity_date,
                    total_study_time_seconds
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(user_id) DO UPDATE SET
                    total_tests_taken = excluded.total_tests_taken,
                    total_tests_passed = excluded.total_tests_passed,
                    total_tests_failed = excluded.total_tests_failed,
                    total_questions_answered = excluded.total_questions_answered,
                    total_correct_answers = excluded.total_correct_answers,
                    current_streak_days = excluded.current_streak_days,
                    best_streak_days = excluded.best_streak_days,
                    last_activity_date = excluded.last_activity_date,
                    total_study_time_seconds = excluded.total_study_time_seconds
            ",
        )
        .bind(id_i64("user_id", statistics.user_id.value())?)
        .bind(i64::from(statistics.total_tests_taken))
        .bind(i64::from(statistics.total_tests_passed))
        .bind(i64::from(statistics.total_tests_failed))
        .bind(i64::from(statistics.total_questions_answered))
        .bind(i64::from(statistics.total_correct_answers))
        .bind(i64::from(statistics.current_streak_days))
        .bind(i64::from(statistics.best_streak_days))
        .bind(statistics.last_activity_date)
        .bind(study_time)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
