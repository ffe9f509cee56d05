use exam_core::model::{QuestionId, QuestionProgress, UserId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ids_i64, map_progress_row, placeholders, u32_from_i64};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_progress(&self, progress: &QuestionProgress) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO question_progress (
                    user_id, question_id, times_correct, times_wrong,
                    is_bookmarked, is_learned, first_answered_at, last_answered_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(user_id, question_id) DO UPDATE SET
                    times_correct = excluded.times_correct,
                    times_wrong = excluded.times_wrong,
                    is_bookmarked = excluded.is_bookmarked,
                    is_learned = excluded.is_learned,
                    first_answered_at = excluded.first_answered_at,
                    last_answered_at = excluded.last_answered_at
            ",
        )
        .bind(id_i64("user_id", progress.user_id.value())?)
        .bind(id_i64("question_id", progress.question_id.value())?)
        .bind(i64::from(progress.times_correct))
        .bind(i64::from(progress.times_wrong))
        .bind(progress.is_bookmarked)
        .bind(progress.is_learned)
        .bind(progress.first_answered_at)
        .bind(progress.last_answered_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn get_progress(
        &self,
        user_id: UserId,
        question_id: QuestionId,
    ) -> Result<Option<QuestionProgress>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT
                    user_id, question_id, times_correct, times_wrong,
                    is_bookmarked, is_learned, first_answered_at, last_answered_at
                FROM question_progress
                WHERE user_id = ?1 AND question_id = ?2
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("question_id", question_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn progress_for_questions(
        &self,
        user_id: UserId,
        question_ids: &[QuestionId],
    ) -> Result<Vec<QuestionProgress>, StorageError> {
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
                SELECT
                    user_id, question_id, times_correct, times_wrong,
                    is_bookmarked, is_learned, first_answered_at, last_answered_at
                FROM question_progress
                WHERE user_id = ?1 AND question_id IN (
            ",
        );
        sql.push_str(&placeholders(question_ids.len(), 1));
        sql.push_str(")\n ORDER BY question_id ASC");

        let mut query = sqlx::query(&sql).bind(id_i64("user_id", user_id.value())?);
        for id in ids_i64("question_id", question_ids, |q| q.value())? {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }

    async fn count_studied(&self, user_id: UserId) -> Result<u32, StorageError> {
        let count: i64 = sqlx::query_scalar(
            r"
                SELECT COUNT(*) FROM question_progress
                WHERE user_id = ?1 AND (times_correct > 0 OR times_wrong > 0)
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        u32_from_i64("studied count", count)
    }
}
