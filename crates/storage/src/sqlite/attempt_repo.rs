use exam_core::model::{
    AnsweredQuestion, AttemptDraft, AttemptStatus, TestAttempt, TestAttemptId, UserId,
};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_attempt_row, placeholders, ser, to_json, u32_from_i64};
use crate::repository::{AttemptFilter, AttemptRepository, StorageError};

const ATTEMPT_COLUMNS: &str = r"
    id, user_id, license_type_id, template_id, test_type, configuration,
    questions, correct_count, wrong_count, total_questions, score_percentage,
    status, started_at, finished_at, time_taken_seconds, current_question_index,
    answers_given, skipped_question_ids, paused_at, remaining_time_seconds
";

/// `WHERE` clause for `filter`; `?1` is always the user id.
fn filter_clause(filter: &AttemptFilter) -> String {
    let mut sql = String::from(" WHERE user_id = ?1");
    if !filter.statuses.is_empty() {
        sql.push_str(" AND status IN (");
        sql.push_str(&placeholders(filter.statuses.len(), 1));
        sql.push(')');
    }
    if filter.kind.is_some() {
        sql.push_str(" AND test_type = ?");
        sql.push_str(&(filter.statuses.len() + 2).to_string());
    }
    sql
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn insert_attempt(&self, draft: AttemptDraft) -> Result<TestAttempt, StorageError> {
        let questions: Vec<AnsweredQuestion> = draft
            .question_ids
            .iter()
            .copied()
            .map(AnsweredQuestion::unanswered)
            .collect();
        let total_questions = u32::try_from(questions.len())
            .map_err(|_| StorageError::Serialization("too many questions".into()))?;

        let res = sqlx::query(
            r"
                INSERT INTO test_attempts (
                    user_id, license_type_id, template_id, test_type, configuration,
                    questions, total_questions, status, started_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(id_i64("user_id", draft.user_id.value())?)
        .bind(
            draft
                .license_type_id
                .map(|id| id_i64("license_type_id", id.value()))
                .transpose()?,
        )
        .bind(
            draft
                .template_id
                .map(|id| id_i64("template_id", id.value()))
                .transpose()?,
        )
        .bind(draft.kind.as_str())
        .bind(to_json(&draft.configuration)?)
        .bind(to_json(&questions)?)
        .bind(i64::from(total_questions))
        .bind(AttemptStatus::InProgress.as_str())
        .bind(draft.started_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("negative attempt id".into()))?;
        draft.assign_id(TestAttemptId::new(id)).map_err(ser)
    }

    async fn save_attempt(&self, attempt: &TestAttempt) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
                UPDATE test_attempts SET
                    license_type_id = ?2,
                    template_id = ?3,
                    configuration = ?4,
                    questions = ?5,
                    correct_count = ?6,
                    wrong_count = ?7,
                    total_questions = ?8,
                    score_percentage = ?9,
                    status = ?10,
                    finished_at = ?11,
                    time_taken_seconds = ?12,
                    current_question_index = ?13,
                    answers_given = ?14,
                    skipped_question_ids = ?15,
                    paused_at = ?16,
                    remaining_time_seconds = ?17,
                    started_at = ?18
                WHERE id = ?1
            ",
        )
        .bind(id_i64("attempt_id", attempt.id().value())?)
        .bind(
            attempt
                .license_type_id()
                .map(|id| id_i64("license_type_id", id.value()))
                .transpose()?,
        )
        .bind(
            attempt
                .template_id()
                .map(|id| id_i64("template_id", id.value()))
                .transpose()?,
        )
        .bind(to_json(attempt.configuration())?)
        .bind(to_json(&attempt.questions())?)
        .bind(i64::from(attempt.correct_count()))
        .bind(i64::from(attempt.wrong_count()))
        .bind(i64::from(attempt.total_questions()))
        .bind(attempt.score_percentage())
        .bind(attempt.status().as_str())
        .bind(attempt.finished_at())
        .bind(attempt.time_taken_seconds())
        .bind(i64::from(attempt.current_question_index()))
        .bind(to_json(attempt.answers_given())?)
        .bind(to_json(&attempt.skipped_question_ids())?)
        .bind(attempt.paused_at())
        .bind(attempt.remaining_time_seconds())
        .bind(attempt.started_at())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_attempt(&self, id: TestAttemptId) -> Result<TestAttempt, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM test_attempts WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("attempt_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        map_attempt_row(&row)
    }

    async fn list_attempts_for_user(
        &self,
        user_id: UserId,
        filter: &AttemptFilter,
    ) -> Result<Vec<TestAttempt>, StorageError> {
        let mut sql = format!("SELECT {ATTEMPT_COLUMNS} FROM test_attempts");
        sql.push_str(&filter_clause(filter));
        sql.push_str(" ORDER BY finished_at DESC, id DESC");

        let next = filter.statuses.len() + usize::from(filter.kind.is_some()) + 2;
        sql.push_str(&format!(" LIMIT ?{next} OFFSET ?{}", next + 1));

        let mut query = sqlx::query(&sql).bind(id_i64("user_id", user_id.value())?);
        for status in &filter.statuses {
            query = query.bind(status.as_str());
        }
        if let Some(kind) = filter.kind {
            query = query.bind(kind.as_str());
        }
        // SQLite treats a negative LIMIT as unbounded.
        query = query
            .bind(filter.limit.map_or(-1, i64::from))
            .bind(i64::from(filter.offset));

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }

    async fn count_attempts_for_user(
        &self,
        user_id: UserId,
        filter: &AttemptFilter,
    ) -> Result<u32, StorageError> {
        let mut sql = String::from("SELECT COUNT(*) FROM test_attempts");
        sql.push_str(&filter_clause(filter));

        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(id_i64("user_id", user_id.value())?);
        for status in &filter.statuses {
            query = query.bind(status.as_str());
        }
        if let Some(kind) = filter.kind {
            query = query.bind(kind.as_str());
        }

        let count = query.fetch_one(&self.pool).await.map_err(conn)?;
        u32_from_i64("attempt count", count)
    }

    async fn active_attempt_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<TestAttempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM test_attempts
             WHERE user_id = ?1 AND status IN (?2, ?3)
             ORDER BY started_at DESC, id DESC
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(AttemptStatus::InProgress.as_str())
            .bind(AttemptStatus::Paused.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn delete_attempt(&self, id: TestAttemptId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM test_attempts WHERE id = ?1")
            .bind(id_i64("attempt_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::TestKind;

    #[test]
    fn filter_clause_numbers_parameters() {
        let filter = AttemptFilter {
            kind: Some(TestKind::Quick),
            ..AttemptFilter::graded()
        };
        assert_eq!(
            filter_clause(&filter),
            " WHERE user_id = ?1 AND status IN (?2, ?3) AND test_type = ?4"
        );
        assert_eq!(filter_clause(&AttemptFilter::all()), " WHERE user_id = ?1");
    }
}
