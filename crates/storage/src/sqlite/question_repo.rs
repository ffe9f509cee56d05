use exam_core::model::{CategoryId, LicenseTypeId, QuestionId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, ids_i64, placeholders, question_id_from_i64, ser, u32_from_i64};
use crate::repository::{QuestionRepository, StorageError};

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(
        &self,
        id: QuestionId,
        category_id: Option<CategoryId>,
        is_active: bool,
        license_type_ids: &[LicenseTypeId],
    ) -> Result<(), StorageError> {
        let question_id = id_i64("question_id", id.value())?;
        let category_id = category_id
            .map(|c| id_i64("category_id", c.value()))
            .transpose()?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO questions (id, category_id, is_active)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    category_id = excluded.category_id,
                    is_active = excluded.is_active
            ",
        )
        .bind(question_id)
        .bind(category_id)
        .bind(is_active)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM question_license_type WHERE question_id = ?1")
            .bind(question_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for license_type_id in ids_i64("license_type_id", license_type_ids, |l| l.value())? {
            sqlx::query(
                r"
                    INSERT INTO question_license_type (question_id, license_type_id)
                    VALUES (?1, ?2)
                    ON CONFLICT DO NOTHING
                ",
            )
            .bind(question_id)
            .bind(license_type_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn active_question_ids(
        &self,
        license_type_ids: &[LicenseTypeId],
        category_ids: &[CategoryId],
    ) -> Result<Vec<QuestionId>, StorageError> {
        if license_type_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
                SELECT DISTINCT q.id
                FROM questions q
                JOIN question_license_type qlt ON qlt.question_id = q.id
                WHERE q.is_active = 1 AND qlt.license_type_id IN (
            ",
        );
        sql.push_str(&placeholders(license_type_ids.len(), 0));
        sql.push(')');
        if !category_ids.is_empty() {
            sql.push_str("\n AND q.category_id IN (");
            sql.push_str(&placeholders(category_ids.len(), license_type_ids.len()));
            sql.push(')');
        }
        sql.push_str("\n ORDER BY q.id ASC");

        let mut query = sqlx::query(&sql);
        for id in ids_i64("license_type_id", license_type_ids, |l| l.value())? {
            query = query.bind(id);
        }
        for id in ids_i64("category_id", category_ids, |c| c.value())? {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;
        rows.iter()
            .map(|row| question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?))
            .collect()
    }

    async fn count_active(&self) -> Result<u32, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        u32_from_i64("active question count", count)
    }
}
