use exam_core::model::{LicenseType, LicenseTypeFamily, LicenseTypeId};

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_license_type_row};
use crate::repository::{LicenseTypeRepository, StorageError};

impl SqliteRepository {
    async fn fetch_license_types(
        &self,
        filter: &str,
        id: Option<i64>,
    ) -> Result<Vec<LicenseType>, StorageError> {
        let sql = format!(
            "SELECT id, code, name, parent_id, is_parent FROM license_types {filter} ORDER BY id ASC"
        );
        let mut query = sqlx::query(&sql);
        if let Some(id) = id {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_license_type_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl LicenseTypeRepository for SqliteRepository {
    async fn upsert_license_type(&self, license_type: &LicenseType) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO license_types (id, code, name, parent_id, is_parent)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    code = excluded.code,
                    name = excluded.name,
                    parent_id = excluded.parent_id,
                    is_parent = excluded.is_parent
            ",
        )
        .bind(id_i64("license_type_id", license_type.id.value())?)
        .bind(license_type.code.as_str())
        .bind(license_type.name.as_str())
        .bind(
            license_type
                .parent_id
                .map(|id| id_i64("parent_id", id.value()))
                .transpose()?,
        )
        .bind(license_type.is_parent)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
            other => conn(other),
        })?;

        Ok(())
    }

    async fn get_license_type(&self, id: LicenseTypeId) -> Result<LicenseType, StorageError> {
        self.fetch_license_types("WHERE id = ?1", Some(id_i64("license_type_id", id.value())?))
            .await?
            .into_iter()
            .next()
            .ok_or(StorageError::NotFound)
    }

    async fn get_family(&self, id: LicenseTypeId) -> Result<LicenseTypeFamily, StorageError> {
        let parent = self.get_license_type(id).await?;
        let children = self
            .fetch_license_types(
                "WHERE parent_id = ?1",
                Some(id_i64("license_type_id", id.value())?),
            )
            .await?;
        Ok(LicenseTypeFamily::new(parent, children))
    }

    async fn list_parent_families(&self) -> Result<Vec<LicenseTypeFamily>, StorageError> {
        let all = self.fetch_license_types("", None).await?;
        Ok(all
            .iter()
            .filter(|lt| lt.parent_id.is_none())
            .map(|parent| LicenseTypeFamily::from_flat(parent.clone(), &all))
            .collect())
    }

    async fn list_license_types(&self) -> Result<Vec<LicenseType>, StorageError> {
        self.fetch_license_types("", None).await
    }
}
