use std::collections::HashSet;

use crate::error::DbError;
use crate::models::InstalledRow;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};
use toolshed_core::{Identity, InstalledRecord};

const SELECT_COLUMNS: &str = r#"
    SELECT id, owner_id, owner_email, owner_name, app_id, display_name, version,
           package_kind, status, installed_at, last_checked
    FROM installed_software
"#;

/// What a reconciliation pass changed for one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub upserted: usize,
    pub removed: Vec<String>,
}

#[derive(Clone)]
pub struct InstalledSoftwareRepository {
    pool: SqlitePool,
}

impl InstalledSoftwareRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new record, failing if the owner already has one for the app.
    pub async fn create(&self, record: &InstalledRecord) -> Result<InstalledRecord, DbError> {
        let row = InstalledRow::from(record);

        let result = sqlx::query(
            r#"
            INSERT INTO installed_software (id, owner_id, owner_email, owner_name, app_id, display_name,
                                            version, package_kind, status, installed_at, last_checked)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.owner_id)
        .bind(&row.owner_email)
        .bind(&row.owner_name)
        .bind(&row.app_id)
        .bind(&row.display_name)
        .bind(&row.version)
        .bind(&row.package_kind)
        .bind(&row.status)
        .bind(row.installed_at)
        .bind(row.last_checked)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(record.clone()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                Err(DbError::AlreadyExists {
                    owner_id: record.owner_id.clone(),
                    app_id: record.app_id.clone(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Insert or refresh the record keyed by `(owner_id, app_id)`.
    ///
    /// An existing row keeps its id and `installed_at`.
    pub async fn upsert(&self, record: &InstalledRecord) -> Result<InstalledRecord, DbError> {
        upsert_row(&self.pool, &InstalledRow::from(record)).await?;

        self.find(&record.owner_id, &record.app_id)
            .await?
            .ok_or_else(|| DbError::RecordNotFound {
                owner_id: record.owner_id.clone(),
                app_id: record.app_id.clone(),
            })
    }

    pub async fn find(
        &self,
        owner_id: &str,
        app_id: &str,
    ) -> Result<Option<InstalledRecord>, DbError> {
        let row: Option<InstalledRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE owner_id = ? AND app_id = ?"))
                .bind(owner_id)
                .bind(app_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn exists(&self, owner_id: &str, app_id: &str) -> Result<bool, DbError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM installed_software WHERE owner_id = ? AND app_id = ?",
        )
        .bind(owner_id)
        .bind(app_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    pub async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<InstalledRecord>, DbError> {
        let rows: Vec<InstalledRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE owner_id = ? ORDER BY app_id"))
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    /// Every owner that currently has at least one record.
    pub async fn find_owners(&self) -> Result<Vec<Identity>, DbError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT owner_id, MAX(owner_email), MAX(owner_name)
            FROM installed_software
            GROUP BY owner_id
            ORDER BY owner_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(owner_id, email, name)| Identity::new(owner_id, email, name))
            .collect())
    }

    pub async fn update_version(
        &self,
        owner_id: &str,
        app_id: &str,
        version: &str,
    ) -> Result<Option<InstalledRecord>, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE installed_software
            SET version = ?, last_checked = ?
            WHERE owner_id = ? AND app_id = ?
            "#,
        )
        .bind(version)
        .bind(Utc::now().timestamp())
        .bind(owner_id)
        .bind(app_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find(owner_id, app_id).await
    }

    pub async fn touch_last_checked(&self, owner_id: &str, app_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE installed_software SET last_checked = ? WHERE owner_id = ? AND app_id = ?",
        )
        .bind(Utc::now().timestamp())
        .bind(owner_id)
        .bind(app_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, owner_id: &str, app_id: &str) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM installed_software WHERE owner_id = ? AND app_id = ?")
                .bind(owner_id)
                .bind(app_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Make the owner's record set match `detected` in one transaction.
    ///
    /// Every detected record is upserted. Existing records whose app is
    /// neither detected nor listed in `preserved` are deleted.
    pub async fn reconcile_owner(
        &self,
        owner_id: &str,
        detected: &[InstalledRecord],
        preserved: &[String],
    ) -> Result<ReconcileOutcome, DbError> {
        let mut tx = self.pool.begin().await?;

        for record in detected {
            upsert_row(&mut *tx, &InstalledRow::from(record)).await?;
        }

        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT app_id FROM installed_software WHERE owner_id = ?")
                .bind(owner_id)
                .fetch_all(&mut *tx)
                .await?;

        let keep: HashSet<&str> = detected
            .iter()
            .map(|r| r.app_id.as_str())
            .chain(preserved.iter().map(String::as_str))
            .collect();

        let mut removed = Vec::new();
        for (app_id,) in existing {
            if keep.contains(app_id.as_str()) {
                continue;
            }
            sqlx::query("DELETE FROM installed_software WHERE owner_id = ? AND app_id = ?")
                .bind(owner_id)
                .bind(&app_id)
                .execute(&mut *tx)
                .await?;
            removed.push(app_id);
        }

        tx.commit().await?;

        tracing::debug!(
            owner_id = %owner_id,
            upserted = detected.len(),
            removed = removed.len(),
            "Reconciled installed software"
        );

        Ok(ReconcileOutcome {
            upserted: detected.len(),
            removed,
        })
    }
}

async fn upsert_row<'e, E>(executor: E, row: &InstalledRow) -> Result<(), DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO installed_software (id, owner_id, owner_email, owner_name, app_id, display_name,
                                        version, package_kind, status, installed_at, last_checked)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(owner_id, app_id) DO UPDATE SET
            owner_email = excluded.owner_email,
            owner_name = excluded.owner_name,
            display_name = excluded.display_name,
            version = excluded.version,
            package_kind = excluded.package_kind,
            status = excluded.status,
            last_checked = excluded.last_checked
        "#,
    )
    .bind(&row.id)
    .bind(&row.owner_id)
    .bind(&row.owner_email)
    .bind(&row.owner_name)
    .bind(&row.app_id)
    .bind(&row.display_name)
    .bind(&row.version)
    .bind(&row.package_kind)
    .bind(&row.status)
    .bind(row.installed_at)
    .bind(row.last_checked)
    .execute(executor)
    .await?;

    Ok(())
}
