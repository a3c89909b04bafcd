use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Record already exists for owner {owner_id} and app {app_id}")]
    AlreadyExists { owner_id: String, app_id: String },

    #[error("Record not found for owner {owner_id} and app {app_id}")]
    RecordNotFound { owner_id: String, app_id: String },
}
