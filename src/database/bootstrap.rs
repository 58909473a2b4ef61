use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::auth::Role;
use crate::db::{create_user, find_user_by_username};
use crate::error::AppError;
use crate::subjects::{CURRICULUM, DbSubject, Subject, SubjectCatalog};

use super::CURRENT_SCHEMA;

pub async fn connect_pool(database_url: &str) -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Creates the schema and seeds the fixed reference data, then returns the
/// subject lookup tables. Safe to run on every start.
#[instrument(skip(pool))]
pub async fn bootstrap(pool: &Pool<Sqlite>) -> Result<SubjectCatalog, AppError> {
    info!("Applying database schema");
    sqlx::raw_sql(CURRENT_SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to apply schema: {}", e)))?;

    let mut tx = pool.begin().await?;

    for role in Role::ALL {
        sqlx::query("INSERT OR IGNORE INTO roles (name) VALUES (?)")
            .bind(role.as_str())
            .execute(&mut *tx)
            .await?;
    }

    for subject in CURRICULUM {
        sqlx::query("INSERT OR IGNORE INTO subjects (name) VALUES (?)")
            .bind(subject)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    let catalog = load_subject_catalog(pool).await?;
    info!(subjects = catalog.len(), "Reference data ready");

    Ok(catalog)
}

#[instrument(skip(pool))]
pub async fn load_subject_catalog(pool: &Pool<Sqlite>) -> Result<SubjectCatalog, AppError> {
    let rows = sqlx::query_as::<_, DbSubject>("SELECT id, name FROM subjects ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(SubjectCatalog::new(
        rows.into_iter().map(Subject::from).collect(),
    ))
}

/// Creates the configured administrator on a database that does not have it yet.
#[instrument(skip(pool, password))]
pub async fn ensure_admin(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<(), AppError> {
    if find_user_by_username(pool, username).await?.is_some() {
        return Ok(());
    }

    info!("Creating bootstrap administrator");
    create_user(
        pool,
        username,
        password,
        Role::Administration.as_str(),
        None,
        None,
        None,
    )
    .await?;

    Ok(())
}
