use crate::{
    auth::{DbUser, DbUserSession, User, UserSession, hash_password, verify_password},
    error::AppError,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

const USER_SELECT: &str = "SELECT u.id, u.username, u.firstname, u.lastname,
        r.name AS role, c.name AS class
     FROM users u
     LEFT JOIN roles r ON u.role = r.id
     LEFT JOIN classes c ON u.class = c.id";

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!("{} WHERE u.id = ?", USER_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(user) => Ok(User::from(user)),
        _ => Err(AppError::NotFound(format!(
            "User with id {} not found in database",
            id
        ))),
    }
}

#[instrument(skip(pool))]
pub async fn find_user_by_username(
    pool: &Pool<Sqlite>,
    username: &str,
) -> Result<Option<User>, AppError> {
    info!("Finding user by username");
    let row = sqlx::query_as::<_, DbUser>(&format!("{} WHERE u.username = ?", USER_SELECT))
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(User::from))
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    password: String,
}

#[instrument(skip_all, fields(username))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, password FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) if verify_password(password, &row.password) => {
            Ok(Some(get_user(pool, row.id).await?))
        }
        _ => Ok(None),
    }
}

#[instrument(skip(pool))]
async fn resolve_id(
    pool: &Pool<Sqlite>,
    table: &'static str,
    name: &str,
) -> Result<Option<i64>, AppError> {
    let id = sqlx::query_scalar::<_, i64>(&format!("SELECT id FROM {} WHERE name = ?", table))
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(id)
}

#[instrument(skip(pool, password))]
pub async fn create_user(
    pool: &Pool<Sqlite>,
    username: &str,
    password: &str,
    role: &str,
    firstname: Option<&str>,
    lastname: Option<&str>,
    class: Option<&str>,
) -> Result<i64, AppError> {
    info!("Creating new user");

    let role_id = resolve_id(pool, "roles", role)
        .await?
        .ok_or_else(|| AppError::Validation("Invalid role".to_string()))?;

    let class_id = match class {
        Some(name) => Some(
            resolve_id(pool, "classes", name)
                .await?
                .ok_or_else(|| AppError::Validation("Invalid class".to_string()))?,
        ),
        None => None,
    };

    let hashed_password = hash_password(password)?;

    let res = sqlx::query(
        "INSERT INTO users (username, firstname, lastname, password, role, class)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(username)
    .bind(firstname)
    .bind(lastname)
    .bind(hashed_password)
    .bind(role_id)
    .bind(class_id)
    .execute(pool)
    .await
    .map_err(|e| match AppError::from_write(e, "User") {
        AppError::Conflict(_) => AppError::Validation("Username already exists".to_string()),
        other => other,
    })?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn create_class(pool: &Pool<Sqlite>, name: &str) -> Result<i64, AppError> {
    info!("Creating class");
    let res = sqlx::query("INSERT INTO classes (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| AppError::from_write(e, "Class"))?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    user_id: i64,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");

    let res = sqlx::query("INSERT INTO user_sessions (user_id, token, expires_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(token)
        .bind(expires_at)
        .execute(pool)
        .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip(pool, token))]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    info!("Getting session by token");

    let session = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, user_id, token, created_at, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match session {
        Some(session) => Ok(UserSession::from(session)),
        _ => Err(AppError::Authentication(
            "Invalid session token".to_string(),
        )),
    }
}

#[instrument(skip(pool, token))]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");

    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    info!("Cleaning expired sessions");

    let now = Utc::now().naive_utc();

    let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at < ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
