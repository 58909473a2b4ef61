use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;

use crate::db::{get_session_by_token, get_user};
use crate::error::AppError;
use crate::validation::{ToValidationResponse, ValidationResponse};

use super::User;

pub const SESSION_COOKIE: &str = "session_token";

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authenticate(request).await
    }
}

#[tracing::instrument(name = "user_auth_guard", skip_all)]
async fn authenticate(request: &Request<'_>) -> Outcome<User, ()> {
    let token = request
        .cookies()
        .get_private(SESSION_COOKIE)
        .map(|c| c.value().to_string());

    let Some(token) = token else {
        return Outcome::Error((Status::Unauthorized, ()));
    };

    let db = match request.rocket().state::<SqlitePool>() {
        Some(pool) => pool,
        _ => {
            tracing::error!("Database pool not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        }
    };

    let session = match get_session_by_token(db, &token).await {
        Ok(session) => session,
        Err(err @ AppError::Database(_)) => {
            err.log_and_record("Session lookup");
            return Outcome::Error((Status::InternalServerError, ()));
        }
        Err(err) => {
            tracing::warn!(error = %err, "Invalid session token");
            return Outcome::Error((Status::Unauthorized, ()));
        }
    };

    if !session.is_valid() {
        tracing::warn!(user_id = %session.user_id, "Session expired");
        return Outcome::Error((Status::Unauthorized, ()));
    }

    // Role and class are re-read here so a change applies without a new login.
    match get_user(db, session.user_id).await {
        Ok(user) => {
            tracing::info!(username = %user.username, role = ?user.role, "User authenticated via session token");
            Outcome::Success(user)
        }
        Err(err @ AppError::Database(_)) => {
            err.log_and_record("Session user lookup");
            Outcome::Error((Status::InternalServerError, ()))
        }
        Err(err) => {
            tracing::warn!(user_id = %session.user_id, error = %err, "Session points at a missing user");
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Unauthorized access attempt");
    Status::Unauthorized.to_validation_response()
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Forbidden access attempt");
    Status::Forbidden.to_validation_response()
}

#[catch(default)]
pub fn default_api(status: Status, _req: &Request) -> Custom<Json<ValidationResponse>> {
    status.to_validation_response()
}
