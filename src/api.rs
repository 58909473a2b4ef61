use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::State;
use rocket::form::Form;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::Redirect;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{Role, SESSION_COOKIE, User, UserSession};
use crate::config::AppConfig;
use crate::db::{
    authenticate_user, clean_expired_sessions, create_class, create_user, create_user_session,
    invalidate_session,
};
use crate::tutoring::has_registration;
use crate::validation::{ApiResult, AppErrorExt, JsonValidateExt};

pub const LOGIN_SUCCESS_URL: &str = "/app/index.html";
pub const LOGIN_FAILURE_URL: &str = "/app/wrong_credentials.html";

static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid username pattern"));

#[derive(FromForm)]
pub struct LoginForm {
    username: String,
    pw: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProfileResponse {
    pub user_id: i64,
    pub username: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Option<String>,
    pub class: Option<String>,
    pub tutoring: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Deserialize, Validate, Clone)]
pub struct CreateUserRequest {
    #[validate(
        length(min = 3, max = 32, message = "Username must be 3 to 32 characters"),
        regex(path = *USERNAME_PATTERN, message = "Username may only contain letters, digits, '.', '_' and '-'")
    )]
    username: String,
    firstname: Option<String>,
    lastname: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    password: String,
    role: String,
    class: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateUserResponse {
    pub id: i64,
    pub username: String,
    pub role: String,
}

#[derive(Deserialize, Validate, Clone)]
pub struct CreateClassRequest {
    #[validate(length(min = 1, max = 64, message = "Class name must be 1 to 64 characters"))]
    name: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ClassResponse {
    pub id: i64,
    pub name: String,
}

#[get("/")]
pub fn root() -> Status {
    Status::NotFound
}

#[post("/login", data = "<form>")]
pub async fn login(
    form: Form<LoginForm>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Redirect {
    info!(username = %form.username, "Login attempt");

    if let Err(e) = clean_expired_sessions(db).await {
        warn!(error = %e, "Failed to clean expired sessions");
    }

    let user = match authenticate_user(db, &form.username, &form.pw).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            info!(username = %form.username, "Rejected credentials");
            return Redirect::found(LOGIN_FAILURE_URL);
        }
        Err(e) => {
            e.log_and_record("Login");
            return Redirect::found(LOGIN_FAILURE_URL);
        }
    };

    let token = UserSession::generate_token();
    let expires_at = Utc::now() + config.session_duration();

    if let Err(e) = create_user_session(db, user.id, &token, expires_at.naive_utc()).await {
        e.log_and_record("Login session");
        return Redirect::found(LOGIN_FAILURE_URL);
    }

    cookies.add_private(
        Cookie::build((SESSION_COOKIE, token))
            .same_site(SameSite::Lax)
            .http_only(true)
            .max_age(rocket::time::Duration::hours(config.session_hours)),
    );

    info!(username = %user.username, "Authentication successful");
    Redirect::found(LOGIN_SUCCESS_URL)
}

#[post("/logout")]
pub async fn logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Json<SuccessResponse> {
    let token = cookies
        .get_private(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(e) = invalidate_session(db, &token).await {
            e.log_and_record("Logout");
        }
    }

    cookies.remove_private(Cookie::build(SESSION_COOKIE));

    Json(SuccessResponse { success: true })
}

#[get("/profile")]
pub async fn profile(user: User, db: &State<Pool<Sqlite>>) -> ApiResult<ProfileResponse> {
    let tutoring = has_registration(db, user.id).await.validate_custom()?;

    Ok(Json(ProfileResponse {
        user_id: user.id,
        username: user.username,
        firstname: user.firstname,
        lastname: user.lastname,
        role: user.role.map(|r| r.to_string()),
        class: user.class,
        tutoring,
    }))
}

#[get("/home")]
pub fn home(user: User) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!("Welcome to the home page, {}!", user.username),
    })
}

#[post("/create_user", data = "<request>")]
pub async fn api_create_user(
    request: Json<CreateUserRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<CreateUserResponse> {
    user.require_role(&[Role::Administration]).validate_custom()?;

    let validated = request.validate_custom()?;

    let id = create_user(
        db,
        &validated.username,
        &validated.password,
        &validated.role,
        validated.firstname.as_deref(),
        validated.lastname.as_deref(),
        validated.class.as_deref(),
    )
    .await
    .validate_custom()?;

    Ok(Json(CreateUserResponse {
        id,
        username: validated.username,
        role: validated.role,
    }))
}

#[post("/create_class", data = "<request>")]
pub async fn api_create_class(
    request: Json<CreateClassRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<ClassResponse> {
    user.require_role(&[Role::Administration, Role::Teacher])
        .validate_custom()?;

    let validated = request.validate_custom()?;

    let id = create_class(db, &validated.name)
        .await
        .map_err(|e| e.conflict_as_validation())
        .validate_custom()?;

    Ok(Json(ClassResponse {
        id,
        name: validated.name,
    }))
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}
