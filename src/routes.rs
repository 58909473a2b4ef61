use once_cell::sync::Lazy;
use regex::Regex;
use rocket::State;
use rocket::form::Form;
use rocket::serde::json::{self, Json};
use rocket::serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::warn;
use validator::Validate;

use crate::auth::User;
use crate::error::AppError;
use crate::models::{DeliveryReport, PushStatus, SearchResults, SubjectSelection, TutoringRegistration};
use crate::push::{self, PushService};
use crate::subjects::SubjectCatalog;
use crate::tutoring;
use crate::validation::{ApiResult, AppErrorExt, JsonValidateExt};

/// Kept for older clients; behaves exactly like `/edit-tutor-profile`.
#[get("/register-tutoring?<subject>")]
pub async fn register_tutoring(
    subject: Option<Vec<String>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    catalog: &State<SubjectCatalog>,
) -> ApiResult<TutoringRegistration> {
    warn!(user_id = user.id, "Deprecated /register-tutoring called");
    save_registration(subject, &user, db, catalog).await
}

#[get("/edit-tutor-profile?<subject>")]
pub async fn edit_tutor_profile(
    subject: Option<Vec<String>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    catalog: &State<SubjectCatalog>,
) -> ApiResult<TutoringRegistration> {
    save_registration(subject, &user, db, catalog).await
}

async fn save_registration(
    subject: Option<Vec<String>>,
    user: &User,
    db: &Pool<Sqlite>,
    catalog: &SubjectCatalog,
) -> ApiResult<TutoringRegistration> {
    let subjects = subject.unwrap_or_default();

    let registration = tutoring::register_or_update(db, catalog, user.id, &subjects)
        .await
        .map_err(|e| e.conflict_as_validation())
        .validate_custom()?;

    Ok(Json(registration))
}

#[get("/search-tutors?<subject>")]
pub async fn search_tutors(
    subject: Option<Vec<String>>,
    db: &State<Pool<Sqlite>>,
    catalog: &State<SubjectCatalog>,
) -> ApiResult<SearchResults> {
    let subjects = subject.unwrap_or_default();
    let results = tutoring::search(db, catalog, &subjects)
        .await
        .validate_custom()?;

    Ok(Json(results))
}

#[get("/get-subjects")]
pub async fn get_subjects(
    user: User,
    db: &State<Pool<Sqlite>>,
    catalog: &State<SubjectCatalog>,
) -> ApiResult<SubjectSelection> {
    let selection = tutoring::list_subjects_for(db, catalog, user.id)
        .await
        .validate_custom()?;

    Ok(Json(selection))
}

static PUSH_ENDPOINT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://").expect("valid endpoint scheme pattern"));

#[derive(Deserialize, Validate, Clone, Debug)]
pub struct SubscriptionKeys {
    #[validate(length(min = 1, message = "p256dh key is required"))]
    p256dh: String,
    #[validate(length(min = 1, message = "auth key is required"))]
    auth: String,
}

/// Shape of a browser `PushSubscription.toJSON()`; extra fields are ignored.
#[derive(Deserialize, Validate, Clone, Debug)]
pub struct SubscribeRequest {
    #[validate(
        url(message = "endpoint must be a URL"),
        regex(path = *PUSH_ENDPOINT_SCHEME, message = "endpoint must be an http(s) URL")
    )]
    endpoint: String,
    #[validate(nested)]
    keys: SubscriptionKeys,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubscribeResponse {
    pub id: i64,
    pub endpoint: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UnsubscribeResponse {
    pub deleted: bool,
}

#[post("/api/push/subscribe", data = "<request>")]
pub async fn push_subscribe(
    request: Result<Json<SubscribeRequest>, json::Error<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<SubscribeResponse> {
    let request = request
        .map_err(|e| AppError::Validation(format!("Malformed subscription payload: {}", e)))
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let id = push::subscribe(
        db,
        user.id,
        &validated.endpoint,
        &validated.keys.p256dh,
        &validated.keys.auth,
    )
    .await
    .validate_custom()?;

    Ok(Json(SubscribeResponse {
        id,
        endpoint: validated.endpoint,
    }))
}

#[delete("/api/push/subscribe/<endpoint>")]
pub async fn push_unsubscribe(
    endpoint: String,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> ApiResult<UnsubscribeResponse> {
    let deleted = push::unsubscribe(db, user.id, &endpoint)
        .await
        .validate_custom()?;

    Ok(Json(UnsubscribeResponse { deleted }))
}

#[derive(FromForm)]
pub struct BroadcastForm {
    title: String,
    body: String,
}

#[derive(FromForm)]
pub struct SendUserForm {
    user_id: i64,
    title: String,
    body: String,
}

#[post("/api/push/send-all", data = "<form>")]
pub async fn push_send_all(
    form: Form<BroadcastForm>,
    _user: User,
    db: &State<Pool<Sqlite>>,
    push_service: &State<PushService>,
) -> ApiResult<DeliveryReport> {
    let report = push::broadcast(db, push_service, &form.title, &form.body)
        .await
        .validate_custom()?;

    Ok(Json(report))
}

#[post("/api/push/send-user", data = "<form>")]
pub async fn push_send_user(
    form: Form<SendUserForm>,
    _user: User,
    db: &State<Pool<Sqlite>>,
    push_service: &State<PushService>,
) -> ApiResult<DeliveryReport> {
    let report = push::send_to_user(db, push_service, form.user_id, &form.title, &form.body)
        .await
        .validate_custom()?;

    Ok(Json(report))
}

#[get("/api/push/status")]
pub async fn push_status(user: User, db: &State<Pool<Sqlite>>) -> ApiResult<PushStatus> {
    let status = push::status(db, user.id).await.validate_custom()?;

    Ok(Json(status))
}
