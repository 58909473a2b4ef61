use sqlx::{Pool, Sqlite};
use tracing::{debug, info, instrument};

use crate::error::AppError;
use crate::models::{
    DbTutorRow, DbTutoringRegistration, SearchResults, SubjectSelection, TutorMatch,
    TutoringRegistration,
};
use crate::subjects::{SubjectCatalog, SubjectSet};

/// Creates the user's registration or overwrites its subject set in place.
#[instrument(skip(pool, catalog))]
pub async fn register_or_update(
    pool: &Pool<Sqlite>,
    catalog: &SubjectCatalog,
    user_id: i64,
    subject_names: &[String],
) -> Result<TutoringRegistration, AppError> {
    let subjects = catalog
        .resolve_all(subject_names)
        .map_err(|name| AppError::Validation(format!("Unknown subject: {}", name)))?;

    info!(subjects = ?subjects.ids(), "Saving tutoring registration");

    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO tutoring (user_id, subjects) VALUES (?, ?)
         ON CONFLICT (user_id) DO UPDATE SET subjects = excluded.subjects
         RETURNING id",
    )
    .bind(user_id)
    .bind(subjects.encode())
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::from_write(e, "Tutoring registration"))?;

    Ok(TutoringRegistration {
        id,
        user_id,
        subjects: subjects.0,
    })
}

#[instrument(skip(pool))]
pub async fn get_registration(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<TutoringRegistration>, AppError> {
    let row = sqlx::query_as::<_, DbTutoringRegistration>(
        "SELECT id, user_id, subjects FROM tutoring WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(TutoringRegistration::from))
}

pub async fn has_registration(pool: &Pool<Sqlite>, user_id: i64) -> Result<bool, AppError> {
    Ok(get_registration(pool, user_id).await?.is_some())
}

/// Users whose registration shares at least one subject with the request.
/// Unknown subject names are ignored; results keep registration order.
#[instrument(skip(pool, catalog))]
pub async fn search(
    pool: &Pool<Sqlite>,
    catalog: &SubjectCatalog,
    subject_names: &[String],
) -> Result<SearchResults, AppError> {
    let wanted = catalog.resolve_known(subject_names);
    if wanted.is_empty() {
        debug!("No known subjects requested, skipping search");
        return Ok(SearchResults::default());
    }

    let rows = sqlx::query_as::<_, DbTutorRow>(
        "SELECT t.user_id, u.username, u.firstname, u.lastname,
                c.name AS class, r.name AS role, t.subjects
         FROM tutoring t
         JOIN users u ON u.id = t.user_id
         LEFT JOIN classes c ON u.class = c.id
         LEFT JOIN roles r ON u.role = r.id
         ORDER BY t.id",
    )
    .fetch_all(pool)
    .await?;

    let results: Vec<TutorMatch> = rows
        .into_iter()
        .filter_map(|row| {
            let offered = SubjectSet::decode(row.subjects.as_deref());
            if !offered.intersects(&wanted) {
                return None;
            }

            Some(TutorMatch {
                user_id: row.user_id.unwrap_or_default(),
                username: row.username.unwrap_or_default(),
                firstname: row.firstname,
                lastname: row.lastname,
                class: row.class,
                role: row.role,
                subjects: offered.labels(catalog),
            })
        })
        .collect();

    info!(matches = results.len(), "Tutor search finished");

    Ok(SearchResults::new(results))
}

/// Full catalog plus the caller's current selection, for the edit form.
#[instrument(skip(pool, catalog))]
pub async fn list_subjects_for(
    pool: &Pool<Sqlite>,
    catalog: &SubjectCatalog,
    user_id: i64,
) -> Result<SubjectSelection, AppError> {
    let selected = get_registration(pool, user_id)
        .await?
        .map(|registration| SubjectSet(registration.subjects))
        .unwrap_or_default();

    Ok(SubjectSelection {
        subjects: catalog.all(),
        user_subjects: selected.names(catalog),
        user_subject_ids: selected.0,
    })
}
