use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::subjects::{Subject, SubjectSet};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TutoringRegistration {
    pub id: i64,
    pub user_id: i64,
    pub subjects: Vec<i64>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbTutoringRegistration {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub subjects: Option<String>,
}

impl From<DbTutoringRegistration> for TutoringRegistration {
    fn from(db: DbTutoringRegistration) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            subjects: SubjectSet::decode(db.subjects.as_deref()).0,
        }
    }
}

/// One registration joined with its owner, as scanned by the tutor search.
#[derive(sqlx::FromRow, Clone)]
pub struct DbTutorRow {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub class: Option<String>,
    pub role: Option<String>,
    pub subjects: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TutorMatch {
    pub user_id: i64,
    pub username: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub class: Option<String>,
    pub role: Option<String>,
    pub subjects: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SearchResults {
    pub results: Vec<TutorMatch>,
    pub count: usize,
}

impl SearchResults {
    pub fn new(results: Vec<TutorMatch>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct SubjectSelection {
    pub subjects: Vec<Subject>,
    pub user_subject_ids: Vec<i64>,
    pub user_subjects: Vec<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct PushSubscription {
    pub id: i64,
    pub user_id: i64,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbPushSubscription {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub endpoint: Option<String>,
    pub p256dh: Option<String>,
    pub auth: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbPushSubscription> for PushSubscription {
    fn from(db: DbPushSubscription) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            endpoint: db.endpoint.unwrap_or_default(),
            p256dh: db.p256dh.unwrap_or_default(),
            auth: db.auth.unwrap_or_default(),
            created_at: db
                .created_at
                .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
                .unwrap_or_else(Utc::now),
        }
    }
}

/// Outcome of one fanout. Delivery failures only ever show up in `failed`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PushStatus {
    pub has_push: bool,
    pub subscription_count: i64,
    pub last_subscription: Option<DateTime<Utc>>,
}
