use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::db::get_user;
use crate::error::AppError;
use crate::models::{DbPushSubscription, DeliveryReport, PushStatus, PushSubscription};

/// Delivers one encoded notification to one subscription.
#[rocket::async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<(), AppError>;
}

/// Web Push (RFC 8030) delivery, `aes128gcm` encrypted and VAPID signed.
pub struct WebPushSender {
    client: IsahcWebPushClient,
    private_key: String,
    subject: String,
    ttl: u32,
}

impl WebPushSender {
    pub fn new(private_key: &str, subject: &str, ttl: u32) -> Result<Self, AppError> {
        Ok(Self {
            client: IsahcWebPushClient::new()?,
            private_key: private_key.to_string(),
            subject: subject.to_string(),
            ttl,
        })
    }
}

#[rocket::async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<(), AppError> {
        let info = SubscriptionInfo::new(
            subscription.endpoint.as_str(),
            subscription.p256dh.as_str(),
            subscription.auth.as_str(),
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&self.private_key, URL_SAFE_NO_PAD, &info)?;
        signature.add_claim("sub", self.subject.as_str());

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload);
        builder.set_ttl(self.ttl);
        builder.set_vapid_signature(signature.build()?);

        self.client.send(builder.build()?).await?;
        Ok(())
    }
}

/// Used when no VAPID key is configured: every attempt fails and is counted.
pub struct DisabledPushSender;

#[rocket::async_trait]
impl PushSender for DisabledPushSender {
    async fn send(&self, _subscription: &PushSubscription, _payload: &[u8]) -> Result<(), AppError> {
        Err(AppError::ExternalService(
            "push delivery is not configured".to_string(),
        ))
    }
}

#[derive(Serialize)]
struct PushPayload<'a> {
    title: &'a str,
    body: &'a str,
}

/// Fanout over a sender with a per-delivery time limit.
#[derive(Clone)]
pub struct PushService {
    sender: Arc<dyn PushSender>,
    delivery_timeout: Duration,
}

impl PushService {
    pub fn new(sender: Arc<dyn PushSender>, delivery_timeout: Duration) -> Self {
        Self {
            sender,
            delivery_timeout,
        }
    }

    /// One isolated attempt per subscription; errors and timeouts are logged
    /// and counted, never returned.
    #[instrument(skip(self, subscriptions, body), fields(total = subscriptions.len()))]
    pub async fn deliver(
        &self,
        subscriptions: &[PushSubscription],
        title: &str,
        body: &str,
    ) -> DeliveryReport {
        let mut report = DeliveryReport {
            total: subscriptions.len(),
            ..Default::default()
        };

        let payload = match serde_json::to_vec(&PushPayload { title, body }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Could not encode push payload");
                report.failed = subscriptions.len();
                return report;
            }
        };

        for subscription in subscriptions {
            match timeout(
                self.delivery_timeout,
                self.sender.send(subscription, &payload),
            )
            .await
            {
                Ok(Ok(())) => report.sent += 1,
                Ok(Err(e)) => {
                    warn!(subscription_id = subscription.id, error = %e, "Push delivery failed");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(
                        subscription_id = subscription.id,
                        timeout_ms = self.delivery_timeout.as_millis() as u64,
                        "Push delivery timed out"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(sent = report.sent, failed = report.failed, "Push fanout finished");
        report
    }
}

#[instrument(skip(pool, p256dh, auth))]
pub async fn subscribe(
    pool: &Pool<Sqlite>,
    user_id: i64,
    endpoint: &str,
    p256dh: &str,
    auth: &str,
) -> Result<i64, AppError> {
    info!("Storing push subscription");
    let res = sqlx::query(
        "INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(endpoint)
    .bind(p256dh)
    .bind(auth)
    .execute(pool)
    .await
    .map_err(|e| AppError::from_write(e, "Subscription"))?;

    Ok(res.last_insert_rowid())
}

/// Returns whether a row was removed.
#[instrument(skip(pool))]
pub async fn unsubscribe(
    pool: &Pool<Sqlite>,
    user_id: i64,
    endpoint: &str,
) -> Result<bool, AppError> {
    let res = sqlx::query("DELETE FROM push_subscriptions WHERE user_id = ? AND endpoint = ?")
        .bind(user_id)
        .bind(endpoint)
        .execute(pool)
        .await?;

    Ok(res.rows_affected() > 0)
}

#[instrument(skip(pool))]
pub async fn list_subscriptions(
    pool: &Pool<Sqlite>,
    user_id: Option<i64>,
) -> Result<Vec<PushSubscription>, AppError> {
    let rows = match user_id {
        Some(user_id) => {
            sqlx::query_as::<_, DbPushSubscription>(
                "SELECT id, user_id, endpoint, p256dh, auth, created_at
                 FROM push_subscriptions WHERE user_id = ? ORDER BY id",
            )
            .bind(user_id)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, DbPushSubscription>(
                "SELECT id, user_id, endpoint, p256dh, auth, created_at
                 FROM push_subscriptions ORDER BY id",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows.into_iter().map(PushSubscription::from).collect())
}

#[instrument(skip(pool, service, body))]
pub async fn broadcast(
    pool: &Pool<Sqlite>,
    service: &PushService,
    title: &str,
    body: &str,
) -> Result<DeliveryReport, AppError> {
    let subscriptions = list_subscriptions(pool, None).await?;
    let mut report = service.deliver(&subscriptions, title, body).await;
    report.target = Some("all".to_string());
    Ok(report)
}

#[instrument(skip(pool, service, body))]
pub async fn send_to_user(
    pool: &Pool<Sqlite>,
    service: &PushService,
    user_id: i64,
    title: &str,
    body: &str,
) -> Result<DeliveryReport, AppError> {
    let subscriptions = list_subscriptions(pool, Some(user_id)).await?;
    if subscriptions.is_empty() {
        info!("User has no push subscriptions");
        return Ok(DeliveryReport {
            error: Some("no subscriptions for user".to_string()),
            ..Default::default()
        });
    }

    let mut report = service.deliver(&subscriptions, title, body).await;
    report.target = Some(format!("user:{}", user_id));
    Ok(report)
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    subscription_count: i64,
    last_subscription: Option<chrono::NaiveDateTime>,
}

#[instrument(skip(pool))]
pub async fn status(pool: &Pool<Sqlite>, user_id: i64) -> Result<PushStatus, AppError> {
    get_user(pool, user_id).await?;

    let row = sqlx::query_as::<_, StatusRow>(
        "SELECT COUNT(*) AS subscription_count, MAX(created_at) AS last_subscription
         FROM push_subscriptions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(PushStatus {
        has_push: row.subscription_count > 0,
        subscription_count: row.subscription_count,
        last_subscription: row
            .last_subscription
            .map(|dt| chrono::DateTime::from_naive_utc_and_offset(dt, chrono::Utc)),
    })
}
