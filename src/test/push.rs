#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::AppError;
    use crate::models::{DeliveryReport, PushSubscription};
    use crate::push::{
        DisabledPushSender, PushSender, PushService, WebPushSender, broadcast, list_subscriptions,
        send_to_user, status, subscribe, unsubscribe,
    };
    use crate::test::test_db::TestDbBuilder;
    use crate::test::test_utils::{RecordingSender, test_push_service};

    const ENDPOINT_A: &str = "https://push.example.com/send/a";
    const ENDPOINT_B: &str = "https://push.example.com/send/b";
    const ENDPOINT_FAIL: &str = "https://push.example.com/send/fail";
    const ENDPOINT_SLOW: &str = "https://push.example.com/send/slow";

    #[rocket::async_test]
    async fn test_subscribe_and_list() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .student("ben", None)
            .build()
            .await
            .expect("Failed to build test database");
        let anna = test_db.user_id("anna").unwrap();
        let ben = test_db.user_id("ben").unwrap();

        let id = subscribe(&test_db.pool, anna, ENDPOINT_A, "key", "secret")
            .await
            .expect("Failed to subscribe");
        assert!(id > 0);
        subscribe(&test_db.pool, ben, ENDPOINT_B, "key", "secret")
            .await
            .expect("Failed to subscribe");

        let all = list_subscriptions(&test_db.pool, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let annas = list_subscriptions(&test_db.pool, Some(anna)).await.unwrap();
        assert_eq!(annas.len(), 1);
        assert_eq!(annas[0].endpoint, ENDPOINT_A);
        assert_eq!(annas[0].p256dh, "key");
        assert_eq!(annas[0].auth, "secret");
    }

    #[rocket::async_test]
    async fn test_duplicate_endpoint_conflicts() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .student("ben", None)
            .subscription("anna", ENDPOINT_A)
            .build()
            .await
            .expect("Failed to build test database");

        for username in ["anna", "ben"] {
            let user_id = test_db.user_id(username).unwrap();
            let result = subscribe(&test_db.pool, user_id, ENDPOINT_A, "key", "secret").await;
            assert!(
                matches!(result, Err(AppError::Conflict(_))),
                "Expected Conflict for {}, got {:?}",
                username,
                result
            );
        }

        assert_eq!(list_subscriptions(&test_db.pool, None).await.unwrap().len(), 1);
    }

    #[rocket::async_test]
    async fn test_unsubscribe_only_removes_own_endpoint() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .student("ben", None)
            .subscription("anna", ENDPOINT_A)
            .build()
            .await
            .expect("Failed to build test database");
        let anna = test_db.user_id("anna").unwrap();
        let ben = test_db.user_id("ben").unwrap();

        assert!(!unsubscribe(&test_db.pool, ben, ENDPOINT_A).await.unwrap());
        assert!(!unsubscribe(&test_db.pool, anna, ENDPOINT_B).await.unwrap());
        assert!(unsubscribe(&test_db.pool, anna, ENDPOINT_A).await.unwrap());
        assert!(!unsubscribe(&test_db.pool, anna, ENDPOINT_A).await.unwrap());

        assert!(list_subscriptions(&test_db.pool, None).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn test_broadcast_counts_partial_failures() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .student("ben", None)
            .subscription("anna", ENDPOINT_A)
            .subscription("anna", ENDPOINT_FAIL)
            .subscription("ben", ENDPOINT_B)
            .build()
            .await
            .expect("Failed to build test database");

        let sender = Arc::new(RecordingSender::default());
        let service = test_push_service(sender.clone());

        let report = broadcast(&test_db.pool, &service, "Hello", "School is closed")
            .await
            .expect("Broadcast should not fail on delivery errors");

        assert_eq!(
            report,
            DeliveryReport {
                sent: 2,
                failed: 1,
                total: 3,
                target: Some("all".to_string()),
                error: None,
            }
        );
        assert_eq!(sender.delivered_endpoints(), vec![ENDPOINT_A, ENDPOINT_B]);

        let delivered = sender.delivered.lock().unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&delivered[0].1).unwrap();
        assert_eq!(payload["title"], "Hello");
        assert_eq!(payload["body"], "School is closed");
    }

    #[rocket::async_test]
    async fn test_broadcast_without_subscriptions() {
        let test_db = TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build test database");
        let service = test_push_service(Arc::new(RecordingSender::default()));

        let report = broadcast(&test_db.pool, &service, "Hello", "Nobody listens")
            .await
            .unwrap();

        assert_eq!(report.total, 0);
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 0);
    }

    #[rocket::async_test]
    async fn test_slow_delivery_times_out_and_fanout_continues() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .subscription("anna", ENDPOINT_SLOW)
            .subscription("anna", ENDPOINT_A)
            .build()
            .await
            .expect("Failed to build test database");

        let sender = Arc::new(RecordingSender::default());
        let service = PushService::new(sender.clone(), Duration::from_millis(50));

        let report = broadcast(&test_db.pool, &service, "Hello", "Slow network")
            .await
            .unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.total, 2);
        assert_eq!(sender.delivered_endpoints(), vec![ENDPOINT_A]);
    }

    #[rocket::async_test]
    async fn test_send_to_user_targets_only_that_user() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .student("ben", None)
            .subscription("anna", ENDPOINT_A)
            .subscription("ben", ENDPOINT_B)
            .build()
            .await
            .expect("Failed to build test database");
        let anna = test_db.user_id("anna").unwrap();

        let sender = Arc::new(RecordingSender::default());
        let service = test_push_service(sender.clone());

        let report = send_to_user(&test_db.pool, &service, anna, "Hi", "Just you")
            .await
            .unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.total, 1);
        assert_eq!(report.target, Some(format!("user:{}", anna)));
        assert_eq!(report.error, None);
        assert_eq!(sender.delivered_endpoints(), vec![ENDPOINT_A]);
    }

    #[rocket::async_test]
    async fn test_send_to_user_without_subscriptions() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .build()
            .await
            .expect("Failed to build test database");
        let service = test_push_service(Arc::new(RecordingSender::default()));

        let report = send_to_user(
            &test_db.pool,
            &service,
            test_db.user_id("anna").unwrap(),
            "Hi",
            "Anyone?",
        )
        .await
        .unwrap();

        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.total, 0);
        assert_eq!(report.error.as_deref(), Some("no subscriptions for user"));
    }

    #[rocket::async_test]
    async fn test_disabled_sender_counts_every_attempt_as_failed() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .subscription("anna", ENDPOINT_A)
            .subscription("anna", ENDPOINT_B)
            .build()
            .await
            .expect("Failed to build test database");
        let service = PushService::new(Arc::new(DisabledPushSender), Duration::from_secs(1));

        let report = broadcast(&test_db.pool, &service, "Hello", "Not configured")
            .await
            .unwrap();

        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 2);
        assert_eq!(report.total, 2);
    }

    #[rocket::async_test]
    async fn test_status_reports_subscriptions() {
        let test_db = TestDbBuilder::new()
            .student("anna", None)
            .student("ben", None)
            .subscription("anna", ENDPOINT_A)
            .subscription("anna", ENDPOINT_B)
            .build()
            .await
            .expect("Failed to build test database");

        let anna = status(&test_db.pool, test_db.user_id("anna").unwrap())
            .await
            .unwrap();
        assert!(anna.has_push);
        assert_eq!(anna.subscription_count, 2);
        assert!(anna.last_subscription.is_some());

        let ben = status(&test_db.pool, test_db.user_id("ben").unwrap())
            .await
            .unwrap();
        assert!(!ben.has_push);
        assert_eq!(ben.subscription_count, 0);
        assert_eq!(ben.last_subscription, None);
    }

    #[rocket::async_test]
    async fn test_status_for_missing_user() {
        let test_db = TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build test database");

        let result = status(&test_db.pool, 4242).await;

        assert!(
            matches!(result, Err(AppError::NotFound(_))),
            "Expected NotFound, got {:?}",
            result
        );
    }

    #[rocket::async_test]
    async fn test_web_push_sender_rejects_malformed_vapid_key() {
        let sender = WebPushSender::new("not-a-vapid-key", "mailto:admin@localhost", 60)
            .expect("Client should build without network access");

        let subscription = PushSubscription {
            id: 1,
            user_id: 1,
            endpoint: ENDPOINT_A.to_string(),
            p256dh: "BNcRdreALRFXTkOOUHK1EtK2wtaz5Ry4YfYCA".to_string(),
            auth: "tBHItJI5svbpez7KI4CCXg".to_string(),
            created_at: chrono::Utc::now(),
        };

        let result = sender.send(&subscription, b"{}").await;

        assert!(
            matches!(result, Err(AppError::ExternalService(_))),
            "Expected ExternalService error, got {:?}",
            result
        );
    }
}
