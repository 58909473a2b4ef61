#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::database::bootstrap;
    use crate::db::{create_class, create_user};
    use crate::error::AppError;
    use crate::push::subscribe;
    use crate::subjects::SubjectCatalog;
    use crate::tutoring::register_or_update;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        classes: Vec<String>,
        users: Vec<TestUser>,
        registrations: Vec<TestRegistration>,
        subscriptions: Vec<TestSubscription>,
    }

    pub struct TestUser {
        pub username: String,
        pub firstname: Option<String>,
        pub role: Role,
        pub class: Option<String>,
        pub password: String,
    }

    pub struct TestRegistration {
        pub username: String,
        pub subjects: Vec<String>,
    }

    pub struct TestSubscription {
        pub username: String,
        pub endpoint: String,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn class(mut self, name: &str) -> Self {
            self.classes.push(name.to_string());
            self
        }

        pub fn student(self, username: &str, class: Option<&str>) -> Self {
            self.user(username, Role::Student, class)
        }

        pub fn teacher(self, username: &str) -> Self {
            self.user(username, Role::Teacher, None)
        }

        pub fn parent(self, username: &str) -> Self {
            self.user(username, Role::Parent, None)
        }

        pub fn admin(self, username: &str) -> Self {
            self.user(username, Role::Administration, None)
        }

        pub fn user(mut self, username: &str, role: Role, class: Option<&str>) -> Self {
            self.users.push(TestUser {
                username: username.to_string(),
                firstname: Some(format!("{}_first", username)),
                role,
                class: class.map(String::from),
                password: STANDARD_PASSWORD.to_string(),
            });
            self
        }

        pub fn tutoring(mut self, username: &str, subjects: &[&str]) -> Self {
            self.registrations.push(TestRegistration {
                username: username.to_string(),
                subjects: subjects.iter().map(|s| s.to_string()).collect(),
            });
            self
        }

        pub fn subscription(mut self, username: &str, endpoint: &str) -> Self {
            self.subscriptions.push(TestSubscription {
                username: username.to_string(),
                endpoint: endpoint.to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter("debug")
                    .with_test_writer()
                    .try_init();
            });

            // Every connection to `sqlite::memory:` is its own database.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await?;

            let catalog = bootstrap(&pool).await?;

            for class in &self.classes {
                create_class(&pool, class).await?;
            }

            let mut user_id_map: HashMap<String, i64> = HashMap::new();

            for user in &self.users {
                let user_id = create_user(
                    &pool,
                    &user.username,
                    &user.password,
                    user.role.as_str(),
                    user.firstname.as_deref(),
                    None,
                    user.class.as_deref(),
                )
                .await?;

                user_id_map.insert(user.username.clone(), user_id);
            }

            for registration in &self.registrations {
                let user_id = lookup(&user_id_map, &registration.username)?;
                register_or_update(&pool, &catalog, user_id, &registration.subjects).await?;
            }

            for sub in &self.subscriptions {
                let user_id = lookup(&user_id_map, &sub.username)?;
                subscribe(&pool, user_id, &sub.endpoint, "test-p256dh", "test-auth").await?;
            }

            Ok(TestDb {
                pool,
                catalog,
                user_id_map,
            })
        }
    }

    fn lookup(map: &HashMap<String, i64>, username: &str) -> Result<i64, AppError> {
        map.get(username)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("Test user {} not declared", username)))
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub catalog: SubjectCatalog,
        pub user_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, username: &str) -> Option<i64> {
            self.user_id_map.get(username).copied()
        }

        /// The stored subject field exactly as persisted.
        pub async fn raw_subjects(&self, username: &str) -> Result<Option<String>, sqlx::Error> {
            let user_id = self.user_id(username).ok_or(sqlx::Error::RowNotFound)?;

            sqlx::query_scalar::<_, Option<String>>(
                "SELECT subjects FROM tutoring WHERE user_id = ?",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
        }

        pub async fn registration_count(&self, username: &str) -> Result<i64, sqlx::Error> {
            let user_id = self.user_id(username).ok_or(sqlx::Error::RowNotFound)?;

            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tutoring WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
        }

        pub async fn set_role(&self, username: &str, role: Role) -> Result<(), sqlx::Error> {
            let user_id = self.user_id(username).ok_or(sqlx::Error::RowNotFound)?;

            sqlx::query("UPDATE users SET role = (SELECT id FROM roles WHERE name = ?) WHERE id = ?")
                .bind(role.as_str())
                .bind(user_id)
                .execute(&self.pool)
                .await?;

            Ok(())
        }
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .class("10a")
            .student("student_user", Some("10a"))
            .student("other_student", Some("10a"))
            .teacher("teacher_user")
            .parent("parent_user")
            .admin("admin_user")
            .build()
            .await
            .expect("Failed to build test database")
    }
}

#[cfg(test)]
pub mod test_utils {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;

    use crate::config::AppConfig;
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::PushSubscription;
    use crate::push::{PushSender, PushService};

    pub use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder, create_standard_test_db};

    /// Records deliveries instead of contacting a push service. Endpoints
    /// containing `fail` are rejected and endpoints containing `slow` stall.
    #[derive(Default)]
    pub struct RecordingSender {
        pub delivered: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl RecordingSender {
        pub fn delivered_endpoints(&self) -> Vec<String> {
            self.delivered
                .lock()
                .map(|d| d.iter().map(|(endpoint, _)| endpoint.clone()).collect())
                .unwrap_or_default()
        }
    }

    #[rocket::async_trait]
    impl PushSender for RecordingSender {
        async fn send(&self, subscription: &PushSubscription, payload: &[u8]) -> Result<(), AppError> {
            if subscription.endpoint.contains("slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }

            if subscription.endpoint.contains("fail") {
                return Err(AppError::ExternalService("410 Gone".to_string()));
            }

            self.delivered
                .lock()
                .unwrap()
                .push((subscription.endpoint.clone(), payload.to_vec()));
            Ok(())
        }
    }

    pub fn test_push_service(sender: Arc<RecordingSender>) -> PushService {
        PushService::new(sender, Duration::from_millis(200))
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with_sender(test_db, Arc::new(RecordingSender::default())).await
    }

    pub async fn setup_test_client_with_sender(
        test_db: TestDb,
        sender: Arc<RecordingSender>,
    ) -> (Client, TestDb) {
        let config = AppConfig {
            static_dir: "does-not-exist".to_string(),
            ..AppConfig::default()
        };

        let rocket = init_rocket(
            test_db.pool.clone(),
            test_db.catalog.clone(),
            config,
            test_push_service(sender),
        );

        let client = Client::tracked(rocket)
            .await
            .expect("Failed to create test client");

        (client, test_db)
    }

    pub async fn login_test_user(client: &Client, username: &str, password: &str) -> Status {
        let response = client
            .post("/login")
            .header(ContentType::Form)
            .body(format!("username={}&pw={}", username, password))
            .dispatch()
            .await;

        response.status()
    }
}
