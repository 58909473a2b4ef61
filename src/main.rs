#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod config;
mod database;
mod db;
mod env;
mod error;
mod models;
mod push;
mod routes;
mod subjects;
mod telemetry;
#[cfg(test)]
mod test;
mod tutoring;
mod validation;

use std::path::Path;
use std::sync::Arc;

use api::{api_create_class, api_create_user, health, home, login, logout, profile, root};
use auth::{default_api, forbidden_api, unauthorized_api};
use config::AppConfig;
use database::{bootstrap, connect_pool, ensure_admin};
use db::clean_expired_sessions;
use error::AppError;
use push::{DisabledPushSender, PushSender, PushService, WebPushSender};
use rocket::fs::FileServer;
use rocket::{Build, Rocket};
use routes::{
    edit_tutor_profile, get_subjects, push_send_all, push_send_user, push_status,
    push_subscribe, push_unsubscribe, register_tutoring, search_tutors,
};
use subjects::SubjectCatalog;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;

use sqlx::SqlitePool;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Figment(#[from] rocket::figment::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
}

fn push_sender(config: &AppConfig) -> Arc<dyn PushSender> {
    let Some(private_key) = config.vapid_private_key.as_deref() else {
        warn!("No VAPID private key configured, push delivery disabled");
        return Arc::new(DisabledPushSender);
    };

    match WebPushSender::new(private_key, &config.vapid_subject, config.push_ttl_secs) {
        Ok(sender) => Arc::new(sender),
        Err(e) => {
            e.log_and_record("Push sender setup");
            Arc::new(DisabledPushSender)
        }
    }
}

fn load_config() -> Result<AppConfig, Error> {
    Ok(AppConfig::from_figment(&rocket::Config::figment())?)
}

async fn prepare(config: &AppConfig) -> Result<(SqlitePool, SubjectCatalog), Error> {
    let pool = connect_pool(&config.database_url).await?;

    let catalog = bootstrap(&pool).await?;

    if let Some((username, password)) = config.bootstrap_admin() {
        ensure_admin(&pool, username, password).await?;
    }

    let purged = clean_expired_sessions(&pool).await?;
    if purged > 0 {
        info!("Cleaned up {} expired sessions", purged);
    }

    Ok((pool, catalog))
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = env::load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }
    init_tracing();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            panic!("{}", e);
        }
    };

    let (pool, catalog) = match prepare(&config).await {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("Failed to prepare database: {}", e);
            panic!("Database setup failed: {}", e);
        }
    };

    let push_service = PushService::new(push_sender(&config), config.push_timeout());

    init_rocket(pool, catalog, config, push_service)
}

pub fn init_rocket(
    pool: SqlitePool,
    catalog: SubjectCatalog,
    config: AppConfig,
    push_service: PushService,
) -> Rocket<Build> {
    info!("Starting school community backend");

    let static_dir = config.static_dir.clone();

    let mut rocket = rocket::build()
        .manage(pool)
        .manage(catalog)
        .manage(push_service)
        .manage(config)
        .mount(
            "/",
            routes![
                root,
                login,
                logout,
                profile,
                home,
                api_create_user,
                api_create_class,
                health,
                register_tutoring,
                edit_tutor_profile,
                search_tutors,
                get_subjects,
                push_subscribe,
                push_unsubscribe,
                push_send_all,
                push_send_user,
                push_status,
            ],
        )
        .register("/", catchers![unauthorized_api, forbidden_api, default_api])
        .attach(TelemetryFairing);

    if Path::new(&static_dir).is_dir() {
        rocket = rocket.mount("/app", FileServer::from(&static_dir));
    } else {
        warn!(static_dir = %static_dir, "Static app directory missing, not serving /app");
    }

    rocket
}
