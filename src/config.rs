use std::time::Duration;

use rocket::figment::Figment;
use serde::Deserialize;

fn default_database_url() -> String {
    "sqlite://data.db".to_string()
}

fn default_static_dir() -> String {
    "pwa".to_string()
}

fn default_session_hours() -> i64 {
    12
}

fn default_push_timeout_secs() -> u64 {
    10
}

fn default_push_ttl_secs() -> u32 {
    24 * 60 * 60
}

fn default_vapid_subject() -> String {
    "mailto:admin@localhost".to_string()
}

/// Application settings, read from the same figment as Rocket's own config
/// (`Rocket.toml` and `ROCKET_*` environment variables).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_session_hours")]
    pub session_hours: i64,
    #[serde(default = "default_push_timeout_secs")]
    pub push_timeout_secs: u64,
    #[serde(default = "default_push_ttl_secs")]
    pub push_ttl_secs: u32,
    #[serde(default)]
    pub vapid_private_key: Option<String>,
    #[serde(default = "default_vapid_subject")]
    pub vapid_subject: String,
    #[serde(default)]
    pub admin_username: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            static_dir: default_static_dir(),
            session_hours: default_session_hours(),
            push_timeout_secs: default_push_timeout_secs(),
            push_ttl_secs: default_push_ttl_secs(),
            vapid_private_key: None,
            vapid_subject: default_vapid_subject(),
            admin_username: None,
            admin_password: None,
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        figment.extract()
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn session_duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_hours)
    }

    /// Administrator to create on startup, when both parts are configured.
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.admin_username, &self.admin_password) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some((username.as_str(), password.as_str()))
            }
            _ => None,
        }
    }
}
