use serde::Serialize;

use crate::error::AppError;

use super::Role;

/// Identity bag for the current request, read fresh from the store.
#[derive(Debug, Serialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Option<Role>,
    pub class: Option<String>,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: Option<i64>,
    pub username: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub role: Option<String>,
    pub class: Option<String>,
}

impl From<DbUser> for User {
    fn from(user: DbUser) -> Self {
        let role = user.role.and_then(|name| match Role::from_str(&name) {
            Ok(role) => Some(role),
            Err(e) => {
                tracing::warn!(error = %e, "User has a role outside the known set");
                None
            }
        });

        Self {
            id: user.id.unwrap_or_default(),
            username: user.username.unwrap_or_default(),
            firstname: user.firstname,
            lastname: user.lastname,
            role,
            class: user.class,
        }
    }
}

impl User {
    pub fn has_role(&self, allowed: &[Role]) -> bool {
        self.role.is_some_and(|role| allowed.contains(&role))
    }

    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if self.has_role(allowed) {
            return Ok(());
        }

        tracing::warn!(
            username = %self.username,
            role = ?self.role,
            allowed = ?allowed,
            "Role not allowed"
        );

        let names: Vec<&str> = allowed.iter().map(Role::as_str).collect();
        Err(AppError::Authorization(format!(
            "Allowed roles: {}",
            names.join(", ")
        )))
    }
}
