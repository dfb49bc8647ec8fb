use axum::http::{header::AUTHORIZATION, HeaderMap};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    database::Database,
    error::AppError,
    models::{Role, User},
    utils::verify_token,
};

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "you do not have access to this resource".to_string(),
            ))
        }
    }
}

// Bearer header wins over the cookie when both are present.
fn extract_token(headers: &HeaderMap, cookies: &Cookies) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }
    cookies.get("auth_token").map(|c| c.value().to_string())
}

/// Resolves the request's token to a live user row. The role is read from
/// the database on every request, not from the token.
pub async fn get_current_user(
    headers: &HeaderMap,
    cookies: &Cookies,
    db: &Database,
) -> Result<CurrentUser, AppError> {
    let token = extract_token(headers, cookies)
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_string()))?;

    let claims = verify_token(&token)
        .map_err(|_| AppError::Unauthorized("invalid or expired token".to_string()))?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("invalid or expired token".to_string()))?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active = true")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("account not found or deactivated".to_string()))?;

    Ok(CurrentUser {
        id: user.id,
        email: user.email,
        name: user.name,
        role: user.role,
    })
}

/// Guest-tolerant variant for endpoints that serve anonymous visitors.
pub async fn maybe_current_user(
    headers: &HeaderMap,
    cookies: &Cookies,
    db: &Database,
) -> Option<CurrentUser> {
    get_current_user(headers, cookies, db).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ADMIN_ROLES, STAFF_ROLES};

    fn user_with_role(role: Role) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            email: "t@example.test".to_string(),
            name: "T".to_string(),
            role,
        }
    }

    #[test]
    fn role_gate_admits_listed_roles_only() {
        assert!(user_with_role(Role::Admin).require_role(ADMIN_ROLES).is_ok());
        assert!(user_with_role(Role::SuperAdmin).require_role(ADMIN_ROLES).is_ok());
        assert!(matches!(
            user_with_role(Role::User).require_role(ADMIN_ROLES),
            Err(AppError::Forbidden(_))
        ));
        assert!(user_with_role(Role::Salesman).require_role(STAFF_ROLES).is_ok());
        assert!(matches!(
            user_with_role(Role::Salesman).require_role(ADMIN_ROLES),
            Err(AppError::Forbidden(_))
        ));
    }
}
