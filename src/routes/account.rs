/// Account routes behind the authorization guard.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::{AppError, DatabaseError};
use crate::middleware::AuthenticatedUser;
use crate::users;

/// Current user information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub created_at: String,
}

/// GET /auth/me
///
/// Current authenticated identity with live roles, as resolved by the
/// guard. Requires `Authorization: Bearer <access_token>`.
pub async fn get_current_user(
    identity: web::ReqData<AuthenticatedUser>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user = users::find_user_by_id(pool.get_ref(), identity.id)
        .await?
        .ok_or_else(|| {
            AppError::Database(DatabaseError::NotFound("User not found".to_string()))
        })?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.id.to_string(),
        email: user.email,
        username: user.username,
        display_name: user.display_name,
        roles: identity.roles.clone(),
        created_at: user.created_at.to_rfc3339(),
    }))
}

/// GET /admin/overview
///
/// Placeholder for the administrative surface. Reaching it at all proves
/// the caller holds the ADMIN role; the guard on the /admin scope rejects
/// everyone else with 403.
pub async fn admin_overview(
    identity: web::ReqData<AuthenticatedUser>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "admin overview",
        "viewer": identity.username,
    })))
}
