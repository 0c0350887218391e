/// Authentication Routes
///
/// Registration, login, token refresh, and logout.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use sqlx::PgPool;

use crate::auth::service::{self, NewRegistration};
use crate::configuration::JwtSettings;
use crate::email_client::EmailClient;
use crate::error::{AppError, AuthError, ErrorContext};
use crate::middleware::AuthenticatedUser;

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub display_name: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request body. The token may arrive here or in the
/// X-Refresh-Token header.
#[derive(Deserialize, Default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// POST /auth/register
///
/// Creates an inactive account and emails a verification link.
/// Deliberately returns no tokens: the account is unusable until the
/// emailed verification token is consumed.
///
/// # Errors
/// - 400: Validation errors or weak password
/// - 409: Email or username already registered
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let user_id = service::register(
        pool.get_ref(),
        email_client.get_ref(),
        NewRegistration {
            email: form.email.clone(),
            username: form.username.clone(),
            display_name: form.display_name.clone(),
            password: form.password.clone(),
        },
    )
    .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "Registration accepted; verification email queued"
    );

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "message": "Registration received. Check your email to verify your account."
    })))
}

/// POST /auth/login
///
/// Authenticate with email and password, returning an access/refresh pair.
///
/// # Security Notes
/// - Unknown account, wrong password, and unverified account all return
///   the same 401 body (prevents account enumeration)
/// - Tokens are only issued for active accounts
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let pair = service::login(pool.get_ref(), jwt_config.get_ref(), &form.email, &form.password).await?;

    tracing::info!(request_id = %context.request_id, "Login succeeded");

    Ok(HttpResponse::Ok().json(pair))
}

/// POST /auth/refresh
///
/// Exchange a refresh token for a rotated access/refresh pair. The
/// presented token is revoked in the same transaction that records the
/// new pair; presenting it a second time revokes every session of the
/// owning user.
///
/// # Errors
/// - 401: Invalid, expired, revoked, or reused refresh token
pub async fn refresh(
    req: HttpRequest,
    form: Option<web::Json<RefreshRequest>>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let presented = form
        .and_then(|f| f.into_inner().refresh_token)
        .or_else(|| {
            req.headers()
                .get("X-Refresh-Token")
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .ok_or(AppError::Auth(AuthError::MissingToken))?;

    let pair = service::refresh(pool.get_ref(), jwt_config.get_ref(), &presented).await?;

    tracing::info!(request_id = %context.request_id, "Token refreshed");

    Ok(HttpResponse::Ok().json(pair))
}

/// POST /auth/logout
///
/// Revokes every outstanding token of the authenticated caller.
/// Idempotent: logging out twice succeeds.
pub async fn logout(
    identity: web::ReqData<AuthenticatedUser>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    service::logout(pool.get_ref(), identity.id).await?;

    tracing::info!(user_id = %identity.id, "User logged out");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Logged out"
    })))
}
