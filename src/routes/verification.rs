/// Email verification route: the link target from the verification email.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use sqlx::PgPool;

use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::verification::consume_verification_token;

#[derive(Deserialize)]
pub struct VerificationQuery {
    token: String,
}

/// GET /auth/verify?token=...
///
/// Consumes the single-use verification token, activates the account, and
/// returns the account's first access/refresh pair. A second call with
/// the same token fails: consumption deletes the row.
pub async fn verify_account(
    query: web::Query<VerificationQuery>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let pair = consume_verification_token(pool.get_ref(), jwt_config.get_ref(), &query.token).await?;

    Ok(HttpResponse::Ok().json(pair))
}
