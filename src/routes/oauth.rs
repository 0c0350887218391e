/// Federated login callback.
///
/// The OAuth2 handshake itself happens at the edge; this route receives
/// the provider's verified claim set, normalizes it to a local identity,
/// and mints a session.

use actix_web::{web, HttpResponse};
use sqlx::PgPool;

use crate::auth::federated::{login_federated, ExternalClaims};
use crate::configuration::JwtSettings;
use crate::error::AppError;

/// POST /auth/oauth/{provider}/callback
///
/// Two callbacks carrying the same external subject always resolve to the
/// same local user, whether or not the provider supplies an email claim.
pub async fn oauth_callback(
    provider: web::Path<String>,
    claims: web::Json<ExternalClaims>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let pair = login_federated(pool.get_ref(), jwt_config.get_ref(), &provider, &claims).await?;

    Ok(HttpResponse::Ok().json(pair))
}
