/// Verification Flow
///
/// Single-use email-verification tokens for pending accounts. A token
/// authenticates the activation action only; it never authorizes API
/// access. Consumption is a DELETE .. RETURNING, so two requests racing
/// on the same value cannot both succeed.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::auth::service::{mint_token_pair, TokenPair};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::users;

// Own short TTL, independent of bearer-token TTLs
const VERIFICATION_TOKEN_TTL_HOURS: i64 = 24;
const VERIFICATION_TOKEN_LENGTH: usize = 48;

fn generate_token_value() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFICATION_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Create a verification token for a pending user inside the caller's
/// transaction and return its plaintext value for the email link.
pub async fn issue_verification_token(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<String, AppError> {
    let token = generate_token_value();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO verification_tokens (token, user_id, created_at, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&token)
    .bind(user_id)
    .bind(now)
    .bind(now + Duration::hours(VERIFICATION_TOKEN_TTL_HOURS))
    .execute(&mut *tx)
    .await?;

    Ok(token)
}

/// Consume a verification token: activate the pending user and mint the
/// account's first access/refresh pair, exactly as login would.
///
/// The row is deleted whether the token turns out fresh or stale, so a
/// second consumption attempt always fails with `TokenNotFound`.
///
/// # Errors
/// `TokenNotFound` when absent or already consumed, `TokenExpired` when stale
pub async fn consume_verification_token(
    pool: &PgPool,
    config: &JwtSettings,
    value: &str,
) -> Result<TokenPair, AppError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
        r#"
        DELETE FROM verification_tokens
        WHERE token = $1
        RETURNING user_id, expires_at
        "#,
    )
    .bind(value)
    .fetch_optional(&mut *tx)
    .await?;

    let (user_id, expires_at) = match row {
        None => {
            tracing::warn!("Unknown or already-consumed verification token");
            return Err(AppError::Auth(AuthError::TokenNotFound));
        }
        Some(row) => row,
    };

    if expires_at <= Utc::now() {
        // Keep the deletion so the stale value cannot be probed again
        tx.commit().await?;
        tracing::info!(user_id = %user_id, "Stale verification token consumed");
        return Err(AppError::Auth(AuthError::TokenExpired));
    }

    users::activate_user(&mut tx, user_id).await?;

    let roles = users::get_role_titles(pool, user_id).await?;
    let pair = mint_token_pair(&mut tx, user_id, roles, config).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, "Account verified and activated");

    Ok(pair)
}
