/// Authentication Service
///
/// Orchestrates registration, login, token refresh, and logout. All three
/// entry paths that mint tokens (password login, email verification, the
/// federated callback) converge on `mint_token_pair`, so every session
/// looks the same to the ledger and the guard.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::auth::jwt::{issue_token, verify_token};
use crate::auth::ledger::{self, TokenKind};
use crate::auth::password::{hash_password, verify_password, DUMMY_HASH};
use crate::configuration::JwtSettings;
use crate::email_client::EmailClient;
use crate::error::{AppError, AuthError};
use crate::users;
use crate::validators::{is_valid_email, is_valid_name, is_valid_username};
use crate::verification;

/// An access/refresh pair, shaped as the token endpoints return it
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Validated registration input
pub struct NewRegistration {
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub password: String,
}

/// Issue an access + refresh pair for a user and record both ledger rows
/// inside the caller's transaction.
pub async fn mint_token_pair(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    roles: Vec<String>,
    config: &JwtSettings,
) -> Result<TokenPair, AppError> {
    let access_token = issue_token(user_id, roles.clone(), config.access_token_expiry, config)?;
    let refresh_token = issue_token(user_id, roles, config.refresh_token_expiry, config)?;

    ledger::record_token(tx, user_id, &access_token, TokenKind::Access, config.access_token_expiry).await?;
    ledger::record_token(tx, user_id, &refresh_token, TokenKind::Refresh, config.refresh_token_expiry).await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: config.access_token_expiry,
    })
}

/// Register a new account.
///
/// Persists an inactive user with the default USER role and a pending
/// verification token, then fires the verification email off-request.
/// No session tokens are returned; the account is unusable until the
/// emailed token is consumed.
///
/// # Errors
/// `DuplicateIdentity` when the email or username is taken,
/// `WeakCredential` when the password fails the strength policy,
/// validation errors for malformed input
pub async fn register(
    pool: &PgPool,
    email_client: &EmailClient,
    registration: NewRegistration,
) -> Result<Uuid, AppError> {
    let email = is_valid_email(&registration.email)?;
    let username = is_valid_username(&registration.username)?;
    let display_name = is_valid_name(&registration.display_name)?;
    let password_hash = hash_password(&registration.password)?;

    if users::exists_by_email(pool, &email).await? || users::exists_by_username(pool, &username).await? {
        return Err(AppError::Auth(AuthError::DuplicateIdentity));
    }

    let mut tx = pool.begin().await?;
    let user_id =
        users::insert_inactive_user(&mut tx, &email, &username, &display_name, &password_hash).await?;
    let verification_token = verification::issue_verification_token(&mut tx, user_id).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, "User registered; pending email verification");

    // Delivery happens off the request path; a relay failure must not
    // roll back the registration. The user can be re-sent a token later.
    let email_client = email_client.clone();
    tokio::spawn(async move {
        if let Err(e) = email_client.send_verification_email(&email, &verification_token).await {
            tracing::error!(user_id = %user_id, error = %e, "Verification email delivery failed");
        }
    });

    Ok(user_id)
}

/// Authenticate with email + password and mint a token pair.
///
/// # Errors
/// `InvalidCredential` on unknown account or wrong password,
/// `AccountInactive` on an unverified or deactivated account.
/// Both surface identically to the client.
pub async fn login(
    pool: &PgPool,
    config: &JwtSettings,
    email: &str,
    password: &str,
) -> Result<TokenPair, AppError> {
    let email = is_valid_email(email)?;

    let user = match users::find_user_by_email(pool, &email).await? {
        Some(user) => user,
        None => {
            // Burn a bcrypt verify so a miss takes as long as a mismatch
            let _ = verify_password(password, DUMMY_HASH)?;
            return Err(AppError::Auth(AuthError::InvalidCredential));
        }
    };

    if !verify_password(password, &user.password_hash)? {
        return Err(AppError::Auth(AuthError::InvalidCredential));
    }

    if !user.is_active {
        return Err(AppError::Auth(AuthError::AccountInactive));
    }

    let roles = users::get_role_titles(pool, user.id).await?;

    let mut tx = pool.begin().await?;
    let pair = mint_token_pair(&mut tx, user.id, roles, config).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(pair)
}

/// Rotate a refresh token: revoke the presented one and mint a new pair,
/// atomically. Presenting an already-rotated token is treated as theft.
///
/// # Errors
/// `TokenMalformed` / `TokenExpired` / `TokenRevoked` / `TokenNotFound`
/// for ordinary failures; `TokenReuseDetected` when the token was already
/// rotated, after which every outstanding token of that user is revoked.
pub async fn refresh(
    pool: &PgPool,
    config: &JwtSettings,
    presented: &str,
) -> Result<TokenPair, AppError> {
    let claims = verify_token(presented, config)?;
    let user_id = claims.user_id()?;

    let user = users::find_user_by_id(pool, user_id)
        .await?
        .filter(|u| u.is_active)
        .ok_or(AppError::Auth(AuthError::AccountInactive))?;

    let entry = match ledger::find_active(pool, presented).await {
        Ok(entry) => entry,
        Err(AppError::Auth(AuthError::TokenRevoked)) => {
            tracing::error!(
                user_id = %user.id,
                "Rotated refresh token presented again; revoking all tokens for user"
            );
            ledger::revoke_all_for_user(pool, user.id).await?;
            return Err(AppError::Auth(AuthError::TokenReuseDetected));
        }
        Err(other) => return Err(other),
    };

    // An access token is never accepted for rotation
    if entry.kind != TokenKind::Refresh || entry.user_id != user.id {
        return Err(AppError::Auth(AuthError::TokenMalformed));
    }

    let roles = users::get_role_titles(pool, user.id).await?;

    let mut tx = pool.begin().await?;

    // Single-use rotation: exactly one concurrent refresh can flip the
    // revoked flag. Losing the race means the token was rotated between
    // the read above and here, which is indistinguishable from reuse.
    if !ledger::revoke_if_active(&mut tx, presented).await? {
        drop(tx);

        tracing::error!(
            user_id = %user.id,
            "Refresh token rotated concurrently; revoking all tokens for user"
        );
        ledger::revoke_all_for_user(pool, user.id).await?;
        return Err(AppError::Auth(AuthError::TokenReuseDetected));
    }

    let pair = mint_token_pair(&mut tx, user.id, roles, config).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, "Refresh token rotated");

    Ok(pair)
}

/// Revoke every outstanding token the user owns. Idempotent.
pub async fn logout(pool: &PgPool, user_id: Uuid) -> Result<(), AppError> {
    ledger::revoke_all_for_user(pool, user_id).await?;
    Ok(())
}
