/// Token Ledger
///
/// Persistent registry of issued bearer tokens, independent of their
/// cryptographic expiry. A token authorizes a request only while its row
/// is neither revoked nor expired, on top of the signature check. Values
/// are stored as SHA-256 digests; plaintext never reaches the database.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Whether a ledger row backs a short-lived access token or a
/// long-lived, single-use refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }

    fn from_column(s: &str) -> Self {
        match s {
            "refresh" => TokenKind::Refresh,
            _ => TokenKind::Access,
        }
    }
}

/// A usable ledger row, as returned by `find_active`
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub user_id: Uuid,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}

/// Hash a token value before it touches the database
fn hash_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Record an issued token inside the caller's transaction
pub async fn record_token(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    value: &str,
    kind: TokenKind,
    expiry_seconds: i64,
) -> Result<(), AppError> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO tokens (id, user_id, value_hash, token_type, kind, created_at, expires_at)
        VALUES ($1, $2, $3, 'bearer', $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(hash_value(value))
    .bind(kind.as_str())
    .bind(now)
    .bind(now + Duration::seconds(expiry_seconds))
    .execute(&mut *tx)
    .await?;

    Ok(())
}

/// Point read by token value, enforcing the ledger half of the usability
/// invariant: the row must exist, be unrevoked, and be unexpired.
///
/// A row whose wall-clock expiry has elapsed but whose `expired` flag is
/// still false gets the flag set here (lazy expiry marking).
///
/// # Errors
/// `TokenNotFound` / `TokenRevoked` / `TokenExpired`
pub async fn find_active(pool: &PgPool, value: &str) -> Result<LedgerEntry, AppError> {
    let value_hash = hash_value(value);

    let row = sqlx::query_as::<_, (Uuid, String, DateTime<Utc>, bool, bool)>(
        r#"
        SELECT user_id, kind, expires_at, revoked, expired
        FROM tokens
        WHERE value_hash = $1
        "#,
    )
    .bind(&value_hash)
    .fetch_optional(pool)
    .await?;

    let (user_id, kind, expires_at, revoked, expired) = match row {
        None => {
            tracing::warn!("Token not present in ledger");
            return Err(AppError::Auth(AuthError::TokenNotFound));
        }
        Some(row) => row,
    };

    if revoked {
        tracing::warn!(user_id = %user_id, "Attempt to use revoked token");
        return Err(AppError::Auth(AuthError::TokenRevoked));
    }

    if expired {
        return Err(AppError::Auth(AuthError::TokenExpired));
    }

    if expires_at <= Utc::now() {
        sqlx::query("UPDATE tokens SET expired = true WHERE value_hash = $1")
            .bind(&value_hash)
            .execute(pool)
            .await?;

        tracing::info!(user_id = %user_id, "Token expired; ledger row marked");
        return Err(AppError::Auth(AuthError::TokenExpired));
    }

    Ok(LedgerEntry {
        user_id,
        kind: TokenKind::from_column(&kind),
        expires_at,
    })
}

/// Compare-and-swap revocation used by refresh rotation.
///
/// Flips the revoked flag only while the row is still usable, so exactly
/// one concurrent refresh can win. Returns `false` when the row is
/// missing, already revoked, or expired; the caller classifies which via
/// `find_active`.
pub async fn revoke_if_active(
    tx: &mut Transaction<'_, Postgres>,
    value: &str,
) -> Result<bool, AppError> {
    let now = Utc::now();
    let rows = sqlx::query(
        r#"
        UPDATE tokens
        SET revoked = true, revoked_at = $1
        WHERE value_hash = $2 AND revoked = false AND expired = false AND expires_at > $1
        "#,
    )
    .bind(now)
    .bind(hash_value(value))
    .execute(&mut *tx)
    .await?;

    Ok(rows.rows_affected() > 0)
}

/// Bulk invalidation of every outstanding token a user owns.
/// Used for logout and for reuse-detection escalation. Idempotent.
pub async fn revoke_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, AppError> {
    let rows = sqlx::query(
        r#"
        UPDATE tokens
        SET revoked = true, revoked_at = $1
        WHERE user_id = $2 AND revoked = false AND expired = false
        "#,
    )
    .bind(Utc::now())
    .bind(user_id)
    .execute(pool)
    .await?;

    tracing::info!(
        user_id = %user_id,
        revoked = rows.rows_affected(),
        "All outstanding tokens revoked for user"
    );
    Ok(rows.rows_affected())
}
