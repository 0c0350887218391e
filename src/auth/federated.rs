/// Federated Identity Normalizer
///
/// Post-processes an external provider's claim set so the rest of the
/// pipeline sees a uniform local identity. Providers are allowed to omit
/// the email claim; in that case a deterministic fallback address is
/// synthesized from the external account id, so repeated logins from the
/// same external account resolve to the same local user.

use sqlx::PgPool;

use crate::auth::password::unusable_password_hash;
use crate::auth::service::{mint_token_pair, TokenPair};
use crate::configuration::JwtSettings;
use crate::error::AppError;
use crate::users;
use crate::validators::is_valid_email;

/// Claim set as delivered by an external provider's callback
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExternalClaims {
    /// Stable account id at the provider
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

/// A provider claim set reduced to the local user model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIdentity {
    pub email: String,
    pub username: String,
    pub display_name: String,
}

/// Reduce a provider subject to a handle usable in emails and usernames
fn subject_handle(subject: &str) -> String {
    let handle: String = subject
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();

    if handle.is_empty() {
        "anonymous".to_string()
    } else {
        handle
    }
}

/// Normalize an external claim set for one provider.
///
/// A missing or blank email claim becomes `<handle>@<provider>.local`.
/// The mapping is pure, so the same external account always lands on the
/// same local identity.
pub fn normalize(provider: &str, claims: &ExternalClaims) -> Result<NormalizedIdentity, AppError> {
    let provider = provider.to_lowercase();
    let handle = subject_handle(&claims.subject);

    let email = match claims.email.as_deref().map(str::trim) {
        Some(email) if !email.is_empty() => is_valid_email(email)?,
        _ => format!("{}@{}.local", handle, provider),
    };

    let display_name = claims
        .display_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| handle.clone());

    Ok(NormalizedIdentity {
        email,
        username: format!("{}.{}", provider, handle),
        display_name,
    })
}

/// Resolve a federated claim set to a local user and mint a session.
///
/// First login creates an active account (the provider vouches for the
/// identity, so there is no email-verification leg) with a password hash
/// nobody can log in with. Later logins find the same row by email.
pub async fn login_federated(
    pool: &PgPool,
    config: &JwtSettings,
    provider: &str,
    claims: &ExternalClaims,
) -> Result<TokenPair, AppError> {
    let identity = normalize(provider, claims)?;

    let user_id = match users::find_user_by_email(pool, &identity.email).await? {
        Some(user) => user.id,
        None => {
            let password_hash = unusable_password_hash()?;
            let mut tx = pool.begin().await?;
            let user_id = users::insert_active_user(
                &mut tx,
                &identity.email,
                &identity.username,
                &identity.display_name,
                &password_hash,
            )
            .await?;
            tx.commit().await?;

            tracing::info!(
                user_id = %user_id,
                provider = %provider,
                "Federated identity created"
            );
            user_id
        }
    };

    let roles = users::get_role_titles(pool, user_id).await?;

    let mut tx = pool.begin().await?;
    let pair = mint_token_pair(&mut tx, user_id, roles, config).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user_id, provider = %provider, "Federated login");

    Ok(pair)
}
