/// Authorization Guard
///
/// Per-request interceptor for protected routes. Every pass re-checks the
/// full usability invariant: signature and embedded expiry, then the
/// ledger row (revoked / expired / missing), then that the subject is
/// still an active user. Roles come from the Credential Store on every
/// request, never from the token payload, so a role change or
/// deactivation takes effect immediately.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use sqlx::PgPool;
use std::rc::Rc;
use uuid::Uuid;

use crate::auth::ledger;
use crate::auth::verify_token;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::users;

/// Resolved caller identity, injected into request extensions
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub roles: Vec<String>,
}

impl AuthenticatedUser {
    pub fn has_role(&self, title: &str) -> bool {
        self.roles.iter().any(|r| r == title)
    }
}

/// Guard middleware for protecting route scopes.
///
/// Built without a role requirement it only authenticates; chain
/// `require_role` to also gate on a role title.
pub struct AuthGuard {
    pool: PgPool,
    jwt_config: JwtSettings,
    required_role: Option<String>,
}

impl AuthGuard {
    pub fn new(pool: PgPool, jwt_config: JwtSettings) -> Self {
        Self {
            pool,
            jwt_config,
            required_role: None,
        }
    }

    pub fn require_role(mut self, title: &str) -> Self {
        self.required_role = Some(title.to_string());
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthGuardService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(AuthGuardService {
            service: Rc::new(service),
            pool: self.pool.clone(),
            jwt_config: self.jwt_config.clone(),
            required_role: self.required_role.clone(),
        }))
    }
}

pub struct AuthGuardService<S> {
    service: Rc<S>,
    pool: PgPool,
    jwt_config: JwtSettings,
    required_role: Option<String>,
}

impl<S, B> Service<ServiceRequest> for AuthGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let bearer = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::to_string);

        let pool = self.pool.clone();
        let jwt_config = self.jwt_config.clone();
        let required_role = self.required_role.clone();
        let service = self.service.clone();

        Box::pin(async move {
            let token = match bearer {
                Some(token) if !token.is_empty() => token,
                _ => {
                    tracing::warn!("Missing or invalid Authorization header");
                    return Err(AppError::Auth(AuthError::MissingToken).into());
                }
            };

            // 1. Signature and embedded expiry
            let claims = verify_token(&token, &jwt_config)?;
            let user_id = claims.user_id()?;

            // 2. Ledger status (revoked / expired / unknown). Refresh
            // tokens are redeemable at the rotation endpoint only; they
            // never authorize API calls.
            let entry = ledger::find_active(&pool, &token).await?;
            if entry.user_id != user_id || entry.kind != ledger::TokenKind::Access {
                tracing::error!(user_id = %user_id, "Ledger row subject or kind mismatch");
                return Err(AppError::Auth(AuthError::TokenMalformed).into());
            }

            // 3. Subject must still be an active user
            let user = users::find_user_by_id(&pool, user_id)
                .await?
                .filter(|u| u.is_active)
                .ok_or(AppError::Auth(AuthError::AccountInactive))?;

            // 4. Live roles, not the token snapshot
            let roles = users::get_role_titles(&pool, user_id).await?;

            if let Some(required) = &required_role {
                if !roles.iter().any(|r| r == required) {
                    tracing::warn!(
                        user_id = %user_id,
                        required_role = %required,
                        "Role requirement not met"
                    );
                    return Err(AppError::Auth(AuthError::Forbidden).into());
                }
            }

            let identity = AuthenticatedUser {
                id: user.id,
                email: user.email,
                username: user.username,
                roles,
            };

            tracing::debug!(user_id = %identity.id, "Request authorized");
            req.extensions_mut().insert(identity);

            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(roles: &[&str]) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            username: "a".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn test_has_role() {
        let user = identity(&["USER", "TEACHER"]);

        assert!(user.has_role("USER"));
        assert!(user.has_role("TEACHER"));
        assert!(!user.has_role("ADMIN"));
    }

    #[test]
    fn test_role_matching_is_case_sensitive() {
        // Role titles are canonically uppercase; no fuzzy matching
        let user = identity(&["ADMIN"]);
        assert!(!user.has_role("admin"));
    }
}
