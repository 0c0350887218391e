/// Request middleware
///
/// The authorization guard for protected routes.

mod auth_guard;

pub use auth_guard::{AuthGuard, AuthenticatedUser};
