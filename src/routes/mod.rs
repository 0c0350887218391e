mod account;
mod auth;
mod health_check;
mod oauth;
mod verification;

pub use account::{admin_overview, get_current_user};
pub use auth::{login, logout, refresh, register};
pub use health_check::health_check;
pub use oauth::oauth_callback;
pub use verification::verify_account;
