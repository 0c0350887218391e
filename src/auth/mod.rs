/// Authentication module
///
/// Token signing/verification, password hashing, the issued-token ledger,
/// federated identity normalization, and the login/refresh orchestration.

mod claims;
pub mod federated;
mod jwt;
pub mod ledger;
mod password;
pub mod service;

pub use claims::Claims;
pub use jwt::issue_token;
pub use jwt::verify_token;
pub use password::hash_password;
pub use password::unusable_password_hash;
pub use password::verify_password;
pub use service::TokenPair;
