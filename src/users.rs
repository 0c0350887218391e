/// Credential Store
///
/// User identity rows plus their role assignments. Authorization decisions
/// are made on role titles, not ids, so the uppercase title is unique.
/// Users are never deleted; deactivation flips `is_active`.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::AppError;

/// A user identity row
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub display_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

type UserRow = (Uuid, String, String, String, String, bool, DateTime<Utc>);

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.0,
            email: row.1,
            username: row.2,
            display_name: row.3,
            password_hash: row.4,
            is_active: row.5,
            created_at: row.6,
        }
    }
}

const USER_COLUMNS: &str = "id, email, username, display_name, password_hash, is_active, created_at";

/// Insert a new inactive user and assign the default USER role,
/// both inside the caller's transaction.
pub async fn insert_inactive_user(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    username: &str,
    display_name: &str,
    password_hash: &str,
) -> Result<Uuid, AppError> {
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, username, display_name, password_hash, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, false, $6, $6)
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(username)
    .bind(display_name)
    .bind(password_hash)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    assign_role(tx, user_id, "USER").await?;

    Ok(user_id)
}

/// Insert an already-active user (federated identities arrive pre-verified
/// by their provider) with the default USER role.
pub async fn insert_active_user(
    tx: &mut Transaction<'_, Postgres>,
    email: &str,
    username: &str,
    display_name: &str,
    password_hash: &str,
) -> Result<Uuid, AppError> {
    let user_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, username, display_name, password_hash, is_active, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, true, $6, $6)
        "#,
    )
    .bind(user_id)
    .bind(email)
    .bind(username)
    .bind(display_name)
    .bind(password_hash)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    assign_role(tx, user_id, "USER").await?;

    Ok(user_id)
}

/// Attach a role to a user by title. Unknown titles are a caller error.
pub async fn assign_role(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    title: &str,
) -> Result<(), AppError> {
    let rows = sqlx::query(
        r#"
        INSERT INTO user_roles (user_id, role_id)
        SELECT $1, id FROM roles WHERE title = $2
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(title)
    .execute(&mut *tx)
    .await?;

    if rows.rows_affected() == 0 {
        tracing::warn!(user_id = %user_id, role = %title, "Role assignment matched no role row");
    }

    Ok(())
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE email = $1",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

pub async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<User>, AppError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(User::from))
}

pub async fn exists_by_email(pool: &PgPool, email: &str) -> Result<bool, AppError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)",
    )
    .bind(email)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

pub async fn exists_by_username(pool: &PgPool, username: &str) -> Result<bool, AppError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)",
    )
    .bind(username)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Flip a pending account to active (email verification succeeded)
pub async fn activate_user(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query("UPDATE users SET is_active = true, updated_at = $1 WHERE id = $2")
        .bind(Utc::now())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    Ok(())
}

/// Live role titles for a user. The guard re-queries these on every request
/// instead of trusting the roles embedded in a token, so role changes and
/// deactivation take effect immediately.
pub async fn get_role_titles(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>, AppError> {
    let titles = sqlx::query_scalar::<_, String>(
        r#"
        SELECT r.title
        FROM roles r
        JOIN user_roles ur ON ur.role_id = r.id
        WHERE ur.user_id = $1
        ORDER BY r.title
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(titles)
}
