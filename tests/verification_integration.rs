use serde_json::{json, Value};
use sqlx::{Connection, Executor, PgConnection, PgPool, Row};
use std::net::TcpListener;

use schoolhub::configuration::{get_configuration, DatabaseSettings};
use schoolhub::email_client::{EmailClient, SenderAddress};
use schoolhub::startup::run;

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

async fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    let connection_pool = configure_database(&configuration.database).await;

    let email_client = EmailClient::new(
        "http://127.0.0.1:1".to_string(),
        SenderAddress::parse("no-reply@schoolhub.example".to_string()).unwrap(),
        address.clone(),
        reqwest::Client::new(),
    );

    let jwt_config = configuration.jwt.clone();
    let server = run(listener, connection_pool.clone(), jwt_config, email_client)
        .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool: connection_pool,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

async fn register(app: &TestApp, client: &reqwest::Client, email: &str, username: &str) {
    let body = json!({
        "email": email,
        "username": username,
        "display_name": "Test User",
        "password": "SecurePass123"
    });

    let response = client
        .post(&format!("{}/auth/register", &app.address))
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(202, response.status().as_u16());
}

async fn verification_token_for(app: &TestApp, email: &str) -> String {
    sqlx::query(
        "SELECT vt.token FROM verification_tokens vt \
         JOIN users u ON u.id = vt.user_id WHERE u.email = $1",
    )
    .bind(email)
    .fetch_one(&app.db_pool)
    .await
    .expect("No verification token found")
    .get::<String, _>("token")
}

#[tokio::test]
async fn verification_activates_account_and_returns_first_token_pair() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register(&app, &client, "john@example.com", "jdoe").await;
    let token = verification_token_for(&app, "john@example.com").await;

    let response = client
        .get(&format!("{}/auth/verify?token={}", &app.address, token))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body.get("access_token").is_some());
    assert!(body.get("refresh_token").is_some());

    let is_active: bool =
        sqlx::query_scalar("SELECT is_active FROM users WHERE email = 'john@example.com'")
            .fetch_one(&app.db_pool)
            .await
            .expect("Failed to fetch user");
    assert!(is_active);

    // The pair authorizes API access right away
    let me = client
        .get(&format!("{}/auth/me", &app.address))
        .header(
            "Authorization",
            format!("Bearer {}", body["access_token"].as_str().unwrap()),
        )
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, me.status().as_u16());
}

#[tokio::test]
async fn verification_token_is_single_use() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register(&app, &client, "john@example.com", "jdoe").await;
    let token = verification_token_for(&app, "john@example.com").await;

    let first = client
        .get(&format!("{}/auth/verify?token={}", &app.address, token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, first.status().as_u16());

    // Consumption deletes the row; the second attempt fails
    let second = client
        .get(&format!("{}/auth/verify?token={}", &app.address, token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, second.status().as_u16());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verification_tokens")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count tokens");
    assert_eq!(0, count);
}

#[tokio::test]
async fn unknown_verification_token_is_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(&format!(
            "{}/auth/verify?token=not-a-real-token",
            &app.address
        ))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn stale_verification_token_is_rejected_and_consumed() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register(&app, &client, "john@example.com", "jdoe").await;
    let token = verification_token_for(&app, "john@example.com").await;

    sqlx::query("UPDATE verification_tokens SET expires_at = NOW() - INTERVAL '1 hour'")
        .execute(&app.db_pool)
        .await
        .expect("Failed to age token");

    let response = client
        .get(&format!("{}/auth/verify?token={}", &app.address, token))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, response.status().as_u16());

    // The account stays inactive and the stale row is gone
    let is_active: bool =
        sqlx::query_scalar("SELECT is_active FROM users WHERE email = 'john@example.com'")
            .fetch_one(&app.db_pool)
            .await
            .expect("Failed to fetch user");
    assert!(!is_active);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verification_tokens")
        .fetch_one(&app.db_pool)
        .await
        .expect("Failed to count tokens");
    assert_eq!(0, count);
}

#[tokio::test]
async fn verification_pair_stays_valid_when_user_logs_in_again() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    register(&app, &client, "a@x.com", "axuser").await;
    let token = verification_token_for(&app, "a@x.com").await;

    let t1: Value = client
        .get(&format!("{}/auth/verify?token={}", &app.address, token))
        .send()
        .await
        .expect("Failed to execute request.")
        .json()
        .await
        .expect("Failed to parse response");

    // A later password login mints T2; T1 remains valid independently
    let t2 = client
        .post(&format!("{}/auth/login", &app.address))
        .json(&json!({"email": "a@x.com", "password": "SecurePass123"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, t2.status().as_u16());

    let me = client
        .get(&format!("{}/auth/me", &app.address))
        .header(
            "Authorization",
            format!("Bearer {}", t1["access_token"].as_str().unwrap()),
        )
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(200, me.status().as_u16());
}
