//! Integration test for the health check endpoint

use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::net::TcpListener;

use schoolhub::configuration::{get_configuration, DatabaseSettings};
use schoolhub::email_client::{EmailClient, SenderAddress};
use schoolhub::startup::run;

async fn spawn_app() -> String {
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
    let server = run(listener, connection_pool, jwt_config, email_client)
        .expect("Failed to bind address");
    let _ = tokio::spawn(server);

    address
}

async fn configure_database(config: &DatabaseSettings) -> PgPool {
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

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app().await;

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
}

#[tokio::test]
async fn health_check_requires_no_token() {
    let addr = spawn_app().await;

    // No Authorization header at all
    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(200, response.status().as_u16());
}
