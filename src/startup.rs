use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use sqlx::PgPool;
use std::net::TcpListener;

use crate::configuration::JwtSettings;
use crate::email_client::EmailClient;
use crate::logger::LoggerMiddleware;
use crate::middleware::AuthGuard;
use crate::routes::{
    admin_overview, get_current_user, health_check, login, logout, oauth_callback, refresh,
    register, verify_account,
};

pub fn run(
    listener: TcpListener,
    connection: PgPool,
    jwt_config: JwtSettings,
    email_client: EmailClient,
) -> Result<Server, std::io::Error> {
    let pool = connection.clone();
    let connection = web::Data::new(connection);
    let jwt_config_data = web::Data::new(jwt_config.clone());
    let email_client = web::Data::new(email_client);

    let server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(Logger::default())      // Standard logging
            .wrap(LoggerMiddleware)       // Custom logging

            // Shared state
            .app_data(connection.clone())
            .app_data(jwt_config_data.clone())
            .app_data(email_client.clone())

            // Public routes (no authentication required)
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/verify", web::get().to(verify_account))
            .route("/auth/oauth/{provider}/callback", web::post().to(oauth_callback))

            // Protected routes (valid, unrevoked bearer token required)
            .service(
                web::resource("/auth/me")
                    .wrap(AuthGuard::new(pool.clone(), jwt_config.clone()))
                    .route(web::get().to(get_current_user)),
            )
            .service(
                web::resource("/auth/logout")
                    .wrap(AuthGuard::new(pool.clone(), jwt_config.clone()))
                    .route(web::post().to(logout)),
            )

            // Role-gated routes
            .service(
                web::scope("/admin")
                    .wrap(AuthGuard::new(pool.clone(), jwt_config.clone()).require_role("ADMIN"))
                    .route("/overview", web::get().to(admin_overview)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
