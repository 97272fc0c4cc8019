use actix_web::{App, HttpServer, middleware, web};

use safeops::config::Config;
use safeops::db;
use safeops::handlers;
use safeops::protocol::ProtocolService;
use safeops::repository::PgRepository;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {e}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    // Initialize database
    let pool = db::init_pool(&config).await.map_err(|e| {
        log::error!("Failed to connect to database: {e}");
        std::io::Error::other(e)
    })?;
    db::run_migrations(&pool).await.map_err(|e| {
        log::error!("Failed to run migrations: {e}");
        std::io::Error::other(e)
    })?;

    let service = web::Data::new(ProtocolService::with_system_clock(
        PgRepository::new(pool),
        config.protocol,
    ));

    log::info!(
        "Starting server at http://{} (default SLA {} min, photo evidence {})",
        config.bind_addr,
        config.protocol.default_sla_minutes,
        if config.protocol.enforce_photo_evidence { "enforced" } else { "advisory" }
    );

    HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .app_data(service.clone())
            .service(web::scope("/api/v1").configure(handlers::api_v1::configure::<PgRepository>))
            // Default 404 handler (must be registered last)
            .default_service(web::to(handlers::not_found))
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
