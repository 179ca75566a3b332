use actix_web::{dev::Service, web, App, HttpServer};
use std::io;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_service::config::Config;
use feed_service::handlers::configure_routes;
use feed_service::AppState;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Local .env is optional
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting feed-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    if let Err(e) = feed_cache::CacheMetrics::register(prometheus::default_registry()) {
        tracing::warn!("Cache metrics registration failed: {}", e);
    }

    let state = match AppState::build(&config).await {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            tracing::error!("Service initialization failed: {:#}", e);
            eprintln!("ERROR: Failed to initialize service: {}", e);
            std::process::exit(1);
        }
    };

    let bind_addr = format!("{}:{}", config.app.host, config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req.path().to_string();
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    let res = fut.await;
                    let status = match &res {
                        Ok(res) => res.status().as_u16(),
                        Err(_) => 500,
                    };
                    tracing::debug!(
                        method = %method,
                        path = %path,
                        status,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "HTTP request"
                    );
                    res
                }
            })
            .configure(configure_routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
