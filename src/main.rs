mod models;
mod handlers;
mod routes;
mod docs;
mod websocket;
mod config;
mod presence;
mod state;
mod store;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use routes::{create_api_routes, create_ws_routes};
use docs::ApiDoc;
use config::Config;
use state::AppState;
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use std::panic;

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "luma_presence=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Connect the presence store
    let store = state::connect_store(&config)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect presence store: {}", e));
    info!("Presence store: {}", store.name());

    let app_state = AppState::new(config.clone(), store);

    // Combine all routes
    let mut app_routes = Router::new()
        // Mount API routes
        .nest("/api", create_api_routes(app_state.clone()))
        // Mount WebSocket push
        .nest("/ws", create_ws_routes(app_state.clone()))
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http());

    if config.is_development() {
        app_routes = app_routes.layer(CorsLayer::permissive());
    }

    // Start the HTTP/API server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 Presence push available at ws://{}/ws/presence/{{moment_id}}", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    let shutdown_state = app_state.clone();
    axum::serve(listener, app_routes)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down, releasing simulations");
            shutdown_state.simulator.stop_all().await;
        })
        .await
        .expect("Server failed to start");
}
