use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; \
             script-src 'self' 'unsafe-inline'; \
             style-src 'self' 'unsafe-inline'; \
             img-src 'self' data: https:; \
             connect-src 'self'",
        ),
    );
    response
}

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    // The game is served from a separate frontend origin
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(false)
        .allow_origin(tower_http::cors::Any); // TODO: restrict to the game origin in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        // Game endpoints (anonymous cookie identity)
        .nest("/api/v1", game_routes().layer(cors))
        // Scheduled trigger, reachable only with the scheduler's credentials
        .nest(
            "/internal/cron",
            cron_routes().layer(middleware::from_fn(handlers::cron_auth_middleware)),
        )
        .with_state(app_state)
        .layer(middleware::from_fn(csp_middleware)) // Apply CSP to all responses
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn game_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route("/me", get(handlers::identity::get_or_create_identity))
        .route("/me/name", put(handlers::identity::change_display_name))
        .route("/puzzles/today", get(handlers::puzzle::today_puzzle))
        .route(
            "/puzzles/{id}/answer",
            get(handlers::puzzle::get_existing_answer),
        )
        .route("/puzzles/{id}/guesses", post(handlers::puzzle::submit_guess))
        .route("/puzzles/{id}/reveal", post(handlers::puzzle::reveal_prompt))
        .route(
            "/puzzles/{id}/leaderboard",
            get(handlers::puzzle::daily_leaderboard),
        )
        .route(
            "/leaderboard/yesterday",
            get(handlers::puzzle::yesterday_leaderboard),
        )
}

fn cron_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new().route("/daily", get(handlers::cron::run_daily_generation))
}
