use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::context::ApplicationContext;
use crate::routes;

pub fn build_router(ctx: Arc<ApplicationContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health/check", get(routes::health))
        .route("/api/games", get(routes::list_games))
        .route("/api/matches", get(routes::list_matches))
        .route("/api/matches/{id}", get(routes::match_detail))
        .route("/api/archive", get(routes::archive))
        .route("/api/ens/resolve", post(routes::ens_resolve))
        .route("/api/matchmaking/join", post(routes::matchmaking_join))
        .route("/api/matchmaking/leave", post(routes::matchmaking_leave))
        .route("/api/queues", get(routes::queues))
        .route("/api/matches/private", post(routes::private_create))
        .route("/api/matches/accept", post(routes::private_accept))
        .route("/api/matches/active", post(routes::active_match))
        .route("/api/leaderboard", get(routes::leaderboard))
        .route("/api/leaderboard/{game_id}", get(routes::leaderboard_game))
        .route("/api/config/minimum-stake", get(routes::minimum_stake))
        .route(
            "/api/admin/emergency-draw-all",
            post(routes::admin_emergency_draw_all),
        )
        .route(
            "/api/admin/emergency-resume",
            post(routes::admin_emergency_resume),
        )
        .route(
            "/api/admin/emergency-status",
            get(routes::admin_emergency_status),
        )
        .route("/ws/game/{match_id}", get(routes::ws_game))
        .route("/ws/spectate/{match_id}", get(routes::ws_spectate))
        .layer(cors)
        .with_state(ctx)
}

pub async fn run_server(ctx: Arc<ApplicationContext>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{}", ctx.config.port).parse()?;
    let mut shutdown_rx = ctx.shutdown_receiver();
    let router = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server started at {:?}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;
    Ok(())
}
