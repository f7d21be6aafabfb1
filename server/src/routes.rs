//! HTTP and WS handlers: thin mappers from requests to the Match
//! Service.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use dork_core::error::Error;

use crate::auth::{admin_auth, player_auth};
use crate::context::ApplicationContext;
use crate::error::{ApiError, ApiResult};
use crate::session::{run_game_session, run_spectator_session};

type Ctx = State<Arc<ApplicationContext>>;

fn field<'a>(body: &'a Value, name: &str) -> Result<&'a str, ApiError> {
    body.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError(Error::InvalidRequest(format!("missing field: {name}"))))
}

pub async fn health(State(ctx): Ctx) -> Json<Value> {
    Json(json!({"ok": true, "emergency": ctx.emergency_active()}))
}

pub async fn list_games(State(ctx): Ctx) -> Json<Value> {
    Json(json!({"games": ctx.registry.list()}))
}

pub async fn list_matches(State(ctx): Ctx) -> Json<Value> {
    Json(json!({"matches": ctx.list_matches().await}))
}

pub async fn match_detail(State(ctx): Ctx, Path(match_id): Path<String>) -> ApiResult<Json<Value>> {
    let detail = ctx.match_detail(&match_id).await?;
    Ok(Json(json!(detail)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveQuery {
    game_id: Option<String>,
    limit: Option<u32>,
    offset: Option<u32>,
}

pub async fn archive(State(ctx): Ctx, Query(query): Query<ArchiveQuery>) -> ApiResult<Json<Value>> {
    let matches = ctx
        .storage
        .list_archive(
            query.game_id.as_deref(),
            query.limit.unwrap_or(20).min(100),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(json!({"matches": matches})))
}

#[derive(Deserialize)]
pub struct EnsResolveBody {
    addresses: Vec<String>,
}

pub async fn ens_resolve(
    State(ctx): Ctx,
    Json(body): Json<EnsResolveBody>,
) -> ApiResult<Json<Value>> {
    let names = ctx.resolve_ens(&body.addresses).await?;
    Ok(Json(json!({"names": names})))
}

pub async fn matchmaking_join(State(ctx): Ctx, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let player = player_auth(&body)?;
    let game_id = field(&body, "gameId")?;
    let stake = body
        .get("stake")
        .and_then(Value::as_str)
        .unwrap_or("0");
    let outcome = ctx.join_queue(&player, game_id, stake).await?;
    Ok(Json(json!(outcome)))
}

pub async fn matchmaking_leave(
    State(ctx): Ctx,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let ticket = field(&body, "ticket")?;
    let removed = ctx.leave_queue(ticket).await?;
    Ok(Json(json!({"removed": removed})))
}

pub async fn queues(State(ctx): Ctx) -> ApiResult<Json<Value>> {
    let snapshot = ctx.queue_snapshot().await?;
    Ok(Json(json!({"queues": snapshot})))
}

pub async fn private_create(State(ctx): Ctx, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let player = player_auth(&body)?;
    let game_id = field(&body, "gameId")?;
    let stake = body.get("stake").and_then(Value::as_str).unwrap_or("0");
    let created = ctx.create_private_match(&player, game_id, stake).await?;
    Ok(Json(json!(created)))
}

pub async fn private_accept(State(ctx): Ctx, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let player = player_auth(&body)?;
    let invite_code = field(&body, "inviteCode")?;
    let accepted = ctx.accept_private_match(&player, invite_code).await?;
    Ok(Json(json!(accepted)))
}

pub async fn active_match(State(ctx): Ctx, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let player = player_auth(&body)?;
    let entry = ctx.check_active_match(&player).await?;
    Ok(Json(match entry {
        Some(entry) => json!({"active": true, "match": entry}),
        None => json!({"active": false}),
    }))
}

#[derive(Deserialize)]
pub struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

pub async fn leaderboard(State(ctx): Ctx, Query(query): Query<PageQuery>) -> ApiResult<Json<Value>> {
    let entries = ctx
        .storage
        .leaderboard(None, query.limit.unwrap_or(20).min(100), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(json!({"leaderboard": entries})))
}

pub async fn leaderboard_game(
    State(ctx): Ctx,
    Path(game_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let entries = ctx
        .storage
        .leaderboard(
            Some(&game_id),
            query.limit.unwrap_or(20).min(100),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(json!({"leaderboard": entries})))
}

pub async fn minimum_stake(State(ctx): Ctx) -> ApiResult<Json<Value>> {
    let minimum = ctx.minimum_stake().await?;
    Ok(Json(json!({"minimumStake": minimum.to_string()})))
}

pub async fn admin_emergency_draw_all(
    State(ctx): Ctx,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    admin_auth(&ctx.config, &headers)?;
    let drawn = ctx.emergency_draw_all().await;
    Ok(Json(json!({"emergency": true, "drawn": drawn})))
}

pub async fn admin_emergency_resume(
    State(ctx): Ctx,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    admin_auth(&ctx.config, &headers)?;
    ctx.emergency_resume();
    Ok(Json(json!({"emergency": false})))
}

pub async fn admin_emergency_status(
    State(ctx): Ctx,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    admin_auth(&ctx.config, &headers)?;
    Ok(Json(json!({"emergency": ctx.emergency_active()})))
}

pub async fn ws_game(
    State(ctx): Ctx,
    Path(match_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_game_session(socket, ctx.clone(), match_id))
}

pub async fn ws_spectate(
    State(ctx): Ctx,
    Path(match_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_spectator_session(socket, ctx.clone(), match_id))
}
