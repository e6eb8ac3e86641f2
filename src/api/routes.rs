use crate::api::api_error::APIError;
use crate::api::model::{TokenResult, UpdateRecordRequest, UpdateRecordResult};
use crate::api::remote_user::RemoteUser;
use crate::api::server::AppState;
use crate::error::Error;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/zone_file", get(read_zone).put(write_zone))
        .route("/reset_zone", post(reset_zone))
        .route("/token", get(read_token))
        .route("/token/reset", post(reset_token))
        .route("/update", get(update))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

async fn read_zone(
    State(state): State<AppState>,
    RemoteUser(username): RemoteUser,
) -> Result<String, APIError> {
    Ok(state.zones.get_user_zonefile(&username).await?)
}

async fn write_zone(
    State(state): State<AppState>,
    RemoteUser(username): RemoteUser,
    zone_data: String,
) -> Result<StatusCode, APIError> {
    state.zones.set_user_zonefile(&username, zone_data).await?;
    tracing::info!("accepted zone update from {username}");
    Ok(StatusCode::NO_CONTENT)
}

async fn reset_zone(
    State(state): State<AppState>,
    RemoteUser(username): RemoteUser,
) -> Result<StatusCode, APIError> {
    state.zones.reset_user_zonefile(&username).await?;
    tracing::info!("reset zone of {username}");
    Ok(StatusCode::NO_CONTENT)
}

async fn read_token(
    State(state): State<AppState>,
    RemoteUser(username): RemoteUser,
) -> Result<Json<TokenResult>, APIError> {
    let token = state.zones.user_token(&username).await?;
    Ok(Json(TokenResult { token }))
}

async fn reset_token(
    State(state): State<AppState>,
    RemoteUser(username): RemoteUser,
) -> Result<Json<TokenResult>, APIError> {
    let token = state.zones.reset_user_token(&username).await?;
    Ok(Json(TokenResult { token }))
}

async fn update(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    WithRejection(Query(payload), _): WithRejection<Query<UpdateRecordRequest>, Error>,
) -> Result<Json<UpdateRecordResult>, APIError> {
    let ip = payload.ip.unwrap_or_else(|| client_addr.ip());
    let IpAddr::V4(addr) = ip else {
        tracing::debug!("rejected update from {client_addr}: {ip} is not IPv4");
        return Err(Error::NotIPv4(ip).into());
    };

    let (username, fqdn) = state
        .zones
        .update_a_record_with_token(&payload.token, &payload.hostname, addr)
        .await?;
    tracing::info!("accepted update from {client_addr} for {username}: \"{fqdn}\" A {addr}");
    Ok(Json(UpdateRecordResult {
        hostname: fqdn.to_string(),
        ip,
    }))
}
