// region:    --- Imports
use crate::auction::manager::AuctionManager;
use crate::error::{AuctionError, ErrorKind};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// endregion: --- Imports

pub type AppState = Arc<AuctionManager>;

// region:    --- Request Bodies
#[derive(Debug, Deserialize)]
pub struct CreateAuctionRequest {
    pub item_id: i64,
    pub seller_id: String,
    pub start_price: i64,
    pub duration_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub bidder_id: String,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct CancelAuctionRequest {
    pub requester_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AttachMessageRequest {
    pub message_id: String,
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}
// endregion: --- Request Bodies

// region:    --- Error Response
/// HTTP status for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Resource => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Fatal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AuctionError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if matches!(kind, ErrorKind::Transient | ErrorKind::Fatal) {
            warn!("{:<12} --> request failed: {}", "Handler", self);
        }
        (
            status_for(kind),
            Json(json!({
                "error": self.to_string(),
                "code": self.code(),
                "kind": kind.as_str(),
            })),
        )
            .into_response()
    }
}
// endregion: --- Error Response

// region:    --- Command Handlers
pub async fn handle_create_auction(
    State(manager): State<AppState>,
    Json(req): Json<CreateAuctionRequest>,
) -> Result<impl IntoResponse, AuctionError> {
    info!("{:<12} --> create auction: {:?}", "Handler", req);
    let auction = manager
        .create_auction(
            req.item_id,
            &req.seller_id,
            req.start_price,
            Duration::from_secs(req.duration_secs),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(auction)))
}

pub async fn handle_place_bid(
    State(manager): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(req): Json<PlaceBidRequest>,
) -> Result<impl IntoResponse, AuctionError> {
    let receipt = manager
        .place_bid(auction_id, &req.bidder_id, req.amount)
        .await?;
    Ok(Json(receipt))
}

pub async fn handle_cancel_auction(
    State(manager): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(req): Json<CancelAuctionRequest>,
) -> Result<impl IntoResponse, AuctionError> {
    info!(
        "{:<12} --> cancel auction {} by {}",
        "Handler", auction_id, req.requester_id
    );
    let auction = manager
        .cancel_auction(auction_id, &req.requester_id)
        .await?;
    Ok(Json(auction))
}

pub async fn handle_attach_message(
    State(manager): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(req): Json<AttachMessageRequest>,
) -> Result<impl IntoResponse, AuctionError> {
    manager
        .attach_message(auction_id, &req.message_id, &req.channel_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
// endregion: --- Command Handlers

// region:    --- Query Handlers
pub async fn handle_get_active_auctions(
    State(manager): State<AppState>,
) -> Result<impl IntoResponse, AuctionError> {
    Ok(Json(manager.get_active_auctions().await?))
}

pub async fn handle_get_auction(
    State(manager): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AuctionError> {
    Ok(Json(manager.get_by_id(auction_id).await?))
}

pub async fn handle_get_auction_by_code(
    State(manager): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AuctionError> {
    Ok(Json(manager.get_by_code(&code).await?))
}

pub async fn handle_get_auction_bids(
    State(manager): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Result<impl IntoResponse, AuctionError> {
    Ok(Json(manager.get_auction_bids(auction_id).await?))
}

pub async fn handle_get_bidder_bids(
    State(manager): State<AppState>,
    Path(bidder_id): Path<String>,
) -> Result<impl IntoResponse, AuctionError> {
    Ok(Json(manager.get_bidder_bids(&bidder_id).await?))
}

pub async fn handle_get_recent_completed(
    State(manager): State<AppState>,
    Path(item_id): Path<i64>,
    Query(query): Query<RecentQuery>,
) -> Result<impl IntoResponse, AuctionError> {
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    Ok(Json(manager.get_recent_completed(item_id, limit).await?))
}
// endregion: --- Query Handlers

// region:    --- Routes
pub fn routes(manager: AppState) -> Router {
    Router::new()
        .route(
            "/auctions",
            post(handle_create_auction).get(handle_get_active_auctions),
        )
        .route("/auctions/:id", get(handle_get_auction))
        .route("/auctions/code/:code", get(handle_get_auction_by_code))
        .route(
            "/auctions/:id/bids",
            post(handle_place_bid).get(handle_get_auction_bids),
        )
        .route("/auctions/:id/cancel", post(handle_cancel_auction))
        .route("/auctions/:id/message", post(handle_attach_message))
        .route("/bidders/:id/bids", get(handle_get_bidder_bids))
        .route("/items/:id/completed", get(handle_get_recent_completed))
        .with_state(manager)
}
// endregion: --- Routes

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuctionError::SelfBid.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuctionError::NotSeller(1).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuctionError::AuctionNotFound("GLF3K7".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuctionError::InsufficientBalance {
                available: 10,
                required: 600
            }
            .into_response()
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
