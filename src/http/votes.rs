use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::models::vote::VoteResponse;
use crate::state::AppState;
use crate::voting::client_ip::ClientHints;

pub fn router() -> Router<AppState> {
    Router::new().route("/submit", post(submit_vote))
}

/// Always answers 200. The body is taken raw so malformed JSON and bad
/// content types become `invalid_input` instead of an extractor rejection.
async fn submit_vote(
    State(state): State<AppState>,
    hints: ClientHints,
    body: Bytes,
) -> Json<VoteResponse> {
    let outcome = state.intake.submit(&body, &hints).await;
    Json(VoteResponse::from(outcome))
}
