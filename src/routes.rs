// src/routes.rs

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    error::{AppError, AppResult},
    models::StoredMessage,
    state::ChatState,
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Deserialize)]
pub struct UnreadQuery {
    pub username: Option<String>,
}

/// Unread private messages addressed to `username`.
pub async fn unread_handler(
    State(state): State<ChatState>,
    Query(UnreadQuery { username }): Query<UnreadQuery>,
) -> AppResult<Json<Vec<StoredMessage>>> {
    let username = required(username, "username")?;
    let unread = state.store.unread_for(&username).await?;
    Ok(Json(unread))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub message_ids: Vec<i64>,
}

pub async fn mark_read_handler(
    State(state): State<ChatState>,
    Json(MarkReadRequest { message_ids }): Json<MarkReadRequest>,
) -> AppResult<Json<Value>> {
    let updated = state.store.mark_read(&message_ids).await?;
    Ok(Json(json!({
        "message": "Messages marked as read",
        "updated": updated,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub user: Option<String>,
    pub peer: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HistoryPage {
    pub messages: Vec<StoredMessage>,
    pub total: i64,
}

/// One page of the private conversation between `user` and `peer`, newest page first.
pub async fn history_handler(
    State(state): State<ChatState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<HistoryPage>> {
    let user = required(query.user, "user")?;
    let peer = required(query.peer, "peer")?;

    let page = query.page.unwrap_or(1);
    if page < 1 {
        return Err(AppError::BadRequest("page must be at least 1".into()));
    }
    let page_size = query
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    if (page - 1).checked_mul(page_size).is_none() {
        return Err(AppError::BadRequest("page out of range".into()));
    }

    let messages = state
        .store
        .conversation(&user, &peer, page, page_size)
        .await?;
    let total = state.store.conversation_count(&user, &peer).await?;

    Ok(Json(HistoryPage { messages, total }))
}

pub async fn health_handler() -> &'static str {
    "ok"
}

fn required(value: Option<String>, name: &str) -> AppResult<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AppError::BadRequest(format!("{name} required"))),
    }
}
