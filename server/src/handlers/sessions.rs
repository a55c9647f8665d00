use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use uuid::Uuid;

use crate::services::{CreateSession, EditSession};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSession>,
) -> Result<Response, AppError> {
    let session = state.scheduler.create_session(&req).await?;
    Ok(created(session, "Event session created"))
}

pub async fn edit_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<EditSession>,
) -> Result<Response, AppError> {
    let session = state.scheduler.edit_session(session_id, &req).await?;
    Ok(success(session, "Event session updated"))
}

pub async fn session_tickets(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, AppError> {
    if state.store.find_session(session_id).await?.is_none() {
        return Err(AppError::NotFound(format!(
            "Event session '{}' was not found",
            session_id
        )));
    }
    let tickets = state.store.find_session_tickets(session_id).await?;
    Ok(success(tickets, "Tickets retrieved"))
}
