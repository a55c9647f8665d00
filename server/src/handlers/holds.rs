use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::Duration;
use serde::Deserialize;
use uuid::Uuid;

use crate::services::HoldRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct HoldBody {
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub tariff_id: Uuid,
    /// Falls back to the configured hold length.
    pub duration_secs: Option<i64>,
}

pub async fn create_hold(
    State(state): State<AppState>,
    Json(body): Json<HoldBody>,
) -> Result<Response, AppError> {
    let duration = match body.duration_secs {
        None => state.default_hold,
        Some(secs) => Duration::try_seconds(secs).ok_or_else(|| {
            AppError::ValidationError(format!("Hold duration of {} seconds is out of range", secs))
        })?,
    };

    let bron = state
        .reservations
        .hold_ticket(&HoldRequest {
            user_id: body.user_id,
            ticket_id: body.ticket_id,
            tariff_id: body.tariff_id,
            duration,
        })
        .await?;
    Ok(created(bron, "Ticket held"))
}

pub async fn cancel_hold(
    State(state): State<AppState>,
    Path(bron_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let bron = state.reservations.cancel_hold(bron_id).await?;
    Ok(success(bron, "Hold cancelled"))
}
