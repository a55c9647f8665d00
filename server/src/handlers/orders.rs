use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Order, OrderType};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct OrderBody {
    pub user_id: Uuid,
    pub ticket_ids: Vec<Uuid>,
    pub order_type: OrderType,
}

#[derive(Serialize)]
struct OrderView {
    #[serde(flatten)]
    order: Order,
    /// `None` for orders that never lapse.
    expires_at: Option<DateTime<Utc>>,
}

fn view(state: &AppState, order: Order) -> OrderView {
    OrderView {
        expires_at: state.orders.expires_at(&order),
        order,
    }
}

pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<OrderBody>,
) -> Result<Response, AppError> {
    let order = state
        .orders
        .create_order(body.user_id, &body.ticket_ids, body.order_type)
        .await?;
    Ok(created(view(&state, order), "Order created"))
}

pub async fn finish_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let order = state.orders.finish_order(order_id).await?;
    Ok(success(view(&state, order), "Order finished"))
}
