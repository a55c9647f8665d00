//! Orders: bundling held tickets for payment.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::clock::Clock;
use crate::models::{NewOrder, Order, OrderType};
use crate::store::BookingStore;
use crate::utils::error::{AppError, AppResult};

pub struct OrderManager {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    order_life_time: Duration,
}

impl OrderManager {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, order_life_time: Duration) -> Self {
        Self {
            store,
            clock,
            order_life_time,
        }
    }

    /// Bundle tickets the user currently holds into an unpaid order.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        ticket_ids: &[Uuid],
        order_type: OrderType,
    ) -> AppResult<Order> {
        let mut unique: Vec<Uuid> = Vec::with_capacity(ticket_ids.len());
        for id in ticket_ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        if unique.is_empty() {
            return Err(AppError::ValidationError(
                "An order needs at least one ticket".to_string(),
            ));
        }

        let order = self
            .store
            .insert_order(&NewOrder {
                user_id,
                ticket_ids: unique,
                order_type,
                created_at: self.clock.now(),
            })
            .await?;

        tracing::info!(
            order_id = %order.id,
            tickets = order.ticket_ids.len(),
            order_type = ?order.order_type,
            expires_at = ?self.expires_at(&order),
            "Order created"
        );
        Ok(order)
    }

    /// Record a successful payment: holds are confirmed and seats sold.
    pub async fn finish_order(&self, order_id: Uuid) -> AppResult<Order> {
        let order = self.store.finish_order(order_id, self.clock.now()).await?;
        tracing::info!(order_id = %order.id, tickets = order.ticket_ids.len(), "Order finished");
        Ok(order)
    }

    pub fn expires_at(&self, order: &Order) -> Option<DateTime<Utc>> {
        order.expires_at(self.order_life_time)
    }
}
