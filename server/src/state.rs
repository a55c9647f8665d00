use std::sync::Arc;

use chrono::Duration;

use crate::config::Config;
use crate::services::{Clock, OrderManager, ReservationManager, SessionScheduler};
use crate::store::BookingStore;

/// Shared handler state. Cloned per request, so everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub scheduler: Arc<SessionScheduler>,
    pub reservations: Arc<ReservationManager>,
    pub orders: Arc<OrderManager>,
    pub default_hold: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            scheduler: Arc::new(SessionScheduler::new(
                Arc::clone(&store),
                Arc::clone(&clock),
            )),
            reservations: Arc::new(ReservationManager::new(
                Arc::clone(&store),
                Arc::clone(&clock),
            )),
            orders: Arc::new(OrderManager::new(
                Arc::clone(&store),
                clock,
                config.order_life_time,
            )),
            store,
            default_hold: config.hold_duration,
        }
    }
}
