use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    PayNow,
    /// Settled through another channel; never reaped by lifetime.
    PayAfter,
}

impl OrderType {
    pub fn expires(self) -> bool {
        self != OrderType::PayAfter
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticket_ids: Vec<Uuid>,
    pub order_type: OrderType,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Deadline after which an unpaid order is purged. `None` once paid or for types that never lapse.
    pub fn expires_at(&self, life_time: Duration) -> Option<DateTime<Utc>> {
        if self.finished || !self.order_type.expires() {
            return None;
        }
        self.created_at.checked_add_signed(life_time)
    }

    /// True when the order was created before `cutoff` and is still eligible for reaping.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        !self.finished && self.order_type.expires() && self.created_at < cutoff
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub ticket_ids: Vec<Uuid>,
    pub order_type: OrderType,
    pub created_at: DateTime<Utc>,
}

/// Every ticket referenced by `orders`, without duplicates, in first-seen order.
pub fn ticket_ids_of(orders: &[Order]) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = Vec::new();
    for order in orders {
        for id in &order.ticket_ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(order_type: OrderType, finished: bool, created_at: DateTime<Utc>) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticket_ids: vec![Uuid::new_v4()],
            order_type,
            finished,
            created_at,
        }
    }

    #[test]
    fn test_pay_after_never_goes_stale() {
        let created = Utc::now() - Duration::days(30);
        let o = order(OrderType::PayAfter, false, created);

        assert!(!o.is_stale(Utc::now()));
        assert_eq!(o.expires_at(Duration::minutes(10)), None);
    }

    #[test]
    fn test_expiry_beyond_calendar_is_none() {
        let o = order(OrderType::PayNow, false, Utc::now());
        assert_eq!(o.expires_at(Duration::MAX), None);
    }

    #[test]
    fn test_finished_order_is_not_stale() {
        let created = Utc::now() - Duration::hours(1);
        assert!(!order(OrderType::PayNow, true, created).is_stale(Utc::now()));
        assert!(order(OrderType::PayNow, false, created).is_stale(Utc::now()));
    }

    #[test]
    fn test_ticket_ids_of_deduplicates() {
        let shared = Uuid::new_v4();
        let mut a = order(OrderType::PayNow, false, Utc::now());
        let mut b = order(OrderType::PayNow, false, Utc::now());
        a.ticket_ids.push(shared);
        b.ticket_ids.push(shared);

        let ids = ticket_ids_of(&[a.clone(), b.clone()]);
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], a.ticket_ids[0]);
        assert_eq!(ids.iter().filter(|id| **id == shared).count(), 1);
    }
}
