//! Seat holds ("bron"): taking and releasing time-bounded reservations.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use super::clock::Clock;
use crate::models::{Bron, NewBron};
use crate::store::BookingStore;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct HoldRequest {
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub tariff_id: Uuid,
    pub duration: Duration,
}

pub struct ReservationManager {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl ReservationManager {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Hold a vacant ticket until `now + duration`.
    ///
    /// Of two concurrent requests for the same seat exactly one succeeds;
    /// the other gets `Conflict`.
    pub async fn hold_ticket(&self, req: &HoldRequest) -> AppResult<Bron> {
        if req.duration <= Duration::zero() {
            return Err(AppError::ValidationError(
                "Hold duration must be positive".to_string(),
            ));
        }

        let now = self.clock.now();
        let expire_time = now.checked_add_signed(req.duration).ok_or_else(|| {
            AppError::ValidationError(format!(
                "Hold duration of {} seconds is out of range",
                req.duration.num_seconds()
            ))
        })?;
        let tariff = self
            .store
            .find_tariff(req.tariff_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tariff '{}' was not found", req.tariff_id)))?;
        if !tariff.is_usable(now) {
            return Err(AppError::Conflict(format!(
                "Tariff '{}' is no longer available",
                tariff.name
            )));
        }

        let bron = self
            .store
            .hold_ticket(&NewBron {
                user_id: req.user_id,
                ticket_id: req.ticket_id,
                bron_tariff_id: tariff.id,
                expire_time,
                created_at: now,
            })
            .await?;

        tracing::info!(
            bron_id = %bron.id,
            ticket_id = %bron.ticket_id,
            expire_time = %bron.expire_time,
            "Ticket held"
        );
        Ok(bron)
    }

    /// Release a hold before it expires.
    pub async fn cancel_hold(&self, bron_id: Uuid) -> AppResult<Bron> {
        let bron = self.store.cancel_hold(bron_id, self.clock.now()).await?;
        tracing::info!(bron_id = %bron.id, ticket_id = %bron.ticket_id, "Hold cancelled");
        Ok(bron)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BronStatus, SeatStatus};
    use crate::services::fixtures::{assert_hold_invariant, Fixture};
    use assert_matches::assert_matches;

    fn hold(fx: &Fixture, ticket_id: Uuid, user_id: Uuid) -> HoldRequest {
        HoldRequest {
            user_id,
            ticket_id,
            tariff_id: fx.tariff.id,
            duration: Duration::minutes(5),
        }
    }

    #[tokio::test]
    async fn test_hold_marks_ticket_held_with_deadline() {
        let fx = Fixture::new().await;
        let (_, tickets) = fx.session_with_tickets().await;
        let user = Uuid::new_v4();

        let bron = fx
            .reservations()
            .hold_ticket(&hold(&fx, tickets[0].id, user))
            .await
            .unwrap();

        assert_eq!(bron.status, BronStatus::Active);
        assert_eq!(bron.expire_time, fx.clock.now() + Duration::minutes(5));
        let ticket = fx.store.find_ticket(tickets[0].id).await.unwrap().unwrap();
        assert_eq!(ticket.status, SeatStatus::Held);
        assert_hold_invariant(&fx.store).await;
    }

    #[tokio::test]
    async fn test_concurrent_holds_have_one_winner() {
        let fx = Fixture::new().await;
        let (_, tickets) = fx.session_with_tickets().await;
        let manager = Arc::new(fx.reservations());

        let a = {
            let manager = Arc::clone(&manager);
            let req = hold(&fx, tickets[0].id, Uuid::new_v4());
            tokio::spawn(async move { manager.hold_ticket(&req).await })
        };
        let b = {
            let manager = Arc::clone(&manager);
            let req = hold(&fx, tickets[0].id, Uuid::new_v4());
            tokio::spawn(async move { manager.hold_ticket(&req).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::Conflict(_)))));
        assert_hold_invariant(&fx.store).await;
    }

    #[tokio::test]
    async fn test_cancel_reverts_ticket_and_rejects_repeat() {
        let fx = Fixture::new().await;
        let (_, tickets) = fx.session_with_tickets().await;
        let manager = fx.reservations();
        let bron = manager
            .hold_ticket(&hold(&fx, tickets[0].id, Uuid::new_v4()))
            .await
            .unwrap();

        fx.clock.advance(Duration::minutes(1));
        let cancelled = manager.cancel_hold(bron.id).await.unwrap();
        assert_eq!(cancelled.status, BronStatus::Cancel);
        assert_eq!(cancelled.updated_at, fx.clock.now());
        let ticket = fx.store.find_ticket(tickets[0].id).await.unwrap().unwrap();
        assert_eq!(ticket.status, SeatStatus::Vacant);
        assert_eq!(ticket.updated_at, fx.clock.now());

        assert_matches!(manager.cancel_hold(bron.id).await, Err(AppError::Conflict(_)));
        assert_matches!(
            manager.cancel_hold(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        );
        assert_hold_invariant(&fx.store).await;
    }

    #[tokio::test]
    async fn test_rejects_bad_duration_tariff_and_ticket() {
        let fx = Fixture::new().await;
        let (_, tickets) = fx.session_with_tickets().await;
        let manager = fx.reservations();
        let user = Uuid::new_v4();

        let mut req = hold(&fx, tickets[0].id, user);
        req.duration = Duration::zero();
        assert_matches!(
            manager.hold_ticket(&req).await,
            Err(AppError::ValidationError(_))
        );

        let mut req = hold(&fx, tickets[0].id, user);
        req.duration = Duration::try_seconds(i64::MAX / 1000).unwrap();
        assert_matches!(
            manager.hold_ticket(&req).await,
            Err(AppError::ValidationError(_))
        );
        let ticket = fx.store.find_ticket(tickets[0].id).await.unwrap().unwrap();
        assert_eq!(ticket.status, SeatStatus::Vacant);

        let mut req = hold(&fx, tickets[0].id, user);
        req.tariff_id = Uuid::new_v4();
        assert_matches!(manager.hold_ticket(&req).await, Err(AppError::NotFound(_)));

        let stale = fx
            .store
            .add_tariff("last week", fx.clock.now() - Duration::days(7))
            .await;
        let mut req = hold(&fx, tickets[0].id, user);
        req.tariff_id = stale.id;
        assert_matches!(manager.hold_ticket(&req).await, Err(AppError::Conflict(_)));

        let req = hold(&fx, Uuid::new_v4(), user);
        assert_matches!(manager.hold_ticket(&req).await, Err(AppError::NotFound(_)));
    }
}
