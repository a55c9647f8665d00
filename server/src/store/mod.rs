//! Persistence boundary for the booking core.
//!
//! [`BookingStore`] is the only way services and the expiry sweeper touch
//! persisted state. Every method that changes more than one row runs as a
//! single transaction, and every seat status change is conditional on the
//! status the caller expects, so concurrent actors cannot double-allocate
//! or double-release a ticket.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Bron, BronTariff, Event, EventSession, NewBron, NewOrder, Order, SeatTemplate,
    SeatTemplateChair, SessionDraft, Ticket, TicketDraft,
};
use crate::utils::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgBookingStore;

/// Outcome of one order reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrderReap {
    pub orders_deleted: u64,
    pub holds_cancelled: u64,
    pub tickets_released: u64,
}

/// Outcome of one hold reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HoldReap {
    pub holds_cancelled: u64,
    pub tickets_released: u64,
}

/// Outcome of one session deactivation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionReap {
    pub sessions_deactivated: u64,
    pub tickets_deactivated: u64,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_event(&self, id: Uuid) -> AppResult<Option<Event>>;

    async fn find_session(&self, id: Uuid) -> AppResult<Option<EventSession>>;

    async fn find_seat_template(&self, id: Uuid) -> AppResult<Option<SeatTemplate>>;

    async fn find_template_chairs(&self, template_id: Uuid) -> AppResult<Vec<SeatTemplateChair>>;

    async fn find_ticket(&self, id: Uuid) -> AppResult<Option<Ticket>>;

    async fn find_session_tickets(&self, session_id: Uuid) -> AppResult<Vec<Ticket>>;

    async fn find_tariff(&self, id: Uuid) -> AppResult<Option<BronTariff>>;

    async fn find_bron(&self, id: Uuid) -> AppResult<Option<Bron>>;

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>>;

    /// Active, non-deleted sessions at `venue_id` whose interval conflicts
    /// with `[start, end]`, optionally ignoring the session `exclude_id`.
    async fn find_conflicting_sessions(
        &self,
        venue_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Vec<EventSession>>;

    /// Persist a session and its tickets together.
    ///
    /// The venue conflict check is repeated inside the write so that two
    /// racing requests cannot both claim the same slot.
    ///
    /// # Errors
    ///
    /// `SchedulingConflict` if the slot was taken in the meantime.
    async fn insert_session(
        &self,
        draft: &SessionDraft,
        tickets: &[TicketDraft],
        now: DateTime<Utc>,
    ) -> AppResult<EventSession>;

    /// Move an existing session, re-checking conflicts while ignoring itself.
    async fn update_session(
        &self,
        id: Uuid,
        draft: &SessionDraft,
        now: DateTime<Utc>,
    ) -> AppResult<EventSession>;

    /// Flip the ticket VACANT -> HELD and record an ACTIVE hold for it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the ticket does not exist
    /// - `Conflict` if the ticket is not vacant or no longer active
    async fn hold_ticket(&self, hold: &NewBron) -> AppResult<Bron>;

    /// ACTIVE -> CANCEL for the hold and HELD -> VACANT for its ticket.
    async fn cancel_hold(&self, bron_id: Uuid, now: DateTime<Utc>) -> AppResult<Bron>;

    /// Record an order over tickets the user currently holds.
    ///
    /// A hold counts only while it is ACTIVE and its `expire_time` has not
    /// passed `order.created_at`, whether or not the sweeper has reaped it yet.
    ///
    /// # Errors
    ///
    /// `Conflict` if any ticket lacks a live hold of this user or is
    /// already part of another unfinished order.
    async fn insert_order(&self, order: &NewOrder) -> AppResult<Order>;

    /// Mark the order finished: holds become CONFIRMED, tickets SOLD.
    ///
    /// # Errors
    ///
    /// `Conflict` if the order is already finished or any of its holds
    /// expired before `now`.
    async fn finish_order(&self, order_id: Uuid, now: DateTime<Utc>) -> AppResult<Order>;

    /// Release and delete unfinished, expiring orders created before `cutoff`.
    ///
    /// Tickets are reverted before the orders are removed.
    async fn reap_expired_orders(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<OrderReap>;

    /// Cancel every ACTIVE hold whose `expire_time` is before `now` and free its ticket.
    async fn reap_expired_holds(&self, now: DateTime<Utc>) -> AppResult<HoldReap>;

    /// Flag tariffs whose window closed before `now` as inactive. Returns rows changed.
    async fn disable_expired_tariffs(&self, now: DateTime<Utc>) -> AppResult<u64>;

    /// Flag sessions that ended before `now`, and their tickets, as inactive.
    async fn deactivate_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<SessionReap>;
}
