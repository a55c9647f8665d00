//! Session scheduling: venue conflict detection and ticket materialization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::clock::Clock;
use crate::models::{EventSession, SeatStatus, SeatTemplateChair, SessionDraft, TicketDraft};
use crate::store::BookingStore;
use crate::utils::error::{AppError, AppResult};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSession {
    pub event_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub seat_template_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditSession {
    pub event_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

pub struct SessionScheduler {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
}

impl SessionScheduler {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Schedule a session and create one ticket per chair of the seat template.
    ///
    /// # Errors
    ///
    /// - `InvalidRange` if the session starts after it ends
    /// - `NotFound` if the event or seat template is missing
    /// - `SchedulingConflict` with the overlapping sessions at the venue
    pub async fn create_session(&self, req: &CreateSession) -> AppResult<EventSession> {
        let draft = self
            .draft(req.event_id, req.start_time, req.end_time)
            .await?;
        self.ensure_slot_free(&draft, None).await?;

        self.store
            .find_seat_template(req.seat_template_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Seat template '{}' was not found",
                    req.seat_template_id
                ))
            })?;
        let chairs = self.store.find_template_chairs(req.seat_template_id).await?;
        let tickets = materialize_tickets(&chairs);

        let session = self
            .store
            .insert_session(&draft, &tickets, self.clock.now())
            .await?;
        tracing::info!(
            session_id = %session.id,
            event_id = %session.event_id,
            tickets = tickets.len(),
            "Event session scheduled"
        );
        Ok(session)
    }

    /// Move a session in time or to another event, ignoring its own slot.
    pub async fn edit_session(&self, id: Uuid, req: &EditSession) -> AppResult<EventSession> {
        let draft = self
            .draft(req.event_id, req.start_time, req.end_time)
            .await?;
        self.store
            .find_session(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event session '{id}' was not found")))?;
        self.ensure_slot_free(&draft, Some(id)).await?;

        let session = self
            .store
            .update_session(id, &draft, self.clock.now())
            .await?;
        tracing::info!(session_id = %id, "Event session rescheduled");
        Ok(session)
    }

    async fn draft(
        &self,
        event_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> AppResult<SessionDraft> {
        if start_time > end_time {
            return Err(AppError::InvalidRange {
                start: start_time,
                end: end_time,
            });
        }
        let event = self
            .store
            .find_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;

        Ok(SessionDraft {
            event_id,
            venue_id: event.address_id,
            start_time,
            end_time,
        })
    }

    async fn ensure_slot_free(&self, draft: &SessionDraft, exclude_id: Option<Uuid>) -> AppResult<()> {
        let conflicts = self
            .store
            .find_conflicting_sessions(draft.venue_id, draft.start_time, draft.end_time, exclude_id)
            .await?;
        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(AppError::SchedulingConflict(conflicts))
        }
    }
}

/// One ticket per template chair.
///
/// A chair's default status carries over, except HELD: no hold backs a fresh
/// ticket, so it starts VACANT.
pub fn materialize_tickets(chairs: &[SeatTemplateChair]) -> Vec<TicketDraft> {
    chairs
        .iter()
        .map(|chair| TicketDraft {
            section: chair.section.clone(),
            seat_row: chair.seat_row.clone(),
            name: chair.name.clone(),
            price: chair.price,
            status: match chair.status {
                Some(SeatStatus::Sold) => SeatStatus::Sold,
                Some(SeatStatus::Held) | Some(SeatStatus::Vacant) | None => SeatStatus::Vacant,
            },
        })
        .collect()
}
