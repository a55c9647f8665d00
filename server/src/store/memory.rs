//! In-memory [`BookingStore`] for tests and local runs without Postgres.
//!
//! A single async mutex guards all tables, so every trait method is atomic
//! with respect to every other one. Transition rules match the Postgres
//! store statement for statement.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BookingStore, HoldReap, OrderReap, SessionReap};
use crate::models::{
    Bron, BronStatus, BronTariff, Event, EventSession, NewBron, NewOrder, Order, SeatStatus,
    SeatTemplate, SeatTemplateChair, SessionDraft, Ticket, TicketDraft,
};
use crate::utils::error::{AppError, AppResult};

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    sessions: HashMap<Uuid, EventSession>,
    templates: HashMap<Uuid, SeatTemplate>,
    chairs: Vec<SeatTemplateChair>,
    tickets: HashMap<Uuid, Ticket>,
    tariffs: HashMap<Uuid, BronTariff>,
    brons: HashMap<Uuid, Bron>,
    orders: HashMap<Uuid, Order>,
}

impl Tables {
    fn conflicting_sessions(
        &self,
        venue_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_id: Option<Uuid>,
    ) -> Vec<EventSession> {
        let mut found: Vec<EventSession> = self
            .sessions
            .values()
            .filter(|s| s.active && !s.deleted && Some(s.id) != exclude_id)
            .filter(|s| {
                self.events
                    .get(&s.event_id)
                    .is_some_and(|e| !e.deleted && e.address_id == venue_id)
            })
            .filter(|s| s.conflicts_with(start, end))
            .cloned()
            .collect();
        found.sort_by_key(|s| s.start_time);
        found
    }

    fn bulk_set_status(
        &mut self,
        ticket_ids: &[Uuid],
        from: SeatStatus,
        to: SeatStatus,
        now: DateTime<Utc>,
    ) -> u64 {
        let mut changed = 0;
        for id in ticket_ids {
            if let Some(ticket) = self.tickets.get_mut(id) {
                if ticket.status == from {
                    ticket.status = to;
                    ticket.updated_at = now;
                    changed += 1;
                }
            }
        }
        changed
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event at `venue_id`. Events are owned by an external catalogue.
    pub async fn add_event(&self, venue_id: Uuid, title: &str) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            address_id: venue_id,
            title: title.to_string(),
            deleted: false,
        };
        self.tables
            .lock()
            .await
            .events
            .insert(event.id, event.clone());
        event
    }

    pub async fn add_seat_template(&self, name: &str, chairs: &[TicketDraft]) -> SeatTemplate {
        let template = SeatTemplate {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        let mut tables = self.tables.lock().await;
        tables.chairs.extend(chairs.iter().map(|c| SeatTemplateChair {
            id: Uuid::new_v4(),
            seat_template_id: template.id,
            section: c.section.clone(),
            seat_row: c.seat_row.clone(),
            name: c.name.clone(),
            price: c.price,
            status: Some(c.status),
        }));
        tables.templates.insert(template.id, template.clone());
        template
    }

    pub async fn add_tariff(&self, name: &str, expire_time: DateTime<Utc>) -> BronTariff {
        let tariff = BronTariff {
            id: Uuid::new_v4(),
            name: name.to_string(),
            expire_time,
            active: true,
        };
        self.tables
            .lock()
            .await
            .tariffs
            .insert(tariff.id, tariff.clone());
        tariff
    }

    pub async fn tickets(&self) -> Vec<Ticket> {
        self.tables.lock().await.tickets.values().cloned().collect()
    }

    pub async fn brons(&self) -> Vec<Bron> {
        self.tables.lock().await.brons.values().cloned().collect()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.tables.lock().await.orders.values().cloned().collect()
    }

    pub async fn sessions(&self) -> Vec<EventSession> {
        self.tables.lock().await.sessions.values().cloned().collect()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_event(&self, id: Uuid) -> AppResult<Option<Event>> {
        let tables = self.tables.lock().await;
        Ok(tables.events.get(&id).filter(|e| !e.deleted).cloned())
    }

    async fn find_session(&self, id: Uuid) -> AppResult<Option<EventSession>> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.get(&id).filter(|s| !s.deleted).cloned())
    }

    async fn find_seat_template(&self, id: Uuid) -> AppResult<Option<SeatTemplate>> {
        Ok(self.tables.lock().await.templates.get(&id).cloned())
    }

    async fn find_template_chairs(&self, template_id: Uuid) -> AppResult<Vec<SeatTemplateChair>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .chairs
            .iter()
            .filter(|c| c.seat_template_id == template_id)
            .cloned()
            .collect())
    }

    async fn find_ticket(&self, id: Uuid) -> AppResult<Option<Ticket>> {
        Ok(self.tables.lock().await.tickets.get(&id).cloned())
    }

    async fn find_session_tickets(&self, session_id: Uuid) -> AppResult<Vec<Ticket>> {
        let tables = self.tables.lock().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.event_session_id == session_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| {
            (&a.section, &a.seat_row, &a.name).cmp(&(&b.section, &b.seat_row, &b.name))
        });
        Ok(tickets)
    }

    async fn find_tariff(&self, id: Uuid) -> AppResult<Option<BronTariff>> {
        Ok(self.tables.lock().await.tariffs.get(&id).cloned())
    }

    async fn find_bron(&self, id: Uuid) -> AppResult<Option<Bron>> {
        Ok(self.tables.lock().await.brons.get(&id).cloned())
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn find_conflicting_sessions(
        &self,
        venue_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Vec<EventSession>> {
        let tables = self.tables.lock().await;
        Ok(tables.conflicting_sessions(venue_id, start, end, exclude_id))
    }

    async fn insert_session(
        &self,
        draft: &SessionDraft,
        tickets: &[TicketDraft],
        now: DateTime<Utc>,
    ) -> AppResult<EventSession> {
        let mut tables = self.tables.lock().await;

        let conflicts =
            tables.conflicting_sessions(draft.venue_id, draft.start_time, draft.end_time, None);
        if !conflicts.is_empty() {
            return Err(AppError::SchedulingConflict(conflicts));
        }

        let session = EventSession {
            id: Uuid::new_v4(),
            event_id: draft.event_id,
            start_time: draft.start_time,
            end_time: draft.end_time,
            active: true,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        tables.sessions.insert(session.id, session.clone());

        for draft in tickets {
            let ticket = Ticket {
                id: Uuid::new_v4(),
                event_session_id: session.id,
                section: draft.section.clone(),
                seat_row: draft.seat_row.clone(),
                name: draft.name.clone(),
                price: draft.price,
                status: draft.status,
                active: true,
                created_at: now,
                updated_at: now,
            };
            tables.tickets.insert(ticket.id, ticket);
        }

        Ok(session)
    }

    async fn update_session(
        &self,
        id: Uuid,
        draft: &SessionDraft,
        now: DateTime<Utc>,
    ) -> AppResult<EventSession> {
        let mut tables = self.tables.lock().await;

        let conflicts =
            tables.conflicting_sessions(draft.venue_id, draft.start_time, draft.end_time, Some(id));
        if !conflicts.is_empty() {
            return Err(AppError::SchedulingConflict(conflicts));
        }

        let session = tables
            .sessions
            .get_mut(&id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| AppError::NotFound(format!("Event session '{id}' was not found")))?;
        session.event_id = draft.event_id;
        session.start_time = draft.start_time;
        session.end_time = draft.end_time;
        session.updated_at = now;
        Ok(session.clone())
    }

    async fn hold_ticket(&self, hold: &NewBron) -> AppResult<Bron> {
        let mut tables = self.tables.lock().await;

        let ticket = tables.tickets.get_mut(&hold.ticket_id).ok_or_else(|| {
            AppError::NotFound(format!("Ticket '{}' was not found", hold.ticket_id))
        })?;
        if !ticket.active || ticket.status != SeatStatus::Vacant {
            return Err(AppError::Conflict(format!(
                "Ticket '{}' is not available",
                hold.ticket_id
            )));
        }
        ticket.status = SeatStatus::Held;
        ticket.updated_at = hold.created_at;

        let bron = Bron {
            id: Uuid::new_v4(),
            user_id: hold.user_id,
            ticket_id: hold.ticket_id,
            bron_tariff_id: hold.bron_tariff_id,
            expire_time: hold.expire_time,
            status: BronStatus::Active,
            created_at: hold.created_at,
            updated_at: hold.created_at,
        };
        tables.brons.insert(bron.id, bron.clone());
        Ok(bron)
    }

    async fn cancel_hold(&self, bron_id: Uuid, now: DateTime<Utc>) -> AppResult<Bron> {
        let mut tables = self.tables.lock().await;

        let bron = tables
            .brons
            .get_mut(&bron_id)
            .ok_or_else(|| AppError::NotFound(format!("Hold '{bron_id}' was not found")))?;
        if bron.status != BronStatus::Active {
            return Err(AppError::Conflict(format!(
                "Hold '{bron_id}' is already {:?}",
                bron.status
            )));
        }
        bron.status = BronStatus::Cancel;
        bron.updated_at = now;
        let bron = bron.clone();

        tables.bulk_set_status(&[bron.ticket_id], SeatStatus::Held, SeatStatus::Vacant, now);
        Ok(bron)
    }

    async fn insert_order(&self, order: &NewOrder) -> AppResult<Order> {
        let mut tables = self.tables.lock().await;

        let held: HashSet<Uuid> = tables
            .brons
            .values()
            .filter(|b| b.is_live(order.created_at) && b.user_id == order.user_id)
            .map(|b| b.ticket_id)
            .collect();
        let missing: Vec<String> = order
            .ticket_ids
            .iter()
            .filter(|id| !held.contains(id))
            .map(Uuid::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Conflict(format!(
                "Tickets are not held by this user: {}",
                missing.join(", ")
            )));
        }

        let taken: Vec<String> = tables
            .orders
            .values()
            .filter(|o| !o.finished && o.ticket_ids.iter().any(|t| order.ticket_ids.contains(t)))
            .map(|o| o.id.to_string())
            .collect();
        if !taken.is_empty() {
            return Err(AppError::Conflict(format!(
                "Tickets already belong to order(s): {}",
                taken.join(", ")
            )));
        }

        let created = Order {
            id: Uuid::new_v4(),
            user_id: order.user_id,
            ticket_ids: order.ticket_ids.clone(),
            order_type: order.order_type,
            finished: false,
            created_at: order.created_at,
        };
        tables.orders.insert(created.id, created.clone());
        Ok(created)
    }

    async fn finish_order(&self, order_id: Uuid, now: DateTime<Utc>) -> AppResult<Order> {
        let mut tables = self.tables.lock().await;

        let order = tables
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Order '{order_id}' was not found")))?;
        if order.finished {
            return Err(AppError::Conflict(format!(
                "Order '{order_id}' is already finished"
            )));
        }

        let holds: Vec<Uuid> = tables
            .brons
            .values()
            .filter(|b| {
                b.is_live(now)
                    && b.user_id == order.user_id
                    && order.ticket_ids.contains(&b.ticket_id)
            })
            .map(|b| b.id)
            .collect();
        if holds.len() != order.ticket_ids.len() {
            return Err(AppError::Conflict(format!(
                "Holds for order '{order_id}' have lapsed"
            )));
        }

        for id in &holds {
            if let Some(bron) = tables.brons.get_mut(id) {
                bron.status = BronStatus::Confirmed;
                bron.updated_at = now;
            }
        }
        tables.bulk_set_status(&order.ticket_ids, SeatStatus::Held, SeatStatus::Sold, now);

        let stored = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("Order '{order_id}' was not found")))?;
        stored.finished = true;
        Ok(stored.clone())
    }

    async fn reap_expired_orders(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<OrderReap> {
        let mut tables = self.tables.lock().await;

        let expired: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.is_stale(cutoff))
            .cloned()
            .collect();
        if expired.is_empty() {
            return Ok(OrderReap::default());
        }

        let owned: HashSet<(Uuid, Uuid)> = expired
            .iter()
            .flat_map(|o| o.ticket_ids.iter().map(move |t| (o.user_id, *t)))
            .collect();

        let mut freed = Vec::new();
        for bron in tables.brons.values_mut() {
            if bron.status == BronStatus::Active && owned.contains(&(bron.user_id, bron.ticket_id)) {
                bron.status = BronStatus::Cancel;
                bron.updated_at = now;
                freed.push(bron.ticket_id);
            }
        }
        let tickets_released =
            tables.bulk_set_status(&freed, SeatStatus::Held, SeatStatus::Vacant, now);

        for order in &expired {
            tables.orders.remove(&order.id);
        }

        Ok(OrderReap {
            orders_deleted: expired.len() as u64,
            holds_cancelled: freed.len() as u64,
            tickets_released,
        })
    }

    async fn reap_expired_holds(&self, now: DateTime<Utc>) -> AppResult<HoldReap> {
        let mut tables = self.tables.lock().await;

        let mut freed = Vec::new();
        for bron in tables.brons.values_mut() {
            if bron.is_expired(now) {
                bron.status = BronStatus::Cancel;
                bron.updated_at = now;
                freed.push(bron.ticket_id);
            }
        }
        let tickets_released =
            tables.bulk_set_status(&freed, SeatStatus::Held, SeatStatus::Vacant, now);

        Ok(HoldReap {
            holds_cancelled: freed.len() as u64,
            tickets_released,
        })
    }

    async fn disable_expired_tariffs(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let mut disabled = 0;
        for tariff in tables.tariffs.values_mut() {
            if tariff.active && tariff.is_elapsed(now) {
                tariff.active = false;
                disabled += 1;
            }
        }
        Ok(disabled)
    }

    async fn deactivate_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<SessionReap> {
        let mut tables = self.tables.lock().await;

        let ended: HashSet<Uuid> = tables
            .sessions
            .values()
            .filter(|s| s.is_finished(now))
            .map(|s| s.id)
            .collect();
        if ended.is_empty() {
            return Ok(SessionReap::default());
        }

        let mut reap = SessionReap::default();
        for ticket in tables.tickets.values_mut() {
            if ticket.active && ended.contains(&ticket.event_session_id) {
                ticket.active = false;
                ticket.updated_at = now;
                reap.tickets_deactivated += 1;
            }
        }
        for id in &ended {
            if let Some(session) = tables.sessions.get_mut(id) {
                session.active = false;
                session.updated_at = now;
                reap.sessions_deactivated += 1;
            }
        }
        Ok(reap)
    }
}
