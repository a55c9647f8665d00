//! PostgreSQL implementation of [`BookingStore`].
//!
//! Multi-row operations run in one transaction. Seat transitions are
//! conditional `UPDATE`s on the expected current status, and the sweeper
//! passes are set-based statements whose predicate is re-evaluated by
//! Postgres at write time, so a payment racing a sweep cannot be undone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{BookingStore, HoldReap, OrderReap, SessionReap};
use crate::models::{
    ticket_ids_of, Bron, BronStatus, BronTariff, Event, EventSession, NewBron, NewOrder, Order,
    OrderType, SeatStatus, SeatTemplate, SeatTemplateChair, SessionDraft, Ticket, TicketDraft,
};
use crate::utils::error::{AppError, AppResult};

const SESSION_COLUMNS: &str =
    "id, event_id, start_time, end_time, active, deleted, created_at, updated_at";

const TICKET_COLUMNS: &str = "\
    id, event_session_id, section, seat_row, name, price, status, active, \
    created_at, updated_at";

const BRON_COLUMNS: &str =
    "id, user_id, ticket_id, bron_tariff_id, expire_time, status, created_at, updated_at";

const ORDER_COLUMNS: &str = "id, user_id, ticket_ids, order_type, finished, created_at";

/// Rows per multi-row ticket INSERT; keeps bind parameters well under the protocol limit.
const TICKET_INSERT_CHUNK: usize = 1000;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }
}

// ---------------------------------------------------------------------------
// Statement helpers, usable inside a transaction
// ---------------------------------------------------------------------------

/// Serializes schedule writes per venue until the surrounding transaction ends.
async fn lock_venue(conn: &mut PgConnection, venue_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(venue_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn conflicting_sessions(
    conn: &mut PgConnection,
    venue_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_id: Option<Uuid>,
) -> Result<Vec<EventSession>, sqlx::Error> {
    let query = "\
        SELECT es.id, es.event_id, es.start_time, es.end_time, es.active, es.deleted, \
               es.created_at, es.updated_at \
        FROM event_session es \
        JOIN event e ON es.event_id = e.id \
        WHERE e.address_id = $1 AND es.deleted = FALSE AND e.deleted = FALSE AND es.active \
          AND ($4::uuid IS NULL OR es.id <> $4) \
          AND ($2 BETWEEN es.start_time AND es.end_time \
               OR $3 BETWEEN es.start_time AND es.end_time \
               OR es.start_time BETWEEN $2 AND $3 \
               OR es.end_time BETWEEN $2 AND $3) \
        ORDER BY es.start_time";
    sqlx::query_as::<_, EventSession>(query)
        .bind(venue_id)
        .bind(start)
        .bind(end)
        .bind(exclude_id)
        .fetch_all(conn)
        .await
}

/// Conditional batch transition `from -> to`. Rows no longer in `from` are left alone.
async fn bulk_set_status(
    conn: &mut PgConnection,
    ticket_ids: &[Uuid],
    from: SeatStatus,
    to: SeatStatus,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if ticket_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(
        "UPDATE ticket SET status = $1, updated_at = $4 \
         WHERE id = ANY($2) AND status = $3",
    )
    .bind(to)
    .bind(ticket_ids)
    .bind(from)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

async fn bron_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Bron>, sqlx::Error> {
    let query = format!("SELECT {BRON_COLUMNS} FROM bron WHERE id = $1");
    sqlx::query_as::<_, Bron>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await
}

async fn find_expired_orders(
    conn: &mut PgConnection,
    before: DateTime<Utc>,
    exclude_type: OrderType,
) -> Result<Vec<Order>, sqlx::Error> {
    let query = format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE created_at < $1 AND finished = FALSE AND order_type <> $2 \
         ORDER BY created_at \
         FOR UPDATE SKIP LOCKED"
    );
    sqlx::query_as::<_, Order>(&query)
        .bind(before)
        .bind(exclude_type)
        .fetch_all(conn)
        .await
}

/// Cancels the ACTIVE holds each order's owner has on the order's tickets.
/// Returns the tickets whose hold was cancelled.
async fn cancel_order_holds(
    conn: &mut PgConnection,
    order_ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "UPDATE bron b SET status = $1, updated_at = $4 \
         FROM orders o \
         WHERE o.id = ANY($2) AND b.user_id = o.user_id \
           AND b.ticket_id = ANY(o.ticket_ids) AND b.status = $3 \
         RETURNING b.ticket_id",
    )
    .bind(BronStatus::Cancel)
    .bind(order_ids)
    .bind(BronStatus::Active)
    .bind(now)
    .fetch_all(conn)
    .await
}

async fn delete_orders(conn: &mut PgConnection, order_ids: &[Uuid]) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM orders WHERE id = ANY($1) AND finished = FALSE")
        .bind(order_ids)
        .execute(conn)
        .await?;
    Ok(result.rows_affected())
}

async fn find_expired_session_ids(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM event_session WHERE active AND end_time < $1 FOR UPDATE SKIP LOCKED",
    )
    .bind(now)
    .fetch_all(conn)
    .await
}

async fn deactivate_tickets(
    conn: &mut PgConnection,
    session_ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE ticket SET active = FALSE, updated_at = $2 \
         WHERE event_session_id = ANY($1) AND active",
    )
    .bind(session_ids)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

async fn deactivate_sessions(
    conn: &mut PgConnection,
    session_ids: &[Uuid],
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE event_session SET active = FALSE, updated_at = $2 \
         WHERE id = ANY($1) AND active",
    )
    .bind(session_ids)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find_event(&self, id: Uuid) -> AppResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, address_id, title, deleted FROM event WHERE id = $1 AND deleted = FALSE",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn find_session(&self, id: Uuid) -> AppResult<Option<EventSession>> {
        let query =
            format!("SELECT {SESSION_COLUMNS} FROM event_session WHERE id = $1 AND deleted = FALSE");
        let session = sqlx::query_as::<_, EventSession>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(session)
    }

    async fn find_seat_template(&self, id: Uuid) -> AppResult<Option<SeatTemplate>> {
        let template =
            sqlx::query_as::<_, SeatTemplate>("SELECT id, name FROM seat_template WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(template)
    }

    async fn find_template_chairs(&self, template_id: Uuid) -> AppResult<Vec<SeatTemplateChair>> {
        let chairs = sqlx::query_as::<_, SeatTemplateChair>(
            "SELECT id, seat_template_id, section, seat_row, name, price, status \
             FROM seat_template_chair WHERE seat_template_id = $1 \
             ORDER BY section, seat_row, name",
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(chairs)
    }

    async fn find_ticket(&self, id: Uuid) -> AppResult<Option<Ticket>> {
        let query = format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = $1");
        let ticket = sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(ticket)
    }

    async fn find_session_tickets(&self, session_id: Uuid) -> AppResult<Vec<Ticket>> {
        let query = format!(
            "SELECT {TICKET_COLUMNS} FROM ticket WHERE event_session_id = $1 \
             ORDER BY section, seat_row, name"
        );
        let tickets = sqlx::query_as::<_, Ticket>(&query)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(tickets)
    }

    async fn find_tariff(&self, id: Uuid) -> AppResult<Option<BronTariff>> {
        let tariff = sqlx::query_as::<_, BronTariff>(
            "SELECT id, name, expire_time, active FROM bron_tariff WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tariff)
    }

    async fn find_bron(&self, id: Uuid) -> AppResult<Option<Bron>> {
        let mut conn = self.pool.acquire().await?;
        Ok(bron_by_id(&mut conn, id).await?)
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<Order>> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let order = sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn find_conflicting_sessions(
        &self,
        venue_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_id: Option<Uuid>,
    ) -> AppResult<Vec<EventSession>> {
        let mut conn = self.pool.acquire().await?;
        Ok(conflicting_sessions(&mut conn, venue_id, start, end, exclude_id).await?)
    }

    async fn insert_session(
        &self,
        draft: &SessionDraft,
        tickets: &[TicketDraft],
        now: DateTime<Utc>,
    ) -> AppResult<EventSession> {
        let mut tx = self.pool.begin().await?;

        lock_venue(&mut tx, draft.venue_id).await?;
        let conflicts =
            conflicting_sessions(&mut tx, draft.venue_id, draft.start_time, draft.end_time, None)
                .await?;
        if !conflicts.is_empty() {
            return Err(AppError::SchedulingConflict(conflicts));
        }

        let query = format!(
            "INSERT INTO event_session (id, event_id, start_time, end_time, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             RETURNING {SESSION_COLUMNS}"
        );
        let session = sqlx::query_as::<_, EventSession>(&query)
            .bind(Uuid::new_v4())
            .bind(draft.event_id)
            .bind(draft.start_time)
            .bind(draft.end_time)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

        for chunk in tickets.chunks(TICKET_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO ticket \
                 (id, event_session_id, section, seat_row, name, price, status, created_at, updated_at) ",
            );
            builder.push_values(chunk, |mut row, ticket| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(session.id)
                    .push_bind(ticket.section.clone())
                    .push_bind(ticket.seat_row.clone())
                    .push_bind(ticket.name.clone())
                    .push_bind(ticket.price)
                    .push_bind(ticket.status)
                    .push_bind(now)
                    .push_bind(now);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(session)
    }

    async fn update_session(
        &self,
        id: Uuid,
        draft: &SessionDraft,
        now: DateTime<Utc>,
    ) -> AppResult<EventSession> {
        let mut tx = self.pool.begin().await?;

        lock_venue(&mut tx, draft.venue_id).await?;
        let conflicts = conflicting_sessions(
            &mut tx,
            draft.venue_id,
            draft.start_time,
            draft.end_time,
            Some(id),
        )
        .await?;
        if !conflicts.is_empty() {
            return Err(AppError::SchedulingConflict(conflicts));
        }

        let query = format!(
            "UPDATE event_session \
             SET event_id = $2, start_time = $3, end_time = $4, updated_at = $5 \
             WHERE id = $1 AND deleted = FALSE \
             RETURNING {SESSION_COLUMNS}"
        );
        let session = sqlx::query_as::<_, EventSession>(&query)
            .bind(id)
            .bind(draft.event_id)
            .bind(draft.start_time)
            .bind(draft.end_time)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Event session '{id}' was not found")))?;

        tx.commit().await?;
        Ok(session)
    }

    async fn hold_ticket(&self, hold: &NewBron) -> AppResult<Bron> {
        let mut tx = self.pool.begin().await?;

        let held = sqlx::query_scalar::<_, Uuid>(
            "UPDATE ticket SET status = $1, updated_at = $4 \
             WHERE id = $2 AND status = $3 AND active \
             RETURNING id",
        )
        .bind(SeatStatus::Held)
        .bind(hold.ticket_id)
        .bind(SeatStatus::Vacant)
        .bind(hold.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        if held.is_none() {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM ticket WHERE id = $1)",
            )
            .bind(hold.ticket_id)
            .fetch_one(&mut *tx)
            .await?;
            return Err(if exists {
                AppError::Conflict(format!("Ticket '{}' is not available", hold.ticket_id))
            } else {
                AppError::NotFound(format!("Ticket '{}' was not found", hold.ticket_id))
            });
        }

        let query = format!(
            "INSERT INTO bron \
                 (id, user_id, ticket_id, bron_tariff_id, expire_time, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7) \
             RETURNING {BRON_COLUMNS}"
        );
        let bron = sqlx::query_as::<_, Bron>(&query)
            .bind(Uuid::new_v4())
            .bind(hold.user_id)
            .bind(hold.ticket_id)
            .bind(hold.bron_tariff_id)
            .bind(hold.expire_time)
            .bind(BronStatus::Active)
            .bind(hold.created_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(bron)
    }

    async fn cancel_hold(&self, bron_id: Uuid, now: DateTime<Utc>) -> AppResult<Bron> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            "UPDATE bron SET status = $1, updated_at = $4 \
             WHERE id = $2 AND status = $3 \
             RETURNING {BRON_COLUMNS}"
        );
        let cancelled = sqlx::query_as::<_, Bron>(&query)
            .bind(BronStatus::Cancel)
            .bind(bron_id)
            .bind(BronStatus::Active)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(bron) = cancelled else {
            return Err(match bron_by_id(&mut tx, bron_id).await? {
                Some(existing) => AppError::Conflict(format!(
                    "Hold '{bron_id}' is already {:?}",
                    existing.status
                )),
                None => AppError::NotFound(format!("Hold '{bron_id}' was not found")),
            });
        };

        bulk_set_status(&mut tx, &[bron.ticket_id], SeatStatus::Held, SeatStatus::Vacant, now)
            .await?;

        tx.commit().await?;
        Ok(bron)
    }

    async fn insert_order(&self, order: &NewOrder) -> AppResult<Order> {
        let mut tx = self.pool.begin().await?;

        let held = sqlx::query_scalar::<_, Uuid>(
            "SELECT ticket_id FROM bron \
             WHERE status = $1 AND user_id = $2 AND ticket_id = ANY($3) AND expire_time >= $4 \
             FOR UPDATE",
        )
        .bind(BronStatus::Active)
        .bind(order.user_id)
        .bind(&order.ticket_ids[..])
        .bind(order.created_at)
        .fetch_all(&mut *tx)
        .await?;

        let missing: Vec<Uuid> = order
            .ticket_ids
            .iter()
            .filter(|id| !held.contains(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Conflict(format!(
                "Tickets are not held by this user: {}",
                join_ids(&missing)
            )));
        }

        let taken = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM orders WHERE finished = FALSE AND ticket_ids && $1",
        )
        .bind(&order.ticket_ids[..])
        .fetch_all(&mut *tx)
        .await?;
        if !taken.is_empty() {
            return Err(AppError::Conflict(format!(
                "Tickets already belong to order(s): {}",
                join_ids(&taken)
            )));
        }

        let query = format!(
            "INSERT INTO orders (id, user_id, ticket_ids, order_type, finished, created_at) \
             VALUES ($1, $2, $3, $4, FALSE, $5) \
             RETURNING {ORDER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Order>(&query)
            .bind(Uuid::new_v4())
            .bind(order.user_id)
            .bind(&order.ticket_ids[..])
            .bind(order.order_type)
            .bind(order.created_at)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn finish_order(&self, order_id: Uuid, now: DateTime<Utc>) -> AppResult<Order> {
        let mut tx = self.pool.begin().await?;

        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let order = sqlx::query_as::<_, Order>(&query)
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order '{order_id}' was not found")))?;
        if order.finished {
            return Err(AppError::Conflict(format!(
                "Order '{order_id}' is already finished"
            )));
        }

        let confirmed = sqlx::query_scalar::<_, Uuid>(
            "UPDATE bron SET status = $1, updated_at = $5 \
             WHERE status = $2 AND user_id = $3 AND ticket_id = ANY($4) AND expire_time >= $5 \
             RETURNING ticket_id",
        )
        .bind(BronStatus::Confirmed)
        .bind(BronStatus::Active)
        .bind(order.user_id)
        .bind(&order.ticket_ids[..])
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;
        if confirmed.len() != order.ticket_ids.len() {
            // Dropping the transaction rolls the partial confirmation back.
            return Err(AppError::Conflict(format!(
                "Holds for order '{order_id}' have lapsed"
            )));
        }

        bulk_set_status(&mut tx, &order.ticket_ids, SeatStatus::Held, SeatStatus::Sold, now)
            .await?;

        let query = format!("UPDATE orders SET finished = TRUE WHERE id = $1 RETURNING {ORDER_COLUMNS}");
        let finished = sqlx::query_as::<_, Order>(&query)
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(finished)
    }

    async fn reap_expired_orders(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<OrderReap> {
        let mut tx = self.pool.begin().await?;

        let orders = find_expired_orders(&mut tx, cutoff, OrderType::PayAfter).await?;
        if orders.is_empty() {
            return Ok(OrderReap::default());
        }
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        tracing::debug!(
            orders = orders.len(),
            tickets = ticket_ids_of(&orders).len(),
            "Reaping expired orders"
        );

        // Seats first, rows second: a crash in between leaves orphan orders, never stuck seats.
        let freed = cancel_order_holds(&mut tx, &order_ids, now).await?;
        let tickets_released =
            bulk_set_status(&mut tx, &freed, SeatStatus::Held, SeatStatus::Vacant, now).await?;
        let orders_deleted = delete_orders(&mut tx, &order_ids).await?;

        tx.commit().await?;
        Ok(OrderReap {
            orders_deleted,
            holds_cancelled: freed.len() as u64,
            tickets_released,
        })
    }

    async fn reap_expired_holds(&self, now: DateTime<Utc>) -> AppResult<HoldReap> {
        let mut tx = self.pool.begin().await?;

        let tickets = sqlx::query_scalar::<_, Uuid>(
            "UPDATE bron SET status = $1, updated_at = $3 \
             WHERE status = $2 AND expire_time < $3 \
             RETURNING ticket_id",
        )
        .bind(BronStatus::Cancel)
        .bind(BronStatus::Active)
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let tickets_released =
            bulk_set_status(&mut tx, &tickets, SeatStatus::Held, SeatStatus::Vacant, now).await?;

        tx.commit().await?;
        Ok(HoldReap {
            holds_cancelled: tickets.len() as u64,
            tickets_released,
        })
    }

    async fn disable_expired_tariffs(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result =
            sqlx::query("UPDATE bron_tariff SET active = FALSE WHERE active AND expire_time < $1")
                .bind(now)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn deactivate_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<SessionReap> {
        let mut tx = self.pool.begin().await?;

        let session_ids = find_expired_session_ids(&mut tx, now).await?;
        if session_ids.is_empty() {
            return Ok(SessionReap::default());
        }

        let tickets_deactivated = deactivate_tickets(&mut tx, &session_ids, now).await?;
        let sessions_deactivated = deactivate_sessions(&mut tx, &session_ids, now).await?;

        tx.commit().await?;
        Ok(SessionReap {
            sessions_deactivated,
            tickets_deactivated,
        })
    }
}
