use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ticket::SeatStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    /// Venue the event takes place at. Sessions conflict per venue.
    pub address_id: Uuid,
    pub title: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventSession {
    pub id: Uuid,
    pub event_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventSession {
    pub fn conflicts_with(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        intervals_conflict(self.start_time, self.end_time, start, end)
    }

    /// Whether the sweeper should flag this session (and its tickets) inactive.
    pub fn is_finished(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_time < now
    }
}

/// Inclusive overlap test used for venue scheduling.
///
/// Two closed intervals conflict when a boundary of one falls within the
/// other or one contains the other. Touching boundaries count as a conflict.
pub fn intervals_conflict(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    let within = |t: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>| start <= t && t <= end;

    within(b_start, a_start, a_end)
        || within(b_end, a_start, a_end)
        || within(a_start, b_start, b_end)
        || within(a_end, b_start, b_end)
}

/// Validated input for writing a session row.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub event_id: Uuid,
    pub venue_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SeatTemplate {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SeatTemplateChair {
    pub id: Uuid,
    pub seat_template_id: Uuid,
    pub section: String,
    #[serde(rename = "row")]
    pub seat_row: String,
    pub name: String,
    pub price: Decimal,
    pub status: Option<SeatStatus>,
}
