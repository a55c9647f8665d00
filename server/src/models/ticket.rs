use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Sale state of a single seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "seat_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    #[default]
    Vacant,
    Held,
    Sold,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_session_id: Uuid,
    pub section: String,
    #[serde(rename = "row")]
    pub seat_row: String,
    pub name: String,
    pub price: Decimal,
    pub status: SeatStatus,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A seat about to be materialized for a session that does not exist yet.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketDraft {
    pub section: String,
    pub seat_row: String,
    pub name: String,
    pub price: Decimal,
    pub status: SeatStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeatTemplateChair;
    use sqlx::postgres::PgRow;

    fn decodes_from_pg_row<T: for<'r> FromRow<'r, PgRow>>() {}

    #[test]
    fn test_seat_row_types_decode_from_rows() {
        decodes_from_pg_row::<Ticket>();
        decodes_from_pg_row::<SeatTemplateChair>();
    }

    #[test]
    fn test_seat_row_is_exposed_as_row() {
        let now = Utc::now();
        let ticket = Ticket {
            id: Uuid::new_v4(),
            event_session_id: Uuid::new_v4(),
            section: "A".to_string(),
            seat_row: "7".to_string(),
            name: "12".to_string(),
            price: Decimal::new(2500, 2),
            status: SeatStatus::Vacant,
            active: true,
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["row"], "7");
        assert!(json.get("seat_row").is_none());
        assert_eq!(json["status"], "VACANT");
    }
}
