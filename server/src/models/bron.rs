use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "bron_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BronStatus {
    Active,
    Cancel,
    Confirmed,
}

/// A time-bounded hold on one ticket.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Bron {
    pub id: Uuid,
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub bron_tariff_id: Uuid,
    pub expire_time: DateTime<Utc>,
    pub status: BronStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Bron {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == BronStatus::Active && self.expire_time < now
    }

    /// ACTIVE and not yet past `expire_time`, regardless of whether a sweep ran.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == BronStatus::Active && self.expire_time >= now
    }
}

#[derive(Debug, Clone)]
pub struct NewBron {
    pub user_id: Uuid,
    pub ticket_id: Uuid,
    pub bron_tariff_id: Uuid,
    pub expire_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Pricing window a hold is taken under.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BronTariff {
    pub id: Uuid,
    pub name: String,
    pub expire_time: DateTime<Utc>,
    pub active: bool,
}

impl BronTariff {
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.expire_time < now
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_elapsed(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bron(status: BronStatus, expire_time: DateTime<Utc>) -> Bron {
        let now = Utc::now();
        Bron {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            ticket_id: Uuid::new_v4(),
            bron_tariff_id: Uuid::new_v4(),
            expire_time,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_only_active_brons_expire() {
        let now = Utc::now();
        let past = now - Duration::minutes(1);

        assert!(bron(BronStatus::Active, past).is_expired(now));
        assert!(!bron(BronStatus::Cancel, past).is_expired(now));
        assert!(!bron(BronStatus::Confirmed, past).is_expired(now));
        assert!(!bron(BronStatus::Active, now + Duration::minutes(1)).is_expired(now));
    }

    #[test]
    fn test_unswept_expired_bron_is_not_live() {
        let now = Utc::now();

        assert!(bron(BronStatus::Active, now).is_live(now));
        assert!(!bron(BronStatus::Active, now - Duration::seconds(1)).is_live(now));
        assert!(!bron(BronStatus::Confirmed, now + Duration::minutes(5)).is_live(now));
    }

    #[test]
    fn test_disabled_tariff_is_not_usable() {
        let now = Utc::now();
        let tariff = BronTariff {
            id: Uuid::new_v4(),
            name: "early bird".to_string(),
            expire_time: now + Duration::days(1),
            active: false,
        };
        assert!(!tariff.is_usable(now));
    }
}
