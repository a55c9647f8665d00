//! Periodic expiry reconciliation.
//!
//! [`ExpirySweeper`] reverts whatever outlived its deadline: stale unpaid
//! orders, lapsed holds, closed tariffs and finished sessions. The four
//! passes are independent. One failing does not stop the others, and since
//! each pass only matches rows still in the expired state, re-running it on
//! the next tick is safe.

use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use crate::store::{BookingStore, HoldReap, OrderReap, SessionReap};
use crate::utils::error::AppResult;

/// Default cadence between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPass {
    OrderReaper,
    HoldReaper,
    TariffDisabler,
    SessionDeactivator,
}

impl SweepPass {
    pub fn as_str(self) -> &'static str {
        match self {
            SweepPass::OrderReaper => "order_reaper",
            SweepPass::HoldReaper => "hold_reaper",
            SweepPass::TariffDisabler => "tariff_disabler",
            SweepPass::SessionDeactivator => "session_deactivator",
        }
    }
}

impl fmt::Display for SweepPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one tick did. A `None` outcome means the pass failed and is listed in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub orders: Option<OrderReap>,
    pub holds: Option<HoldReap>,
    pub tariffs_disabled: Option<u64>,
    pub sessions: Option<SessionReap>,
    pub failed: Vec<SweepPass>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ExpirySweeper {
    store: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    order_life_time: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, order_life_time: Duration) -> Self {
        Self {
            store,
            clock,
            order_life_time,
        }
    }

    /// Run all passes once against the clock's current time.
    pub async fn tick(&self) -> SweepReport {
        let now = self.clock.now();
        // A lifetime reaching past the earliest timestamp leaves nothing old enough to reap.
        let order_cutoff = now
            .checked_sub_signed(self.order_life_time)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let (orders, holds, tariffs, sessions) = tokio::join!(
            self.store.reap_expired_orders(order_cutoff, now),
            self.store.reap_expired_holds(now),
            self.store.disable_expired_tariffs(now),
            self.store.deactivate_expired_sessions(now),
        );

        let mut failed = Vec::new();
        let report = SweepReport {
            orders: settle(SweepPass::OrderReaper, orders, &mut failed),
            holds: settle(SweepPass::HoldReaper, holds, &mut failed),
            tariffs_disabled: settle(SweepPass::TariffDisabler, tariffs, &mut failed),
            sessions: settle(SweepPass::SessionDeactivator, sessions, &mut failed),
            failed,
        };

        if let Some(r) = report.orders.filter(|r| r.orders_deleted > 0) {
            tracing::info!(
                orders = r.orders_deleted,
                holds = r.holds_cancelled,
                tickets = r.tickets_released,
                "Expired orders removed"
            );
        }
        if let Some(r) = report.holds.filter(|r| r.holds_cancelled > 0) {
            tracing::info!(
                holds = r.holds_cancelled,
                tickets = r.tickets_released,
                "Expired holds cancelled"
            );
        }
        if let Some(n) = report.tariffs_disabled.filter(|n| *n > 0) {
            tracing::info!(tariffs = n, "Expired tariffs disabled");
        }
        if let Some(r) = report.sessions.filter(|r| r.sessions_deactivated > 0) {
            tracing::info!(
                sessions = r.sessions_deactivated,
                tickets = r.tickets_deactivated,
                "Finished sessions deactivated"
            );
        }
        tracing::debug!(%now, failed = report.failed.len(), "Sweep tick complete");

        report
    }

    /// Tick every `period` until `cancel` fires.
    ///
    /// Ticks never overlap: a tick that runs past `period` delays the next
    /// one and missed ticks are skipped rather than queued.
    pub async fn run(&self, period: StdDuration, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = period.as_secs(),
            order_life_time_ms = self.order_life_time.num_milliseconds(),
            "Expiry sweeper started"
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Expiry sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

fn settle<T>(pass: SweepPass, result: AppResult<T>, failed: &mut Vec<SweepPass>) -> Option<T> {
    match result {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::error!(
                pass = %pass,
                error = %e,
                transient = e.is_transient(),
                "Sweep pass failed, will retry next tick"
            );
            failed.push(pass);
            None
        }
    }
}
