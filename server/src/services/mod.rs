//! Booking core: scheduling, holds, orders and the expiry sweeper.

pub mod clock;
pub mod orders;
pub mod reservation;
pub mod scheduler;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use orders::OrderManager;
pub use reservation::{HoldRequest, ReservationManager};
pub use scheduler::{CreateSession, EditSession, SessionScheduler};
pub use sweeper::{ExpirySweeper, SweepPass, SweepReport};
