pub mod bron;
pub mod event;
pub mod order;
pub mod ticket;

pub use bron::{Bron, BronStatus, BronTariff, NewBron};
pub use event::{intervals_conflict, Event, EventSession, SeatTemplate, SeatTemplateChair, SessionDraft};
pub use order::{ticket_ids_of, NewOrder, Order, OrderType};
pub use ticket::{SeatStatus, Ticket, TicketDraft};
