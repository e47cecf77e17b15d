//! Core data model for the planning board.
//!
//! Orders come from the external feed and are never persisted. Loads,
//! priorities, line assignments, and outfeed queues are owned by storage.

mod board;
mod order;
mod status;

pub use board::{BoardState, LineAssignment, Outfeed, OutfeedId, QueueEntry, Queues};
pub use order::{LineKey, Order, OrderState};
pub use status::{OutfeedStatus, PackingStatus, UnknownStatus};
