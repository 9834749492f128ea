//! Auction room lifecycle for Gavel.
//!
//! Each room runs as an isolated Tokio task (actor model) owning its
//! inventory, players, escrow, and round countdown. The registry maps
//! room codes to running actors.
//!
//! # Key types
//!
//! - [`RoomRegistry`] — creates rooms, resolves codes, removes deserted rooms
//! - [`RoomHandle`] — send commands to a running room actor
//! - [`RoomOp`] — the auction operations a player can request
//! - [`GameState`] — one room's inventory, players, and current lot
//! - [`RoomError`] — why an operation was rejected

mod engine;
mod error;
mod ids;
mod registry;
mod room;
mod state;

pub use engine::{BidOutcome, ClearOutcome, SettlementOutcome};
pub use error::RoomError;
pub use registry::{RoomRegistry, ROOM_CODE_LEN};
pub use room::{RoomHandle, RoomOp};
pub use state::{ClientSender, ConnBinding, GameState, Player, MAX_NAME_LEN};
