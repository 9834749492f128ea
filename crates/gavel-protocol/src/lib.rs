//! Wire protocol for Gavel.
//!
//! This crate defines the "language" that auction clients and the server
//! speak:
//!
//! - **Types** ([`ClientMessage`], [`ServerEvent`], [`RoomSnapshot`], the
//!   identity newtypes) — the records that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those records are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding
//!   or decoding.
//!
//! The protocol layer sits between the transport (raw WebSocket frames)
//! and the room layer (auction state). It knows nothing about connections
//! or rooms — it only knows message shapes.
//!
//! Every message carries a `type` discriminator so browser clients can
//! switch on it directly. Broadcast events embed a [`RoomSnapshot`], the
//! *sanitized* view of room state: connection handles and timer scheduling
//! internals are never part of it.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AuctionPhase, ClientMessage, Item, ItemId, ItemSpec, ItemStatus,
    PlayerId, PlayerSummary, Role, RoomCode, RoomSnapshot, ServerEvent,
    Settings, TimerView, WonItem,
};
