use gavel_protocol::{AuctionPhase, ItemId, ItemStatus, PlayerId, RoomCode};
use thiserror::Error;

/// Errors produced by room lookups and auction operations.
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomCode),

    #[error("room {0} is no longer running")]
    Unavailable(RoomCode),

    #[error("only the auctioneer can do that")]
    NotAuctioneer,

    #[error("the auctioneer cannot bid")]
    AuctioneerCannotBid,

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("session could not be restored: {0}")]
    SessionInvalid(String),

    #[error("no item with id {0}")]
    UnknownItem(ItemId),

    #[error("item {item} is not available: {status:?}")]
    ItemUnavailable { item: ItemId, status: ItemStatus },

    #[error("cannot {operation} while the auction is {phase}")]
    WrongPhase {
        operation: &'static str,
        phase: AuctionPhase,
    },

    #[error("bid of {amount} is below the minimum of {min_allowed}")]
    BidTooLow { amount: u64, min_allowed: u64 },

    #[error("bid of {amount} exceeds your remaining budget of {budget}")]
    InsufficientBudget { amount: u64, budget: u64 },

    #[error("invalid value: {0}")]
    InvalidValue(String),
}
