//! Core protocol types for Gavel's wire format.
//!
//! Everything here is serializable: these are the structures that travel
//! between the server and auction clients as JSON. Both message enums are
//! internally tagged (`#[serde(tag = "type")]`) so the client can dispatch
//! on a plain `type` string.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A short, human-enterable room code (e.g. `"K7WQ2N"`).
///
/// Assigned at room creation, immutable, and the key in the room registry.
/// Codes are never reused while a room with that code is still alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A server-issued player identity: a 32-character hex token.
///
/// This doubles as the bearer session id — a client that presents a known
/// `PlayerId` on reconnect resumes that player's budget and won items.
/// It is never derived from a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unique identifier for an auction item within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// The role a reconnecting client claims for its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Auctioneer,
    Player,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auctioneer => write!(f, "auctioneer"),
            Self::Player => write!(f, "player"),
        }
    }
}

// ---------------------------------------------------------------------------
// Auction domain types (wire-visible)
// ---------------------------------------------------------------------------

/// Lifecycle of a single item.
///
/// `Pending → Auctioning` when selected as the current lot;
/// `Auctioning → Sold` on settlement with a winner, or back to `Pending`
/// when the lot is cleared, times out with no bids, or the auctioneer
/// disconnects mid-auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Auctioning,
    Sold,
}

/// One item in a room's inventory. Items are append-only: they are never
/// removed, only status-transitioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub base_price: u64,
    pub status: ItemStatus,
}

/// An item a player has won, with the price they paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WonItem {
    pub item: Item,
    pub final_bid: u64,
}

/// A name/price pair used when adding items in bulk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub name: String,
    #[serde(default)]
    pub base_price: u64,
}

/// The auction round state machine:
///
/// ```text
/// Idle → ItemSelected → Bidding → Idle   (loop per lot)
/// ```
///
/// A current lot exists exactly when the phase is not `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionPhase {
    Idle,
    ItemSelected,
    Bidding,
}

impl AuctionPhase {
    /// Returns `true` if a lot is on the block (selected or under bids).
    pub fn has_lot(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for AuctionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::ItemSelected => write!(f, "item_selected"),
            Self::Bidding => write!(f, "bidding"),
        }
    }
}

/// Room settings, mutable by the auctioneer at any time.
///
/// `starting_budget` only affects players who join after the change;
/// `round_duration_secs` applies the next time the round timer is armed
/// or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub starting_budget: u64,
    pub min_increment_percent: u64,
    pub round_duration_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            starting_budget: 5000,
            min_increment_percent: 5,
            round_duration_secs: 30,
        }
    }
}

/// The client-facing view of the round timer.
///
/// This is a *view*, not the timer itself: the live countdown handle is
/// process-local scheduling state owned by the room task and is never
/// serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimerView {
    pub active: bool,
    /// Unix timestamp in milliseconds when the round ends. 0 when inactive.
    pub ends_at_ms: u64,
}

/// The public slice of a player: everything except their connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub name: String,
    pub budget: u64,
    pub won_items: Vec<WonItem>,
}

/// A sanitized snapshot of the full room state, embedded in every room
/// broadcast. Safe to hand to any client or to the assistant service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub items: Vec<Item>,
    pub current_lot: Option<ItemId>,
    pub current_highest_bid: u64,
    pub current_highest_bidder: Option<PlayerId>,
    pub phase: AuctionPhase,
    pub settings: Settings,
    pub timer: TimerView,
    pub players: BTreeMap<PlayerId, PlayerSummary>,
}

// ---------------------------------------------------------------------------
// Client → Server messages
// ---------------------------------------------------------------------------

/// Everything a client can ask the server to do.
///
/// The first three variants manage the connection's session binding; the
/// rest require the connection to already be bound to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Create a room and become its permanent auctioneer.
    CreateRoom,

    /// Join an existing room as a new bidder.
    JoinRoom {
        room_code: RoomCode,
        name: Option<String>,
    },

    /// Resume a pre-existing player identity after a reload or network
    /// blip. Any mismatch fails with a session error; the client must
    /// fall back to `create_room`/`join_room`.
    ReconnectSession {
        room_code: RoomCode,
        player_id: PlayerId,
        role: Role,
        name: Option<String>,
    },

    /// Auctioneer: append one item to the inventory.
    AddItem { name: String, base_price: u64 },

    /// Auctioneer: append a batch of items (e.g. pasted from a list).
    /// Blank names are filtered out.
    AddItems { items: Vec<ItemSpec> },

    /// Auctioneer: put a pending item on the block.
    SelectItem { item_id: ItemId },

    /// Auctioneer: open bidding on the selected lot and arm the timer.
    StartBidding,

    /// Bid on the current lot.
    PlaceBid { amount: u64 },

    /// Auctioneer: settle the current lot now (hammer down).
    FinalizeItem,

    /// Auctioneer: abandon the current lot without a sale.
    ClearAuction,

    /// Auctioneer: change room settings.
    UpdateSettings { settings: Settings },

    /// Change this player's display name.
    SetName { name: String },

    /// Ask the AI auctioneer assistant a question.
    AskAssistant { text: String },
}

// ---------------------------------------------------------------------------
// Server → Client events
// ---------------------------------------------------------------------------

/// Everything the server can tell a client.
///
/// Events that reflect a state change carry a full [`RoomSnapshot`] so
/// clients can re-render without tracking deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    // -- Session --
    /// Sent once when the connection is accepted.
    ClientIdAssigned { connection_id: u64 },

    RoomCreated {
        room_code: RoomCode,
        player_id: PlayerId,
        snapshot: RoomSnapshot,
    },

    JoinedRoom {
        room_code: RoomCode,
        player_id: PlayerId,
        snapshot: RoomSnapshot,
    },

    ReconnectedSession {
        room_code: RoomCode,
        player_id: PlayerId,
        role: Role,
        snapshot: RoomSnapshot,
    },

    RoomNotFound { room_code: RoomCode },

    /// A session-level rejection: already in a room, not in a room, or a
    /// reconnect identity mismatch.
    SessionError { message: String },

    // -- Inventory --
    ItemAdded { item: Item, snapshot: RoomSnapshot },

    BatchItemsAdded { count: usize, snapshot: RoomSnapshot },

    // -- Auction lifecycle --
    AuctionStateUpdate { snapshot: RoomSnapshot },

    /// A bid was accepted. `announcement` is the human-readable line for
    /// the room's event feed.
    PlayerBidUpdate {
        player_id: PlayerId,
        name: String,
        amount: u64,
        announcement: String,
        snapshot: RoomSnapshot,
    },

    /// The current lot was settled, with or without a sale.
    ItemFinalized {
        item: Item,
        winner: Option<PlayerId>,
        final_bid: u64,
        by_timer: bool,
        message: String,
        snapshot: RoomSnapshot,
    },

    AuctionCleared { message: String, snapshot: RoomSnapshot },

    SettingsUpdated { settings: Settings, snapshot: RoomSnapshot },

    // -- Advisory --
    Info { message: String },

    /// A rejected operation: authorization, validation, or state error.
    /// The room state is unchanged.
    Error { message: String },

    // -- Assistant pass-through --
    LlmResponse { text: String },
}

// =========================================================================
// Tests
// =========================================================================
