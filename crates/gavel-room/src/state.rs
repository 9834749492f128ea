//! In-memory room state: players, inventory, and the current lot.
//!
//! [`GameState`] is owned exclusively by a room task, so none of this
//! needs locking. The auction operations themselves live in
//! [`crate::engine`]; this module is the data and its bookkeeping.

use std::collections::HashMap;

use gavel_protocol::{
    AuctionPhase, Item, ItemId, PlayerId, PlayerSummary, RoomSnapshot, ServerEvent, Settings,
    TimerView, WonItem,
};
use tokio::sync::mpsc;

use crate::ids::generate_player_id;

/// The outbound half of a client connection: events pushed here are
/// serialized and written to the socket by the connection's writer task.
pub type ClientSender = mpsc::UnboundedSender<ServerEvent>;

/// Display names are clipped to this many characters.
pub const MAX_NAME_LEN: usize = 20;

/// A live socket bound to a player.
///
/// The `id` is the server-assigned connection id. A reconnect binds a new
/// connection with a new id; the old socket's eventual disconnect then
/// no-ops instead of unbinding the fresh one.
#[derive(Debug, Clone)]
pub struct ConnBinding {
    pub id: u64,
    pub sender: ClientSender,
}

/// One participant, auctioneer included. Identity and budget survive
/// disconnects; only the connection binding comes and goes.
#[derive(Debug)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub budget: u64,
    pub won_items: Vec<WonItem>,
    pub conn: Option<ConnBinding>,
}

impl Player {
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            name: self.name.clone(),
            budget: self.budget,
            won_items: self.won_items.clone(),
        }
    }
}

/// Trims and clips a display name. Returns `None` when nothing is left,
/// so the caller can fall back to a default.
pub(crate) fn clip_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_NAME_LEN).collect())
}

/// The full mutable state of one auction room.
#[derive(Debug)]
pub struct GameState {
    pub(crate) items: Vec<Item>,
    pub(crate) next_item_id: u64,
    pub(crate) players: HashMap<PlayerId, Player>,
    pub(crate) current_lot: Option<ItemId>,
    pub(crate) current_highest_bid: u64,
    pub(crate) current_highest_bidder: Option<PlayerId>,
    pub(crate) phase: AuctionPhase,
    pub(crate) settings: Settings,
    pub(crate) timer: TimerView,
}

impl GameState {
    pub fn new(settings: Settings) -> Self {
        Self {
            items: Vec::new(),
            next_item_id: 1,
            players: HashMap::new(),
            current_lot: None,
            current_highest_bid: 0,
            current_highest_bidder: None,
            phase: AuctionPhase::Idle,
            settings,
            timer: TimerView::default(),
        }
    }

    /// Adds a new player with the room's current starting budget and
    /// returns their freshly generated id.
    ///
    /// `name` falls back to `default_name` when absent or blank.
    pub fn add_player(&mut self, name: Option<&str>, default_name: &str) -> PlayerId {
        let id = generate_player_id();
        let name = name
            .and_then(clip_name)
            .unwrap_or_else(|| default_name.to_string());
        self.players.insert(
            id.clone(),
            Player {
                id: id.clone(),
                name,
                budget: self.settings.starting_budget,
                won_items: Vec::new(),
                conn: None,
            },
        );
        id
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn player_mut(&mut self, id: &PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    /// The display name for a player, or a placeholder for ids that are
    /// no longer (or never were) in the room.
    pub fn player_name(&self, id: &PlayerId) -> String {
        self.players
            .get(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "someone".to_string())
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub(crate) fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    /// The item currently on the block, if any.
    pub fn lot(&self) -> Option<&Item> {
        self.current_lot.and_then(|id| self.item(id))
    }

    pub fn phase(&self) -> AuctionPhase {
        self.phase
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// True when no participant has a live connection. The room is then
    /// eligible for removal.
    pub fn is_deserted(&self) -> bool {
        !self.players.values().any(Player::is_connected)
    }

    /// Builds the client-facing snapshot embedded in broadcasts.
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            items: self.items.clone(),
            current_lot: self.current_lot,
            current_highest_bid: self.current_highest_bid,
            current_highest_bidder: self.current_highest_bidder.clone(),
            phase: self.phase,
            settings: self.settings,
            timer: self.timer,
            players: self
                .players
                .iter()
                .map(|(id, p)| (id.clone(), p.summary()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_name_trims_and_truncates() {
        assert_eq!(clip_name("  Jane  "), Some("Jane".to_string()));
        let long = "a".repeat(40);
        assert_eq!(clip_name(&long).unwrap().len(), MAX_NAME_LEN);
        assert_eq!(clip_name("   "), None);
        assert_eq!(clip_name(""), None);
    }

    #[test]
    fn test_add_player_uses_default_name_when_blank() {
        let mut state = GameState::new(Settings::default());
        let id = state.add_player(Some("   "), "Bidder 1");
        assert_eq!(state.player(&id).unwrap().name, "Bidder 1");
        assert_eq!(state.player(&id).unwrap().budget, 5000);
    }

    #[test]
    fn test_add_player_budget_follows_current_settings() {
        let mut state = GameState::new(Settings::default());
        state.settings.starting_budget = 750;
        let id = state.add_player(None, "Bidder 1");
        assert_eq!(state.player(&id).unwrap().budget, 750);
    }

    #[test]
    fn test_snapshot_reflects_players_and_phase() {
        let mut state = GameState::new(Settings::default());
        let a = state.add_player(Some("Ann"), "Bidder 1");
        let snap = state.snapshot();
        assert_eq!(snap.phase, AuctionPhase::Idle);
        assert_eq!(snap.players.len(), 1);
        assert_eq!(snap.players[&a].name, "Ann");
    }

    #[test]
    fn test_is_deserted_ignores_never_connected_players() {
        let mut state = GameState::new(Settings::default());
        state.add_player(Some("Ann"), "Bidder 1");
        assert!(state.is_deserted());
    }
}
