//! The room registry: creates rooms, resolves codes, and removes rooms
//! once every participant has disconnected.
//!
//! The registry is plain synchronous state; the server wraps it in a
//! mutex and holds the lock only long enough to resolve or insert a
//! handle. Rooms themselves run as independent tasks.

use std::collections::HashMap;
use std::sync::Arc;

use gavel_assist::Assistant;
use gavel_protocol::{PlayerId, RoomCode, RoomSnapshot, Settings};

use crate::ids::generate_room_code;
use crate::room::{spawn_room, RoomHandle};
use crate::state::ClientSender;

/// Length of generated room codes.
pub const ROOM_CODE_LEN: usize = 6;

/// Tracks every live room by code and spawns new ones.
pub struct RoomRegistry<A: Assistant> {
    rooms: HashMap<RoomCode, RoomHandle>,
    assist: Arc<A>,
    code_len: usize,
}

impl<A: Assistant> RoomRegistry<A> {
    /// Creates an empty registry sharing one assistant across all rooms.
    pub fn new(assist: Arc<A>) -> Self {
        Self {
            rooms: HashMap::new(),
            assist,
            code_len: ROOM_CODE_LEN,
        }
    }

    /// Spawns a new room with default settings, binding the creator as
    /// its auctioneer. Returns the handle, the auctioneer's id, and the
    /// initial snapshot.
    pub fn create_room(
        &mut self,
        conn_id: u64,
        sender: ClientSender,
        name: Option<String>,
    ) -> (RoomHandle, PlayerId, RoomSnapshot) {
        let code = self.unique_code();
        let (handle, auctioneer_id, snapshot) = spawn_room(
            code.clone(),
            Settings::default(),
            Arc::clone(&self.assist),
            conn_id,
            sender,
            name,
        );
        self.rooms.insert(code.clone(), handle.clone());
        tracing::info!(room = %code, rooms = self.rooms.len(), "room created");
        (handle, auctioneer_id, snapshot)
    }

    /// Resolves a room code to its handle.
    pub fn get(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.rooms.get(code).cloned()
    }

    /// Removes a room once its actor confirms it is still deserted.
    ///
    /// The deserted check has to happen inside the actor: a join can
    /// land between a disconnect reporting the room empty and this call
    /// taking effect, and that join must keep the room alive. Returns
    /// `false` when the code is unknown or the room refused to stop.
    pub async fn remove(&mut self, code: &RoomCode) -> bool {
        let Some(handle) = self.rooms.get(code) else {
            return false;
        };
        if !handle.shutdown_if_deserted().await {
            return false;
        }
        self.rooms.remove(code);
        tracing::info!(room = %code, rooms = self.rooms.len(), "room removed");
        true
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Generates a code no live room is using. Collisions are vanishingly
    /// rare at any realistic room count, so the retry loop is fine.
    fn unique_code(&self) -> RoomCode {
        loop {
            let code = generate_room_code(self.code_len);
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gavel_assist::CannedAssistant;
    use tokio::sync::mpsc;

    use super::*;

    fn registry() -> RoomRegistry<CannedAssistant> {
        RoomRegistry::new(Arc::new(CannedAssistant))
    }

    #[tokio::test]
    async fn test_create_room_registers_handle() {
        let mut reg = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, auctioneer_id, snapshot) = reg.create_room(1, tx, Some("Host".into()));
        assert_eq!(reg.room_count(), 1);
        assert!(reg.get(handle.code()).is_some());
        assert_eq!(snapshot.players[&auctioneer_id].name, "Host");
    }

    #[tokio::test]
    async fn test_get_unknown_code_is_none() {
        let reg = registry();
        assert!(reg.get(&RoomCode("NOPE22".into())).is_none());
    }

    #[tokio::test]
    async fn test_remove_requires_deserted_room() {
        let mut reg = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (handle, auctioneer, _) = reg.create_room(1, tx, None);
        let code = handle.code().clone();

        // The auctioneer is still connected, so the room stays.
        assert!(!reg.remove(&code).await);
        assert_eq!(reg.room_count(), 1);

        assert!(handle.disconnect(auctioneer, 1).await.unwrap());
        assert!(reg.remove(&code).await);
        assert_eq!(reg.room_count(), 0);
        assert!(!reg.remove(&code).await);
    }
}
