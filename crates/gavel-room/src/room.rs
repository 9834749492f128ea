//! Room actor: an isolated Tokio task that owns one auction.
//!
//! Each room runs in its own task, communicating with the outside world
//! through an mpsc channel. This is the "actor model" — no shared
//! mutable state, just message passing. Because the round countdown is
//! polled inside the same `select!` loop that applies bids, a timer
//! expiry and a last-second bid can never interleave.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use gavel_assist::{query_with_fallback, Assistant};
use gavel_protocol::{
    AuctionPhase, ItemId, ItemSpec, PlayerId, Role, RoomCode, RoomSnapshot, ServerEvent, Settings,
    TimerView,
};
use gavel_timer::{Countdown, CountdownEvent};
use tokio::sync::{mpsc, oneshot};

use crate::error::RoomError;
use crate::state::{ClientSender, ConnBinding, GameState};

/// An auction operation requested by a player, already stripped of its
/// session envelope. The room actor authorizes and applies these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomOp {
    AddItem { name: String, base_price: u64 },
    AddItems { items: Vec<ItemSpec> },
    SelectItem { item_id: ItemId },
    StartBidding,
    PlaceBid { amount: u64 },
    FinalizeItem,
    ClearAuction,
    UpdateSettings { settings: Settings },
    SetName { name: String },
    AskAssistant { text: String },
}

/// Capacity of a room's command channel.
const COMMAND_BUFFER: usize = 64;

/// How long the assistant gets before the fallback reply is used.
const ASSIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Commands sent to a room actor through its channel.
///
/// The `oneshot::Sender` in some variants is a reply channel — the
/// caller sends a command and waits for the response on it. Auction
/// operations themselves are fire-and-forget: their results come back
/// as [`ServerEvent`]s on the players' connection channels.
pub(crate) enum RoomCommand {
    /// Add a new bidder and bind their connection.
    Join {
        conn_id: u64,
        sender: ClientSender,
        name: Option<String>,
        reply: oneshot::Sender<(PlayerId, RoomSnapshot)>,
    },

    /// Rebind an existing player identity to a fresh connection.
    Reconnect {
        conn_id: u64,
        sender: ClientSender,
        player_id: PlayerId,
        role: Role,
        name: Option<String>,
        reply: oneshot::Sender<Result<RoomSnapshot, RoomError>>,
    },

    /// Apply an auction operation on behalf of a player.
    Op { caller: PlayerId, op: RoomOp },

    /// A player's connection closed. Replies whether the room is now
    /// deserted (no live connections left).
    Disconnect {
        player_id: PlayerId,
        conn_id: u64,
        reply: oneshot::Sender<bool>,
    },

    /// Request the current room snapshot.
    GetSnapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },

    /// Shut down the room if no participant is still connected.
    /// Replies whether the actor actually stopped.
    ShutdownIfDeserted { reply: oneshot::Sender<bool> },
}

/// Handle to a running room actor. Used to send commands to it.
///
/// Cheap to clone — it's just an `mpsc::Sender` wrapper plus the room
/// code. The registry holds one of these per room.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the room's code.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Adds a new bidder to the room, binding their connection.
    pub async fn join(
        &self,
        conn_id: u64,
        sender: ClientSender,
        name: Option<String>,
    ) -> Result<(PlayerId, RoomSnapshot), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join {
                conn_id,
                sender,
                name,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Resumes an existing player identity on a fresh connection.
    pub async fn reconnect(
        &self,
        conn_id: u64,
        sender: ClientSender,
        player_id: PlayerId,
        role: Role,
        name: Option<String>,
    ) -> Result<RoomSnapshot, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Reconnect {
                conn_id,
                sender,
                player_id,
                role,
                name,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?
    }

    /// Sends an auction operation to the room (fire-and-forget; the
    /// outcome arrives as events on the player's connection channel).
    pub async fn op(&self, caller: PlayerId, op: RoomOp) -> Result<(), RoomError> {
        self.sender
            .send(RoomCommand::Op { caller, op })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Reports a closed connection. Returns `true` when the room has no
    /// live connections left and should be removed from the registry.
    pub async fn disconnect(&self, player_id: PlayerId, conn_id: u64) -> Result<bool, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Disconnect {
                player_id,
                conn_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Requests the current room snapshot.
    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::GetSnapshot { reply: reply_tx })
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Asks the room to stop, which it only does while still deserted.
    /// A join or reconnect that slipped in ahead of this call keeps the
    /// room alive. Returns whether the actor stopped.
    pub(crate) async fn shutdown_if_deserted(&self) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .sender
            .send(RoomCommand::ShutdownIfDeserted { reply: reply_tx })
            .await
            .is_err()
        {
            // Channel closed means the actor is already gone.
            return true;
        }
        reply_rx.await.unwrap_or(true)
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<A: Assistant> {
    code: RoomCode,
    auctioneer_id: PlayerId,
    state: GameState,
    countdown: Countdown,
    assist: Arc<A>,
    next_bidder_seq: u64,
}

/// Spawns a room task with the creator bound as its auctioneer.
///
/// Returns the handle plus the auctioneer's id and the initial snapshot,
/// so the caller can answer the `create_room` request without a second
/// round trip.
pub(crate) fn spawn_room<A: Assistant>(
    code: RoomCode,
    settings: Settings,
    assist: Arc<A>,
    conn_id: u64,
    sender: ClientSender,
    name: Option<String>,
) -> (RoomHandle, PlayerId, RoomSnapshot) {
    let mut state = GameState::new(settings);
    let auctioneer_id = state.add_player(name.as_deref(), "Auctioneer");
    if let Some(player) = state.player_mut(&auctioneer_id) {
        player.conn = Some(ConnBinding { id: conn_id, sender });
    }
    let snapshot = state.snapshot();

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = RoomActor {
        code: code.clone(),
        auctioneer_id: auctioneer_id.clone(),
        state,
        countdown: Countdown::new(),
        assist,
        next_bidder_seq: 1,
    };
    tokio::spawn(actor.run(cmd_rx));

    let handle = RoomHandle {
        code,
        sender: cmd_tx,
    };
    (handle, auctioneer_id, snapshot)
}

impl<A: Assistant> RoomActor<A> {
    /// Runs the actor loop, processing commands and the round countdown
    /// until shutdown.
    async fn run(mut self, mut receiver: mpsc::Receiver<RoomCommand>) {
        tracing::info!(room = %self.code, "room started");

        loop {
            tokio::select! {
                cmd = receiver.recv() => match cmd {
                    Some(RoomCommand::Join { conn_id, sender, name, reply }) => {
                        let result = self.handle_join(conn_id, sender, name);
                        let _ = reply.send(result);
                    }
                    Some(RoomCommand::Reconnect { conn_id, sender, player_id, role, name, reply }) => {
                        let result = self.handle_reconnect(conn_id, sender, player_id, role, name);
                        let _ = reply.send(result);
                    }
                    Some(RoomCommand::Op { caller, op }) => {
                        self.handle_op(caller, op);
                    }
                    Some(RoomCommand::Disconnect { player_id, conn_id, reply }) => {
                        self.handle_disconnect(&player_id, conn_id);
                        let _ = reply.send(self.state.is_deserted());
                    }
                    Some(RoomCommand::GetSnapshot { reply }) => {
                        let _ = reply.send(self.state.snapshot());
                    }
                    Some(RoomCommand::ShutdownIfDeserted { reply }) => {
                        if self.state.is_deserted() {
                            let _ = reply.send(true);
                            tracing::info!(room = %self.code, "room shutting down");
                            break;
                        }
                        let _ = reply.send(false);
                    }
                    None => {
                        tracing::info!(room = %self.code, "room shutting down");
                        break;
                    }
                },
                event = self.countdown.wait() => match event {
                    CountdownEvent::Tick { .. } => {
                        // Rebroadcast so clients can resync their local
                        // countdown display against ends_at_ms.
                        self.broadcast(ServerEvent::AuctionStateUpdate {
                            snapshot: self.state.snapshot(),
                        });
                    }
                    CountdownEvent::Expired => {
                        self.settle(true);
                    }
                },
            }
        }

        tracing::info!(room = %self.code, "room stopped");
    }

    fn handle_join(
        &mut self,
        conn_id: u64,
        sender: ClientSender,
        name: Option<String>,
    ) -> (PlayerId, RoomSnapshot) {
        let default_name = format!("Bidder {}", self.next_bidder_seq);
        self.next_bidder_seq += 1;
        let player_id = self.state.add_player(name.as_deref(), &default_name);
        if let Some(player) = self.state.player_mut(&player_id) {
            player.conn = Some(ConnBinding {
                id: conn_id,
                sender,
            });
        }
        let joined_name = self.state.player_name(&player_id);
        tracing::info!(room = %self.code, player = %player_id, name = %joined_name, "player joined");

        self.broadcast(ServerEvent::Info {
            message: format!("{joined_name} joined the room."),
        });
        self.broadcast_state();
        (player_id, self.state.snapshot())
    }

    fn handle_reconnect(
        &mut self,
        conn_id: u64,
        sender: ClientSender,
        player_id: PlayerId,
        role: Role,
        name: Option<String>,
    ) -> Result<RoomSnapshot, RoomError> {
        match role {
            Role::Auctioneer if player_id != self.auctioneer_id => {
                return Err(RoomError::SessionInvalid(
                    "not this room's auctioneer".into(),
                ));
            }
            Role::Player if player_id == self.auctioneer_id => {
                return Err(RoomError::SessionInvalid(
                    "that id belongs to the auctioneer".into(),
                ));
            }
            _ => {}
        }
        let player = self
            .state
            .player_mut(&player_id)
            .ok_or_else(|| RoomError::SessionInvalid("unknown player id".into()))?;

        // A new binding supersedes any stale one from the old socket.
        player.conn = Some(ConnBinding {
            id: conn_id,
            sender,
        });
        if role == Role::Player {
            if let Some(new_name) = name.as_deref().and_then(crate::state::clip_name) {
                player.name = new_name;
            }
        }
        let display = self.state.player_name(&player_id);
        tracing::info!(room = %self.code, player = %player_id, %role, "player reconnected");

        self.broadcast(ServerEvent::Info {
            message: format!("{display} reconnected."),
        });
        self.broadcast_state();
        Ok(self.state.snapshot())
    }

    fn handle_disconnect(&mut self, player_id: &PlayerId, conn_id: u64) {
        let Some(player) = self.state.player_mut(player_id) else {
            return;
        };
        match player.conn.as_ref().map(|b| b.id) {
            Some(id) if id == conn_id => player.conn = None,
            // A reconnect already rebound this player; the old socket's
            // close must not tear down the fresh binding.
            _ => return,
        }
        let name = self.state.player_name(player_id);
        tracing::info!(room = %self.code, player = %player_id, "player disconnected");

        if *player_id == self.auctioneer_id {
            // Without an auctioneer the current lot cannot be settled.
            let outcome = self.state.clear_auction();
            self.disarm_timer();
            if let Some((refunded, amount)) = outcome.refunded {
                self.send_to(&refunded, ServerEvent::Info {
                    message: format!("Your bid of {amount} credits was returned."),
                });
            }
            if outcome.item.is_some() {
                self.broadcast(ServerEvent::AuctionCleared {
                    message: "The auctioneer disconnected; the lot returns to the queue.".into(),
                    snapshot: self.state.snapshot(),
                });
            }
            self.broadcast(ServerEvent::Info {
                message: "The auctioneer disconnected.".into(),
            });
        } else {
            if self.state.retract_bidder(player_id) {
                // Their bid is withdrawn; give the rest of the room a
                // full round to react.
                if self.state.phase() == AuctionPhase::Bidding {
                    self.arm_timer();
                }
                self.broadcast(ServerEvent::Info {
                    message: format!("{name} left; their bid was withdrawn."),
                });
            } else {
                self.broadcast(ServerEvent::Info {
                    message: format!("{name} left the room."),
                });
            }
        }
        self.broadcast_state();
    }

    fn handle_op(&mut self, caller: PlayerId, op: RoomOp) {
        if let Err(e) = self.apply_op(&caller, op) {
            tracing::debug!(room = %self.code, player = %caller, error = %e, "operation rejected");
            self.send_to(&caller, ServerEvent::Error {
                message: e.to_string(),
            });
        }
    }

    fn apply_op(&mut self, caller: &PlayerId, op: RoomOp) -> Result<(), RoomError> {
        match op {
            RoomOp::AddItem { name, base_price } => {
                self.require_auctioneer(caller)?;
                let item = self.state.add_item(&name, base_price)?;
                tracing::info!(room = %self.code, item = %item.id, name = %item.name, "item added");
                self.broadcast(ServerEvent::ItemAdded {
                    item,
                    snapshot: self.state.snapshot(),
                });
            }
            RoomOp::AddItems { items } => {
                self.require_auctioneer(caller)?;
                let added = self.state.add_items(&items);
                tracing::info!(room = %self.code, count = added.len(), "batch items added");
                self.broadcast(ServerEvent::BatchItemsAdded {
                    count: added.len(),
                    snapshot: self.state.snapshot(),
                });
            }
            RoomOp::SelectItem { item_id } => {
                self.require_auctioneer(caller)?;
                let item = self.state.select_item(item_id)?;
                self.broadcast(ServerEvent::Info {
                    message: format!(
                        "'{}' is up for auction, starting at {} credits.",
                        item.name, item.base_price
                    ),
                });
                self.broadcast_state();
            }
            RoomOp::StartBidding => {
                self.require_auctioneer(caller)?;
                self.state.start_bidding()?;
                self.arm_timer();
                self.broadcast(ServerEvent::Info {
                    message: "Bidding is open!".into(),
                });
                self.broadcast_state();
            }
            RoomOp::PlaceBid { amount } => {
                if *caller == self.auctioneer_id {
                    return Err(RoomError::AuctioneerCannotBid);
                }
                let outcome = self.state.place_bid(caller, amount)?;
                // Soft close: any accepted bid restarts the full round.
                self.arm_timer();
                if let Some((outbid, refund)) = outcome.outbid {
                    self.send_to(&outbid, ServerEvent::Info {
                        message: format!(
                            "You were outbid; {refund} credits returned to your budget."
                        ),
                    });
                }
                let name = self.state.player_name(caller);
                let lot = self
                    .state
                    .lot()
                    .map(|i| i.name.clone())
                    .unwrap_or_default();
                self.broadcast(ServerEvent::PlayerBidUpdate {
                    player_id: caller.clone(),
                    name: name.clone(),
                    amount,
                    announcement: format!("{name} bids {amount} credits for '{lot}'."),
                    snapshot: self.state.snapshot(),
                });
            }
            RoomOp::FinalizeItem => {
                self.require_auctioneer(caller)?;
                // Settling anything but an open round is a rejected
                // no-op, never a broadcast.
                if self.state.phase() != AuctionPhase::Bidding {
                    return Err(RoomError::WrongPhase {
                        operation: "finalize",
                        phase: self.state.phase(),
                    });
                }
                self.settle(false);
            }
            RoomOp::ClearAuction => {
                self.require_auctioneer(caller)?;
                let outcome = self.state.clear_auction();
                self.disarm_timer();
                match outcome.item {
                    Some(item) => {
                        if let Some((refunded, amount)) = outcome.refunded {
                            self.send_to(&refunded, ServerEvent::Info {
                                message: format!(
                                    "Your bid of {amount} credits was returned."
                                ),
                            });
                        }
                        self.broadcast(ServerEvent::AuctionCleared {
                            message: format!("'{}' returns to the queue.", item.name),
                            snapshot: self.state.snapshot(),
                        });
                    }
                    None => {
                        self.send_to(caller, ServerEvent::Info {
                            message: "No auction in progress.".into(),
                        });
                    }
                }
            }
            RoomOp::UpdateSettings { settings } => {
                self.require_auctioneer(caller)?;
                self.state.update_settings(settings)?;
                self.broadcast(ServerEvent::SettingsUpdated {
                    settings,
                    snapshot: self.state.snapshot(),
                });
            }
            RoomOp::SetName { name } => {
                let new_name = self.state.rename_player(caller, &name)?;
                self.broadcast(ServerEvent::Info {
                    message: format!("A player is now known as {new_name}."),
                });
                self.broadcast_state();
            }
            RoomOp::AskAssistant { text } => {
                let Some(sender) = self
                    .state
                    .player(caller)
                    .and_then(|p| p.conn.as_ref())
                    .map(|c| c.sender.clone())
                else {
                    return Ok(());
                };
                let role = if *caller == self.auctioneer_id {
                    Role::Auctioneer
                } else {
                    Role::Player
                };
                let snapshot = self.state.snapshot();
                let assist = Arc::clone(&self.assist);
                // Queries run off-task so a slow assistant never stalls
                // the auction.
                tokio::spawn(async move {
                    let reply =
                        query_with_fallback(&*assist, &text, role, &snapshot, ASSIST_TIMEOUT)
                            .await;
                    let _ = sender.send(ServerEvent::LlmResponse { text: reply });
                });
            }
        }
        Ok(())
    }

    /// Settles the current lot and announces the outcome. `by_timer`
    /// distinguishes the countdown's hammer from the auctioneer's.
    fn settle(&mut self, by_timer: bool) {
        let outcome = match self.state.finalize() {
            Ok(o) => o,
            // Expiry races only against commands in the same loop, so a
            // lotless settle should not happen; log and move on.
            Err(e) => {
                tracing::warn!(room = %self.code, error = %e, "settlement skipped");
                return;
            }
        };
        self.disarm_timer();
        let (winner, final_bid, message) = match &outcome.winner {
            Some((winner_id, bid)) => {
                let name = self.state.player_name(winner_id);
                tracing::info!(
                    room = %self.code,
                    item = %outcome.item.id,
                    winner = %winner_id,
                    final_bid = bid,
                    by_timer,
                    "item sold"
                );
                (
                    Some(winner_id.clone()),
                    *bid,
                    format!("'{}' sold to {} for {} credits!", outcome.item.name, name, bid),
                )
            }
            None => {
                tracing::info!(room = %self.code, item = %outcome.item.id, by_timer, "no sale");
                let message = if by_timer {
                    format!("Time's up with no bids; '{}' returns to the queue.", outcome.item.name)
                } else {
                    format!("No bids; '{}' returns to the queue.", outcome.item.name)
                };
                (None, 0, message)
            }
        };
        self.broadcast(ServerEvent::ItemFinalized {
            item: outcome.item,
            winner,
            final_bid,
            by_timer,
            message,
            snapshot: self.state.snapshot(),
        });
    }

    fn require_auctioneer(&self, caller: &PlayerId) -> Result<(), RoomError> {
        if *caller == self.auctioneer_id {
            Ok(())
        } else {
            Err(RoomError::NotAuctioneer)
        }
    }

    /// Arms (or re-arms) the round countdown and refreshes the timer
    /// view that snapshots carry.
    fn arm_timer(&mut self) {
        let duration = Duration::from_secs(self.state.settings().round_duration_secs);
        self.countdown.arm(duration);
        self.state.timer = TimerView {
            active: true,
            ends_at_ms: unix_ms_after(duration),
        };
    }

    fn disarm_timer(&mut self) {
        self.countdown.cancel();
        self.state.timer = TimerView::default();
    }

    fn broadcast_state(&self) {
        self.broadcast(ServerEvent::AuctionStateUpdate {
            snapshot: self.state.snapshot(),
        });
    }

    fn broadcast(&self, event: ServerEvent) {
        for player in self.state.players.values() {
            if let Some(conn) = &player.conn {
                let _ = conn.sender.send(event.clone());
            }
        }
    }

    fn send_to(&self, player_id: &PlayerId, event: ServerEvent) {
        if let Some(conn) = self.state.player(player_id).and_then(|p| p.conn.as_ref()) {
            let _ = conn.sender.send(event);
        }
    }
}

/// Wall-clock Unix milliseconds `duration` from now, for the client-facing
/// timer view.
fn unix_ms_after(duration: Duration) -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|now| (now + duration).as_millis() as u64)
        .unwrap_or(0)
}
