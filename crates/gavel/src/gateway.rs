//! Per-connection gateway: WebSocket accept, message routing, and
//! disconnect cleanup.
//!
//! Each accepted socket gets its own task running [`handle_connection`].
//! The socket is split in two: a reader loop that decodes
//! [`ClientMessage`]s and routes them, and a writer task that drains the
//! connection's event channel back onto the wire. Room actors only ever
//! see the channel sender, never the socket.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use gavel_assist::Assistant;
use gavel_protocol::{ClientMessage, Codec, PlayerId, ServerEvent};
use gavel_room::{ClientSender, RoomHandle, RoomOp};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::server::ServerState;
use crate::GavelError;

/// Counter for generating unique connection ids.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// The room this connection is bound to, once it has created, joined,
/// or reconnected into one. At most one room per connection.
struct Binding {
    room: RoomHandle,
    player_id: PlayerId,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, C>(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<ServerState<A, C>>,
) -> Result<(), GavelError>
where
    A: Assistant,
    C: Codec + Clone,
{
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let conn_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(conn = conn_id, %addr, "accepted connection");

    let (ws_sink, mut ws_stream) = ws.split();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_events(ws_sink, event_rx, state.codec.clone()));

    let _ = event_tx.send(ServerEvent::ClientIdAssigned {
        connection_id: conn_id,
    });

    let mut binding: Option<Binding> = None;

    while let Some(frame) = ws_stream.next().await {
        let data = match frame {
            Ok(Message::Text(text)) => text.as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Close(_)) => break,
            // Ping/pong are handled by tungstenite itself.
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(conn = conn_id, error = %e, "recv error");
                break;
            }
        };

        let msg: ClientMessage = match state.codec.decode(&data) {
            Ok(msg) => msg,
            // Malformed input never tears down the connection.
            Err(e) => {
                tracing::debug!(conn = conn_id, error = %e, "undecodable message");
                let _ = event_tx.send(ServerEvent::Error {
                    message: "could not parse message".into(),
                });
                continue;
            }
        };

        dispatch(msg, conn_id, &mut binding, &event_tx, &state).await;
    }

    // Tell the room this socket is gone; remove the room once every
    // participant has disconnected.
    if let Some(Binding { room, player_id }) = binding {
        if let Ok(true) = room.disconnect(player_id, conn_id).await {
            state.rooms.lock().await.remove(room.code()).await;
        }
    }
    tracing::debug!(conn = conn_id, "connection closed");

    drop(event_tx);
    let _ = writer.await;
    Ok(())
}

/// Routes one decoded message: session messages manage the binding, all
/// other messages become room operations.
async fn dispatch<A, C>(
    msg: ClientMessage,
    conn_id: u64,
    binding: &mut Option<Binding>,
    event_tx: &ClientSender,
    state: &Arc<ServerState<A, C>>,
) where
    A: Assistant,
    C: Codec + Clone,
{
    match msg {
        ClientMessage::CreateRoom => {
            if binding.is_some() {
                session_error(event_tx, "already in a room");
                return;
            }
            let (room, player_id, snapshot) = state
                .rooms
                .lock()
                .await
                .create_room(conn_id, event_tx.clone(), None);
            let room_code = room.code().clone();
            *binding = Some(Binding {
                room,
                player_id: player_id.clone(),
            });
            let _ = event_tx.send(ServerEvent::RoomCreated {
                room_code,
                player_id,
                snapshot,
            });
        }
        ClientMessage::JoinRoom { room_code, name } => {
            if binding.is_some() {
                session_error(event_tx, "already in a room");
                return;
            }
            let Some(room) = state.rooms.lock().await.get(&room_code) else {
                let _ = event_tx.send(ServerEvent::RoomNotFound { room_code });
                return;
            };
            match room.join(conn_id, event_tx.clone(), name).await {
                Ok((player_id, snapshot)) => {
                    *binding = Some(Binding {
                        room,
                        player_id: player_id.clone(),
                    });
                    let _ = event_tx.send(ServerEvent::JoinedRoom {
                        room_code,
                        player_id,
                        snapshot,
                    });
                }
                Err(e) => session_error(event_tx, &e.to_string()),
            }
        }
        ClientMessage::ReconnectSession {
            room_code,
            player_id,
            role,
            name,
        } => {
            if binding.is_some() {
                session_error(event_tx, "already in a room");
                return;
            }
            let Some(room) = state.rooms.lock().await.get(&room_code) else {
                let _ = event_tx.send(ServerEvent::RoomNotFound { room_code });
                return;
            };
            match room
                .reconnect(conn_id, event_tx.clone(), player_id.clone(), role, name)
                .await
            {
                Ok(snapshot) => {
                    *binding = Some(Binding {
                        room,
                        player_id: player_id.clone(),
                    });
                    let _ = event_tx.send(ServerEvent::ReconnectedSession {
                        room_code,
                        player_id,
                        role,
                        snapshot,
                    });
                }
                Err(e) => session_error(event_tx, &e.to_string()),
            }
        }
        other => {
            let Some(op) = to_room_op(other) else {
                return;
            };
            let Some(Binding { room, player_id }) = binding else {
                session_error(event_tx, "not in a room");
                return;
            };
            if room.op(player_id.clone(), op).await.is_err() {
                session_error(event_tx, "room is no longer running");
            }
        }
    }
}

/// Maps a room-scoped client message to its [`RoomOp`]. Session messages
/// are handled in [`dispatch`] and return `None`.
fn to_room_op(msg: ClientMessage) -> Option<RoomOp> {
    match msg {
        ClientMessage::AddItem { name, base_price } => {
            Some(RoomOp::AddItem { name, base_price })
        }
        ClientMessage::AddItems { items } => Some(RoomOp::AddItems { items }),
        ClientMessage::SelectItem { item_id } => Some(RoomOp::SelectItem { item_id }),
        ClientMessage::StartBidding => Some(RoomOp::StartBidding),
        ClientMessage::PlaceBid { amount } => Some(RoomOp::PlaceBid { amount }),
        ClientMessage::FinalizeItem => Some(RoomOp::FinalizeItem),
        ClientMessage::ClearAuction => Some(RoomOp::ClearAuction),
        ClientMessage::UpdateSettings { settings } => {
            Some(RoomOp::UpdateSettings { settings })
        }
        ClientMessage::SetName { name } => Some(RoomOp::SetName { name }),
        ClientMessage::AskAssistant { text } => Some(RoomOp::AskAssistant { text }),
        ClientMessage::CreateRoom
        | ClientMessage::JoinRoom { .. }
        | ClientMessage::ReconnectSession { .. } => None,
    }
}

fn session_error(event_tx: &ClientSender, message: &str) {
    let _ = event_tx.send(ServerEvent::SessionError {
        message: message.to_string(),
    });
}

/// Drains the connection's event channel onto the socket as JSON text
/// frames. Exits when the channel closes or the socket rejects a write.
async fn write_events<C: Codec>(
    mut sink: SplitSink<WsStream, Message>,
    mut event_rx: mpsc::UnboundedReceiver<ServerEvent>,
    codec: C,
) {
    while let Some(event) = event_rx.recv().await {
        let bytes = match codec.encode(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode event");
                continue;
            }
        };
        let Ok(text) = String::from_utf8(bytes) else {
            continue;
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use gavel_protocol::ItemId;

    #[test]
    fn test_to_room_op_maps_auction_messages() {
        assert_eq!(
            to_room_op(ClientMessage::PlaceBid { amount: 105 }),
            Some(RoomOp::PlaceBid { amount: 105 })
        );
        assert_eq!(
            to_room_op(ClientMessage::SelectItem { item_id: ItemId(3) }),
            Some(RoomOp::SelectItem { item_id: ItemId(3) })
        );
        assert_eq!(to_room_op(ClientMessage::CreateRoom), None);
    }
}
