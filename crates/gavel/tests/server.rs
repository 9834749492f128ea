//! End-to-end tests: real WebSocket clients against a running server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gavel::GavelServerBuilder;
use gavel_assist::CannedAssistant;
use gavel_protocol::{AuctionPhase, ClientMessage, PlayerId, Role, RoomCode, ServerEvent};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns the address.
async fn start_server() -> String {
    let server = GavelServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(CannedAssistant)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, msg: &ClientMessage) {
    let text = serde_json::to_string(msg).expect("encode");
    ws.send(Message::Text(text.into())).await.expect("send");
}

async fn recv_event(ws: &mut ClientWs) -> ServerEvent {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for event")
        .expect("stream ended")
        .expect("recv error");
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

/// Reads events until `pick` returns `Some`, skipping everything else.
async fn recv_until<T>(ws: &mut ClientWs, pick: impl Fn(ServerEvent) -> Option<T>) -> T {
    loop {
        if let Some(found) = pick(recv_event(ws).await) {
            return found;
        }
    }
}

/// Waits until a state broadcast shows the given phase. Needed before a
/// client acts on a phase change driven from another connection, which
/// would otherwise race it.
async fn wait_for_phase(ws: &mut ClientWs, phase: AuctionPhase) {
    recv_until(ws, |ev| match ev {
        ServerEvent::AuctionStateUpdate { snapshot } if snapshot.phase == phase => Some(()),
        _ => None,
    })
    .await;
}

/// Connects and creates a room, returning the auctioneer's client.
async fn create_room(addr: &str) -> (ClientWs, RoomCode, PlayerId) {
    let mut ws = connect(addr).await;
    send(&mut ws, &ClientMessage::CreateRoom).await;
    let (room_code, player_id) = recv_until(&mut ws, |ev| match ev {
        ServerEvent::RoomCreated {
            room_code,
            player_id,
            ..
        } => Some((room_code, player_id)),
        _ => None,
    })
    .await;
    (ws, room_code, player_id)
}

/// Connects and joins an existing room, returning the bidder's client.
async fn join_room(addr: &str, room_code: &RoomCode, name: &str) -> (ClientWs, PlayerId) {
    let mut ws = connect(addr).await;
    send(
        &mut ws,
        &ClientMessage::JoinRoom {
            room_code: room_code.clone(),
            name: Some(name.to_string()),
        },
    )
    .await;
    let player_id = recv_until(&mut ws, |ev| match ev {
        ServerEvent::JoinedRoom { player_id, .. } => Some(player_id),
        _ => None,
    })
    .await;
    (ws, player_id)
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_connect_assigns_client_id() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    match recv_event(&mut ws).await {
        ServerEvent::ClientIdAssigned { connection_id } => assert!(connection_id > 0),
        other => panic!("expected ClientIdAssigned, got {other:?}"),
    }
}

#[tokio::test]
async fn test_create_room_returns_code_and_snapshot() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, &ClientMessage::CreateRoom).await;

    let (room_code, snapshot) = recv_until(&mut ws, |ev| match ev {
        ServerEvent::RoomCreated {
            room_code, snapshot, ..
        } => Some((room_code, snapshot)),
        _ => None,
    })
    .await;
    assert_eq!(room_code.0.len(), 6);
    assert_eq!(snapshot.players.len(), 1);
    assert!(snapshot.items.is_empty());
}

#[tokio::test]
async fn test_join_unknown_room_reports_not_found() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(
        &mut ws,
        &ClientMessage::JoinRoom {
            room_code: RoomCode("ZZZZ99".into()),
            name: None,
        },
    )
    .await;

    recv_until(&mut ws, |ev| match ev {
        ServerEvent::RoomNotFound { room_code } => {
            assert_eq!(room_code.0, "ZZZZ99");
            Some(())
        }
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_operation_without_room_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, &ClientMessage::PlaceBid { amount: 105 }).await;

    let message = recv_until(&mut ws, |ev| match ev {
        ServerEvent::SessionError { message } => Some(message),
        _ => None,
    })
    .await;
    assert!(message.contains("not in a room"));
}

#[tokio::test]
async fn test_malformed_json_keeps_connection_alive() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text("not json at all".into()))
        .await
        .expect("send");
    recv_until(&mut ws, |ev| match ev {
        ServerEvent::Error { message } => {
            assert!(message.contains("parse"));
            Some(())
        }
        _ => None,
    })
    .await;

    // The connection still works.
    send(&mut ws, &ClientMessage::CreateRoom).await;
    recv_until(&mut ws, |ev| match ev {
        ServerEvent::RoomCreated { .. } => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_full_auction_round_over_websocket() {
    let addr = start_server().await;
    let (mut host, room_code, _auctioneer) = create_room(&addr).await;
    let (mut bidder, bidder_id) = join_room(&addr, &room_code, "Ann").await;

    send(
        &mut host,
        &ClientMessage::AddItem {
            name: "Old Vase".into(),
            base_price: 100,
        },
    )
    .await;
    let item = recv_until(&mut bidder, |ev| match ev {
        ServerEvent::ItemAdded { item, .. } => Some(item),
        _ => None,
    })
    .await;

    send(&mut host, &ClientMessage::SelectItem { item_id: item.id }).await;
    send(&mut host, &ClientMessage::StartBidding).await;
    wait_for_phase(&mut bidder, AuctionPhase::Bidding).await;
    send(&mut bidder, &ClientMessage::PlaceBid { amount: 105 }).await;

    let (amount, snapshot) = recv_until(&mut bidder, |ev| match ev {
        ServerEvent::PlayerBidUpdate {
            amount, snapshot, ..
        } => Some((amount, snapshot)),
        _ => None,
    })
    .await;
    assert_eq!(amount, 105);
    assert_eq!(snapshot.players[&bidder_id].budget, 4895);
    assert!(snapshot.timer.active);

    send(&mut host, &ClientMessage::FinalizeItem).await;
    let (winner, final_bid) = recv_until(&mut host, |ev| match ev {
        ServerEvent::ItemFinalized {
            winner, final_bid, ..
        } => Some((winner, final_bid)),
        _ => None,
    })
    .await;
    assert_eq!(winner, Some(bidder_id));
    assert_eq!(final_bid, 105);
}

#[tokio::test]
async fn test_bid_rejection_goes_to_bidder_only() {
    let addr = start_server().await;
    let (mut host, room_code, _auctioneer) = create_room(&addr).await;
    let (mut bidder, _bidder_id) = join_room(&addr, &room_code, "Ann").await;

    send(
        &mut host,
        &ClientMessage::AddItem {
            name: "Old Vase".into(),
            base_price: 100,
        },
    )
    .await;
    let item = recv_until(&mut host, |ev| match ev {
        ServerEvent::ItemAdded { item, .. } => Some(item),
        _ => None,
    })
    .await;
    send(&mut host, &ClientMessage::SelectItem { item_id: item.id }).await;
    send(&mut host, &ClientMessage::StartBidding).await;
    wait_for_phase(&mut bidder, AuctionPhase::Bidding).await;

    // Below the 105 minimum.
    send(&mut bidder, &ClientMessage::PlaceBid { amount: 101 }).await;
    let message = recv_until(&mut bidder, |ev| match ev {
        ServerEvent::Error { message } => Some(message),
        _ => None,
    })
    .await;
    assert!(message.contains("below the minimum"));
}

#[tokio::test]
async fn test_auctioneer_reconnects_with_player_id() {
    let addr = start_server().await;
    let (host, room_code, auctioneer) = create_room(&addr).await;
    // A bidder keeps the room alive while the auctioneer drops.
    let (_bidder, _bidder_id) = join_room(&addr, &room_code, "Ann").await;

    drop(host);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = connect(&addr).await;
    send(
        &mut ws,
        &ClientMessage::ReconnectSession {
            room_code: room_code.clone(),
            player_id: auctioneer.clone(),
            role: Role::Auctioneer,
            name: None,
        },
    )
    .await;
    let snapshot = recv_until(&mut ws, |ev| match ev {
        ServerEvent::ReconnectedSession { snapshot, .. } => Some(snapshot),
        _ => None,
    })
    .await;
    assert!(snapshot.players.contains_key(&auctioneer));
}

#[tokio::test]
async fn test_reconnect_into_removed_room_fails() {
    let addr = start_server().await;
    let (host, room_code, auctioneer) = create_room(&addr).await;

    // The only participant leaves, so the room is removed.
    drop(host);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut ws = connect(&addr).await;
    send(
        &mut ws,
        &ClientMessage::ReconnectSession {
            room_code,
            player_id: auctioneer,
            role: Role::Auctioneer,
            name: None,
        },
    )
    .await;
    recv_until(&mut ws, |ev| match ev {
        ServerEvent::RoomNotFound { .. } => Some(()),
        _ => None,
    })
    .await;
}

#[tokio::test]
async fn test_ask_assistant_answers() {
    let addr = start_server().await;
    let (mut host, _room_code, _auctioneer) = create_room(&addr).await;

    send(
        &mut host,
        &ClientMessage::AskAssistant {
            text: "what's on the block?".into(),
        },
    )
    .await;
    let text = recv_until(&mut host, |ev| match ev {
        ServerEvent::LlmResponse { text } => Some(text),
        _ => None,
    })
    .await;
    assert!(!text.is_empty());
}
