//! The AI auctioneer-assistant boundary.
//!
//! Rooms can forward free-text questions ("what should I bid?", "describe
//! this lot") to an external text-generation service. That service is a
//! pure collaborator: it receives a *sanitized* [`RoomSnapshot`] and
//! returns text. It never mutates auction state, and its latency or
//! unavailability must never stall a room — queries are spawned
//! fire-and-forget by the room task, and every failure path collapses to
//! a fixed apology string via [`query_with_fallback`].
//!
//! Gavel doesn't ship a production LLM integration; you implement
//! [`Assistant`] for your provider (HTTP API, local model, ...) and hand
//! it to the server builder. [`CannedAssistant`] is the offline
//! implementation used in development and tests.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use gavel_protocol::{Role, RoomSnapshot};
use tracing::warn;

/// The apology clients see when the assistant is unavailable, times out,
/// or errors. Never surfaced as an error to game logic.
pub const FALLBACK_APOLOGY: &str =
    "The auction assistant is unavailable right now. Please carry on bidding.";

/// Errors an [`Assistant`] implementation may report.
///
/// These never cross into room logic — [`query_with_fallback`] absorbs
/// them into [`FALLBACK_APOLOGY`].
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    /// The backing service rejected or failed the request.
    #[error("assistant unavailable: {0}")]
    Unavailable(String),

    /// The backing service produced no usable text.
    #[error("assistant returned an empty response")]
    Empty,
}

/// Generates assistant text from a question and a read-only room snapshot.
///
/// Implementations must not retain or mutate the snapshot beyond the
/// call. `Send + Sync + 'static` so one instance can be shared across
/// every room task.
pub trait Assistant: Send + Sync + 'static {
    /// Answers `text` for a caller with the given role, seeded with the
    /// current room snapshot.
    fn query(
        &self,
        text: &str,
        role: Role,
        snapshot: &RoomSnapshot,
    ) -> impl std::future::Future<Output = Result<String, AssistError>> + Send;
}

/// Runs a query with a hard timeout, collapsing every failure to
/// [`FALLBACK_APOLOGY`].
///
/// This is the only entry point room code uses; it cannot fail.
pub async fn query_with_fallback<A: Assistant>(
    assistant: &A,
    text: &str,
    role: Role,
    snapshot: &RoomSnapshot,
    timeout: Duration,
) -> String {
    match tokio::time::timeout(timeout, assistant.query(text, role, snapshot)).await {
        Ok(Ok(reply)) if !reply.trim().is_empty() => reply,
        Ok(Ok(_)) => {
            warn!("assistant returned empty text, using fallback");
            FALLBACK_APOLOGY.to_string()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "assistant query failed, using fallback");
            FALLBACK_APOLOGY.to_string()
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs_f64(), "assistant query timed out");
            FALLBACK_APOLOGY.to_string()
        }
    }
}

/// An offline [`Assistant`] that answers from the snapshot alone.
///
/// Good enough for development rooms and deterministic in tests: it
/// narrates the current lot and standing bid without any external calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedAssistant;

impl Assistant for CannedAssistant {
    async fn query(
        &self,
        _text: &str,
        role: Role,
        snapshot: &RoomSnapshot,
    ) -> Result<String, AssistError> {
        let lot = snapshot
            .current_lot
            .and_then(|id| snapshot.items.iter().find(|i| i.id == id));

        let reply = match lot {
            Some(item) => {
                let bidder = snapshot
                    .current_highest_bidder
                    .as_ref()
                    .and_then(|pid| snapshot.players.get(pid))
                    .map(|p| p.name.clone());
                match bidder {
                    Some(name) => format!(
                        "'{}' is on the block. The high bid stands at {} credits with {}. Any advance?",
                        item.name, snapshot.current_highest_bid, name
                    ),
                    None => format!(
                        "'{}' is on the block at {} credits. No bids yet — who will open?",
                        item.name, snapshot.current_highest_bid
                    ),
                }
            }
            None => match role {
                Role::Auctioneer => {
                    "Nothing is on the block. Select a pending item to start the next lot."
                        .to_string()
                }
                Role::Player => {
                    "Nothing is on the block right now. Hold tight for the next lot."
                        .to_string()
                }
            },
        };

        Ok(reply)
    }
}
