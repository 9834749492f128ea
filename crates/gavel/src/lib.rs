//! # Gavel
//!
//! A live multi-party auction room server. One auctioneer and any
//! number of bidders share a room over WebSockets: the auctioneer runs
//! an inventory of lots through countdown bidding rounds, bidders place
//! escrowed bids from a fixed budget, and every state change is
//! broadcast to the whole room as a full snapshot.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use gavel::GavelServer;
//! use gavel_assist::CannedAssistant;
//! use gavel_protocol::JsonCodec;
//!
//! # async fn run() -> Result<(), gavel::GavelError> {
//! let server = GavelServer::<CannedAssistant, JsonCodec>::builder()
//!     .bind("0.0.0.0:8080")
//!     .build(CannedAssistant)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod gateway;
mod server;

pub use error::GavelError;
pub use server::{GavelServer, GavelServerBuilder};
