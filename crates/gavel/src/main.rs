//! Gavel server binary.
//!
//! Binds to `GAVEL_ADDR` (default `0.0.0.0:8080`) and serves auction
//! rooms with the offline canned assistant. Log verbosity follows
//! `RUST_LOG` (default `info`).

use gavel::{GavelError, GavelServerBuilder};
use gavel_assist::CannedAssistant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), GavelError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("GAVEL_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let server = GavelServerBuilder::new()
        .bind(&addr)
        .build(CannedAssistant)
        .await?;
    server.run().await
}
