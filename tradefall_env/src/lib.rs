//! Tradefall Environment Abstraction Layer
//!
//! This crate lets the Tradefall pipeline run against either the real world
//! (tokio timers, a live WebSocket feed) or a deterministic harness (virtual
//! clock, scripted feed) without changing a line of pipeline code.
//!
//! # Core Concept
//!
//! Everything the pipeline cannot control is reached through a trait:
//! - Time and task spawning (`TradefallContext`)
//! - The inbound trade feed (`FeedTransport`)
//!
//! # Example
//!
//! ```ignore
//! use tradefall_env::{FeedTransport, TradefallContext};
//!
//! async fn pump<Ctx: TradefallContext, T: FeedTransport>(ctx: &Ctx, feed: &mut T) {
//!     loop {
//!         tokio::select! {
//!             msg = feed.next_text() => handle(msg),
//!             _ = ctx.sleep(Duration::from_millis(50)) => tick(),
//!         }
//!     }
//! }
//! ```

mod context;
mod network;
mod types;
mod error;
mod tokio_impl;
mod ws_impl;

pub use context::TradefallContext;
pub use network::FeedTransport;
pub use types::Endpoint;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use ws_impl::WsTransport;
