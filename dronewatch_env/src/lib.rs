//! dronewatch Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the ingestion engine run
//! in **Production** (tokio) and under a **Simulation** virtual clock.
//!
//! Everything the engine needs from the outside world goes through here:
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Tasks (`spawn()`)
//! - The inbound feed (`FeedTransport::recv()`)
//!
//! # Example
//!
//! ```ignore
//! use dronewatch_env::{TrackerContext, FeedTransport};
//!
//! async fn pump<Ctx: TrackerContext, Feed: FeedTransport>(ctx: &Ctx, feed: &Feed) {
//!     while let Some(envelope) = feed.recv().await {
//!         handle(envelope, ctx.unix_millis());
//!     }
//! }
//! ```

mod context;
mod feed;
mod types;
mod error;
mod tokio_impl;

pub use context::TrackerContext;
pub use feed::FeedTransport;
pub use types::FeedEnvelope;
pub use error::EnvError;
pub use tokio_impl::TokioContext;
