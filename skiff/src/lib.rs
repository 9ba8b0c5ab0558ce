//! # Skiff
//!
//! An async client for the NATS publish/subscribe protocol, built on `io_uring`.
//!
//! ## Architecture
//!
//! - **`skiff-core`**: Read buffer, options, URL parsing, subscription registry
//! - **`skiff-nats`**: Sans-IO NATS codec and the connection session
//! - **`skiff`**: Public API surface (this crate)
//!
//! ## Protocols (opt-in via features)
//!
//! - **`nats`** - NATS text protocol client
//!
//! ```toml
//! [dependencies]
//! skiff = { version = "0.1", features = ["nats"] }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "nats")]
//! use skiff::nats::prelude::*;
//!
//! # #[cfg(feature = "nats")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut conn = skiff::nats::connect("nats://127.0.0.1:4222").await?;
//!
//! conn.subscribe("weather.>", |msg: &Message| {
//!     println!("{}: {:?}", msg.subject, msg.payload_str());
//!     Flow::Continue
//! })
//! .await?;
//!
//! conn.publish("weather.oslo", "-3C").await?;
//! conn.wait(WaitOptions::new().with_count(1)).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A connection is driven by one task at a time: every operation takes
//! `&mut self`, and handlers run inline on the task that called `wait`.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export core types
pub use bytes::Bytes;
pub use skiff_core::error::{ProtocolError, Result, SkiffError};

pub mod dev_tracing;

// Protocol modules (opt-in via features)
#[cfg(feature = "nats")]
pub mod nats;
