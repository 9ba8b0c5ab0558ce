//! # Skiff NATS
//!
//! Client for the NATS text protocol, built on `compio`.
//!
//! ## Overview
//!
//! A [`Connection`] speaks the line-oriented NATS protocol over one TCP
//! stream:
//! - **CONNECT / INFO**: handshake with optional credentials from the URL
//! - **SUB / UNSUB**: subject interest with per-subscription handlers
//! - **PUB**: fire-and-forget publish, optionally with a reply subject
//! - **MSG**: delivery, dispatched by subscription id in [`Connection::wait`]
//! - **PING / PONG**: liveness in both directions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skiff_core::options::ConnectOptions;
//! use skiff_core::subscription::Flow;
//! use skiff_nats::{Connection, WaitOptions};
//!
//! #[compio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConnectOptions::new().with_url("nats://127.0.0.1:4222")?;
//!     let mut conn = Connection::new(options);
//!     conn.connect().await?;
//!
//!     conn.subscribe("orders.>", |msg: &skiff_core::message::Message| {
//!         println!("{} bytes on {}", msg.size, msg.subject);
//!         Flow::Stop
//!     })
//!     .await?;
//!     conn.publish("orders.new", "42").await?;
//!     conn.wait(WaitOptions::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Sans-IO codec**: [`codec::Decoder`] works on buffered bytes only
//! - **Table-driven parsing**: every verb is described once in [`command::COMMANDS`]
//! - **Zero-copy payloads**: messages carry `Bytes`

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]

// Public protocol types
pub mod codec;
pub mod command;
pub mod info;

// Internal modules (not part of public API)
mod handshake;
mod transport;

pub mod connection;

pub use codec::{ClientOp, Decoder, ServerOp};
pub use connection::{Connection, StopReason, WaitOptions, WaitOutcome};
pub use info::{ConnectInfo, ServerInfo};

pub use skiff_core::error::{ProtocolError, Result, SkiffError};
pub use skiff_core::message::Message;
pub use skiff_core::options::ConnectOptions;
pub use skiff_core::subscription::{Flow, MessageHandler, Subscription};

pub mod prelude {
    pub use crate::connection::{Connection, StopReason, WaitOptions, WaitOutcome};
    pub use crate::info::ServerInfo;
    pub use skiff_core::prelude::*;
}
