//! Skiff Core
//!
//! This crate contains the protocol-agnostic building blocks:
//! - Line/payload read buffer (`buffer`)
//! - Connection options and server URL parsing (`options`, `endpoint`)
//! - TCP utilities (`tcp`)
//! - Cancellation safety for framed writes (`poison`)
//! - Deadline timers and timeout wrappers for compio I/O (`timer`, `timeout`)
//! - Delivered message value and subscription registry (`message`, `subscription`)
//! - Error types (`error`)

// The tcp module needs raw fd/socket access for socket configuration
#![cfg_attr(not(test), deny(unsafe_code))]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
pub mod buffer;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod options;
pub mod poison;
pub mod subscription;
pub mod tcp;
pub mod timeout;
pub mod timer;

// Optional: a small prelude to make downstream crates ergonomic.
// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::buffer::ReadBuffer;
    pub use crate::endpoint::ServerUrl;
    pub use crate::error::{ProtocolError, Result, SkiffError};
    pub use crate::message::Message;
    pub use crate::options::ConnectOptions;
    pub use crate::poison::PoisonGuard;
    pub use crate::subscription::{Flow, MessageHandler, Subscription, SubscriptionRegistry};
    pub use crate::tcp::tune_stream;
}
