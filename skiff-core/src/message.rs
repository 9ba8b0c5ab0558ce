//! Delivered message value.

use bytes::Bytes;
use std::fmt;

/// One message delivered by the broker for a subscription.
///
/// `size` is the byte count declared in the frame header; the payload is
/// always read as exactly that many bytes, so `payload.len() == size`.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    /// Subscription id the broker matched
    pub sid: u64,
    /// Subject the message was published to
    pub subject: String,
    /// Reply subject, if the publisher asked for one
    pub reply: Option<String>,
    /// Declared payload size
    pub size: usize,
    /// Raw payload
    pub payload: Bytes,
}

impl Message {
    /// Build a message; `size` is taken from the payload.
    #[must_use]
    pub fn new(sid: u64, subject: impl Into<String>, reply: Option<String>, payload: Bytes) -> Self {
        Self {
            sid,
            subject: subject.into(),
            reply,
            size: payload.len(),
            payload,
        }
    }

    /// Payload as UTF-8, if valid.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("sid", &self.sid)
            .field("subject", &self.subject)
            .field("reply", &self.reply)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
