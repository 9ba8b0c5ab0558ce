//! Subscription registry and message handler capability.
//!
//! The registry maps subscription ids (sids) to their handler. Sids come
//! from a counter that only ever moves forward, so an id is never handed
//! out twice during the registry's lifetime.

use hashbrown::HashMap;
use std::fmt;

use crate::error::SkiffError;
use crate::message::Message;

/// Whether the receive loop should keep going after a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receives messages delivered to one subscription.
///
/// Implemented for any `FnMut(&Message) -> Flow`, so closures work directly:
///
/// ```
/// use skiff_core::subscription::{Flow, MessageHandler};
/// use skiff_core::message::Message;
///
/// let mut seen = 0;
/// let mut handler = |_msg: &Message| {
///     seen += 1;
///     Flow::Continue
/// };
/// let msg = Message::new(1, "greet", None, "hi".into());
/// assert_eq!(handler.handle(&msg), Flow::Continue);
/// ```
pub trait MessageHandler {
    fn handle(&mut self, msg: &Message) -> Flow;
}

impl<F> MessageHandler for F
where
    F: FnMut(&Message) -> Flow,
{
    fn handle(&mut self, msg: &Message) -> Flow {
        self(msg)
    }
}

/// Caller-side handle for a registered subscription.
///
/// Holding the handle does not keep the subscription alive; the registry
/// owns it until `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    sid: u64,
    subject: String,
    queue: Option<String>,
}

impl Subscription {
    #[must_use]
    pub const fn sid(&self) -> u64 {
        self.sid
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Queue group, if the subscription load-balances with others.
    #[must_use]
    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }
}

struct Entry {
    subscription: Subscription,
    handler: Box<dyn MessageHandler>,
}

/// Owned mapping from sid to subscription + handler.
pub struct SubscriptionRegistry {
    entries: HashMap<u64, Entry>,
    next_sid: u64,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    /// Empty registry; the first sid handed out is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_sid: 1,
        }
    }

    /// Sid the next `register` call will use.
    #[must_use]
    pub const fn next_sid(&self) -> u64 {
        self.next_sid
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, sid: u64) -> bool {
        self.entries.contains_key(&sid)
    }

    #[must_use]
    pub fn get(&self, sid: u64) -> Option<&Subscription> {
        self.entries.get(&sid).map(|e| &e.subscription)
    }

    /// Allocate a fresh sid and store the handler under it.
    pub fn register(
        &mut self,
        subject: impl Into<String>,
        queue: Option<String>,
        handler: Box<dyn MessageHandler>,
    ) -> Subscription {
        let subscription = Subscription {
            sid: self.next_sid,
            subject: subject.into(),
            queue,
        };
        self.next_sid += 1;
        self.entries.insert(
            subscription.sid,
            Entry {
                subscription: subscription.clone(),
                handler,
            },
        );
        subscription
    }

    /// Remove a subscription.
    ///
    /// # Errors
    ///
    /// `NotSubscribed` if `sid` is not registered; the registry is left as is.
    pub fn remove(&mut self, sid: u64) -> Result<Subscription, SkiffError> {
        self.entries
            .remove(&sid)
            .map(|e| e.subscription)
            .ok_or(SkiffError::NotSubscribed(sid))
    }

    /// Hand `msg` to the handler registered for `msg.sid`.
    ///
    /// Returns `None` if no subscription has that sid.
    pub fn dispatch(&mut self, msg: &Message) -> Option<Flow> {
        self.entries.get_mut(&msg.sid).map(|e| e.handler.handle(msg))
    }

    /// All registered subscriptions, ordered by sid.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut subs: Vec<_> = self.entries.values().map(|e| e.subscription.clone()).collect();
        subs.sort_by_key(Subscription::sid);
        subs
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.subscriptions())
            .field("next_sid", &self.next_sid)
            .finish()
    }
}
