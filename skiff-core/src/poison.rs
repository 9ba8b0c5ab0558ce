//! RAII guard for protecting against partial frame writes in async contexts.
//!
//! When a future is dropped mid-write (e.g. by a timeout), the broker may
//! already hold half of a `PUB` header or payload. Anything written after
//! that would be parsed as part of the broken frame. The guard marks the
//! connection as poisoned for the duration of the write and only clears the
//! flag once the whole frame is on the wire:
//!
//! 1. `PoisonGuard::new()` sets the flag to `true`
//! 2. If the future is dropped before completion, the flag stays `true`
//! 3. `disarm()` after a successful write resets it to `false`
//!
//! A poisoned connection must be reconnected.
//!
//! ```rust
//! use skiff_core::poison::PoisonGuard;
//!
//! let mut poisoned = false;
//! let guard = PoisonGuard::new(&mut poisoned);
//! // ... write the whole frame ...
//! guard.disarm();
//! assert!(!poisoned);
//! ```

/// Marks a connection as poisoned unless disarmed.
pub struct PoisonGuard<'a> {
    flag: &'a mut bool,
}

impl<'a> PoisonGuard<'a> {
    /// Arm the guard, immediately marking the connection as poisoned.
    #[inline]
    pub fn new(flag: &'a mut bool) -> Self {
        *flag = true;
        Self { flag }
    }

    /// Mark the connection healthy. Call only after the frame is fully written.
    #[inline]
    pub fn disarm(self) {
        *self.flag = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poison_on_drop() {
        let mut poisoned = false;
        {
            let _guard = PoisonGuard::new(&mut poisoned);
        }
        assert!(poisoned, "connection should stay poisoned when the write is abandoned");
    }

    #[test]
    fn test_disarm_clears_poison() {
        let mut poisoned = true;
        PoisonGuard::new(&mut poisoned).disarm();
        assert!(!poisoned);
    }
}
