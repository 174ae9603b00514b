//! Per-session cooldown gate for chat messages.

use std::{collections::HashMap, ops::Sub, time::Duration};

use crate::registry::SessionId;

/// Minimum interval between chat messages from one connection.
pub const MESSAGE_COOLDOWN: Duration = Duration::from_millis(1000);

/// Tracks the last accepted send per session and gates the next one.
///
/// Generic over the environment's instant type so tests run on a virtual
/// clock. A session with no recorded send is always allowed.
#[derive(Debug)]
pub struct RateLimiter<I> {
    cooldown: Duration,
    last_sent: HashMap<SessionId, I>,
}

impl<I> RateLimiter<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Limiter with the given cooldown window.
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, last_sent: HashMap::new() }
    }

    /// Check-and-stamp in one step: returns whether a send at `now` is
    /// allowed, and records `now` as the last send if it is.
    ///
    /// A rejected send does NOT move the stamp - the window is measured from
    /// the last accepted message.
    pub fn allow(&mut self, session_id: SessionId, now: I) -> bool {
        if let Some(last) = self.last_sent.get(&session_id) {
            if now - *last < self.cooldown {
                return false;
            }
        }
        self.last_sent.insert(session_id, now);
        true
    }

    /// Drop state for a disconnected session.
    pub fn forget(&mut self, session_id: SessionId) {
        self.last_sent.remove(&session_id);
    }
}
