//! Room directory: the ordered, mutable set of room names.
//!
//! Created once at process start with the default rooms and mutated only by
//! the admin room operations. Insertion order is preserved and is exactly
//! the order clients see. `Lobby` and `Support` can never be deleted;
//! `Support` is reachable by admins through join without being listed.

/// Room every non-admin participant lands in; migration target for deleted
/// rooms.
pub const LOBBY: &str = "Lobby";

/// Default room for admins. Protected but not listed in the directory.
pub const SUPPORT: &str = "Support";

/// Rooms present at process start, in client-visible order.
const DEFAULT_ROOMS: [&str; 4] = ["Lobby", "Privé A", "Privé B", "Privé C"];

/// Ordered set of room names with protected defaults.
#[derive(Debug, Clone)]
pub struct RoomDirectory {
    rooms: Vec<String>,
}

impl RoomDirectory {
    /// Directory seeded with the default rooms.
    pub fn new() -> Self {
        Self { rooms: DEFAULT_ROOMS.iter().map(ToString::to_string).collect() }
    }

    /// Room names in insertion order.
    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    /// Whether `name` is listed.
    pub fn contains(&self, name: &str) -> bool {
        self.rooms.iter().any(|r| r == name)
    }

    /// Whether `name` may never be deleted.
    pub fn is_protected(name: &str) -> bool {
        name == LOBBY || name == SUPPORT
    }

    /// Append a room, preserving insertion order.
    ///
    /// Returns `false` (directory unchanged) if the name is already listed.
    pub fn create(&mut self, name: &str) -> bool {
        if self.contains(name) {
            return false;
        }
        self.rooms.push(name.to_string());
        true
    }

    /// Remove a room by name. Returns `false` if it was not listed.
    ///
    /// Callers must check [`Self::is_protected`] first; this method does not.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.rooms.len();
        self.rooms.retain(|r| r != name);
        self.rooms.len() != before
    }
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}
