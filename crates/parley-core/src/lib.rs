//! Session, room, and broadcast engine for Parley.
//!
//! The engine is a pure, action-based state machine (Sans-IO): the
//! [`ChatDriver`] consumes one [`ChatEvent`] at a time - connection accepted,
//! client event received, connection closed - and returns the list of
//! [`ChatAction`]s a runtime must execute (unicast, room broadcast, global
//! broadcast, close, log). No I/O happens here, which keeps every transition
//! synchronous, deterministic, and directly testable.
//!
//! # Components
//!
//! - [`SessionRegistry`]: connection → participant state (display name, role,
//!   current room). The single source of truth for room membership.
//! - [`RoomDirectory`]: the ordered, mutable set of room names with
//!   protected defaults.
//! - [`RateLimiter`]: per-session cooldown gate for chat messages.
//! - [`ChatDriver`]: membership transitions, presence recomputation,
//!   broadcast routing, and admin room operations.
//! - [`Environment`]: time abstraction so the rate gate and message
//!   timestamps run on a virtual clock in tests.
//!
//! Room membership is never cached: a room's occupant list is re-derived
//! from the registry on every recomputation, trading a scan per membership
//! change for immunity to dual-state drift.

mod directory;
mod driver;
mod env;
mod error;
mod rate_limit;
mod registry;

pub use directory::{LOBBY, RoomDirectory, SUPPORT};
pub use driver::{ChatAction, ChatConfig, ChatDriver, ChatEvent, LogLevel};
pub use env::Environment;
pub use error::ChatError;
pub use rate_limit::RateLimiter;
pub use registry::{Session, SessionId, SessionRegistry};
