//! Property-based tests for the chat engine.
//!
//! These verify invariants that must hold for all event interleavings:
//! presence always equals derived session state, the directory never loses
//! protected rooms or gains duplicates, and the rate gate admits exactly the
//! sends a greedy cooldown model admits.

use std::{collections::HashMap, ops::Sub, time::Duration};

use parley_auth::{AuthError, Identity, TokenVerifier};
use parley_core::{
    ChatConfig, ChatDriver, ChatEvent, Environment, LOBBY, RateLimiter, SessionId,
};
use parley_proto::{ClientEvent, Role};
use proptest::prelude::*;

/// Room names the generated operations draw from. Contains a protected name
/// on purpose.
const ROOM_POOL: [&str; 4] = ["Lobby", "Privé A", "Team", "Ops"];

#[derive(Clone)]
struct TestEnv;

impl Environment for TestEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock_ms(&self) -> i64 {
        0
    }
}

/// Maps `admin:<name>` to an admin identity, anything else to a user.
struct TestVerifier;

impl TokenVerifier for TestVerifier {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        match token.strip_prefix("admin:") {
            Some(name) => Ok(Identity { name: name.to_string(), role: Role::Admin }),
            None => Ok(Identity { name: token.to_string(), role: Role::User }),
        }
    }
}

fn new_driver() -> ChatDriver<TestEnv, TestVerifier> {
    ChatDriver::new(TestEnv, TestVerifier, ChatConfig::default())
}

/// One generated engine operation.
#[derive(Debug, Clone)]
enum Op {
    Join { user: usize, room: usize },
    Disconnect { user: usize },
    DeleteRoom { room: usize },
}

fn op_strategy(n_users: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..n_users, 0..ROOM_POOL.len()).prop_map(|(user, room)| Op::Join { user, room }),
        (0..n_users).prop_map(|user| Op::Disconnect { user }),
        (0..ROOM_POOL.len()).prop_map(|room| Op::DeleteRoom { room }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: after any interleaving of joins, disconnects, and room
    /// deletions, every room's derived occupant list equals the model's
    /// (same members, admission order).
    #[test]
    fn prop_presence_always_matches_session_state(
        n_users in 1usize..6,
        ops in prop::collection::vec(op_strategy(5), 0..40)
    ) {
        let mut driver = new_driver();

        // Session 100 is the admin issuing deletions; guests are 0..n_users.
        driver.process_event(ChatEvent::ConnectionAccepted {
            session_id: 100,
            token: "admin:operator".to_string(),
        })?;

        // Model: session → current room (guests start in the lobby).
        let mut model: HashMap<SessionId, Option<String>> = HashMap::new();
        for user in 0..n_users {
            driver.process_event(ChatEvent::ConnectionAccepted {
                session_id: user as SessionId,
                token: format!("guest-{user}"),
            })?;
            model.insert(user as SessionId, Some(LOBBY.to_string()));
        }

        for op in ops {
            match op {
                Op::Join { user, room } => {
                    let id = (user % n_users) as SessionId;
                    if model.contains_key(&id) {
                        driver.process_event(ChatEvent::EventReceived {
                            session_id: id,
                            event: ClientEvent::JoinRoom(ROOM_POOL[room].to_string()),
                        })?;
                        model.insert(id, Some(ROOM_POOL[room].to_string()));
                    }
                },
                Op::Disconnect { user } => {
                    let id = (user % n_users) as SessionId;
                    if model.remove(&id).is_some() {
                        driver.process_event(ChatEvent::ConnectionClosed { session_id: id })?;
                    }
                },
                Op::DeleteRoom { room } => {
                    let name = ROOM_POOL[room];
                    driver.process_event(ChatEvent::EventReceived {
                        session_id: 100,
                        event: ClientEvent::DeleteRoom(name.to_string()),
                    })?;
                    if name != "Lobby" {
                        for current in model.values_mut() {
                            if current.as_deref() == Some(name) {
                                *current = Some(LOBBY.to_string());
                            }
                        }
                    }
                },
            }
        }

        for room in ROOM_POOL {
            // Admission order of guests is their session ID order here.
            let expected: Vec<SessionId> = (0..n_users as SessionId)
                .filter(|id| model.get(id).is_some_and(|r| r.as_deref() == Some(room)))
                .collect();
            prop_assert_eq!(driver.occupants(room), expected, "room {}", room);
        }
    }

    /// Property: the directory never loses the lobby and never holds
    /// duplicate names, whatever an admin creates and deletes.
    #[test]
    fn prop_directory_keeps_lobby_and_stays_duplicate_free(
        ops in prop::collection::vec(
            (any::<bool>(), 0..ROOM_POOL.len()),
            0..40
        )
    ) {
        let mut driver = new_driver();
        driver.process_event(ChatEvent::ConnectionAccepted {
            session_id: 1,
            token: "admin:operator".to_string(),
        })?;

        for (create, room) in ops {
            let name = ROOM_POOL[room].to_string();
            let event = if create {
                ClientEvent::CreateRoom(name)
            } else {
                ClientEvent::DeleteRoom(name)
            };
            driver.process_event(ChatEvent::EventReceived { session_id: 1, event })?;

            prop_assert!(driver.rooms().iter().any(|r| r == "Lobby"));
            let mut seen = std::collections::HashSet::new();
            for room in driver.rooms() {
                prop_assert!(seen.insert(room.clone()), "duplicate room {}", room);
            }
        }
    }

    /// Property: for any ascending send times, the gate admits exactly the
    /// sends a greedy cooldown walk admits.
    #[test]
    fn prop_rate_gate_matches_greedy_model(
        deltas in prop::collection::vec(0u64..3000, 1..30)
    ) {
        /// Milliseconds on a virtual clock.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
        struct Ms(u64);

        impl Sub for Ms {
            type Output = Duration;

            fn sub(self, rhs: Self) -> Duration {
                Duration::from_millis(self.0 - rhs.0)
            }
        }

        let cooldown = Duration::from_millis(1000);
        let mut limiter = RateLimiter::new(cooldown);

        let mut now = 0u64;
        let mut last_accepted: Option<u64> = None;
        for delta in deltas {
            now += delta;

            let expected = match last_accepted {
                Some(last) => now - last >= 1000,
                None => true,
            };
            let allowed = limiter.allow(7, Ms(now));

            prop_assert_eq!(allowed, expected, "at t={}", now);
            if allowed {
                last_accepted = Some(now);
            }
        }
    }
}
