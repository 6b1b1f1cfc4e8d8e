//! Web-socket terminal (C10): a `TerminalSession` registry keyed by uuid,
//! allocated by `POST /vps/:id/terminal` and consumed by the web-socket
//! upgrade at `/ws/terminal/:uuid`. A moka cache with a bounded capacity
//! and a TTL matching the session's idle window.

use std::time::Duration;

use moka::sync::Cache;
use uuid::Uuid;

use crate::ssh::PoolKey;

const SESSION_TTL: Duration = Duration::from_secs(300);
const MAX_SESSIONS: u64 = 1_000;

/// The connection parameters needed to open the interactive channel once the
/// browser's web-socket arrives; the channel itself is opened lazily at
/// upgrade time, not when the session is allocated.
#[derive(Debug, Clone)]
pub struct PendingTerminal {
    pub pool_key: PoolKey,
    pub private_key_pem: String,
}

#[derive(Clone)]
pub struct TerminalRegistry {
    sessions: Cache<Uuid, PendingTerminal>,
}

impl TerminalRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Cache::builder()
                .time_to_live(SESSION_TTL)
                .max_capacity(MAX_SESSIONS)
                .build(),
        }
    }

    /// Allocates a new session, returning the uuid the browser will open a
    /// web-socket against.
    pub fn allocate(&self, pending: PendingTerminal) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(id, pending);
        id
    }

    /// Consumes the pending session; a second lookup for the same uuid
    /// returns `None` so a terminal can only be connected to once.
    pub fn take(&self, id: Uuid) -> Option<PendingTerminal> {
        let pending = self.sessions.get(&id);
        self.sessions.invalidate(&id);
        pending
    }
}

impl Default for TerminalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub mod ws;

pub use ws::handle_socket;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_session_is_consumed_exactly_once() {
        let registry = TerminalRegistry::new();
        let id = registry.allocate(PendingTerminal {
            pool_key: PoolKey::new("10.0.0.1", 22, "root"),
            private_key_pem: "pem".to_string(),
        });
        assert!(registry.take(id).is_some());
        assert!(registry.take(id).is_none());
    }

    #[test]
    fn unknown_uuid_is_none() {
        let registry = TerminalRegistry::new();
        assert!(registry.take(Uuid::new_v4()).is_none());
    }
}
