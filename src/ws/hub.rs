use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::locks::LockTable;
use super::presence::PresenceTracker;
use super::registry::RoomRegistry;
use super::session::SessionHandle;

/// Shared synchronization state: rooms, presence and drag-item locks.
pub struct SyncHub {
    pub rooms: RoomRegistry,
    pub presence: PresenceTracker,
    pub locks: Arc<LockTable>,
}

impl SyncHub {
    pub fn new(lock_ttl: Duration) -> Self {
        Self {
            rooms: RoomRegistry::new(),
            presence: PresenceTracker::new(),
            locks: Arc::new(LockTable::new(lock_ttl)),
        }
    }

    /// Registers the session in its room and the global index, then counts it in presence.
    pub fn join(&self, session: &SessionHandle) {
        self.rooms.join(session.clone());
        let connections = self
            .presence
            .on_join(session.sheet_id, session.user_id(), &session.user.username);
        info!(
            "Session {} joined sheet {} as user {} ({} connection(s))",
            session.id,
            session.sheet_id,
            session.user_id(),
            connections
        );
    }

    /// Tears a session down. Safe to call from every failure path: only the first call
    /// does any work, later ones return `false`.
    ///
    /// The user's locks are released once their last live session is gone.
    pub fn leave(&self, session: &SessionHandle) -> bool {
        let Some(session) = self.rooms.remove(session.id) else {
            return false;
        };
        session.close();

        let remaining = self.presence.on_leave(session.sheet_id, session.user_id());
        let released = if self.rooms.has_sessions_for_user(session.user_id()) {
            0
        } else {
            self.locks.release_all_held_by(session.user_id())
        };

        info!(
            "Session {} left sheet {} (user {}: {} connection(s) left, {} lock(s) released)",
            session.id,
            session.sheet_id,
            session.user_id(),
            remaining,
            released
        );
        true
    }
}

/// Runs `SyncHub::leave` when dropped, covering normal exit, task abort and panic alike.
pub struct LeaveGuard {
    hub: Arc<SyncHub>,
    session: SessionHandle,
}

impl LeaveGuard {
    pub fn new(hub: Arc<SyncHub>, session: SessionHandle) -> Self {
        Self { hub, session }
    }
}

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        self.hub.leave(&self.session);
    }
}
