use dashmap::DashMap;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::session::{Enqueue, SessionHandle};
use crate::models::SendMessage;

/// Live sessions, grouped per sheet and indexed globally.
///
/// Rooms hold handles only; a session is owned by its read/write loops. Rooms are
/// created on first join and never removed, since an empty room costs nothing.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<i64, DashMap<Uuid, SessionHandle>>,
    sessions: DashMap<Uuid, SessionHandle>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, session: SessionHandle) {
        self.rooms
            .entry(session.sheet_id)
            .or_default()
            .insert(session.id, session.clone());
        self.sessions.insert(session.id, session);
    }

    /// Removes a session from its room and the global index.
    ///
    /// Returns the handle only for the call that actually took it out of the global
    /// index, which makes this the exactly-once gate for teardown.
    pub fn remove(&self, session_id: Uuid) -> Option<SessionHandle> {
        let (_, session) = self.sessions.remove(&session_id)?;
        if let Some(room) = self.rooms.get(&session.sheet_id) {
            room.remove(&session_id);
        }
        Some(session)
    }

    /// Enqueues `message` for every session in the sheet's room.
    ///
    /// Publish is best-effort per recipient: a session whose queue is full is evicted
    /// from the room and told to close, so one slow client cannot stall the others.
    /// Returns the number of sessions the frame was queued for.
    pub fn publish(&self, sheet_id: i64, message: &SendMessage) -> usize {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize broadcast for sheet {}: {}", sheet_id, e);
                return 0;
            }
        };

        let Some(room) = self.rooms.get(&sheet_id) else {
            return 0;
        };

        let mut delivered = 0;
        let mut unresponsive = Vec::new();
        for member in room.iter() {
            match member.try_enqueue(frame.clone()) {
                Enqueue::Queued => delivered += 1,
                Enqueue::Full => unresponsive.push(member.key().to_owned()),
                Enqueue::Closed => debug!("Skipping closed session {} in sheet {}", member.key(), sheet_id),
            }
        }

        for session_id in unresponsive {
            if let Some((_, session)) = room.remove(&session_id) {
                warn!(
                    "Evicting unresponsive session {} (user {}) from sheet {}: outbound queue full",
                    session.id,
                    session.user_id(),
                    sheet_id
                );
                session.close();
            }
        }

        delivered
    }

    /// Enqueues a private reply for one session, with the same eviction policy as `publish`.
    pub fn send_to(&self, session: &SessionHandle, message: &SendMessage) -> bool {
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize reply for session {}: {}", session.id, e);
                return false;
            }
        };

        match session.try_enqueue(frame) {
            Enqueue::Queued => true,
            Enqueue::Full => {
                warn!(
                    "Evicting unresponsive session {} (user {}) from sheet {}: outbound queue full",
                    session.id,
                    session.user_id(),
                    session.sheet_id
                );
                if let Some(room) = self.rooms.get(&session.sheet_id) {
                    room.remove(&session.id);
                }
                session.close();
                false
            }
            Enqueue::Closed => false,
        }
    }

    #[cfg(test)]
    pub fn is_member(&self, sheet_id: i64, session_id: Uuid) -> bool {
        self.rooms
            .get(&sheet_id)
            .map_or(false, |room| room.contains_key(&session_id))
    }

    pub fn room_size(&self, sheet_id: i64) -> usize {
        self.rooms.get(&sheet_id).map_or(0, |room| room.len())
    }

    /// Whether the user still has any live session, on any sheet.
    pub fn has_sessions_for_user(&self, user_id: i64) -> bool {
        self.sessions.iter().any(|session| session.user_id() == user_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.iter().filter(|room| !room.is_empty()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorMessage;
    use crate::ws::session::SessionUser;

    fn session(sheet_id: i64, user_id: i64, capacity: usize) -> (SessionHandle, tokio::sync::mpsc::Receiver<String>) {
        SessionHandle::new(sheet_id, SessionUser { user_id, username: format!("user{user_id}") }, capacity)
    }

    fn ping() -> SendMessage {
        SendMessage::Error(ErrorMessage { request: "TEST".into(), message: "hello".into() })
    }

    #[tokio::test]
    async fn publish_reaches_only_the_sheet_room() {
        let registry = RoomRegistry::new();
        let (a, mut rx_a) = session(5, 1, 8);
        let (b, mut rx_b) = session(5, 2, 8);
        let (c, mut rx_c) = session(6, 3, 8);
        registry.join(a);
        registry.join(b);
        registry.join(c);

        assert_eq!(registry.publish(5, &ping()), 2);
        assert!(rx_a.recv().await.unwrap().contains("hello"));
        assert!(rx_b.recv().await.unwrap().contains("hello"));
        assert!(rx_c.try_recv().is_err());
        assert_eq!(registry.publish(99, &ping()), 0);
    }

    #[tokio::test]
    async fn full_queue_evicts_slow_consumer_only() {
        let registry = RoomRegistry::new();
        let (slow, _rx_slow) = session(5, 1, 1);
        let (fast, mut rx_fast) = session(5, 2, 8);
        registry.join(slow.clone());
        registry.join(fast.clone());

        assert_eq!(registry.publish(5, &ping()), 2);
        assert_eq!(registry.publish(5, &ping()), 1);

        assert!(!registry.is_member(5, slow.id));
        assert!(registry.is_member(5, fast.id));
        assert_eq!(registry.room_size(5), 1);
        tokio::time::timeout(std::time::Duration::from_secs(1), slow.closed())
            .await
            .expect("evicted session is told to close");

        assert!(rx_fast.recv().await.is_some());
        assert!(rx_fast.recv().await.is_some());
    }

    #[test]
    fn remove_is_exactly_once() {
        let registry = RoomRegistry::new();
        let (a, _rx) = session(5, 1, 4);
        registry.join(a.clone());
        assert!(registry.has_sessions_for_user(1));

        assert!(registry.remove(a.id).is_some());
        assert!(registry.remove(a.id).is_none());
        assert_eq!(registry.session_count(), 0);
        assert_eq!(registry.room_size(5), 0);
        assert!(!registry.has_sessions_for_user(1));
    }
}
