use tracing::debug;

use crate::models::{OnlineUsersMessage, SendMessage};
use crate::ws::{SessionHandle, SyncHub};

/// Handle GET_USERS
pub fn handle_get_users_message(hub: &SyncHub, session: &SessionHandle) {
    let users = hub.presence.snapshot(session.sheet_id);
    debug!("Sending {} online user(s) of sheet {} to session {}", users.len(), session.sheet_id, session.id);

    let reply = SendMessage::OnlineUsers(OnlineUsersMessage { sheet_id: session.sheet_id, users });
    hub.rooms.send_to(session, &reply);
}
