use tracing::{debug, warn};

use crate::models::{DecodeError, ReceivedMessage};
use crate::state::AppState;
use crate::websocket::msg_cell_handler::handle_cell_update_message;
use crate::websocket::msg_drag_handler::{handle_lock_message, handle_move_message, handle_release_message};
use crate::websocket::msg_users_handler::handle_get_users_message;
use crate::ws::SessionHandle;

/// Decodes one inbound text frame and routes it. Bad frames are logged and dropped;
/// nothing here can end the session.
pub async fn dispatch(state: &AppState, session: &SessionHandle, text: &str) {
    let message = match ReceivedMessage::decode(text) {
        Ok(message) => message,
        Err(DecodeError::UnknownType(kind)) => {
            warn!("Ignoring unknown message type '{}' from session {}", kind, session.id);
            return;
        }
        Err(e) => {
            warn!("Dropping message from session {} on sheet {}: {}", session.id, session.sheet_id, e);
            return;
        }
    };
    debug!("Received {} from session {} (user {})", message.kind(), session.id, session.user_id());

    match message {
        ReceivedMessage::GetUsers => handle_get_users_message(&state.hub, session),
        ReceivedMessage::CellUpdate(update_msg) => handle_cell_update_message(state, session, update_msg).await,
        ReceivedMessage::GetDragItem(lock_msg) => handle_lock_message(&state.hub, session, lock_msg),
        ReceivedMessage::DragItemRelease(lock_msg) => handle_release_message(&state.hub, session, lock_msg),
        ReceivedMessage::DragItemMove(move_msg) => handle_move_message(state, session, move_msg).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{DragItemRow, MemoryStore};
    use crate::ws::SessionUser;
    use serde_json::Value;
    use std::sync::Arc;
    use tokio::sync::mpsc::Receiver;

    fn state() -> AppState {
        let store = MemoryStore::new();
        store
            .insert_drag_item(DragItemRow { id: 42, content: "Physics".into(), creator_id: 1 })
            .unwrap();
        AppState::new(Config::default(), Arc::new(store))
    }

    fn connect(state: &AppState, sheet_id: i64, user_id: i64) -> (SessionHandle, Receiver<String>) {
        let user = SessionUser { user_id, username: format!("user{user_id}") };
        let (session, rx) = SessionHandle::new(sheet_id, user, 16);
        state.hub.join(&session);
        (session, rx)
    }

    fn next(rx: &mut Receiver<String>) -> Value {
        let frame = rx.try_recv().expect("expected a queued frame");
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn bad_frames_are_dropped_silently() {
        let state = state();
        let (a, mut rx) = connect(&state, 5, 1);

        dispatch(&state, &a, r#"{"type":"CURSOR_MOVED","x":1}"#).await;
        dispatch(&state, &a, r#"{"type":"CELL_UPDATE","row":"two"}"#).await;
        dispatch(&state, &a, "{{{").await;

        assert!(rx.try_recv().is_err());
        assert!(state.hub.rooms.is_member(5, a.id));
    }

    #[tokio::test]
    async fn get_users_replies_privately() {
        let state = state();
        let (a, mut rx_a) = connect(&state, 5, 1);
        let (_b, mut rx_b) = connect(&state, 5, 2);

        dispatch(&state, &a, r#"{"type":"GET_USERS"}"#).await;
        let reply = next(&mut rx_a);
        assert_eq!(reply["type"], "ONLINE_USERS");
        assert_eq!(reply["users"].as_array().unwrap().len(), 2);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn cell_update_broadcasts_then_conflicts() {
        let state = state();
        let (a, mut rx_a) = connect(&state, 5, 1);
        let (b, mut rx_b) = connect(&state, 5, 2);
        let update = r#"{"type":"CELL_UPDATE","sheet_id":5,"row":2,"column":3,"content":"Math","version":0}"#;

        dispatch(&state, &a, update).await;
        for rx in [&mut rx_a, &mut rx_b] {
            let frame = next(rx);
            assert_eq!(frame["type"], "CELL_UPDATED");
            assert_eq!(frame["version"], 1);
            assert_eq!(frame["updated_by"], 1);
        }

        dispatch(&state, &b, &update.replace("Math", "Art")).await;
        let conflict = next(&mut rx_b);
        assert_eq!(conflict["type"], "CELL_CONFLICT");
        assert_eq!(conflict["your_content"], "Art");
        assert_eq!(conflict["new_content"], "Math");
        assert_eq!(conflict["current_version"], 1);
        assert!(rx_a.try_recv().is_err(), "conflicts are never broadcast");
    }

    #[tokio::test]
    async fn foreign_sheet_gets_error_reply() {
        let state = state();
        let (a, mut rx) = connect(&state, 5, 1);
        dispatch(
            &state,
            &a,
            r#"{"type":"CELL_UPDATE","sheet_id":6,"row":0,"column":0,"content":"x","version":0}"#,
        )
        .await;
        let reply = next(&mut rx);
        assert_eq!(reply["type"], "ERROR");
        assert_eq!(reply["request"], "CELL_UPDATE");
    }

    #[tokio::test]
    async fn drag_flow_locks_moves_and_releases() {
        let state = state();
        let (a, mut rx_a) = connect(&state, 5, 1);
        let (b, mut rx_b) = connect(&state, 5, 2);
        let lock = r#"{"type":"GET_DRAG_ITEM","drag_item_id":42}"#;

        dispatch(&state, &a, lock).await;
        assert_eq!(next(&mut rx_a)["success"], true);
        dispatch(&state, &b, lock).await;
        assert_eq!(next(&mut rx_b)["success"], false);

        // B cannot move what it does not hold
        let move_to = r#"{"type":"DRAG_ITEM_MOVE","sheet_id":5,"drag_item_id":42,"target_row":1,"target_col":4}"#;
        dispatch(&state, &b, move_to).await;
        let refused = next(&mut rx_b);
        assert_eq!(refused["type"], "DRAG_ITEM_LOCK");
        assert_eq!(refused["success"], false);
        assert!(rx_a.try_recv().is_err());

        dispatch(&state, &a, move_to).await;
        for rx in [&mut rx_a, &mut rx_b] {
            let moved = next(rx);
            assert_eq!(moved["type"], "DRAG_ITEM_MOVED");
            assert_eq!(moved["moved_by"], 1);
            assert_eq!(moved["is_placed"], true);
            assert!(moved["from_row"].is_null());
        }

        dispatch(&state, &a, r#"{"type":"DRAG_ITEM_RELEASE","drag_item_id":42}"#).await;
        assert_eq!(next(&mut rx_a)["message"], "released");
        dispatch(&state, &b, lock).await;
        assert_eq!(next(&mut rx_b)["success"], true);
    }
}
