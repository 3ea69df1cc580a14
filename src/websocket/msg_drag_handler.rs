use tracing::{debug, error, info, warn};

use crate::models::{DragItemConflictMessage, DragItemLockMessage, DragItemMoveMessage, DragItemMovedMessage, SendMessage};
use crate::services::MoveOutcome;
use crate::state::AppState;
use crate::ws::{LockGrant, SessionHandle, SyncHub};

/// Handle GET_DRAG_ITEM
pub fn handle_lock_message(hub: &SyncHub, session: &SessionHandle, lock_msg: DragItemLockMessage) {
    let item_id = lock_msg.drag_item_id;
    let reply = match hub.locks.acquire(item_id, session.user_id()) {
        Ok(grant) => {
            if let LockGrant::Reclaimed { previous } = grant {
                info!("User {} took over expired lock on drag item {} from user {}", session.user_id(), item_id, previous);
            }
            debug!("User {} holds drag item {}", session.user_id(), item_id);
            SendMessage::lock_reply(item_id, true, "locked")
        }
        Err(e) => {
            debug!("User {} refused lock on drag item {}: {}", session.user_id(), item_id, e);
            SendMessage::lock_reply(item_id, false, e.to_string())
        }
    };
    hub.rooms.send_to(session, &reply);
}

/// Handle DRAG_ITEM_RELEASE. Releasing a lock the user does not hold is silently ignored.
pub fn handle_release_message(hub: &SyncHub, session: &SessionHandle, lock_msg: DragItemLockMessage) {
    let item_id = lock_msg.drag_item_id;
    if hub.locks.release(item_id, session.user_id()) {
        debug!("User {} released drag item {}", session.user_id(), item_id);
        hub.rooms.send_to(session, &SendMessage::lock_reply(item_id, true, "released"));
    }
}

/// Handle DRAG_ITEM_MOVE - Verify lock, Place and Broadcast
pub async fn handle_move_message(state: &AppState, session: &SessionHandle, move_msg: DragItemMoveMessage) {
    let rooms = &state.hub.rooms;
    let DragItemMoveMessage { sheet_id, drag_item_id, target_row, target_col } = move_msg;

    if sheet_id != session.sheet_id {
        warn!(
            "Session {} on sheet {} sent a drag move for sheet {}",
            session.id, session.sheet_id, sheet_id
        );
        rooms.send_to(session, &SendMessage::error("DRAG_ITEM_MOVE", "sheet does not match this connection"));
        return;
    }

    let outcome = state
        .cells
        .move_item(sheet_id, drag_item_id, target_row, target_col, session.user_id())
        .await;

    let reply = match outcome {
        Ok(MoveOutcome::Moved { from }) => {
            let moved = SendMessage::DragItemMoved(DragItemMovedMessage {
                sheet_id,
                drag_item_id,
                from_row: from.map(|(row, _)| row),
                from_col: from.map(|(_, col)| col),
                target_row,
                target_col,
                moved_by: session.user_id(),
                is_placed: true,
            });
            rooms.publish(sheet_id, &moved);
            return;
        }
        Ok(MoveOutcome::LockNotHeld) => SendMessage::lock_reply(drag_item_id, false, "lock expired or not held"),
        Ok(MoveOutcome::TargetOccupied { occupant }) => SendMessage::DragItemConflict(DragItemConflictMessage {
            sheet_id,
            drag_item_id,
            target_row,
            target_col,
            message: format!("target cell already holds drag item {}", occupant),
        }),
        Ok(MoveOutcome::ItemNotFound) => SendMessage::error("DRAG_ITEM_MOVE", "drag item not found"),
        Err(e) => {
            error!("Moving drag item {} on sheet {} failed: {}", drag_item_id, sheet_id, e);
            SendMessage::error("DRAG_ITEM_MOVE", "drag item move failed")
        }
    };
    rooms.send_to(session, &reply);
}
