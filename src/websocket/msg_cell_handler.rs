use tracing::{debug, error, warn};

use crate::models::{CellConflictMessage, CellUpdateMessage, CellUpdatedMessage, SendMessage};
use crate::services::CellUpdateOutcome;
use crate::state::AppState;
use crate::ws::SessionHandle;

/// Handle CELL_UPDATE - Check, Apply and Broadcast
pub async fn handle_cell_update_message(state: &AppState, session: &SessionHandle, update_msg: CellUpdateMessage) {
    let rooms = &state.hub.rooms;
    let CellUpdateMessage { sheet_id, row, column, content, version } = update_msg;

    if sheet_id != session.sheet_id {
        warn!(
            "Session {} on sheet {} sent a cell update for sheet {}",
            session.id, session.sheet_id, sheet_id
        );
        rooms.send_to(session, &SendMessage::error("CELL_UPDATE", "sheet does not match this connection"));
        return;
    }

    debug!(
        "Cell update for sheet {}: ({}, {}) at v{} by user {}",
        sheet_id,
        row,
        column,
        version,
        session.user_id()
    );

    let outcome = state
        .cells
        .apply_update(sheet_id, row, column, content, version, session.user_id())
        .await;

    match outcome {
        Ok(CellUpdateOutcome::Applied { version, content }) => {
            let updated = SendMessage::CellUpdated(CellUpdatedMessage {
                sheet_id,
                row,
                column,
                content,
                updated_by: session.user_id(),
                version,
            });
            rooms.publish(sheet_id, &updated);
        }
        Ok(CellUpdateOutcome::Conflict { your_content, current_content, current_version }) => {
            let conflict = SendMessage::CellConflict(CellConflictMessage {
                sheet_id,
                row,
                column,
                your_content,
                new_content: current_content,
                current_version,
            });
            rooms.send_to(session, &conflict);
        }
        Err(e) => {
            error!("Cell update on sheet {} at ({}, {}) failed: {}", sheet_id, row, column, e);
            rooms.send_to(session, &SendMessage::error("CELL_UPDATE", "cell update failed"));
        }
    }
}
