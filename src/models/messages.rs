use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::OnlineUser;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CellUpdateMessage {
    pub sheet_id: i64,
    pub row: i32,
    pub column: i32,
    pub content: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DragItemLockMessage {
    pub drag_item_id: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DragItemMoveMessage {
    pub sheet_id: i64,
    pub drag_item_id: i64,
    pub target_row: i32,
    pub target_col: i32,
}

/// Inbound frames, discriminated by their `type` field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ReceivedMessage {
    #[serde(rename = "GET_USERS")]
    GetUsers,
    #[serde(rename = "CELL_UPDATE")]
    CellUpdate(CellUpdateMessage),
    #[serde(rename = "GET_DRAG_ITEM")]
    GetDragItem(DragItemLockMessage),
    #[serde(rename = "DRAG_ITEM_RELEASE")]
    DragItemRelease(DragItemLockMessage),
    #[serde(rename = "DRAG_ITEM_MOVE")]
    DragItemMove(DragItemMoveMessage),
}

const KNOWN_TYPES: [&str; 5] = [
    "GET_USERS",
    "CELL_UPDATE",
    "GET_DRAG_ITEM",
    "DRAG_ITEM_RELEASE",
    "DRAG_ITEM_MOVE",
];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("message carries no type discriminator")]
    MissingType,
    #[error("unknown message type '{0}'")]
    UnknownType(String),
}

impl ReceivedMessage {
    /// Decodes a text frame, telling unknown discriminators apart from broken payloads.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(DecodeError::UnknownType(kind.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ReceivedMessage::GetUsers => "GET_USERS",
            ReceivedMessage::CellUpdate(_) => "CELL_UPDATE",
            ReceivedMessage::GetDragItem(_) => "GET_DRAG_ITEM",
            ReceivedMessage::DragItemRelease(_) => "DRAG_ITEM_RELEASE",
            ReceivedMessage::DragItemMove(_) => "DRAG_ITEM_MOVE",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OnlineUsersMessage {
    pub sheet_id: i64,
    pub users: Vec<OnlineUser>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CellUpdatedMessage {
    pub sheet_id: i64,
    pub row: i32,
    pub column: i32,
    pub content: String,
    pub updated_by: i64,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CellConflictMessage {
    pub sheet_id: i64,
    pub row: i32,
    pub column: i32,
    pub your_content: String,
    pub new_content: String,
    pub current_version: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DragItemLockResponse {
    pub drag_item_id: i64,
    pub success: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DragItemMovedMessage {
    pub sheet_id: i64,
    pub drag_item_id: i64,
    pub from_row: Option<i32>,
    pub from_col: Option<i32>,
    pub target_row: i32,
    pub target_col: i32,
    pub moved_by: i64,
    pub is_placed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DragItemConflictMessage {
    pub sheet_id: i64,
    pub drag_item_id: i64,
    pub target_row: i32,
    pub target_col: i32,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub request: String,
    pub message: String,
}

/// Outbound frames, either broadcast to a room or sent privately to one session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum SendMessage {
    #[serde(rename = "ONLINE_USERS")]
    OnlineUsers(OnlineUsersMessage),
    #[serde(rename = "CELL_UPDATED")]
    CellUpdated(CellUpdatedMessage),
    #[serde(rename = "CELL_CONFLICT")]
    CellConflict(CellConflictMessage),
    #[serde(rename = "DRAG_ITEM_LOCK")]
    DragItemLock(DragItemLockResponse),
    #[serde(rename = "DRAG_ITEM_MOVED")]
    DragItemMoved(DragItemMovedMessage),
    #[serde(rename = "DRAG_ITEM_CONFLICT")]
    DragItemConflict(DragItemConflictMessage),
    #[serde(rename = "ERROR")]
    Error(ErrorMessage),
}

impl SendMessage {
    pub fn error(request: &str, message: impl Into<String>) -> Self {
        SendMessage::Error(ErrorMessage { request: request.to_string(), message: message.into() })
    }

    pub fn lock_reply(drag_item_id: i64, success: bool, message: impl Into<String>) -> Self {
        SendMessage::DragItemLock(DragItemLockResponse { drag_item_id, success, message: message.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_cell_update() {
        let msg = ReceivedMessage::decode(
            r#"{"type":"CELL_UPDATE","sheet_id":5,"row":2,"column":3,"content":"Math","version":0}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ReceivedMessage::CellUpdate(CellUpdateMessage {
                sheet_id: 5,
                row: 2,
                column: 3,
                content: "Math".into(),
                version: 0,
            })
        );
    }

    #[test]
    fn decodes_get_users_with_extra_fields() {
        let msg = ReceivedMessage::decode(r#"{"type":"GET_USERS","sheet_id":5}"#).unwrap();
        assert_eq!(msg, ReceivedMessage::GetUsers);
    }

    #[test]
    fn unknown_type_is_distinguished_from_malformed() {
        assert!(matches!(
            ReceivedMessage::decode(r#"{"type":"CURSOR_MOVED","x":1}"#),
            Err(DecodeError::UnknownType(kind)) if kind == "CURSOR_MOVED"
        ));
        assert!(matches!(
            ReceivedMessage::decode(r#"{"type":"GET_DRAG_ITEM","drag_item_id":"abc"}"#),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(ReceivedMessage::decode("not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(ReceivedMessage::decode(r#"{"row":1}"#), Err(DecodeError::MissingType)));
    }

    #[test]
    fn outbound_messages_carry_type_tag() {
        let msg = SendMessage::CellUpdated(CellUpdatedMessage {
            sheet_id: 5,
            row: 2,
            column: 3,
            content: "Math".into(),
            updated_by: 1,
            version: 1,
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "CELL_UPDATED",
                "sheet_id": 5,
                "row": 2,
                "column": 3,
                "content": "Math",
                "updated_by": 1,
                "version": 1
            })
        );

        let lock = serde_json::to_value(SendMessage::lock_reply(42, false, "busy")).unwrap();
        assert_eq!(lock["type"], "DRAG_ITEM_LOCK");
        assert_eq!(lock["success"], false);
        assert_eq!(lock["drag_item_id"], 42);
    }
}
