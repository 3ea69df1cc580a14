use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of the persistence layer. "Not found" is reported as `Ok(None)`, never as an error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Cell row as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CellRow {
    pub sheet_id: i64,
    pub row_index: i32,
    pub col_index: i32,
    pub content: String,
    pub item_id: Option<i64>,
    pub last_edit_by: i64,
    pub version: i64,
}

impl CellRow {
    pub fn empty(sheet_id: i64, row_index: i32, col_index: i32) -> Self {
        Self {
            sheet_id,
            row_index,
            col_index,
            content: String::new(),
            item_id: None,
            last_edit_by: 0,
            version: 0,
        }
    }
}

/// Drag item row as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DragItemRow {
    pub id: i64,
    pub content: String,
    pub creator_id: i64,
}

/// A version-guarded content write.
#[derive(Debug, Clone)]
pub struct CellWrite {
    pub sheet_id: i64,
    pub row: i32,
    pub col: i32,
    pub content: String,
    pub expected_version: i64,
    pub editor_id: i64,
}

/// Request to associate a drag item with a target cell.
#[derive(Debug, Clone)]
pub struct DragItemPlacement {
    pub sheet_id: i64,
    pub item_id: i64,
    pub target_row: i32,
    pub target_col: i32,
    pub mover_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementResult {
    /// The item now sits in the target cell; `from` is where it was before on that sheet.
    Placed { from: Option<(i32, i32)> },
    /// The target holds another item owned by someone else.
    Occupied { occupant: i64 },
}

/// Storage interface consumed by the synchronization layer.
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Current version of a cell, `None` when the cell was never written.
    async fn get_cell_version(&self, sheet_id: i64, row: i32, col: i32) -> Result<Option<i64>, StoreError>;

    /// Writes `content` at `expected_version + 1` only if the stored version still equals
    /// `expected_version`. Returns the number of rows affected.
    async fn conditional_update_cell(&self, write: &CellWrite) -> Result<u64, StoreError>;

    async fn get_cell_by_position(&self, sheet_id: i64, row: i32, col: i32) -> Result<Option<CellRow>, StoreError>;

    async fn get_user_display_name(&self, user_id: i64) -> Result<Option<String>, StoreError>;

    async fn get_drag_item(&self, item_id: i64) -> Result<Option<DragItemRow>, StoreError>;

    /// Atomically moves a drag item into the target cell, clearing its previous cell on the same sheet.
    async fn place_drag_item(&self, placement: &DragItemPlacement) -> Result<PlacementResult, StoreError>;

    /// Cheap round trip used by the readiness check.
    async fn ping(&self) -> Result<(), StoreError>;
}
