use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::store::{
    CellRow, CellWrite, DragItemPlacement, DragItemRow, PlacementResult, SheetStore, StoreError,
};

type CellKey = (i64, i32, i32);

#[derive(Default)]
struct MemoryTables {
    cells: HashMap<CellKey, CellRow>,
    /// Soft-deleted cells, invisible to reads until written again
    deleted: HashMap<CellKey, CellRow>,
    users: HashMap<i64, String>,
    drag_items: HashMap<i64, DragItemRow>,
}

/// Process-local storage used when no database is configured, and by tests.
///
/// All tables sit behind one mutex so multi-cell placements are atomic, the same
/// way a transaction makes them atomic in PostgreSQL.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, MemoryTables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn insert_user(&self, user_id: i64, username: impl Into<String>) -> Result<(), StoreError> {
        self.tables()?.users.insert(user_id, username.into());
        Ok(())
    }

    pub fn insert_drag_item(&self, item: DragItemRow) -> Result<(), StoreError> {
        self.tables()?.drag_items.insert(item.id, item);
        Ok(())
    }

    /// Marks a cell deleted. It reads as missing until a write or placement revives it at version 1.
    pub fn soft_delete_cell(&self, sheet_id: i64, row: i32, col: i32) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let key = (sheet_id, row, col);
        match tables.cells.remove(&key) {
            Some(cell) => {
                tables.deleted.insert(key, cell);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SheetStore for MemoryStore {
    async fn get_cell_version(&self, sheet_id: i64, row: i32, col: i32) -> Result<Option<i64>, StoreError> {
        Ok(self.tables()?.cells.get(&(sheet_id, row, col)).map(|cell| cell.version))
    }

    async fn conditional_update_cell(&self, write: &CellWrite) -> Result<u64, StoreError> {
        let mut tables = self.tables()?;
        let key = (write.sheet_id, write.row, write.col);
        let current = tables.cells.get(&key).map_or(0, |cell| cell.version);
        if current != write.expected_version {
            return Ok(0);
        }

        tables.deleted.remove(&key);
        let cell = tables
            .cells
            .entry(key)
            .or_insert_with(|| CellRow::empty(write.sheet_id, write.row, write.col));
        cell.content = write.content.clone();
        cell.last_edit_by = write.editor_id;
        cell.version = write.expected_version + 1;
        Ok(1)
    }

    async fn get_cell_by_position(&self, sheet_id: i64, row: i32, col: i32) -> Result<Option<CellRow>, StoreError> {
        Ok(self.tables()?.cells.get(&(sheet_id, row, col)).cloned())
    }

    async fn get_user_display_name(&self, user_id: i64) -> Result<Option<String>, StoreError> {
        Ok(self.tables()?.users.get(&user_id).cloned())
    }

    async fn get_drag_item(&self, item_id: i64) -> Result<Option<DragItemRow>, StoreError> {
        Ok(self.tables()?.drag_items.get(&item_id).cloned())
    }

    async fn place_drag_item(&self, placement: &DragItemPlacement) -> Result<PlacementResult, StoreError> {
        let mut tables = self.tables()?;
        let target_key = (placement.sheet_id, placement.target_row, placement.target_col);

        if let Some(target) = tables.cells.get(&target_key) {
            if let Some(occupant) = target.item_id {
                if occupant != placement.item_id && target.last_edit_by != placement.mover_id {
                    return Ok(PlacementResult::Occupied { occupant });
                }
            }
        }

        let mut from = None;
        for cell in tables.cells.values_mut() {
            let key = (cell.sheet_id, cell.row_index, cell.col_index);
            if key != target_key && cell.sheet_id == placement.sheet_id && cell.item_id == Some(placement.item_id) {
                from = Some((cell.row_index, cell.col_index));
                cell.item_id = None;
                cell.last_edit_by = placement.mover_id;
                cell.version += 1;
            }
        }

        tables.deleted.remove(&target_key);
        let target = tables
            .cells
            .entry(target_key)
            .or_insert_with(|| CellRow::empty(placement.sheet_id, placement.target_row, placement.target_col));
        target.item_id = Some(placement.item_id);
        target.last_edit_by = placement.mover_id;
        target.version += 1;

        Ok(PlacementResult::Placed { from })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.tables().map(|_| ())
    }
}
