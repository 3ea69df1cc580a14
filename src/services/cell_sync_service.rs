use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::{CellWrite, DragItemPlacement, PlacementResult, SheetStore, StoreError};
use crate::ws::LockTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellUpdateOutcome {
    Applied {
        version: i64,
        content: String,
    },
    /// The writer saw an outdated version; nothing was written.
    Conflict {
        your_content: String,
        current_content: String,
        current_version: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { from: Option<(i32, i32)> },
    /// The mover has no valid lock on the item.
    LockNotHeld,
    TargetOccupied { occupant: i64 },
    ItemNotFound,
}

/// Version-checked cell writes and lock-guarded drag item placement.
///
/// Storage is the only source of truth for versions; nothing is cached here.
pub struct CellSynchronizer {
    store: Arc<dyn SheetStore>,
    locks: Arc<LockTable>,
}

impl CellSynchronizer {
    pub fn new(store: Arc<dyn SheetStore>, locks: Arc<LockTable>) -> Self {
        Self { store, locks }
    }

    /// Writes `content` if `observed_version` is still the cell's version.
    ///
    /// The storage write itself is conditional, so a concurrent writer that slips in
    /// between the version read and the write still produces a conflict.
    pub async fn apply_update(
        &self,
        sheet_id: i64,
        row: i32,
        col: i32,
        content: String,
        observed_version: i64,
        editor_id: i64,
    ) -> Result<CellUpdateOutcome, StoreError> {
        // A cell that was never written behaves as an empty cell at version 0
        let current_version = self.store.get_cell_version(sheet_id, row, col).await?.unwrap_or(0);
        if observed_version != current_version {
            debug!(
                "Stale write to ({}, {}) on sheet {} by user {}: saw v{}, current v{}",
                row, col, sheet_id, editor_id, observed_version, current_version
            );
            return self.conflict(sheet_id, row, col, content).await;
        }

        let write = CellWrite {
            sheet_id,
            row,
            col,
            content,
            expected_version: current_version,
            editor_id,
        };
        let affected = self.store.conditional_update_cell(&write).await?;
        if affected == 0 {
            debug!(
                "Lost write race on ({}, {}) of sheet {} for user {} at v{}",
                row, col, sheet_id, editor_id, current_version
            );
            return self.conflict(sheet_id, row, col, write.content).await;
        }

        Ok(CellUpdateOutcome::Applied {
            version: current_version + 1,
            content: write.content,
        })
    }

    async fn conflict(
        &self,
        sheet_id: i64,
        row: i32,
        col: i32,
        your_content: String,
    ) -> Result<CellUpdateOutcome, StoreError> {
        let current = self.store.get_cell_by_position(sheet_id, row, col).await?;
        let (current_content, current_version) = current
            .map(|cell| (cell.content, cell.version))
            .unwrap_or_default();
        Ok(CellUpdateOutcome::Conflict {
            your_content,
            current_content,
            current_version,
        })
    }

    /// Places a drag item on a target cell. The mover must hold the item's lock; the lock
    /// is refreshed on success and released when the move fails.
    pub async fn move_item(
        &self,
        sheet_id: i64,
        item_id: i64,
        target_row: i32,
        target_col: i32,
        mover_id: i64,
    ) -> Result<MoveOutcome, StoreError> {
        if !self.locks.refresh(item_id, mover_id) {
            warn!("User {} tried to move drag item {} without holding its lock", mover_id, item_id);
            return Ok(MoveOutcome::LockNotHeld);
        }

        let outcome = self.place(sheet_id, item_id, target_row, target_col, mover_id).await;
        if !matches!(outcome, Ok(MoveOutcome::Moved { .. })) {
            self.locks.release(item_id, mover_id);
        }
        outcome
    }

    async fn place(
        &self,
        sheet_id: i64,
        item_id: i64,
        target_row: i32,
        target_col: i32,
        mover_id: i64,
    ) -> Result<MoveOutcome, StoreError> {
        if self.store.get_drag_item(item_id).await?.is_none() {
            warn!("Drag item {} not found", item_id);
            return Ok(MoveOutcome::ItemNotFound);
        }

        let placement = DragItemPlacement {
            sheet_id,
            item_id,
            target_row,
            target_col,
            mover_id,
        };
        match self.store.place_drag_item(&placement).await {
            Ok(PlacementResult::Placed { from }) => {
                info!(
                    "User {} moved drag item {} to ({}, {}) on sheet {}",
                    mover_id, item_id, target_row, target_col, sheet_id
                );
                Ok(MoveOutcome::Moved { from })
            }
            Ok(PlacementResult::Occupied { occupant }) => Ok(MoveOutcome::TargetOccupied { occupant }),
            Err(e) => {
                error!("Failed to place drag item {} on sheet {}: {}", item_id, sheet_id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DragItemRow, MemoryStore};
    use std::time::Duration;

    fn synchronizer() -> (CellSynchronizer, Arc<MemoryStore>, Arc<LockTable>) {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(LockTable::new(Duration::from_secs(30)));
        (CellSynchronizer::new(store.clone(), locks.clone()), store, locks)
    }

    fn drag_item(id: i64) -> DragItemRow {
        DragItemRow { id, content: "Physics".into(), creator_id: 1 }
    }

    #[tokio::test]
    async fn first_write_lands_at_version_one() {
        let (cells, store, _) = synchronizer();
        let outcome = cells.apply_update(5, 2, 3, "Math".into(), 0, 1).await.unwrap();
        assert_eq!(outcome, CellUpdateOutcome::Applied { version: 1, content: "Math".into() });

        let cell = store.get_cell_by_position(5, 2, 3).await.unwrap().unwrap();
        assert_eq!(cell.version, 1);
        assert_eq!(cell.last_edit_by, 1);
    }

    #[tokio::test]
    async fn stale_write_is_side_effect_free() {
        let (cells, store, _) = synchronizer();
        cells.apply_update(5, 2, 3, "Math".into(), 0, 1).await.unwrap();

        let outcome = cells.apply_update(5, 2, 3, "Art".into(), 0, 2).await.unwrap();
        assert_eq!(
            outcome,
            CellUpdateOutcome::Conflict {
                your_content: "Art".into(),
                current_content: "Math".into(),
                current_version: 1,
            }
        );

        let cell = store.get_cell_by_position(5, 2, 3).await.unwrap().unwrap();
        assert_eq!(cell.content, "Math");
        assert_eq!(cell.version, 1);
    }

    #[tokio::test]
    async fn stale_write_to_untouched_cell_creates_nothing() {
        let (cells, store, _) = synchronizer();
        let outcome = cells.apply_update(5, 2, 3, "Art".into(), 4, 2).await.unwrap();
        assert!(matches!(outcome, CellUpdateOutcome::Conflict { current_version: 0, .. }));
        assert!(store.get_cell_by_position(5, 2, 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_cell_conflict_then_resubmit_succeeds() {
        let (cells, store, _) = synchronizer();
        cells.apply_update(5, 2, 3, "Math".into(), 0, 1).await.unwrap();
        store.soft_delete_cell(5, 2, 3).unwrap();

        // a client still holding v1 is told the cell is at v0
        let outcome = cells.apply_update(5, 2, 3, "Art".into(), 1, 2).await.unwrap();
        assert!(matches!(outcome, CellUpdateOutcome::Conflict { current_version: 0, .. }));

        let outcome = cells.apply_update(5, 2, 3, "Art".into(), 0, 2).await.unwrap();
        assert_eq!(outcome, CellUpdateOutcome::Applied { version: 1, content: "Art".into() });
    }

    #[tokio::test]
    async fn concurrent_same_version_writes_have_one_winner() {
        let (cells, store, _) = synchronizer();
        let cells = Arc::new(cells);
        cells.apply_update(5, 1, 1, "v1".into(), 0, 1).await.unwrap();

        let tasks: Vec<_> = (0..10)
            .map(|editor| {
                let cells = cells.clone();
                tokio::spawn(async move { cells.apply_update(5, 1, 1, format!("edit {editor}"), 1, editor).await })
            })
            .collect();

        let mut applied = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                CellUpdateOutcome::Applied { version, .. } => {
                    assert_eq!(version, 2);
                    applied += 1;
                }
                CellUpdateOutcome::Conflict { .. } => conflicts += 1,
            }
        }
        assert_eq!((applied, conflicts), (1, 9));
        assert_eq!(store.get_cell_version(5, 1, 1).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn move_requires_lock() {
        let (cells, store, _) = synchronizer();
        store.insert_drag_item(drag_item(42)).unwrap();
        let outcome = cells.move_item(5, 42, 1, 1, 7).await.unwrap();
        assert_eq!(outcome, MoveOutcome::LockNotHeld);
        assert!(store.get_cell_by_position(5, 1, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn move_with_lock_places_item_and_keeps_lock() {
        let (cells, store, locks) = synchronizer();
        store.insert_drag_item(drag_item(42)).unwrap();
        locks.acquire(42, 7).unwrap();

        assert_eq!(cells.move_item(5, 42, 1, 1, 7).await.unwrap(), MoveOutcome::Moved { from: None });
        assert_eq!(
            cells.move_item(5, 42, 2, 2, 7).await.unwrap(),
            MoveOutcome::Moved { from: Some((1, 1)) }
        );
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn occupied_target_rejects_and_releases_lock() {
        let (cells, store, locks) = synchronizer();
        store.insert_drag_item(drag_item(42)).unwrap();
        store.insert_drag_item(drag_item(43)).unwrap();
        locks.acquire(42, 7).unwrap();
        cells.move_item(5, 42, 1, 1, 7).await.unwrap();

        locks.acquire(43, 8).unwrap();
        let outcome = cells.move_item(5, 43, 1, 1, 8).await.unwrap();
        assert_eq!(outcome, MoveOutcome::TargetOccupied { occupant: 42 });
        assert!(!locks.release(43, 8), "failed move drops the mover's lock");
    }

    #[tokio::test]
    async fn unknown_item_is_reported() {
        let (cells, _, locks) = synchronizer();
        locks.acquire(99, 7).unwrap();
        assert_eq!(cells.move_item(5, 99, 1, 1, 7).await.unwrap(), MoveOutcome::ItemNotFound);
        assert!(locks.is_empty());
    }
}
