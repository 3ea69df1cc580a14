use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{debug, error, info};

use super::store::{
    CellRow, CellWrite, DragItemPlacement, DragItemRow, PlacementResult, SheetStore, StoreError,
};

/// PostgreSQL backed sheet storage
pub struct DbSheet {
    pool: PgPool,
}

impl DbSheet {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    ///
    /// # Returns
    /// * `Result<Self, SqlxError>` - Database connection pool or error
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    fn log_pool_state(&self, action: &str, sheet_id: i64) {
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        debug!(
            "{} for sheet {}. Pool connections: {} idle, {} in use",
            action,
            sheet_id,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );
    }
}

#[async_trait]
impl SheetStore for DbSheet {
    async fn get_cell_version(&self, sheet_id: i64, row: i32, col: i32) -> Result<Option<i64>, StoreError> {
        let query_sql = r#"
            SELECT version
            FROM cell
            WHERE sheet_id = $1
                AND row_index = $2
                AND col_index = $3
                AND delete_time = 0
        "#;

        let row = sqlx::query(query_sql)
            .bind(sheet_id)
            .bind(row)
            .bind(col)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("version")?)),
            None => Ok(None),
        }
    }

    async fn conditional_update_cell(&self, write: &CellWrite) -> Result<u64, StoreError> {
        self.log_pool_state("Conditional cell update", write.sheet_id);

        // A cell that was never written, or was soft-deleted, is (re)created at version 1,
        // provided the writer saw version 0.
        let result = if write.expected_version == 0 {
            let query_sql = r#"
                INSERT INTO cell (sheet_id, row_index, col_index, content, last_edit_by, version, update_time, delete_time)
                VALUES ($1, $2, $3, $4, $5, 1, NOW(), 0)
                ON CONFLICT (sheet_id, row_index, col_index) DO UPDATE
                SET content = EXCLUDED.content,
                    item_id = CASE WHEN cell.delete_time <> 0 THEN NULL ELSE cell.item_id END,
                    last_edit_by = EXCLUDED.last_edit_by,
                    version = 1,
                    update_time = NOW(),
                    delete_time = 0
                WHERE cell.delete_time <> 0
                    OR cell.version = 0
            "#;
            sqlx::query(query_sql)
                .bind(write.sheet_id)
                .bind(write.row)
                .bind(write.col)
                .bind(&write.content)
                .bind(write.editor_id)
                .execute(&self.pool)
                .await
        } else {
            let query_sql = r#"
                UPDATE cell
                SET content = $4,
                    last_edit_by = $5,
                    version = $6 + 1,
                    update_time = NOW()
                WHERE sheet_id = $1
                    AND row_index = $2
                    AND col_index = $3
                    AND version = $6
                    AND delete_time = 0
            "#;
            sqlx::query(query_sql)
                .bind(write.sheet_id)
                .bind(write.row)
                .bind(write.col)
                .bind(&write.content)
                .bind(write.editor_id)
                .bind(write.expected_version)
                .execute(&self.pool)
                .await
        };

        match result {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) => {
                error!(
                    "Failed to update cell ({}, {}) of sheet {}: {}",
                    write.row, write.col, write.sheet_id, e
                );
                Err(e.into())
            }
        }
    }

    async fn get_cell_by_position(&self, sheet_id: i64, row: i32, col: i32) -> Result<Option<CellRow>, StoreError> {
        let query_sql = r#"
            SELECT
                sheet_id,
                row_index,
                col_index,
                COALESCE(content, '') AS content,
                item_id,
                last_edit_by,
                version
            FROM cell
            WHERE sheet_id = $1
                AND row_index = $2
                AND col_index = $3
                AND delete_time = 0
        "#;

        let cell = sqlx::query_as::<_, CellRow>(query_sql)
            .bind(sheet_id)
            .bind(row)
            .bind(col)
            .fetch_optional(&self.pool)
            .await?;

        Ok(cell)
    }

    async fn get_user_display_name(&self, user_id: i64) -> Result<Option<String>, StoreError> {
        let query_sql = r#"
            SELECT username
            FROM "user"
            WHERE user_id = $1
                AND delete_time = 0
        "#;

        let row = sqlx::query(query_sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("username")?)),
            None => Ok(None),
        }
    }

    async fn get_drag_item(&self, item_id: i64) -> Result<Option<DragItemRow>, StoreError> {
        let query_sql = r#"
            SELECT id, content, creator_id
            FROM draggable_item
            WHERE id = $1
                AND delete_time = 0
        "#;

        let item = sqlx::query_as::<_, DragItemRow>(query_sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    async fn place_drag_item(&self, placement: &DragItemPlacement) -> Result<PlacementResult, StoreError> {
        self.log_pool_state("Placing drag item", placement.sheet_id);

        // Begin a transaction
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(
                    "Failed to acquire connection from pool for sheet {}: {}. Pool state: {} idle, {} total",
                    placement.sheet_id, e, self.pool.num_idle(), self.pool.size()
                );
                return Err(e.into());
            }
        };

        // Where the item currently sits on this sheet, if anywhere else
        let source_sql = r#"
            SELECT row_index, col_index
            FROM cell
            WHERE sheet_id = $1
                AND item_id = $2
                AND delete_time = 0
                AND NOT (row_index = $3 AND col_index = $4)
            LIMIT 1
            FOR UPDATE
        "#;
        let source = sqlx::query(source_sql)
            .bind(placement.sheet_id)
            .bind(placement.item_id)
            .bind(placement.target_row)
            .bind(placement.target_col)
            .fetch_optional(&mut *tx)
            .await?;
        let from = match source {
            Some(row) => Some((row.try_get::<i32, _>("row_index")?, row.try_get::<i32, _>("col_index")?)),
            None => None,
        };

        // The target accepts the item when empty, already holding it, or last placed by the mover.
        // A soft-deleted row counts as empty and is revived at version 1.
        let target_sql = r#"
            INSERT INTO cell (sheet_id, row_index, col_index, content, item_id, last_edit_by, version, update_time, delete_time)
            VALUES ($1, $2, $3, '', $4, $5, 1, NOW(), 0)
            ON CONFLICT (sheet_id, row_index, col_index) DO UPDATE
            SET item_id = EXCLUDED.item_id,
                content = CASE WHEN cell.delete_time <> 0 THEN '' ELSE cell.content END,
                last_edit_by = EXCLUDED.last_edit_by,
                version = CASE WHEN cell.delete_time <> 0 THEN 1 ELSE cell.version + 1 END,
                update_time = NOW(),
                delete_time = 0
            WHERE cell.delete_time <> 0
                OR cell.item_id IS NULL
                OR cell.item_id = EXCLUDED.item_id
                OR cell.last_edit_by = EXCLUDED.last_edit_by
        "#;
        let placed = sqlx::query(target_sql)
            .bind(placement.sheet_id)
            .bind(placement.target_row)
            .bind(placement.target_col)
            .bind(placement.item_id)
            .bind(placement.mover_id)
            .execute(&mut *tx)
            .await?;

        if placed.rows_affected() == 0 {
            let occupant_sql = r#"
                SELECT item_id
                FROM cell
                WHERE sheet_id = $1
                    AND row_index = $2
                    AND col_index = $3
                    AND delete_time = 0
            "#;
            let occupant: Option<i64> = sqlx::query(occupant_sql)
                .bind(placement.sheet_id)
                .bind(placement.target_row)
                .bind(placement.target_col)
                .fetch_optional(&mut *tx)
                .await?
                .map(|row| row.try_get::<Option<i64>, _>("item_id"))
                .transpose()?
                .flatten();
            tx.rollback().await?;
            return Ok(PlacementResult::Occupied { occupant: occupant.unwrap_or_default() });
        }

        if from.is_some() {
            let clear_sql = r#"
                UPDATE cell
                SET item_id = NULL,
                    last_edit_by = $3,
                    version = version + 1,
                    update_time = NOW()
                WHERE sheet_id = $1
                    AND item_id = $2
                    AND delete_time = 0
                    AND NOT (row_index = $4 AND col_index = $5)
            "#;
            sqlx::query(clear_sql)
                .bind(placement.sheet_id)
                .bind(placement.item_id)
                .bind(placement.mover_id)
                .bind(placement.target_row)
                .bind(placement.target_col)
                .execute(&mut *tx)
                .await?;
        }

        // Commit the transaction
        tx.commit().await?;

        info!(
            "Drag item {} placed at ({}, {}) on sheet {} by user {}",
            placement.item_id, placement.target_row, placement.target_col, placement.sheet_id, placement.mover_id
        );
        Ok(PlacementResult::Placed { from })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
