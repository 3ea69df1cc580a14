pub mod auth_service;
pub mod cell_sync_service;

pub use auth_service::AuthUser;
pub use cell_sync_service::{CellSynchronizer, CellUpdateOutcome, MoveOutcome};
