use crate::{models::DiagnosticsResponse, services::AuthUser, state::AppState};
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use std::sync::{Arc, Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Report session, room, lock and process statistics
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> (StatusCode, Json<DiagnosticsResponse>) {
    let hub = &state.hub;
    let n_sessions = hub.rooms.session_count() as u32;
    let n_rooms = hub.rooms.room_count() as u32;
    let n_online_users = hub.presence.online_user_count() as u32;
    let n_locks = hub.locks.len() as u32;
    let n_user_names = state.user_names.entry_count() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics for user {}: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Sessions: {}, Rooms: {}, Locks: {}",
        auth_user.user_id,
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_sessions,
        n_rooms,
        n_locks
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_sessions,
            n_rooms,
            n_online_users,
            n_locks,
            n_user_names,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    )
}
