use dashmap::DashMap;
use std::collections::HashMap;

use crate::models::OnlineUser;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub username: String,
    pub connections: u32,
}

/// Per-sheet connection counts per user.
///
/// Each sheet's user map sits behind its DashMap shard lock, so a count and its
/// name always change together and a snapshot never sees half an update.
#[derive(Default)]
pub struct PresenceTracker {
    sheets: DashMap<i64, HashMap<i64, PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one more session for the user; returns the new count.
    pub fn on_join(&self, sheet_id: i64, user_id: i64, username: &str) -> u32 {
        let mut users = self.sheets.entry(sheet_id).or_default();
        let entry = users.entry(user_id).or_insert_with(|| PresenceEntry {
            username: username.to_string(),
            connections: 0,
        });
        entry.username = username.to_string();
        entry.connections += 1;
        entry.connections
    }

    /// Counts one session less for the user; the entry disappears at zero. Returns the remaining count.
    pub fn on_leave(&self, sheet_id: i64, user_id: i64) -> u32 {
        let remaining = {
            let Some(mut users) = self.sheets.get_mut(&sheet_id) else {
                return 0;
            };
            let current = users.get(&user_id).map_or(0, |entry| entry.connections);
            if current > 1 {
                if let Some(entry) = users.get_mut(&user_id) {
                    entry.connections = current - 1;
                }
                current - 1
            } else {
                users.remove(&user_id);
                0
            }
        };
        self.sheets.remove_if(&sheet_id, |_, users| users.is_empty());
        remaining
    }

    /// Current viewers of a sheet, ordered by user id.
    pub fn snapshot(&self, sheet_id: i64) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self
            .sheets
            .get(&sheet_id)
            .map(|users| {
                users
                    .iter()
                    .map(|(user_id, entry)| OnlineUser {
                        user_id: *user_id,
                        username: entry.username.clone(),
                        connections: entry.connections,
                    })
                    .collect()
            })
            .unwrap_or_default();
        users.sort_by_key(|user| user.user_id);
        users
    }

    pub fn connections(&self, sheet_id: i64, user_id: i64) -> u32 {
        self.sheets
            .get(&sheet_id)
            .and_then(|users| users.get(&user_id).map(|entry| entry.connections))
            .unwrap_or(0)
    }

    /// Distinct (sheet, user) pairs currently online
    pub fn online_user_count(&self) -> usize {
        self.sheets.iter().map(|users| users.len()).sum()
    }
}
