pub mod hub;
pub mod locks;
pub mod presence;
pub mod registry;
pub mod session;
pub mod userctx;

pub use hub::{LeaveGuard, SyncHub};
pub use locks::{spawn_lock_sweeper, LockError, LockGrant, LockTable};
pub use presence::PresenceTracker;
pub use registry::RoomRegistry;
pub use session::{SessionHandle, SessionUser};
pub use userctx::UserNameCache;
