use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

/// Authenticated identity a session acts for
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: i64,
    pub username: String,
}

/// Result of a non-blocking enqueue onto a session's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueue {
    Queued,
    /// The queue is at capacity; the session is treated as unresponsive.
    Full,
    /// The write loop is gone.
    Closed,
}

/// Cheap, cloneable handle to one live session.
///
/// The write loop owns the receiving half of the outbound queue; registries only
/// ever hold handles, so dropping a handle never keeps a transport alive.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: Uuid,
    pub sheet_id: i64,
    pub user: SessionUser,
    outbound: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(sheet_id: i64, user: SessionUser, queue_capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, receiver) = mpsc::channel(queue_capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            sheet_id,
            user,
            outbound,
            shutdown: Arc::new(Notify::new()),
        };
        (handle, receiver)
    }

    pub fn user_id(&self) -> i64 {
        self.user.user_id
    }

    pub fn try_enqueue(&self, frame: String) -> Enqueue {
        match self.outbound.try_send(frame) {
            Ok(()) => Enqueue::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Enqueue::Full,
            Err(mpsc::error::TrySendError::Closed(_)) => Enqueue::Closed,
        }
    }

    /// Signals the write loop to stop. The permit is retained if the loop is not waiting yet.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves once `close` has been called.
    pub async fn closed(&self) {
        self.shutdown.notified().await;
    }
}
