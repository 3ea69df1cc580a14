use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, State,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc::Receiver;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::config::SyncSettings;
use crate::models::ErrorResponse;
use crate::services::AuthUser;
use crate::state::AppState;
use crate::websocket::dispatcher::dispatch;
use crate::ws::{LeaveGuard, SessionHandle, SessionUser};

#[derive(Debug, Error)]
enum WriteError {
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
    #[error("write deadline exceeded")]
    Timeout,
}

/// WebSocket handler
pub async fn websocket_handler(
    Path(sheet_id): Path<i64>,
    Extension(auth_user): Extension<AuthUser>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    info!("New WebSocket connection attempt for sheet {} by user {}", sheet_id, auth_user.user_id);

    // Resolve the display name before upgrading, so unknown users never get a session
    let username = match state.user_names.get_or_fetch(state.store.as_ref(), auth_user.user_id).await {
        Ok(Some(username)) => username,
        Ok(None) => {
            warn!("Refusing WebSocket for unknown user {}", auth_user.user_id);
            return Err(ErrorResponse::reply(StatusCode::NOT_FOUND, "User not found"));
        }
        Err(e) => {
            error!("Failed to resolve user {}: {}", auth_user.user_id, e);
            return Err(ErrorResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load user"));
        }
    };

    let user = SessionUser { user_id: auth_user.user_id, username };
    let max_size = state.settings.max_message_size;
    Ok(ws
        .max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| handle_socket(socket, sheet_id, user, state)))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, sheet_id: i64, user: SessionUser, state: Arc<AppState>) {
    let settings = state.settings.clone();
    let (session, outbound) = SessionHandle::new(sheet_id, user, settings.outbound_queue_capacity);
    state.hub.join(&session);

    // Teardown runs exactly once, whichever way this function is left
    let _leave = LeaveGuard::new(state.hub.clone(), session.clone());

    info!("WebSocket connection established for sheet {} with session {}", sheet_id, session.id);
    let (sender, receiver) = socket.split();

    let mut send_task = tokio::spawn(write_loop(sender, outbound, session.clone(), settings));
    let mut recv_task = tokio::spawn(read_loop(receiver, session.clone(), state.clone()));

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("WebSocket connection terminated for session {}", session.id);
}

/// Drains the outbound queue onto the socket and pings on a fixed period.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: Receiver<String>,
    session: SessionHandle,
    settings: SyncSettings,
) {
    let mut ping = time::interval_at(Instant::now() + settings.ping_period, settings.ping_period);

    loop {
        let message = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame),
                None => break,
            },
            _ = session.closed() => {
                debug!("Session {} closed by the server", session.id);
                let _ = time::timeout(settings.write_wait, sender.send(Message::Close(None))).await;
                break;
            }
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        // An eviction must not wait for a stalled write to time out
        tokio::select! {
            result = send_with_retry(&mut sender, message, &settings) => {
                if let Err(e) = result {
                    warn!("Dropping session {} after failed write: {}", session.id, e);
                    break;
                }
            }
            _ = session.closed() => {
                debug!("Session {} closed by the server during a write", session.id);
                break;
            }
        }
    }
}

/// Writes one frame within `write_wait`, retrying up to `write_retries` times.
///
/// Once the sink has accepted the frame only the flush is retried, so a slow peer
/// never receives the same frame twice.
async fn send_with_retry<S>(sender: &mut S, message: Message, settings: &SyncSettings) -> Result<(), WriteError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut queued = false;
    let mut attempt = 0;
    loop {
        let step = if queued {
            time::timeout(settings.write_wait, sender.flush()).await
        } else {
            time::timeout(settings.write_wait, async {
                sender.feed(message.clone()).await?;
                queued = true;
                sender.flush().await
            })
            .await
        };
        let err = match step {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => WriteError::from(e),
            Err(_) => WriteError::Timeout,
        };
        if attempt >= settings.write_retries {
            return Err(err);
        }
        attempt += 1;
        debug!("Write failed ({}), retry {} of {}", err, attempt, settings.write_retries);
        time::sleep(retry_backoff(attempt)).await;
    }
}

/// Quadratic backoff between write retries.
fn retry_backoff(attempt: u32) -> Duration {
    let attempt = u64::from(attempt);
    Duration::from_millis(50 * attempt * attempt)
}

/// Reads frames until the peer goes away, errors, or stops answering pings.
async fn read_loop(mut receiver: SplitStream<WebSocket>, session: SessionHandle, state: Arc<AppState>) {
    let pong_wait = state.settings.pong_wait;
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let frame = match time::timeout_at(deadline, receiver.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                warn!("Read error on session {}: {}", session.id, e);
                break;
            }
            Ok(None) => break,
            Err(_) => {
                warn!("Session {} missed its pong deadline", session.id);
                break;
            }
        };

        match frame {
            Message::Text(text) => dispatch(&state, &session, &text).await,
            Message::Pong(_) => deadline = Instant::now() + pong_wait,
            // Pings are answered by the transport
            Message::Ping(_) => {}
            Message::Binary(_) => warn!("Ignoring binary frame from session {}", session.id),
            Message::Close(_) => {
                debug!("Session {} sent close", session.id);
                break;
            }
        }
    }
}
