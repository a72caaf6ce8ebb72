//! Per-connection handler: handshake, then hand off to the scheduler.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Wrap the connection in a session (starts its reader task)
//!   2. Run the proof-of-work handshake under the handshake deadline
//!   3. Admit the session to the scheduler's pool
//!
//! After admission the scheduler owns the session; the handler returns.

use std::sync::Arc;

use haggle_scheduler::SchedulerError;
use haggle_session::Session;
use haggle_transport::{Connection, WebSocketConnection};

use crate::HaggleError;
use crate::server::ServerState;

/// Handles a single connection from accept to admission.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), HaggleError> {
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    let session = Session::spawn(conn, state.session_config.clone());

    let identity = match session.handshake(state.verifier.as_ref()).await {
        Ok(identity) => identity,
        Err(e) => {
            // Rejections already closed it; a timeout did not.
            session.close().await;
            return Err(e.into());
        }
    };

    match state.scheduler.admit(Arc::clone(&session)).await {
        Ok(()) => {
            tracing::info!(%conn_id, %identity, "agent joined the pool");
            Ok(())
        }
        // The scheduler tells the remote why and closes the session.
        Err(e @ SchedulerError::DuplicateIdentity(_)) => Err(e.into()),
        Err(e) => {
            session.close().await;
            Err(e.into())
        }
    }
}
