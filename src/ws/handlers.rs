//! Realtime message dispatch
//!
//! Answers client messages on an established session connection. Session
//! mutations triggered here are fanned out through the event hub, so most
//! messages produce no direct reply.

use crate::error::GameError;
use crate::metrics;
use crate::protocol::{ClientMessage, Envelope, ServerEvent};
use crate::state::AppState;
use std::sync::Arc;

fn reply(state: &AppState, session_id: &str, event: ServerEvent) -> Envelope {
    Envelope::new(session_id, state.hub.current_seq(session_id), event)
}

fn error_reply(state: &AppState, session_id: &str, err: &GameError) -> Envelope {
    reply(state, session_id, ServerEvent::error(err.code(), err.to_string()))
}

/// Handle a client message and return an optional direct reply
pub async fn handle_message(
    msg: ClientMessage,
    session_id: &str,
    player_id: &str,
    state: &Arc<AppState>,
) -> Option<Envelope> {
    let kind = match &msg {
        ClientMessage::Ping { .. } => "ping",
        ClientMessage::SubmitResponse { .. } => "submit-response",
        ClientMessage::RequestSync => "request-sync",
    };
    state
        .metrics
        .increment(metrics::WS_MESSAGES_TOTAL, &[("type", kind)]);

    match msg {
        ClientMessage::Ping { sent_at } => {
            Some(reply(state, session_id, ServerEvent::Pong { sent_at }))
        }

        ClientMessage::SubmitResponse { response } => {
            match state
                .submit_response(session_id, player_id, &response)
                .await
            {
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!("Rejected response from {}: {}", player_id, e);
                    Some(error_reply(state, session_id, &e))
                }
            }
        }

        ClientMessage::RequestSync => match state.welcome(session_id, player_id).await {
            Ok(welcome) => Some(welcome),
            Err(e) => Some(error_reply(state, session_id, &e)),
        },
    }
}
