pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, Envelope, ServerEvent};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub session_id: String,
    pub player_id: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection request: session={}, player={}",
        params.session_id,
        params.player_id
    );

    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn send_envelope<S>(sender: &mut S, envelope: &Envelope) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    match serde_json::to_string(envelope) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize {}: {}", envelope.event.kind(), e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let WsQuery {
        session_id,
        player_id,
    } = params;

    let (mut events, welcome) = match state.subscribe(&session_id, &player_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!("Refusing WebSocket for {}/{}: {}", session_id, player_id, e);
            let error = Envelope::new(
                &session_id,
                0,
                ServerEvent::error(e.code(), e.to_string()),
            );
            send_envelope(&mut sender, &error).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    if !send_envelope(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    if let Err(e) = state.connect_player(&session_id, &player_id).await {
        tracing::warn!("Failed to register connection: {}", e);
        return;
    }

    // Replies from submissions scored off the socket loop
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<Envelope>();

    loop {
        tokio::select! {
            Some(reply) = reply_rx.recv() => {
                if !send_envelope(&mut sender, &reply).await {
                    tracing::error!("Failed to send response");
                    break;
                }
            }

            event = events.recv() => {
                match event {
                    Ok(envelope) => {
                        if !send_envelope(&mut sender, &envelope).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            "Player {} lagged {} events behind, resyncing",
                            player_id,
                            skipped
                        );
                        match state.welcome(&session_id, &player_id).await {
                            Ok(resync) => {
                                if !send_envelope(&mut sender, &resync).await {
                                    break;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);
                        state.touch_connection(&session_id, &player_id).await;

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg @ ClientMessage::SubmitResponse { .. }) => {
                                // Scoring can take as long as the AI timeout; keep forwarding meanwhile
                                let state = state.clone();
                                let session_id = session_id.clone();
                                let player_id = player_id.clone();
                                let reply_tx = reply_tx.clone();
                                tokio::spawn(async move {
                                    if let Some(reply) = handlers::handle_message(
                                        client_msg,
                                        &session_id,
                                        &player_id,
                                        &state,
                                    )
                                    .await
                                    {
                                        let _ = reply_tx.send(reply);
                                    }
                                });
                            }
                            Ok(client_msg) => {
                                if let Some(response) = handlers::handle_message(
                                    client_msg,
                                    &session_id,
                                    &player_id,
                                    &state,
                                )
                                .await
                                {
                                    if !send_envelope(&mut sender, &response).await {
                                        tracing::error!("Failed to send response");
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                let error = Envelope::new(
                                    &session_id,
                                    state.hub.current_seq(&session_id),
                                    ServerEvent::error(
                                        "PARSE_ERROR",
                                        format!("Invalid message format: {}", e),
                                    ),
                                );
                                send_envelope(&mut sender, &error).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        state.touch_connection(&session_id, &player_id).await;
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    state.disconnect_player(&session_id, &player_id).await;
    tracing::info!(
        "WebSocket connection closed for {} in session {}",
        player_id,
        session_id
    );
}
