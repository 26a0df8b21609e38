use crate::protocol::{Envelope, ServerEvent};
use crate::state::AppState;
use crate::types::SessionId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

const SESSION_CHANNEL_CAPACITY: usize = 256;

/// How often idle connection registry entries and expired cache entries are swept
pub const REAPER_INTERVAL: Duration = Duration::from_secs(60);

struct SessionChannel {
    tx: broadcast::Sender<Envelope>,
    seq: u64,
}

impl SessionChannel {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SESSION_CHANNEL_CAPACITY);
        Self { tx, seq: 0 }
    }
}

/// Per-session fan-out of sequenced events
#[derive(Default)]
pub struct EventHub {
    channels: Mutex<HashMap<SessionId, SessionChannel>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<SessionId, SessionChannel>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stamp the next sequence number on `event` and send it to every subscriber.
    ///
    /// Callers publish while holding the sessions write lock so that sequence
    /// order equals mutation order.
    pub fn publish(&self, session_id: &str, event: ServerEvent) -> Envelope {
        let mut channels = self.channels();
        let channel = channels
            .entry(session_id.to_string())
            .or_insert_with(SessionChannel::new);
        channel.seq += 1;

        let envelope = Envelope::new(session_id, channel.seq, event);
        // No receivers connected is fine
        if channel.tx.send(envelope.clone()).is_err() {
            tracing::trace!(
                "No subscribers for {} in session {}",
                envelope.event.kind(),
                session_id
            );
        }
        envelope
    }

    /// Subscribe to a session and return the sequence number of the last published event
    pub fn subscribe(&self, session_id: &str) -> (broadcast::Receiver<Envelope>, u64) {
        let mut channels = self.channels();
        let channel = channels
            .entry(session_id.to_string())
            .or_insert_with(SessionChannel::new);
        (channel.tx.subscribe(), channel.seq)
    }

    pub fn current_seq(&self, session_id: &str) -> u64 {
        self.channels().get(session_id).map(|c| c.seq).unwrap_or(0)
    }

    /// Drop a session's channel; open receivers see the channel close
    pub fn remove(&self, session_id: &str) -> bool {
        self.channels().remove(session_id).is_some()
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.channels()
            .get(session_id)
            .map(|c| c.tx.receiver_count())
            .unwrap_or(0)
    }
}

/// Close the round for `door_id` if players have not all answered within `limit`
pub fn spawn_response_timeout(
    state: Arc<AppState>,
    session_id: SessionId,
    door_id: String,
    limit: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(limit).await;
        if let Err(e) = state.handle_response_timeout(&session_id, &door_id).await {
            tracing::warn!(
                "Response timeout for door {} in session {} failed: {}",
                door_id,
                session_id,
                e
            );
        }
    });
}

/// Present the next door after `delay`
pub fn spawn_next_door(state: Arc<AppState>, session_id: SessionId, delay: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = state.present_next_door(&session_id).await {
            tracing::warn!("Could not present next door in session {}: {}", session_id, e);
        }
    });
}

/// Periodically drop stale connection entries and expired cached doors
pub fn spawn_connection_reaper(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(REAPER_INTERVAL);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = state.cleanup_inactive_connections().await;
            let purged = state.doors.purge_cache().await;
            let evicted = state.prune_completed_sessions().await;
            if removed > 0 || purged > 0 || evicted > 0 {
                tracing::debug!(
                    "Reaper removed {} idle connections, {} cached doors and {} completed sessions",
                    removed,
                    purged,
                    evicted
                );
            }
        }
    });
}
