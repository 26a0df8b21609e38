use async_trait::async_trait;
use dumdoors::api;
use dumdoors::client::{Applied, Connector, SessionStore, Transport, WsConnector};
use dumdoors::config::AppConfig;
use dumdoors::error::GameError;
use dumdoors::metrics::Metrics;
use dumdoors::protocol::{ClientMessage, Envelope, ServerEvent};
use dumdoors::scoring::{ScoreRequest, Scorer, ScoringResult};
use dumdoors::state::AppState;
use dumdoors::types::{Door, GameMode, GameStatus, LeaderboardFilter, ScoringMetrics};
use dumdoors::ws::handlers::handle_message;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const ANSWERS: &[&str] = &[
    "I would creatively build a ladder out of the bookshelf and climb out",
    "Call the fire department and calmly wait by the window",
    "Negotiate with the goose using a sandwich as leverage",
    "Use the emergency exit and alert everyone on the way out",
];

fn fast_state() -> Arc<AppState> {
    Arc::new(AppState::with_config(AppConfig {
        door_time_limit: Duration::from_secs(3600),
        next_door_delay: Duration::from_millis(5),
        ..AppConfig::default()
    }))
}

/// Wait for the next door, or None once the game is over
async fn wait_for_door(state: &AppState, session_id: &str) -> Option<Door> {
    for _ in 0..500 {
        let session = state.get_session(session_id).await.expect("session exists");
        if session.status == GameStatus::Completed {
            return None;
        }
        if let Some(door) = session.current_door {
            return Some(door);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("No door presented in time");
}

/// Feed everything buffered on the channel into the store
fn drain(rx: &mut broadcast::Receiver<Envelope>, store: &mut SessionStore, seen: &mut Vec<Envelope>) {
    while let Ok(envelope) = rx.try_recv() {
        store.apply(&envelope);
        seen.push(envelope);
    }
}

/// End-to-end single-player game driven through the realtime handlers
#[tokio::test]
async fn test_single_player_game_to_completion() {
    let state = fast_state();

    // 1. Create the session
    let session = state
        .create_session(GameMode::SinglePlayer, "alice", "Alice", Some("workplace".to_string()))
        .await
        .unwrap();
    let id = session.session_id.clone();
    assert_eq!(session.status, GameStatus::Waiting);

    // 2. Connect: subscribe and apply the welcome snapshot
    let (mut rx, welcome) = state.subscribe(&id, "alice").await.unwrap();
    let mut store = SessionStore::new();
    assert_eq!(store.apply(&welcome), Applied::Snapshot);
    state.connect_player(&id, "alice").await.unwrap();

    // 3. Single-player sessions take nobody else
    assert_eq!(
        state.join_session(&id, "bob", "Bob").await.unwrap_err(),
        GameError::SinglePlayerTaken
    );

    // 4. Start with the first door
    state.start_game_with_first_door(&id).await.unwrap();
    let first = wait_for_door(&state, &id).await.unwrap();
    assert_eq!(first.difficulty, 1);
    assert_eq!(first.theme, "workplace");

    // 5. Answer doors until the path is done
    let mut seen = Vec::new();
    let mut last_position = 0;
    let mut rounds = 0;
    while wait_for_door(&state, &id).await.is_some() {
        let reply = handle_message(
            ClientMessage::SubmitResponse {
                response: ANSWERS[rounds % ANSWERS.len()].to_string(),
            },
            &id,
            "alice",
            &state,
        )
        .await;
        assert!(reply.is_none(), "unexpected reply {:?}", reply);

        drain(&mut rx, &mut store, &mut seen);
        let position = store.position_of("alice").unwrap();
        assert!(position >= last_position);
        last_position = position;

        rounds += 1;
        assert!(rounds < 40, "game never finished");
    }
    drain(&mut rx, &mut store, &mut seen);

    // 6. Completed: snapshot, completion event and leaderboard entry
    let session = state.get_session(&id).await.unwrap();
    assert_eq!(session.status, GameStatus::Completed);
    assert!(store.is_completed());
    assert_eq!(store.session().unwrap().version, session.version);
    assert!(rounds >= 5);

    let completed = seen
        .iter()
        .find_map(|e| match &e.event {
            ServerEvent::GameCompleted { winner_id, .. } => Some(winner_id.clone()),
            _ => None,
        })
        .expect("game-completed published");
    assert_eq!(completed.as_deref(), Some("alice"));

    // Sequence numbers are strictly increasing
    assert!(seen.windows(2).all(|w| w[0].seq < w[1].seq));

    let board = state.global_leaderboard(&LeaderboardFilter::default()).await;
    assert_eq!(board.fastest_completions.len(), 1);
    assert_eq!(board.fastest_completions[0].player_id, "alice");
    assert_eq!(state.leaderboard_stats().await.total_games_completed, 1);

    // 7. Nothing mutates a finished game
    assert_eq!(
        state.submit_response(&id, "alice", ANSWERS[1]).await.unwrap_err(),
        GameError::SessionCompleted
    );
    assert_eq!(state.complete_game(&id).await.unwrap_err(), GameError::SessionCompleted);
}

/// Two players answering every door of a multiplayer game
#[tokio::test]
async fn test_multiplayer_rounds() {
    let state = fast_state();
    let session = state
        .create_session(GameMode::Multiplayer, "alice", "Alice", None)
        .await
        .unwrap();
    let id = session.session_id.clone();

    // Multiplayer needs a second player
    assert_eq!(
        state.start_game(&id).await.unwrap_err(),
        GameError::NotEnoughPlayers
    );
    state.join_session(&id, "bob", "Bob").await.unwrap();

    let (mut rx, welcome) = state.subscribe(&id, "bob").await.unwrap();
    let mut store = SessionStore::new();
    store.apply(&welcome);

    state.start_game_with_first_door(&id).await.unwrap();

    // Joining a started game fails
    assert_eq!(
        state.join_session(&id, "carol", "Carol").await.unwrap_err(),
        GameError::NotAcceptingPlayers
    );

    let mut seen = Vec::new();
    let mut rounds = 0;
    while wait_for_door(&state, &id).await.is_some() {
        for (i, player) in ["alice", "bob"].iter().enumerate() {
            let reply = handle_message(
                ClientMessage::SubmitResponse {
                    response: ANSWERS[(rounds + i) % ANSWERS.len()].to_string(),
                },
                &id,
                player,
                &state,
            )
            .await;
            assert!(reply.is_none());
        }
        drain(&mut rx, &mut store, &mut seen);
        rounds += 1;
        assert!(rounds < 40, "game never finished");
    }
    drain(&mut rx, &mut store, &mut seen);

    let scores_updates = seen
        .iter()
        .filter(|e| matches!(e.event, ServerEvent::ScoresUpdated { .. }))
        .count();
    assert_eq!(scores_updates, rounds);

    let session = state.get_session(&id).await.unwrap();
    assert_eq!(session.status, GameStatus::Completed);
    assert!(session.players.iter().any(|p| p.has_won()));
    assert!(store.is_completed());

    let rankings = state.final_rankings(&id).await.unwrap();
    assert_eq!(rankings.len(), 2);
    assert!(rankings[0].is_winner);

    // One entry per player with at least one response
    assert_eq!(state.leaderboard.read().await.len(), 2);
}

/// Ping, sync and error replies over the realtime handlers
#[tokio::test]
async fn test_realtime_replies() {
    let state = fast_state();
    let session = state
        .create_session(GameMode::Multiplayer, "alice", "Alice", None)
        .await
        .unwrap();
    let id = session.session_id;

    let pong = handle_message(ClientMessage::Ping { sent_at: 7 }, &id, "alice", &state)
        .await
        .unwrap();
    assert_eq!(pong.event, ServerEvent::Pong { sent_at: 7 });

    let sync = handle_message(ClientMessage::RequestSync, &id, "alice", &state)
        .await
        .unwrap();
    let mut store = SessionStore::new();
    assert_eq!(store.apply(&sync), Applied::Snapshot);

    // Waiting room: no door yet
    let err = handle_message(
        ClientMessage::SubmitResponse {
            response: ANSWERS[0].to_string(),
        },
        &id,
        "alice",
        &state,
    )
    .await
    .unwrap();
    assert!(matches!(err.event, ServerEvent::Error { .. }));

    // Strangers cannot connect
    assert!(state.subscribe(&id, "mallory").await.is_err());
}

/// Takes longer than any reasonable heartbeat to score
struct SlowScorer;

#[async_trait]
impl Scorer for SlowScorer {
    async fn score(&self, _request: &ScoreRequest) -> ScoringResult<ScoringMetrics> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(ScoringMetrics::FALLBACK)
    }

    fn name(&self) -> &str {
        "slow"
    }
}

/// A socket keeps answering pings while its own submission is being scored
#[tokio::test]
async fn test_ping_answered_while_scoring() {
    let config = AppConfig {
        door_time_limit: Duration::from_secs(3600),
        next_door_delay: Duration::from_millis(5),
        ..AppConfig::default()
    };
    let state = Arc::new(AppState::new(
        config,
        Arc::new(SlowScorer),
        Arc::new(Metrics::new()),
    ));
    let session = state
        .create_session(GameMode::SinglePlayer, "alice", "Alice", None)
        .await
        .unwrap();
    let id = session.session_id;
    state.start_game_with_first_door(&id).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let connector = WsConnector::new(&format!("http://{}", addr), &id, "alice").unwrap();
    let mut transport = connector.connect().await.unwrap();
    let welcome: Envelope =
        serde_json::from_str(&transport.recv().await.unwrap().unwrap()).unwrap();
    assert!(matches!(
        welcome.event,
        ServerEvent::ConnectionEstablished { .. }
    ));

    let submit = ClientMessage::SubmitResponse {
        response: ANSWERS[0].to_string(),
    };
    transport
        .send(serde_json::to_string(&submit).unwrap())
        .await
        .unwrap();
    transport
        .send(serde_json::to_string(&ClientMessage::Ping { sent_at: 99 }).unwrap())
        .await
        .unwrap();

    let pong = tokio::time::timeout(Duration::from_secs(1), async {
        while let Some(Ok(text)) = transport.recv().await {
            let envelope: Envelope = serde_json::from_str(&text).unwrap();
            if let ServerEvent::Pong { sent_at } = envelope.event {
                return Some(sent_at);
            }
        }
        None
    })
    .await
    .expect("pong arrived while the submission was still scoring");
    assert_eq!(pong, Some(99));

    // The submission is still in flight
    let session = state.get_session(&id).await.unwrap();
    assert!(session.players[0].responses.is_empty());
}
