//! Integration tests for the Haggle server, handler, and full connection
//! flow over loopback WebSockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use haggle::prelude::*;
use haggle_scheduler::SchedulerHandle;
use haggle_session::IdentityHash;
use haggle_transport::WebSocketConnection;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

struct TestServer {
    addr: SocketAddr,
    scheduler: SchedulerHandle<WebSocketConnection>,
    leaderboard: Arc<MemoryLeaderboard>,
}

impl TestServer {
    fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1:0".into(),
        complexity: 4,
        seed: Some(11),
        ..ServerConfig::default()
    }
}

async fn start_server(config: ServerConfig) -> TestServer {
    let leaderboard = Arc::new(MemoryLeaderboard::new());
    let server = HaggleServer::builder()
        .config(config)
        .leaderboard(leaderboard.clone())
        .build()
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("local addr");
    let scheduler = server.scheduler();
    tokio::spawn(server.run());

    TestServer {
        addr,
        scheduler,
        leaderboard,
    }
}

fn spawn_client(
    url: String,
    name: &str,
) -> (
    tokio::task::JoinHandle<Result<(), HaggleError>>,
    mpsc::UnboundedReceiver<GameLog>,
) {
    let mut client = Client::new(name, conceder);
    let games = client.games();
    let task = tokio::spawn(async move { client.connect(&url).await });
    (task, games)
}

async fn next_game(games: &mut mpsc::UnboundedReceiver<GameLog>) -> GameLog {
    tokio::time::timeout(Duration::from_secs(10), games.recv())
        .await
        .expect("game should finish in time")
        .expect("client should still be running")
}

type RawWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn recv_json(ws: &mut RawWs) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("server should answer in time")
        .expect("stream should be open")
        .expect("frame should be valid");
    serde_json::from_slice(&msg.into_data()).expect("frame should be JSON")
}

// =========================================================================
// Full games
// =========================================================================

#[tokio::test]
async fn test_two_clients_play_and_results_are_recorded() {
    let server = start_server(test_config()).await;
    let (_alice, mut alice_games) = spawn_client(server.url(), "alice");
    let (_bob, mut bob_games) = spawn_client(server.url(), "bob");

    for _ in 0..3 {
        let alice = next_game(&mut alice_games).await;
        let bob = next_game(&mut bob_games).await;

        // Both sides saw the same game from opposite seats.
        assert_eq!(alice.game, bob.game);
        assert_ne!(alice.config.is_first, bob.config.is_first);
        assert_eq!(alice.config.counts, bob.config.counts);
        assert_eq!(alice.result.opponent_values, bob.config.values);
        assert_eq!(alice.result.score, bob.result.opponent_score);
        assert!(!alice.moves.is_empty());
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while server.leaderboard.games() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let alice = server
        .leaderboard
        .standing(&IdentityHash::from_name("alice"))
        .expect("alice should be ranked");
    assert!(alice.games >= 3);
}

#[tokio::test]
async fn test_clients_keep_playing_across_rehash() {
    let server = start_server(ServerConfig {
        rehash_every: 2,
        ..test_config()
    })
    .await;
    let (_carol, mut carol_games) = spawn_client(server.url(), "carol");
    let (_dave, mut dave_games) = spawn_client(server.url(), "dave");

    // Two rotations each.
    for _ in 0..5 {
        next_game(&mut carol_games).await;
        next_game(&mut dave_games).await;
    }
}

#[tokio::test]
async fn test_silent_socket_does_not_block_other_clients() {
    let server = start_server(test_config()).await;

    // Opens TCP and never upgrades.
    let _silent = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let connected = tokio::time::timeout(
        Duration::from_secs(3),
        tokio_tungstenite::connect_async(server.url()),
    )
    .await
    .expect("honest client should connect while a socket sits idle");
    assert!(connected.is_ok());

    let (_frank, mut frank_games) = spawn_client(server.url(), "frank");
    let (_grace, mut grace_games) = spawn_client(server.url(), "grace");
    next_game(&mut frank_games).await;
    next_game(&mut grace_games).await;
}

// =========================================================================
// Admission failures
// =========================================================================

#[tokio::test]
async fn test_duplicate_name_is_disconnected() {
    let server = start_server(ServerConfig {
        parallel_games: 0,
        ..test_config()
    })
    .await;
    let (_first, _) = spawn_client(server.url(), "erin");

    tokio::time::timeout(Duration::from_secs(5), async {
        while server.scheduler.stats().await.unwrap().pooled < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let (second, _) = spawn_client(server.url(), "erin");
    let result = tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .expect("duplicate should be disconnected")
        .unwrap();

    assert!(result.is_ok());
    assert_eq!(server.scheduler.stats().await.unwrap().pooled, 1);
}

#[tokio::test]
async fn test_bad_challenge_gets_error_frame() {
    let server = start_server(test_config()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.url())
        .await
        .expect("client should connect");

    let init = recv_json(&mut ws).await;
    assert_eq!(init["payload"]["kind"], "init");
    assert_eq!(init["payload"]["version"], 1);
    assert_eq!(init["payload"]["complexity"], 4);
    assert!(init["payload"]["prefix"].is_string());

    let reply = json!({
        "seq": init["seq"],
        "payload": { "kind": "init", "name": "mallory", "challenge": "zz" },
    });
    ws.send(Message::text(reply.to_string())).await.unwrap();

    let error = recv_json(&mut ws).await;
    assert!(error["error"].is_string());

    // Then the server hangs up.
    let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("server should close");
    assert!(matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

#[tokio::test]
async fn test_build_unsatisfiable_games_fails() {
    let result = HaggleServer::builder()
        .config(ServerConfig {
            types: 1,
            ..test_config()
        })
        .build()
        .await;

    assert!(matches!(result, Err(HaggleError::Negotiation(_))));
}
