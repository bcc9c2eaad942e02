mod common;

use std::time::Duration;

use common::*;
use odalpapi::protocol::codec::make_version;
use odalpapi::{CancelToken, ClientConfig, DiscoveryClient, GameType, QueryError};

fn quick_client() -> DiscoveryClient {
    DiscoveryClient::new(ClientConfig {
        master_timeout: Duration::from_millis(300),
        query_timeout: Duration::from_millis(300),
        ping_timeout: Duration::from_millis(300),
        batch_ping_divisor: 2,
        single_ping_divisor: 1,
        client_version: CLIENT_VERSION,
    })
}

#[tokio::test]
async fn game_server_query_decodes_reply() {
    let server = spawn_server(Behaviour::Reply(game_reply("Duel Arena", 3, CLIENT_VERSION))).await;
    let client = quick_client();

    let response = client
        .query_game_server(&server.address(), true, &CancelToken::new())
        .await
        .unwrap();

    assert!(response.failure.is_none());
    let info = response.server;
    assert!(info.responded);
    assert_eq!(info.name.as_deref(), Some("Duel Arena"));
    assert_eq!(info.game_type, GameType::Deathmatch);
    assert_eq!(info.players.len(), 3);
    assert_eq!(info.wads[1].name, "doom2.wad");
    assert_eq!(info.ping, Some(response.pong_ms));
    assert_eq!(info.address, server.address());
}

#[tokio::test]
async fn undecodable_reply_still_resolves() {
    let server = spawn_server(Behaviour::Reply(vec![1, 2, 3, 4, 5, 6])).await;
    let response = quick_client()
        .query_game_server(&server.address(), false, &CancelToken::new())
        .await
        .unwrap();
    assert!(!response.server.responded);
    assert!(matches!(response.failure, Some(QueryError::MalformedResponse(_))));
}

#[tokio::test]
async fn outdated_server_is_flagged_for_removal() {
    let reply = game_reply("Old", 1, make_version(0, 9, 5));
    let server = spawn_server(Behaviour::Reply(reply)).await;
    let response = quick_client()
        .query_game_server(&server.address(), false, &CancelToken::new())
        .await
        .unwrap();
    assert!(!response.server.responded);
    assert!(response.failure.unwrap().remove_server());
}

#[tokio::test]
async fn silent_server_times_out() {
    let server = spawn_server(Behaviour::Silent).await;
    let result = quick_client()
        .query_game_server(&server.address(), false, &CancelToken::new())
        .await;
    assert!(matches!(result, Err(QueryError::Timeout)));
    assert_eq!(server.hits(), 1);
}

#[tokio::test]
async fn duplicate_replies_are_harmless() {
    let server = spawn_server(Behaviour::ReplyTwice(game_reply("Echo", 0, CLIENT_VERSION))).await;
    let client = quick_client();
    for _ in 0..3 {
        let response = client
            .query_game_server(&server.address(), false, &CancelToken::new())
            .await
            .unwrap();
        assert!(response.server.responded);
    }
}

#[tokio::test]
async fn closed_port_is_not_a_timeout() {
    let addr = closed_port().await;
    let result = quick_client()
        .query_game_server(&address_of(addr), false, &CancelToken::new())
        .await;
    // Loopback usually reports the refusal; some sandboxes drop it instead.
    assert!(matches!(
        result,
        Err(QueryError::NotFound(_)) | Err(QueryError::Timeout)
    ));
}

#[tokio::test]
async fn cancellation_beats_the_timeout() {
    let server = spawn_server(Behaviour::Silent).await;
    let client = DiscoveryClient::new(ClientConfig {
        query_timeout: Duration::from_secs(30),
        ..ClientConfig::default()
    });
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = client.query_game_server(&server.address(), false, &cancel).await;
    assert!(matches!(result, Err(QueryError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn pre_cancelled_query_sends_nothing() {
    let server = spawn_server(Behaviour::Silent).await;
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = quick_client().ping_game_server(&server.address(), &cancel).await;
    assert!(matches!(result, Err(QueryError::Cancelled)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.hits(), 0);
}

#[tokio::test]
async fn master_query_lists_servers_in_order() {
    let a = "10.0.0.1:10666".parse().unwrap();
    let b = "10.0.0.2:10667".parse().unwrap();
    let master = spawn_master(vec![a, b]).await;

    let servers = quick_client()
        .query_master_server(&master.address(), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0].key(), "10.0.0.1:10666");
    assert_eq!(servers[1].key(), "10.0.0.2:10667");
}

#[tokio::test]
async fn ping_measures_round_trip() {
    let server = spawn_server(Behaviour::Reply(Vec::new())).await;
    let ms = quick_client()
        .ping_game_server(&server.address(), &CancelToken::new())
        .await
        .unwrap();
    assert!(ms < 300);
}

#[tokio::test]
async fn lan_discovery_keeps_one_decodable_reply_per_host() {
    let twice = spawn_server(Behaviour::ReplyTwice(game_reply("Basement", 2, CLIENT_VERSION))).await;
    let plain = spawn_server(Behaviour::Reply(game_reply("Attic", 0, CLIENT_VERSION))).await;
    let garbage = spawn_server(Behaviour::Reply(b"junk".to_vec())).await;
    let silent = spawn_server(Behaviour::Silent).await;
    let targets = [twice.addr, plain.addr, garbage.addr, silent.addr];

    let started = std::time::Instant::now();
    let found = quick_client()
        .discover_on(&targets, Duration::from_millis(300), &CancelToken::new())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let mut keys: Vec<String> = found.iter().map(|s| s.key()).collect();
    keys.sort();
    let mut expected = vec![twice.address().key(), plain.address().key()];
    expected.sort();
    assert_eq!(keys, expected);
    assert!(found.iter().all(|s| s.responded && s.ping.is_some()));
    assert_eq!(garbage.hits(), 1);
    assert_eq!(silent.hits(), 1);
}

#[tokio::test]
async fn lan_discovery_with_no_answers_ends_at_the_deadline() {
    let silent = spawn_server(Behaviour::Silent).await;
    let found = quick_client()
        .discover_on(&[silent.addr], Duration::from_millis(100), &CancelToken::new())
        .await
        .unwrap();
    assert!(found.is_empty());
}

#[tokio::test]
async fn lan_discovery_stops_on_cancel() {
    let silent = spawn_server(Behaviour::Silent).await;
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let result = quick_client()
        .discover_on(&[silent.addr], Duration::from_secs(30), &cancel)
        .await;
    assert!(matches!(result, Err(QueryError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn lan_discovery_needs_a_target() {
    let result = quick_client()
        .discover_on(&[], Duration::from_millis(50), &CancelToken::new())
        .await;
    assert!(matches!(result, Err(QueryError::NotFound(_))));
}
