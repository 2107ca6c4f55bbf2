//! Integration tests for the browser against real responders
//!
//! Every test runs master and game server responders on loopback sockets and
//! drives them with the browser over real UDP.

use browser::{Browser, BrowserConfig, BrowserError, SessionClient, SessionConfig};
use server::{Responder, ResponderConfig, ResponderHandle, ResponderStats, Role};
use shared::{PlayerInfo, ServerAddress, ServerInfo};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_test::assert_ok;

fn loopback_session(timeout: Duration) -> SessionConfig {
    SessionConfig {
        bind_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
        ..SessionConfig::default().with_timeout(timeout)
    }
}

fn browser_config(masters: &[SocketAddr]) -> BrowserConfig {
    BrowserConfig {
        master_servers: masters.iter().map(|m| m.to_string()).collect(),
        master_timeout: Duration::from_secs(1),
        server_timeout: Duration::from_millis(300),
        session: loopback_session(Duration::from_secs(1)),
        ..Default::default()
    }
}

fn game_info(name: &str) -> ServerInfo {
    ServerInfo {
        version: "0.7.4".to_string(),
        name: name.to_string(),
        map: "ctf1".to_string(),
        game_type: "CTF".to_string(),
        max_players: 16,
        max_clients: 16,
        ..Default::default()
    }
}

async fn spawn_game(info: ServerInfo, config: ResponderConfig) -> ResponderHandle {
    let responder = assert_ok!(Responder::bind("127.0.0.1:0", Role::Game { info }, config).await);
    assert_ok!(responder.spawn())
}

async fn spawn_master(servers: Vec<ServerAddress>) -> ResponderHandle {
    let responder = assert_ok!(
        Responder::bind("127.0.0.1:0", Role::Master { servers }, ResponderConfig::default()).await
    );
    assert_ok!(responder.spawn())
}

/// A loopback address nobody answers on.
fn dead_address() -> SocketAddr {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("Failed to bind probe socket");
    socket.local_addr().unwrap()
}

/// SESSION TESTS
mod session_tests {
    use super::*;

    /// Tests that the handshake runs once and the token is reused afterwards
    #[tokio::test]
    async fn token_handshake_is_cached() {
        let game = spawn_game(game_info("cached"), ResponderConfig::default()).await;

        let mut client = assert_ok!(SessionClient::bind(loopback_session(Duration::from_secs(2))).await);
        client.set_target_addr(game.local_addr);

        let first = assert_ok!(client.get_token().await);
        let requests = ResponderStats::get(&game.stats.token_requests);
        assert!(requests >= 1);

        let second = assert_ok!(client.get_token().await);
        assert_eq!(first, second);
        assert_eq!(ResponderStats::get(&game.stats.token_requests), requests);
    }

    /// Tests the info exchange with two players, one of them in a clan
    #[tokio::test]
    async fn server_info_roundtrip() {
        let mut info = game_info("Simply zCatch");
        info.game_type = String::new();
        info.players = vec![
            PlayerInfo {
                name: "player1".to_string(),
                ..Default::default()
            },
            PlayerInfo {
                name: "player2".to_string(),
                clan: "clan2".to_string(),
                ..Default::default()
            },
        ];
        let game = spawn_game(info.clone(), ResponderConfig::default()).await;

        let mut client = assert_ok!(SessionClient::bind(loopback_session(Duration::from_secs(2))).await);
        client.set_target_addr(game.local_addr);
        let received = assert_ok!(client.get_server_info().await);

        let mut expected = info;
        expected.address = game.local_addr.to_string();
        expected.normalize();
        assert_eq!(received.num_clients, 2);
        assert_eq!(received, expected);
    }

    /// Tests that dropped datagrams are recovered by retransmission
    #[tokio::test]
    async fn lossy_server_still_answers() {
        let config = ResponderConfig {
            drop_first: 3,
            ..Default::default()
        };
        let game = spawn_game(game_info("lossy"), config).await;

        let mut client = assert_ok!(SessionClient::bind(loopback_session(Duration::from_secs(3))).await);
        client.set_target_addr(game.local_addr);
        let info = assert_ok!(client.get_server_info().await);

        assert_eq!(info.name, "lossy");
        assert_eq!(ResponderStats::get(&game.stats.dropped), 3);
    }

    /// Tests a server list spread over three datagrams
    #[tokio::test]
    async fn chunked_server_list() {
        let servers: Vec<ServerAddress> = (0..160u16)
            .map(|i| ServerAddress::from(SocketAddr::from(([10, 20, 0, 1], 9000 + i))))
            .collect();
        let master = spawn_master(servers.clone()).await;

        let mut client = assert_ok!(SessionClient::bind(loopback_session(Duration::from_secs(2))).await);
        client.set_target_addr(master.local_addr);

        let mut received = assert_ok!(client.get_server_addresses().await);
        received.sort();
        assert_eq!(received, servers);
    }

    /// Tests that multi-byte counts decode with the deployed bit shift
    #[tokio::test]
    async fn large_count_uses_bit_shift_decoding() {
        let servers: Vec<ServerAddress> = (0..300u16)
            .map(|i| ServerAddress::from(SocketAddr::from(([10, 30, 0, 1], 9000 + i))))
            .collect();
        let master = spawn_master(servers).await;

        let mut client = assert_ok!(SessionClient::bind(loopback_session(Duration::from_secs(2))).await);
        client.set_target_addr(master.local_addr);

        // 300 is sent as [0x01, 0x2C] and read back as (1 << 1) | 0x2C
        assert_eq!(assert_ok!(client.get_server_count().await), 46);
    }

    /// Tests that an unresponsive server ends in a timeout
    #[tokio::test]
    async fn silent_server_times_out() {
        let mut client = assert_ok!(SessionClient::bind(loopback_session(Duration::from_millis(150))).await);
        client.set_target_addr(dead_address());

        let started = std::time::Instant::now();
        assert!(matches!(client.get_server_info().await, Err(BrowserError::Timeout)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

/// DISCOVERY TESTS
mod discovery_tests {
    use super::*;

    /// Tests that servers listed by several masters show up once
    #[tokio::test]
    async fn addresses_are_deduplicated_across_masters() {
        let games = [
            spawn_game(game_info("one"), ResponderConfig::default()).await,
            spawn_game(game_info("two"), ResponderConfig::default()).await,
            spawn_game(game_info("three"), ResponderConfig::default()).await,
        ];
        let addr = |i: usize| ServerAddress::from(games[i].local_addr);

        let master_a = spawn_master(vec![addr(0), addr(1)]).await;
        let master_b = spawn_master(vec![addr(1), addr(2)]).await;

        let browser = assert_ok!(
            Browser::new(browser_config(&[master_a.local_addr, master_b.local_addr])).await
        );
        let mut found = assert_ok!(browser.discover_addresses().await);
        found.sort();

        let mut expected = vec![addr(0), addr(1), addr(2)];
        expected.sort();
        assert_eq!(found, expected);
    }

    /// Tests a full discovery pass with one unreachable server
    #[tokio::test]
    async fn discover_all_collects_reachable_servers() {
        let games = [
            spawn_game(game_info("alpha"), ResponderConfig::default()).await,
            spawn_game(game_info("bravo"), ResponderConfig::default()).await,
        ];
        let dead = dead_address();

        let master = spawn_master(vec![
            ServerAddress::from(games[0].local_addr),
            ServerAddress::from(games[1].local_addr),
            ServerAddress::from(dead),
        ])
        .await;

        let browser = assert_ok!(Browser::new(browser_config(&[master.local_addr])).await);
        let mut infos = assert_ok!(browser.discover_all().await);
        infos.sort_by(|a, b| a.name.cmp(&b.name));

        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "bravo"]);
        assert_eq!(infos[0].address, games[0].local_addr.to_string());
        assert!(ResponderStats::get(&games[0].stats.info_requests) >= 1);
    }

    /// Tests that an unreachable master does not fail discovery
    #[tokio::test]
    async fn unreachable_master_contributes_nothing() {
        let game = spawn_game(game_info("solo"), ResponderConfig::default()).await;
        let master = spawn_master(vec![ServerAddress::from(game.local_addr)]).await;

        let mut config = browser_config(&[master.local_addr, dead_address()]);
        config.master_timeout = Duration::from_millis(300);
        let browser = assert_ok!(Browser::new(config).await);

        let found = assert_ok!(browser.discover_addresses().await);
        assert_eq!(found, vec![ServerAddress::from(game.local_addr)]);
    }

    /// Tests that cancellation aborts a pending discovery
    #[tokio::test]
    async fn cancellation_aborts_discovery() {
        let mut config = browser_config(&[dead_address()]);
        config.master_timeout = Duration::from_secs(30);
        let cancel = config.cancel.clone();
        let browser = assert_ok!(Browser::new(config).await);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let started = std::time::Instant::now();
        assert!(matches!(browser.discover_all().await, Err(BrowserError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
