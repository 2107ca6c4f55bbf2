use clap::Parser;
use log::info;
use rand::Rng;
use server::{Responder, ResponderConfig, Role};
use shared::{PlayerInfo, ServerAddress, ServerInfo};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// IP address to bind all responders to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Master server port
    #[arg(short = 'm', long, default_value_t = shared::MASTER_SERVER_PORT)]
    master_port: u16,

    /// Port of the first game server; the others follow consecutively
    #[arg(short = 'p', long, default_value_t = shared::DEFAULT_SERVER_PORT)]
    port: u16,

    /// Number of game servers to run
    #[arg(short = 'n', long, default_value = "4")]
    servers: u16,

    /// Probability of dropping an incoming datagram (0.0 - 1.0)
    #[arg(short = 'l', long, default_value = "0.0")]
    loss: f64,
}

fn generate_info(index: u16) -> ServerInfo {
    let mut rng = rand::thread_rng();
    let maps = ["ctf1", "ctf2", "dm1", "dm2", "dm6"];
    let game_types = ["CTF", "DM", "TDM", "zCatch"];

    let players: Vec<PlayerInfo> = (0..rng.gen_range(0..8))
        .map(|p| PlayerInfo {
            name: format!("player{}", p + 1),
            clan: if rng.gen_bool(0.3) { "clan".to_string() } else { String::new() },
            country: -1,
            score: rng.gen_range(0..50),
            kind: 0,
        })
        .collect();

    let mut info = ServerInfo {
        version: "0.7.5".to_string(),
        name: format!("Local Server #{}", index + 1),
        map: maps[rng.gen_range(0..maps.len())].to_string(),
        game_type: game_types[rng.gen_range(0..game_types.len())].to_string(),
        num_players: players.len() as i32,
        max_players: 16,
        max_clients: 16,
        players,
        ..Default::default()
    };
    info.normalize();
    info
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ResponderConfig {
        loss: args.loss,
        ..Default::default()
    };

    let mut handles = Vec::with_capacity(args.servers as usize + 1);
    let mut registered = Vec::with_capacity(args.servers as usize);

    for index in 0..args.servers {
        let port = args.port.saturating_add(index);
        let address = format!("{}:{}", args.host, port);
        let role = Role::Game {
            info: generate_info(index),
        };
        let responder = Responder::bind(&address, role, config.clone()).await?;
        let local: SocketAddr = responder.local_addr()?;
        registered.push(ServerAddress::from(local));
        handles.push(responder.spawn()?);
    }

    let master_address = format!("{}:{}", args.host, args.master_port);
    let master = Responder::bind(&master_address, Role::Master { servers: registered }, config).await?;
    handles.push(master.spawn()?);

    info!(
        "Running master server on {} with {} game servers",
        master_address, args.servers
    );

    tokio::signal::ctrl_c().await?;
    println!("Received Ctrl+C, shutting down gracefully...");

    for handle in &handles {
        handle.shutdown();
    }
    Ok(())
}
