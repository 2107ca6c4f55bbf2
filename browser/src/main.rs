use browser::{Browser, BrowserConfig, SessionClient, SessionConfig};
use clap::{Parser, Subcommand};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Master server to query (repeatable, defaults to the public ones)
    #[arg(short = 'm', long = "master")]
    masters: Vec<String>,

    /// Overall timeout of a master server exchange in milliseconds
    #[arg(long, default_value = "5000")]
    master_timeout: u64,

    /// Overall timeout of a game server exchange in milliseconds
    #[arg(long, default_value = "16000")]
    server_timeout: u64,

    /// Additional passes over servers that did not answer
    #[arg(short = 'r', long, default_value = "2")]
    retries: usize,

    /// Cap on concurrent info workers (default: one per server)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Pretty-print JSON output
    #[arg(short = 'p', long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Number of servers registered at each master server
    Count,
    /// Deduplicated server addresses of all master servers
    List,
    /// Info of a single game server
    Info { address: String },
    /// Info of every server known to the master servers
    All,
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<(), Box<dyn std::error::Error>> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = BrowserConfig {
        master_timeout: Duration::from_millis(args.master_timeout),
        server_timeout: Duration::from_millis(args.server_timeout),
        retry_budget: args.retries,
        max_workers: args.workers,
        ..Default::default()
    };
    if !args.masters.is_empty() {
        config.master_servers = args.masters.clone();
    }

    let cancel = config.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling");
            cancel.cancel();
        }
    });

    match args.command {
        Command::Info { address } => {
            let session = SessionConfig::default().with_timeout(config.server_timeout);
            let mut client = SessionClient::bind(session).await?.with_cancel(config.cancel.clone());
            client.set_target(&address).await?;
            let info = client.get_server_info().await?;
            print_json(&info, args.pretty)?;
        }
        Command::Count => {
            let browser = Browser::new(config).await?;
            let counts: Vec<(String, i32)> = browser
                .server_counts()
                .await?
                .into_iter()
                .map(|(master, count)| (master.to_string(), count))
                .collect();
            print_json(&counts, args.pretty)?;
        }
        Command::List => {
            let browser = Browser::new(config).await?;
            let mut addresses = browser.discover_addresses().await?;
            addresses.sort();
            info!("{} servers", addresses.len());
            print_json(&addresses, args.pretty)?;
        }
        Command::All => {
            let browser = Browser::new(config).await?;
            let mut infos = browser.discover_all().await?;
            infos.sort_by(|a, b| a.address.cmp(&b.address));
            info!("{} servers answered", infos.len());
            print_json(&infos, args.pretty)?;
        }
    }

    Ok(())
}
