//! Kanban — collaborative board in the terminal, plus its relay gateway.
//!
//! `kanban gateway` serves the HTTP endpoints that broadcast board changes.
//! `kanban board` runs an interactive client against a gateway.
//!
//! Relay credentials come from `PUSHER_APP_ID`, `PUSHER_APP_KEY`,
//! `PUSHER_APP_SECRET` and `PUSHER_APP_CLUSTER`. Without them the gateway
//! fans events out itself on `GET /events`. The board only needs the key and
//! cluster to subscribe. Log verbosity follows `RUST_LOG`.

mod session;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use log::info;
use tokio::net::TcpListener;

use kanban_collab::{
    BoardClient, ConfigError, GatewayClient, GatewayConfig, GatewayError, ProtocolError,
    PusherRelay, RelayCredentials, RelayGateway, SubscriberCredentials, Subscription,
    SubscriptionConfig, GATEWAY_PORT,
};
use kanban_core::{demo_notes, BoardState, IdStrategy};

#[derive(Parser, Debug)]
#[command(name = "kanban")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay gateway on port 4000
    Gateway {
        /// Interface to listen on
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },
    /// Open the board in this terminal
    Board(BoardArgs),
}

#[derive(Args, Debug)]
struct BoardArgs {
    /// Relay gateway base URL
    #[arg(long, default_value = "http://localhost:4000")]
    gateway: String,

    /// Subscription WebSocket URL (defaults to the hosted broker when
    /// credentials are set, else the gateway's /events)
    #[arg(long)]
    events: Option<String>,

    /// Start without the demo notes
    #[arg(long)]
    empty: bool,

    /// Mint random ids for new notes instead of counters
    #[arg(long)]
    random_ids: bool,
}

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("could not subscribe: {0}")]
    Subscribe(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

async fn run_gateway(host: String) -> Result<(), AppError> {
    let config = GatewayConfig {
        bind_addr: format!("{host}:{GATEWAY_PORT}"),
        ..GatewayConfig::default()
    };

    let gateway = match RelayCredentials::from_env()? {
        Some(credentials) => {
            info!(
                "Publishing through hosted relay app {} ({})",
                credentials.app_id, credentials.cluster
            );
            RelayGateway::new(config, Arc::new(PusherRelay::new(credentials)))
        }
        None => {
            info!("No relay credentials set; subscribers connect to /events");
            RelayGateway::local(config)
        }
    };

    let listener = TcpListener::bind(&gateway.config().bind_addr).await?;
    gateway
        .serve_with_shutdown(listener, async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;
    Ok(())
}

async fn run_board(args: BoardArgs) -> Result<(), AppError> {
    let events_url = match args.events {
        Some(url) => url,
        None => match SubscriberCredentials::from_env()? {
            Some(credentials) => credentials.websocket_url(),
            None => format!("{}/events", args.gateway.trim_end_matches('/').replacen("http", "ws", 1)),
        },
    };

    let strategy = if args.random_ids {
        IdStrategy::Random
    } else {
        IdStrategy::Sequential
    };
    let mut board = BoardState::with_id_strategy(strategy);
    if !args.empty {
        board = board.seeded(demo_notes());
    }

    info!("Subscribing to {events_url}");
    let subscription = Subscription::connect(SubscriptionConfig::new(events_url)).await?;
    let client = BoardClient::new(board, GatewayClient::new(args.gateway));

    session::run(client, subscription).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Gateway { host } => run_gateway(host).await,
        Command::Board(args) => run_board(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("kanban: {e}");
            ExitCode::FAILURE
        }
    }
}
