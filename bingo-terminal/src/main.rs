//! Bingo Terminal: shared bingo rooms from the command line.
//!
//! `serve` runs the WebSocket store; `play` drives a [`RoomSyncController`]
//! against a server (or, without `--server`, the local RocksDB store) from a
//! line-oriented prompt.

mod cli;
mod render;

use log::{error, info};
use std::error::Error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use bingo_core::RoomCode;
use bingo_sync::client::{ClientConfig, StoreClient};
use bingo_sync::controller::{Outcome, RoomSyncController};
use bingo_sync::remote::Backend;
use bingo_sync::server::{ServerConfig, StoreServer};
use bingo_sync::settings::SettingsStore;
use bingo_sync::storage::{KeyValueStore, RocksStore, StoreConfig};

use clap::Parser;
use cli::{Cli, Command, Mode, PlayOptions};

type BoxError = Box<dyn Error + Send + Sync>;

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.mode {
        Mode::Serve { bind } => serve(bind).await,
        Mode::Play(options) => play(options).await,
    };
    if let Err(e) = result {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn serve(bind_addr: String) -> Result<(), BoxError> {
    let config = ServerConfig {
        bind_addr,
        ..ServerConfig::default()
    };
    info!("Starting store server on {}", config.bind_addr);
    StoreServer::new(config).run().await
}

async fn play(options: PlayOptions) -> Result<(), BoxError> {
    let store: Arc<dyn KeyValueStore> = Arc::new(RocksStore::open(StoreConfig::at(&options.data))?);

    let backend = match &options.server {
        Some(url) => Backend::remote(StoreClient::connect(url, ClientConfig::default()).await?),
        None => {
            println!("local mode: no other players will see this game");
            Backend::local(store.clone())
        }
    };
    let ctl = RoomSyncController::new(backend, SettingsStore::new(store))?;

    if let Some(seed) = &options.seed {
        report(&ctl.set_seed(seed).await);
    }
    let joined = match options.room.clone() {
        Some(code) => ctl.select_room(code).await,
        None => ctl.start().await,
    };
    match joined {
        Outcome::Applied => print!("{}", render::board(&ctl.state().await)),
        other => report(&other),
    }
    println!("type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            None => continue,
            Some(Err(message)) => {
                println!("{message}");
                continue;
            }
            Some(Ok(command)) => command,
        };
        if command == Command::Quit {
            break;
        }
        run(&ctl, command).await;
    }

    ctl.shutdown().await;
    Ok(())
}

fn report(outcome: &Outcome) {
    if let Some(message) = render::outcome(outcome) {
        println!("{message}");
    }
}

async fn run(ctl: &RoomSyncController, command: Command) {
    match command {
        Command::Room(raw) => match RoomCode::parse(&raw) {
            Ok(code) => {
                let outcome = ctl.select_room(code).await;
                report(&outcome);
                if outcome.is_applied() {
                    print!("{}", render::board(&ctl.state().await));
                }
            }
            Err(e) => println!("invalid room code: {e}"),
        },
        Command::Leave => ctl.leave_room().await,
        Command::Seed(None) => println!("seed: {}", ctl.seed().await),
        Command::Seed(Some(seed)) => {
            let outcome = ctl.set_seed(&seed).await;
            report(&outcome);
            if outcome.is_applied() {
                print!("{}", render::board(&ctl.state().await));
            }
        }
        Command::Add(word) => report(&ctl.add_word(&word).await),
        Command::Call(word) => {
            let outcome = ctl.call_word(&word).await;
            report(&outcome);
            if outcome.is_applied() {
                print!("{}", render::board(&ctl.state().await));
            }
        }
        Command::Random => {
            let (word, outcome) = ctl.call_random().await;
            if let Some(word) = word {
                println!("called {word}");
            }
            report(&outcome);
            if outcome.is_applied() {
                print!("{}", render::board(&ctl.state().await));
            }
        }
        Command::Clear => report(&ctl.clear_calls().await),
        Command::Reset => report(&ctl.reset_pool().await),
        Command::Board => print!("{}", render::board(&ctl.state().await)),
        Command::Words => print!("{}", render::words(&ctl.state().await)),
        Command::Status => {
            println!("mode: {:?}", ctl.mode());
            print!("{}", render::status(&ctl.state().await));
        }
        Command::Dismiss => ctl.dismiss_error().await,
        Command::Help => println!("{}", cli::HELP),
        Command::Quit => {}
    }
}
