//! Command-line flags and interactive commands.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use bingo_core::RoomCode;

pub const HELP: &str = "\
commands:
  room CODE      join (or create) a room
  leave          leave the current room
  seed [SEED]    show or change your board seed
  add WORD       add a word to the pool
  call WORD      call a word
  random         call a random uncalled pool word
  clear          clear all calls
  reset          clear all calls and words
  board          show your board
  words          list the pool
  status         connection, room and pending writes
  dismiss        clear the last error
  help           this text
  quit           leave the game";

/// Shared bingo rooms from the terminal. Log level comes from RUST_LOG.
#[derive(Parser, Debug)]
#[command(name = "bingo-terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Run the WebSocket store server
    Serve {
        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1:9191")]
        bind: String,
    },

    /// Play from an interactive prompt
    Play(PlayOptions),
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PlayOptions {
    /// Store server URL (ws://...). Without it the game runs locally and
    /// no other player sees it.
    #[arg(long)]
    pub server: Option<String>,

    /// Directory for the local RocksDB store (settings, local rooms)
    #[arg(long, default_value = "bingo_data")]
    pub data: PathBuf,

    /// Room to join on start instead of the saved one
    #[arg(long, value_parser = parse_room)]
    pub room: Option<RoomCode>,

    /// Board seed to use from now on
    #[arg(long)]
    pub seed: Option<String>,
}

fn parse_room(raw: &str) -> Result<RoomCode, String> {
    RoomCode::parse(raw).map_err(|e| e.to_string())
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Room(String),
    Leave,
    Seed(Option<String>),
    Add(String),
    Call(String),
    Random,
    Clear,
    Reset,
    Board,
    Words,
    Status,
    Dismiss,
    Help,
    Quit,
}

impl Command {
    /// `None` for a blank line. Arguments keep inner spaces.
    pub fn parse(line: &str) -> Option<Result<Command, String>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let arg = |name: &str| {
            if rest.is_empty() {
                Err(format!("'{name}' needs an argument"))
            } else {
                Ok(rest.to_string())
            }
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "room" | "join" => arg("room").map(Command::Room),
            "leave" => Ok(Command::Leave),
            "seed" => Ok(Command::Seed((!rest.is_empty()).then(|| rest.to_string()))),
            "add" => arg("add").map(Command::Add),
            "call" => arg("call").map(Command::Call),
            "random" | "r" => Ok(Command::Random),
            "clear" => Ok(Command::Clear),
            "reset" => Ok(Command::Reset),
            "board" | "b" => Ok(Command::Board),
            "words" | "pool" => Ok(Command::Words),
            "status" => Ok(Command::Status),
            "dismiss" => Ok(Command::Dismiss),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(format!("unknown command '{other}', try 'help'")),
        };
        Some(command)
    }
}
