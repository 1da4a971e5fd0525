//! Plain-text rendering of the game state.

use bingo_core::{Cell, GRID_SIZE};
use bingo_sync::controller::{GameState, Outcome, Phase, SkipReason};

const CELL_WIDTH: usize = 12;

fn fit(label: &str, width: usize) -> String {
    let count = label.chars().count();
    if count <= width {
        format!("{label:^width$}")
    } else {
        let cut: String = label.chars().take(width - 1).collect();
        format!("{cut}…")
    }
}

/// The 5×5 board; called cells are wrapped in `*`.
pub fn board(state: &GameState) -> String {
    let rule = format!("+{}", format!("{}+", "-".repeat(CELL_WIDTH)).repeat(GRID_SIZE));
    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');

    for (r, row) in state.board.rows().enumerate() {
        out.push('|');
        for (c, cell) in row.iter().enumerate() {
            let marked = state.marked[r * GRID_SIZE + c];
            let text = match cell {
                Cell::Empty => String::new(),
                _ if marked => format!("*{}*", cell.label()),
                _ => cell.label().to_string(),
            };
            out.push_str(&fit(&text, CELL_WIDTH));
            out.push('|');
        }
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
    }

    if state.bingo.has_bingo() {
        out.push_str(&format!(
            "BINGO x{} ({} rows, {} cols, {} diagonals)\n",
            state.bingo.total, state.bingo.rows, state.bingo.cols, state.bingo.diagonals
        ));
    }
    out
}

/// The pool with call marks, in pool order.
pub fn words(state: &GameState) -> String {
    if state.pool.is_empty() {
        return "pool is empty\n".to_string();
    }
    let mut out = String::new();
    for (i, word) in state.pool.iter().enumerate() {
        let mark = if state.is_called(word) { "x" } else { " " };
        out.push_str(&format!("{:>3}. [{mark}] {word}\n", i + 1));
    }
    out.push_str(&format!(
        "{} words, {} calls\n",
        state.pool.len(),
        state.called.len()
    ));
    out
}

pub fn status(state: &GameState) -> String {
    let room = match &state.room {
        Some(room) => format!("{} ({})", room.code, room.id),
        None => "none".to_string(),
    };
    let mut out = format!(
        "room: {room}\nphase: {}\nseed: {}\npending writes: {}\n",
        phase(&state.phase),
        state.seed,
        state.pending_writes
    );
    if let Some(error) = &state.last_error {
        out.push_str(&format!("last error: {error}\n"));
    }
    out
}

pub fn phase(phase: &Phase) -> String {
    match phase {
        Phase::Idle => "no room".into(),
        Phase::Resolving => "finding room".into(),
        Phase::Loading => "loading".into(),
        Phase::Subscribed => "live".into(),
        Phase::Failed(message) => format!("failed: {message}"),
        Phase::TornDown => "closed".into(),
    }
}

/// One-line feedback for an intent, `None` when it simply worked.
pub fn outcome(outcome: &Outcome) -> Option<String> {
    let text = match outcome {
        Outcome::Applied => return None,
        Outcome::Superseded => "superseded by a newer room change".to_string(),
        Outcome::Failed(message) => format!("error: {message}"),
        Outcome::Skipped(reason) => match reason {
            SkipReason::EmptyWord => "nothing to add".into(),
            SkipReason::ReservedWord => "FREE is reserved".into(),
            SkipReason::DuplicateWord => "already in the pool".into(),
            SkipReason::EmptySeed => "seed cannot be empty".into(),
            SkipReason::NoRoom => "join a room first ('room CODE')".into(),
            SkipReason::NothingToCall => "every pool word has been called".into(),
            SkipReason::ShutDown => "session is closed".into(),
        },
    };
    Some(text)
}
