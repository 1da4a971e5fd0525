//! Seed-derived 5×5 board layout.
//!
//! ```text
//!  0  1  2  3  4
//!  5  6  7  8  9
//! 10 11 FREE 13 14
//! 15 16 17 18 19
//! 20 21 22 23 24
//! ```
//!
//! The 24 non-center indices are permuted with [`SeededShuffle`] under the
//! seed `"pos-" + player_seed`; the i-th pool word lands on the i-th permuted
//! index. Positions past the end of the pool stay empty.

use serde::{Deserialize, Serialize};

use crate::entry::FREE;
use crate::shuffle::SeededShuffle;

/// Board edge length.
pub const GRID_SIZE: usize = 5;
/// Total number of cells.
pub const CELL_COUNT: usize = GRID_SIZE * GRID_SIZE;
/// Index of the FREE cell (row 2, col 2).
pub const CENTER_INDEX: usize = CELL_COUNT / 2;
/// Cells available for pool words.
pub const WORD_SLOTS: usize = CELL_COUNT - 1;
/// Prefix that separates the position permutation from other uses of a seed.
pub const POSITION_NAMESPACE: &str = "pos-";

/// Per-cell mark state, indexed `row * GRID_SIZE + col`.
pub type Marks = [bool; CELL_COUNT];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Free,
    Word(String),
    Empty,
}

impl Cell {
    pub fn word(&self) -> Option<&str> {
        match self {
            Cell::Word(w) => Some(w),
            _ => None,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Cell::Free)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Display text: the word, `FREE`, or an empty string.
    pub fn label(&self) -> &str {
        match self {
            Cell::Free => FREE,
            Cell::Word(w) => w,
            Cell::Empty => "",
        }
    }
}

/// A player's board: a pure function of (pool in order, seed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardLayout {
    cells: Vec<Cell>,
}

impl BoardLayout {
    /// Shuffled non-center indices for `seed`.
    pub fn positions(seed: &str) -> Vec<usize> {
        let indices: Vec<usize> = (0..CELL_COUNT).filter(|i| *i != CENTER_INDEX).collect();
        SeededShuffle::new(format!("{POSITION_NAMESPACE}{seed}")).shuffle(&indices)
    }

    /// Place up to [`WORD_SLOTS`] pool words. The pool is expected to be
    /// duplicate-free already.
    pub fn generate<S: AsRef<str>>(pool: &[S], seed: &str) -> Self {
        let mut cells = vec![Cell::Empty; CELL_COUNT];
        cells[CENTER_INDEX] = Cell::Free;

        for (word, index) in pool.iter().zip(Self::positions(seed)) {
            cells[index] = Cell::Word(word.as_ref().to_string());
        }

        if pool.len() > WORD_SLOTS {
            log::trace!(
                "Pool has {} words; {} left off the board",
                pool.len(),
                pool.len() - WORD_SLOTS
            );
        }

        Self { cells }
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cell_at(&self, row: usize, col: usize) -> Option<&Cell> {
        if row >= GRID_SIZE || col >= GRID_SIZE {
            return None;
        }
        self.cells.get(row * GRID_SIZE + col)
    }

    /// Rows of cells, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(GRID_SIZE)
    }

    /// Board index holding `word`, if it was placed.
    pub fn position_of(&self, word: &str) -> Option<usize> {
        self.cells.iter().position(|c| c.word() == Some(word))
    }

    /// Number of cells holding a pool word.
    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|c| c.word().is_some()).count()
    }

    /// FREE is always marked, a word cell is marked when `is_called` says so,
    /// and empty cells never are.
    pub fn marks<F>(&self, is_called: F) -> Marks
    where
        F: Fn(&str) -> bool,
    {
        let mut marks = [false; CELL_COUNT];
        for (mark, cell) in marks.iter_mut().zip(&self.cells) {
            *mark = match cell {
                Cell::Free => true,
                Cell::Word(w) => is_called(w),
                Cell::Empty => false,
            };
        }
        marks
    }
}
