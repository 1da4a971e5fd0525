//! Completed-line detection over an N×N mark grid.

use serde::{Deserialize, Serialize};

use crate::layout::{Marks, GRID_SIZE};

/// Completed lines on a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BingoCount {
    pub rows: usize,
    pub cols: usize,
    /// 0, 1 or 2
    pub diagonals: usize,
    pub total: usize,
}

impl BingoCount {
    pub fn has_bingo(&self) -> bool {
        self.total > 0
    }
}

/// Full O(N²) scan; no incremental state is kept between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BingoDetector {
    size: usize,
}

impl Default for BingoDetector {
    fn default() -> Self {
        Self::new(GRID_SIZE)
    }
}

impl BingoDetector {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// `marked` is indexed `row * size + col`. Indices past the end of the
    /// slice count as unmarked.
    pub fn scan(&self, marked: &[bool]) -> BingoCount {
        let n = self.size;
        if n == 0 {
            return BingoCount::default();
        }
        let at = |row: usize, col: usize| marked.get(row * n + col).copied().unwrap_or(false);

        let rows = (0..n).filter(|&r| (0..n).all(|c| at(r, c))).count();
        let cols = (0..n).filter(|&c| (0..n).all(|r| at(r, c))).count();
        let main = (0..n).all(|i| at(i, i));
        let anti = (0..n).all(|i| at(i, n - 1 - i));
        let diagonals = usize::from(main) + usize::from(anti);

        BingoCount {
            rows,
            cols,
            diagonals,
            total: rows + cols + diagonals,
        }
    }
}

/// Scan a standard 5×5 board.
pub fn detect(marked: &Marks) -> BingoCount {
    BingoDetector::default().scan(marked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{CELL_COUNT, CENTER_INDEX};

    fn only_center() -> Marks {
        let mut marks = [false; CELL_COUNT];
        marks[CENTER_INDEX] = true;
        marks
    }

    #[test]
    fn test_fully_marked_board() {
        let count = detect(&[true; CELL_COUNT]);
        assert_eq!(
            count,
            BingoCount { rows: 5, cols: 5, diagonals: 2, total: 12 }
        );
        assert!(count.has_bingo());
    }

    #[test]
    fn test_only_center_marked() {
        let count = detect(&only_center());
        assert_eq!(count.total, 0);
        assert!(!count.has_bingo());
    }

    #[test]
    fn test_single_row() {
        let mut marks = only_center();
        for col in 0..5 {
            marks[5 + col] = true;
        }
        let count = detect(&marks);
        assert_eq!(count.rows, 1);
        assert_eq!(count.cols, 0);
        assert_eq!(count.total, 1);
    }

    #[test]
    fn test_single_column() {
        let mut marks = only_center();
        for row in 0..5 {
            marks[row * 5 + 4] = true;
        }
        let count = detect(&marks);
        assert_eq!(count.cols, 1);
        assert_eq!(count.rows, 0);
    }

    #[test]
    fn test_diagonals_share_center() {
        let mut marks = only_center();
        for i in 0..5 {
            marks[i * 5 + i] = true;
        }
        assert_eq!(detect(&marks).diagonals, 1);

        for i in 0..5 {
            marks[i * 5 + (4 - i)] = true;
        }
        let count = detect(&marks);
        assert_eq!(count.diagonals, 2);
        assert_eq!(count.total, 2);
    }

    #[test]
    fn test_row_and_column_crossing() {
        let mut marks = only_center();
        for i in 0..5 {
            marks[2 * 5 + i] = true;
            marks[i * 5 + 2] = true;
        }
        let count = detect(&marks);
        assert_eq!(count.rows, 1);
        assert_eq!(count.cols, 1);
        assert_eq!(count.total, 2);
    }

    #[test]
    fn test_other_sizes() {
        let detector = BingoDetector::new(3);
        let count = detector.scan(&[true; 9]);
        assert_eq!(count.total, 8);

        // Short slice: missing cells are unmarked
        assert_eq!(detector.scan(&[true; 3]).rows, 1);
        assert_eq!(BingoDetector::new(0).scan(&[]), BingoCount::default());
    }
}
