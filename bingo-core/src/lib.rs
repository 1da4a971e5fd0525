//! # bingo-core: deterministic board logic for shared bingo rooms
//!
//! Pure, synchronous building blocks used by the sync layer:
//!
//! ```text
//! ┌───────────────┐   seed    ┌─────────────┐  marks  ┌───────────────┐
//! │ SeededShuffle │ ────────► │ BoardLayout │ ──────► │ BingoDetector │
//! │ (FNV-1a +     │           │ (5×5, FREE  │         │ (rows, cols,  │
//! │  xorshift32)  │           │  at 12)     │         │  diagonals)   │
//! └───────────────┘           └─────────────┘         └───────────────┘
//! ```
//!
//! plus the shared data model: [`Room`], [`WordEntry`], [`CallEntry`].

pub mod detector;
pub mod entry;
pub mod layout;
pub mod room;
pub mod shuffle;

pub use detector::{detect, BingoCount, BingoDetector};
pub use entry::{
    is_reserved, normalize_word, now_millis, CallEntry, Entry, EntryId, EntryKind, WordEntry,
    WordError, FREE,
};
pub use layout::{BoardLayout, Cell, Marks, CELL_COUNT, CENTER_INDEX, GRID_SIZE, WORD_SLOTS};
pub use room::{Room, RoomCode, RoomCodeError, RoomId, MAX_ROOM_CODE_LEN};
pub use shuffle::{fnv1a_32, seeded_shuffle, SeededShuffle, XorShift32};
