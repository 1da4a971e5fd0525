//! Room lifecycle and derived game state.
//!
//! ```text
//!            select_room(code)
//!   Idle ──────────────────────► Resolving ──► Loading ──► Subscribed
//!    ▲                              │             │            │
//!    │ leave_room                   └──── error ──┴──► Failed  │
//!    └─────────────────────────────────────────────────────────┘
//!                       shutdown() from any phase ──► TornDown
//! ```
//!
//! Every room selection takes a new generation number. Results that arrive
//! for an older generation are dropped, and the previous room's feeds are
//! released before the next room is resolved, so at most one pair of push
//! subscriptions is live at any time.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use bingo_core::{
    detect, is_reserved, normalize_word, BingoCount, BoardLayout, CallEntry, Entry, Marks, Room,
    RoomCode, WordEntry, WordError,
};

use crate::collection::{AppendOutcome, Reconciled, ReconciledCollection};
use crate::remote::{Backend, BackendMode, PushEvent, RemoteError, SubscriptionGuard};
use crate::settings::{SessionSettings, SettingsStore};
use crate::storage::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Resolving,
    Loading,
    Subscribed,
    /// Room setup failed; the message is also in `last_error`.
    Failed(String),
    TornDown,
}

impl Phase {
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Subscribed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyWord,
    ReservedWord,
    DuplicateWord,
    EmptySeed,
    NoRoom,
    NothingToCall,
    ShutDown,
}

/// Result of a user intent. Intents never fail with `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
    Failed(String),
    /// A newer room selection overtook this one.
    Superseded,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

/// Everything a view needs, derived from the two collections and the seed.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub room: Option<Room>,
    pub phase: Phase,
    pub seed: String,
    /// Pool words in local order.
    pub pool: Vec<String>,
    /// Called words in local order, repeats included.
    pub called: Vec<String>,
    pub board: BoardLayout,
    pub marked: Marks,
    pub bingo: BingoCount,
    pub pending_writes: usize,
    pub last_error: Option<String>,
}

impl GameState {
    pub fn is_called(&self, word: &str) -> bool {
        self.called.iter().any(|c| c == word)
    }

    /// Pool words that have not been called yet.
    pub fn uncalled(&self) -> Vec<&str> {
        uncalled(&self.pool, &self.called)
    }
}

/// Candidates for a random call: pool words, in pool order, that are
/// neither called nor `FREE`.
pub fn uncalled<'a>(pool: &'a [String], called: &[String]) -> Vec<&'a str> {
    let called: HashSet<&str> = called.iter().map(String::as_str).collect();
    pool.iter()
        .map(String::as_str)
        .filter(|w| !called.contains(w) && !is_reserved(w))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
struct Derived {
    pool: Vec<String>,
    called: Vec<String>,
    board: BoardLayout,
    marked: Marks,
    bingo: BingoCount,
}

impl Derived {
    fn compute(pool: Vec<String>, called: Vec<String>, seed: &str) -> Self {
        let board = BoardLayout::generate(&pool, seed);
        let marked = {
            let called_set: HashSet<&str> = called.iter().map(String::as_str).collect();
            board.marks(|w| called_set.contains(w))
        };
        let bingo = detect(&marked);
        Self {
            pool,
            called,
            board,
            marked,
            bingo,
        }
    }
}

/// Memo key: (words version, calls version, seed).
type DerivedKey = (u64, u64, String);

struct Session {
    phase: Phase,
    room: Option<Room>,
    feeds: Vec<SubscriptionGuard>,
    pumps: Vec<JoinHandle<()>>,
}

struct Inner {
    backend: Backend,
    words: ReconciledCollection<WordEntry>,
    calls: ReconciledCollection<CallEntry>,
    settings_store: SettingsStore,
    settings: RwLock<SessionSettings>,
    generation: AtomicU64,
    session: Mutex<Session>,
    last_error: RwLock<Option<String>>,
    memo: Mutex<Option<(DerivedKey, Derived)>>,
    changes: Arc<watch::Sender<u64>>,
}

/// Drives one player's view of one room at a time. Clones share state.
#[derive(Clone)]
pub struct RoomSyncController {
    inner: Arc<Inner>,
}

impl RoomSyncController {
    /// Build a controller, loading session settings from `settings_store`.
    pub fn new(backend: Backend, settings_store: SettingsStore) -> Result<Self, StoreError> {
        let settings = settings_store.load()?;
        log::info!(
            "Controller ready ({:?} backend, seed {})",
            backend.mode,
            settings.seed
        );

        let (changes, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(Inner {
                words: ReconciledCollection::new(backend.words.clone()),
                calls: ReconciledCollection::new(backend.calls.clone()),
                backend,
                settings_store,
                settings: RwLock::new(settings),
                generation: AtomicU64::new(0),
                session: Mutex::new(Session {
                    phase: Phase::Idle,
                    room: None,
                    feeds: Vec::new(),
                    pumps: Vec::new(),
                }),
                last_error: RwLock::new(None),
                memo: Mutex::new(None),
                changes: Arc::new(changes),
            }),
        })
    }

    pub fn mode(&self) -> BackendMode {
        self.inner.backend.mode
    }

    pub fn words(&self) -> &ReconciledCollection<WordEntry> {
        &self.inner.words
    }

    pub fn calls(&self) -> &ReconciledCollection<CallEntry> {
        &self.inner.calls
    }

    /// Receiver bumped after every visible change.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|v| *v = v.wrapping_add(1));
    }

    async fn record_error(&self, message: String) -> Outcome {
        *self.inner.last_error.write().await = Some(message.clone());
        self.notify();
        Outcome::Failed(message)
    }

    pub async fn dismiss_error(&self) {
        *self.inner.last_error.write().await = None;
        self.notify();
    }

    // ─── Room lifecycle ──────────────────────────────────────────────

    /// Re-enter the room saved in the session settings, if any.
    pub async fn start(&self) -> Outcome {
        let saved = self.inner.settings.read().await.room_code.clone();
        match saved {
            Some(code) => self.select_room(code).await,
            None => Outcome::Skipped(SkipReason::NoRoom),
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != generation
    }

    async fn teardown(&self, session: &mut Session) {
        for pump in session.pumps.drain(..) {
            pump.abort();
        }
        let released = session.feeds.len();
        session.feeds.clear();
        session.room = None;
        self.inner.words.unbind().await;
        self.inner.calls.unbind().await;
        if released > 0 {
            log::debug!("Released {released} push subscriptions");
        }
    }

    async fn save_room(&self, code: Option<&RoomCode>) {
        self.inner.settings.write().await.room_code = code.cloned();
        if let Err(e) = self.inner.settings_store.save_room(code) {
            log::warn!("Could not save room code: {e}");
        }
    }

    /// Switch to the room for `code`, creating it if needed.
    pub async fn select_room(&self, code: RoomCode) -> Outcome {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut session = self.inner.session.lock().await;
            if session.phase == Phase::TornDown {
                return Outcome::Skipped(SkipReason::ShutDown);
            }
            self.teardown(&mut session).await;
            session.phase = Phase::Resolving;
        }
        log::info!("Resolving room '{code}'");
        self.save_room(Some(&code)).await;
        self.notify();

        // Resolving
        let room = match self.inner.backend.rooms.resolve(&code).await {
            Ok(room) => room,
            Err(e) => return self.fail_setup(generation, "resolve room", e).await,
        };

        // Loading: open the feeds first so nothing written during the fetch
        // is missed. Overlap with the snapshot is absorbed by id dedupe.
        let feeds = {
            let mut session = self.inner.session.lock().await;
            if self.is_stale(generation) {
                return Outcome::Superseded;
            }
            session.phase = Phase::Loading;
            session.room = Some(room.clone());

            let words = self.inner.words.subscribe(room.id).await;
            let calls = self.inner.calls.subscribe(room.id).await;
            match (words, calls) {
                (Ok(words), Ok(calls)) => {
                    let (word_events, word_guard) = words.split();
                    let (call_events, call_guard) = calls.split();
                    session.feeds = vec![word_guard, call_guard];
                    Ok((word_events, call_events))
                }
                (Err(e), _) | (_, Err(e)) => Err(e),
            }
        };
        self.notify();
        let (word_events, call_events) = match feeds {
            Ok(feeds) => feeds,
            Err(e) => return self.fail_setup(generation, "subscribe", e).await,
        };

        let (words, calls) = tokio::join!(
            self.inner.words.fetch(room.id),
            self.inner.calls.fetch(room.id)
        );
        let (words, calls) = match (words, calls) {
            (Ok(words), Ok(calls)) => (words, calls),
            (Err(e), _) | (_, Err(e)) => return self.fail_setup(generation, "load room", e).await,
        };

        // Subscribed
        {
            let mut session = self.inner.session.lock().await;
            if self.is_stale(generation) {
                return Outcome::Superseded;
            }
            let (word_count, call_count) = (words.len(), calls.len());
            self.inner.words.bind(room.id, words).await;
            self.inner.calls.bind(room.id, calls).await;
            session.pumps = vec![
                self.spawn_pump(self.inner.words.clone(), word_events),
                self.spawn_pump(self.inner.calls.clone(), call_events),
            ];
            session.phase = Phase::Subscribed;
            log::info!(
                "Joined room '{code}' ({}): {word_count} words, {call_count} calls",
                room.id
            );
        }
        *self.inner.last_error.write().await = None;
        self.notify();
        Outcome::Applied
    }

    async fn fail_setup(&self, generation: u64, op: &str, error: RemoteError) -> Outcome {
        let message = format!("Could not {op}: {error}");
        {
            let mut session = self.inner.session.lock().await;
            if self.is_stale(generation) {
                return Outcome::Superseded;
            }
            self.teardown(&mut session).await;
            session.phase = Phase::Failed(message.clone());
        }
        log::error!("{message}");
        self.record_error(message).await
    }

    fn spawn_pump<T: Entry>(
        &self,
        collection: ReconciledCollection<T>,
        mut events: mpsc::UnboundedReceiver<PushEvent<T>>,
    ) -> JoinHandle<()> {
        let changes = self.inner.changes.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log::trace!("{}: push {event:?}", collection.name());
                if collection.receive_push(event).await {
                    changes.send_modify(|v| *v = v.wrapping_add(1));
                }
            }
            log::debug!("{}: push feed ended", collection.name());
        })
    }

    /// Leave the current room without selecting another.
    pub async fn leave_room(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut session = self.inner.session.lock().await;
            if session.phase == Phase::TornDown {
                return;
            }
            self.teardown(&mut session).await;
            session.phase = Phase::Idle;
        }
        self.save_room(None).await;
        self.notify();
    }

    /// Release everything. The controller accepts no further room changes.
    pub async fn shutdown(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let mut session = self.inner.session.lock().await;
        self.teardown(&mut session).await;
        session.phase = Phase::TornDown;
        drop(session);
        log::info!("Controller torn down");
        self.notify();
    }

    pub async fn phase(&self) -> Phase {
        self.inner.session.lock().await.phase.clone()
    }

    pub async fn room(&self) -> Option<Room> {
        self.inner.session.lock().await.room.clone()
    }

    /// Live push subscriptions held for the current room.
    pub async fn live_subscriptions(&self) -> usize {
        self.inner.session.lock().await.feeds.len()
    }

    // ─── Settings ────────────────────────────────────────────────────

    pub async fn seed(&self) -> String {
        self.inner.settings.read().await.seed.clone()
    }

    pub async fn set_seed(&self, seed: &str) -> Outcome {
        let seed = seed.trim();
        if seed.is_empty() {
            return Outcome::Skipped(SkipReason::EmptySeed);
        }
        self.inner.settings.write().await.seed = seed.to_string();
        self.notify();
        if let Err(e) = self.inner.settings_store.save_seed(seed) {
            log::warn!("Could not save seed: {e}");
            return self.record_error(format!("Could not save seed: {e}")).await;
        }
        Outcome::Applied
    }

    // ─── User intents ────────────────────────────────────────────────

    async fn settle<T>(&self, op: &str, outcome: AppendOutcome<T>) -> Outcome {
        self.notify();
        match outcome {
            AppendOutcome::Committed {
                reconciled: Reconciled::Stale,
                ..
            } => Outcome::Superseded,
            AppendOutcome::Committed { .. } => Outcome::Applied,
            AppendOutcome::Rejected => Outcome::Skipped(SkipReason::DuplicateWord),
            AppendOutcome::Unbound => Outcome::Skipped(SkipReason::NoRoom),
            AppendOutcome::Failed(e) => self.record_error(format!("Could not {op}: {e}")).await,
        }
    }

    /// Add a word to the pool. Surrounding whitespace is trimmed; empty
    /// words, `FREE` and words already in the pool are skipped.
    pub async fn add_word(&self, input: &str) -> Outcome {
        let word = match normalize_word(input) {
            Ok(word) => word,
            Err(WordError::Empty) => return Outcome::Skipped(SkipReason::EmptyWord),
            Err(WordError::Reserved) => return Outcome::Skipped(SkipReason::ReservedWord),
        };
        let outcome = self
            .inner
            .words
            .append_unless(word.clone(), |e: &WordEntry| e.text == word)
            .await;
        self.settle("add word", outcome).await
    }

    /// Call a word. Words outside the pool are accepted and mark nothing.
    pub async fn call_word(&self, word: &str) -> Outcome {
        let word = word.trim();
        if word.is_empty() {
            return Outcome::Skipped(SkipReason::EmptyWord);
        }
        let outcome = self.inner.calls.append(word.to_string()).await;
        self.settle("call word", outcome).await
    }

    async fn uncalled_words(&self) -> Vec<String> {
        let pool = self.inner.words.values().await;
        let called = self.inner.calls.values().await;
        uncalled(&pool, &called).into_iter().map(str::to_string).collect()
    }

    /// Call a uniformly chosen pool word that has not been called yet.
    pub async fn call_random(&self) -> (Option<String>, Outcome) {
        let candidates = self.uncalled_words().await;
        let choice = {
            let mut rng = rand::thread_rng();
            candidates.choose(&mut rng).cloned()
        };
        self.call_choice(choice).await
    }

    /// [`call_random`](Self::call_random) with a caller-supplied generator.
    pub async fn call_random_with<R>(&self, rng: &mut R) -> (Option<String>, Outcome)
    where
        R: Rng + Send + ?Sized,
    {
        let candidates = self.uncalled_words().await;
        let choice = candidates.choose(rng).cloned();
        self.call_choice(choice).await
    }

    async fn call_choice(&self, choice: Option<String>) -> (Option<String>, Outcome) {
        match choice {
            Some(word) => {
                let outcome = self.call_word(&word).await;
                (Some(word), outcome)
            }
            None if self.inner.calls.room().await.is_none() => {
                (None, Outcome::Skipped(SkipReason::NoRoom))
            }
            None => (None, Outcome::Skipped(SkipReason::NothingToCall)),
        }
    }

    /// Delete every call in the room.
    pub async fn clear_calls(&self) -> Outcome {
        if self.inner.calls.room().await.is_none() {
            return Outcome::Skipped(SkipReason::NoRoom);
        }
        let result = self.inner.calls.clear_all().await;
        self.notify();
        match result {
            Ok(_) => Outcome::Applied,
            Err(e) => self.record_error(format!("Could not clear calls: {e}")).await,
        }
    }

    /// Delete every call, then every pool word. Stops at the first failure.
    pub async fn reset_pool(&self) -> Outcome {
        match self.clear_calls().await {
            Outcome::Applied => {}
            other => return other,
        }
        let result = self.inner.words.clear_all().await;
        self.notify();
        match result {
            Ok(_) => Outcome::Applied,
            Err(e) => self.record_error(format!("Could not reset pool: {e}")).await,
        }
    }

    // ─── Derived state ───────────────────────────────────────────────

    /// Current game state. The board part is recomputed only when a
    /// collection or the seed changed since the last call.
    pub async fn state(&self) -> GameState {
        let seed = self.seed().await;
        let key: DerivedKey = (
            self.inner.words.version().await,
            self.inner.calls.version().await,
            seed.clone(),
        );

        let derived = {
            let mut memo = self.inner.memo.lock().await;
            match memo.as_ref() {
                Some((cached, derived)) if *cached == key => derived.clone(),
                _ => {
                    let derived = Derived::compute(
                        self.inner.words.values().await,
                        self.inner.calls.values().await,
                        &seed,
                    );
                    *memo = Some((key, derived.clone()));
                    derived
                }
            }
        };

        let (phase, room) = {
            let session = self.inner.session.lock().await;
            (session.phase.clone(), session.room.clone())
        };

        GameState {
            room,
            phase,
            seed,
            pool: derived.pool,
            called: derived.called,
            board: derived.board,
            marked: derived.marked,
            bingo: derived.bingo,
            pending_writes: self.inner.words.pending_count().await
                + self.inner.calls.pending_count().await,
            last_error: self.inner.last_error.read().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::storage::{KeyValueStore, MemoryStore};
    use bingo_core::{Cell, CENTER_INDEX};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn settings(seed: &str) -> SettingsStore {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let store = SettingsStore::new(kv);
        store.save_seed(seed).unwrap();
        store
    }

    fn controller(store: &MemoryBackend) -> RoomSyncController {
        RoomSyncController::new(Backend::in_process(store), settings("Player-1")).unwrap()
    }

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_select_room_reaches_subscribed() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        assert_eq!(ctl.phase().await, Phase::Idle);

        assert_eq!(ctl.select_room(code("party")).await, Outcome::Applied);
        assert_eq!(ctl.phase().await, Phase::Subscribed);
        assert_eq!(ctl.room().await.unwrap().code, code("party"));
        assert_eq!(ctl.live_subscriptions().await, 2);
    }

    #[tokio::test]
    async fn test_intents_without_room_are_skipped() {
        let ctl = controller(&MemoryBackend::default());
        assert_eq!(ctl.add_word("CAT").await, Outcome::Skipped(SkipReason::NoRoom));
        assert_eq!(ctl.call_word("CAT").await, Outcome::Skipped(SkipReason::NoRoom));
        assert_eq!(ctl.clear_calls().await, Outcome::Skipped(SkipReason::NoRoom));
        assert_eq!(ctl.call_random().await.1, Outcome::Skipped(SkipReason::NoRoom));
    }

    #[tokio::test]
    async fn test_add_word_validation() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        ctl.select_room(code("words")).await;

        assert_eq!(ctl.add_word("   ").await, Outcome::Skipped(SkipReason::EmptyWord));
        assert_eq!(ctl.add_word("free").await, Outcome::Skipped(SkipReason::ReservedWord));
        assert_eq!(ctl.add_word("  CAT ").await, Outcome::Applied);
        assert_eq!(ctl.add_word("CAT").await, Outcome::Skipped(SkipReason::DuplicateWord));
        assert_eq!(ctl.add_word("cat").await, Outcome::Applied);
        assert_eq!(ctl.state().await.pool, vec!["CAT", "cat"]);
    }

    #[tokio::test]
    async fn test_derived_state_follows_calls() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        ctl.select_room(code("derived")).await;
        for i in 0..24 {
            ctl.add_word(&format!("W{i}")).await;
        }

        let state = ctl.state().await;
        assert_eq!(state.board, BoardLayout::generate(&state.pool, "Player-1"));
        assert_eq!(state.board.cell(CENTER_INDEX), Some(&Cell::Free));
        assert!(state.marked[CENTER_INDEX]);
        assert_eq!(state.bingo.total, 0);

        // Call the whole middle row.
        let row: Vec<String> = state.board.rows().nth(2).unwrap()
            .iter()
            .filter_map(Cell::word)
            .map(String::from)
            .collect();
        for word in &row {
            assert_eq!(ctl.call_word(word).await, Outcome::Applied);
        }
        let state = ctl.state().await;
        assert_eq!(state.bingo.rows, 1);
        assert!(state.bingo.has_bingo());
    }

    #[tokio::test]
    async fn test_state_memoized_until_change() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        ctl.select_room(code("memo")).await;
        ctl.add_word("A").await;

        let first = ctl.state().await;
        let second = ctl.state().await;
        assert_eq!(first, second);

        ctl.set_seed("other").await;
        let third = ctl.state().await;
        assert_eq!(third.seed, "other");
        let pool = vec!["A"];
        assert_eq!(third.board, BoardLayout::generate(&pool[..], "other"));
    }

    #[tokio::test]
    async fn test_call_random_picks_uncalled() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        ctl.select_room(code("random")).await;
        for w in ["A", "B", "C"] {
            ctl.add_word(w).await;
        }
        ctl.call_word("A").await;

        let mut rng = StdRng::seed_from_u64(7);
        let mut drawn = HashSet::new();
        for _ in 0..2 {
            let (word, outcome) = ctl.call_random_with(&mut rng).await;
            assert_eq!(outcome, Outcome::Applied);
            drawn.insert(word.unwrap());
        }
        assert_eq!(drawn, HashSet::from(["B".to_string(), "C".to_string()]));

        let (word, outcome) = ctl.call_random_with(&mut rng).await;
        assert_eq!(word, None);
        assert_eq!(outcome, Outcome::Skipped(SkipReason::NothingToCall));
    }

    #[test]
    fn test_uncalled_keeps_pool_order() {
        let pool: Vec<String> = ["A", "B", "free", "C", "D"].map(String::from).to_vec();
        let called: Vec<String> = ["C", "A", "ZZZ"].map(String::from).to_vec();
        assert_eq!(uncalled(&pool, &called), vec!["B", "D"]);
        assert!(uncalled(&[], &called).is_empty());
    }

    #[tokio::test]
    async fn test_random_candidates_match_state() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        ctl.select_room(code("cands")).await;
        for w in ["A", "B", "C"] {
            ctl.add_word(w).await;
        }
        ctl.call_word("B").await;

        let state = ctl.state().await;
        let expected: Vec<String> = state.uncalled().into_iter().map(String::from).collect();
        assert_eq!(ctl.uncalled_words().await, expected);
        assert_eq!(expected, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_clear_and_reset() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        ctl.select_room(code("reset")).await;
        ctl.add_word("A").await;
        ctl.call_word("A").await;

        assert_eq!(ctl.clear_calls().await, Outcome::Applied);
        let state = ctl.state().await;
        assert!(state.called.is_empty());
        assert_eq!(state.pool, vec!["A"]);

        ctl.call_word("A").await;
        assert_eq!(ctl.reset_pool().await, Outcome::Applied);
        let state = ctl.state().await;
        assert!(state.pool.is_empty() && state.called.is_empty());
    }

    #[tokio::test]
    async fn test_failure_recorded_and_recoverable() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        ctl.select_room(code("flaky")).await;
        ctl.add_word("A").await;

        store.set_offline(true);
        let outcome = ctl.add_word("B").await;
        assert!(matches!(outcome, Outcome::Failed(_)));
        let state = ctl.state().await;
        assert_eq!(state.pool, vec!["A"]);
        assert!(state.last_error.unwrap().contains("offline"));

        assert!(matches!(ctl.reset_pool().await, Outcome::Failed(_)));
        assert_eq!(ctl.state().await.pool, vec!["A"]);

        store.set_offline(false);
        assert_eq!(ctl.add_word("B").await, Outcome::Applied);
        assert_eq!(ctl.state().await.pool, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_setup_failure_then_retry() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        store.set_offline(true);

        let outcome = ctl.select_room(code("later")).await;
        assert!(matches!(outcome, Outcome::Failed(_)));
        assert!(matches!(ctl.phase().await, Phase::Failed(_)));
        assert_eq!(ctl.live_subscriptions().await, 0);

        store.set_offline(false);
        assert_eq!(ctl.select_room(code("later")).await, Outcome::Applied);
        assert_eq!(ctl.state().await.last_error, None);
    }

    #[tokio::test]
    async fn test_shutdown_is_final() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        ctl.select_room(code("bye")).await;
        ctl.shutdown().await;

        assert_eq!(ctl.phase().await, Phase::TornDown);
        assert_eq!(ctl.live_subscriptions().await, 0);
        assert_eq!(
            ctl.select_room(code("again")).await,
            Outcome::Skipped(SkipReason::ShutDown)
        );
    }

    #[tokio::test]
    async fn test_start_restores_saved_room() {
        let store = MemoryBackend::default();
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let first =
            RoomSyncController::new(Backend::in_process(&store), SettingsStore::new(kv.clone()))
                .unwrap();
        assert_eq!(first.start().await, Outcome::Skipped(SkipReason::NoRoom));
        first.select_room(code("saved")).await;
        let seed = first.seed().await;
        first.shutdown().await;

        let second =
            RoomSyncController::new(Backend::in_process(&store), SettingsStore::new(kv)).unwrap();
        assert_eq!(second.seed().await, seed);
        assert_eq!(second.start().await, Outcome::Applied);
        assert_eq!(second.room().await.unwrap().code, code("saved"));
    }

    #[tokio::test]
    async fn test_changes_notified() {
        let store = MemoryBackend::default();
        let ctl = controller(&store);
        let mut changes = ctl.subscribe_changes();
        ctl.select_room(code("watch")).await;
        assert!(changes.has_changed().unwrap());
        changes.borrow_and_update();

        ctl.add_word("A").await;
        assert!(changes.has_changed().unwrap());
    }
}
