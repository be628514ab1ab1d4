//! Per-user sessions: balance, conversation state, bet and statistics.
//!
//! Every mutator writes the durable row first and only then the in-memory
//! mirror, so a failed write leaves the mirror untouched. The cache in
//! [`SessionStore`] is never evicted; it is bounded by the number of
//! distinct users ever seen.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::state::State;
use crate::store::{Database, StatColumn, UserRow};

/// Statistic counters mirrored from the user row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub wins: i64,
    pub losses: i64,
    pub total_bet: i64,
    pub total_prize: i64,
    pub total_deposited: i64,
    pub total_withdrawn: i64,
}

/// One user's durable session.
pub struct Session {
    db: Database,
    user_id: i64,
    state: State,
    balance: i64,
    bet: i64,
    stats: Stats,
}

impl Session {
    fn from_row(db: Database, row: UserRow) -> Self {
        Self {
            db,
            user_id: row.user_id,
            state: State::from_code(row.state),
            balance: row.score,
            bet: row.bet,
            stats: Stats {
                wins: row.win,
                losses: row.lose,
                total_bet: row.total_bet,
                total_prize: row.prize,
                total_deposited: row.deposit,
                total_withdrawn: row.withdraw,
            },
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn bet(&self) -> i64 {
        self.bet
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Moves the conversation to `state`.
    pub fn set_state(&mut self, state: State) -> Result<(), StoreError> {
        self.db.set_state(self.user_id, state.code())?;
        self.state = state;
        Ok(())
    }

    /// Records the current stake.
    pub fn set_bet(&mut self, bet: i64) -> Result<(), StoreError> {
        self.db.set_bet(self.user_id, bet)?;
        self.bet = bet;
        Ok(())
    }

    /// Adds to the balance.
    pub fn credit(&mut self, amount: i64) -> Result<(), StoreError> {
        self.db.adjust_score(self.user_id, amount)?;
        self.balance += amount;
        Ok(())
    }

    /// Subtracts from the balance if it suffices.
    ///
    /// Returns `false`, with no effect at all, when `amount` exceeds the
    /// balance. The balance can never go negative through this path.
    pub fn try_debit(&mut self, amount: i64) -> Result<bool, StoreError> {
        if amount > self.balance {
            return Ok(false);
        }
        self.db.adjust_score(self.user_id, -amount)?;
        self.balance -= amount;
        Ok(true)
    }

    pub fn add_win(&mut self) -> Result<(), StoreError> {
        self.db.bump_stat(self.user_id, StatColumn::Win, 1)?;
        self.stats.wins += 1;
        Ok(())
    }

    pub fn add_loss(&mut self) -> Result<(), StoreError> {
        self.db.bump_stat(self.user_id, StatColumn::Lose, 1)?;
        self.stats.losses += 1;
        Ok(())
    }

    pub fn add_bet(&mut self, amount: i64) -> Result<(), StoreError> {
        self.db.bump_stat(self.user_id, StatColumn::TotalBet, amount)?;
        self.stats.total_bet += amount;
        Ok(())
    }

    pub fn add_prize(&mut self, amount: i64) -> Result<(), StoreError> {
        self.db.bump_stat(self.user_id, StatColumn::Prize, amount)?;
        self.stats.total_prize += amount;
        Ok(())
    }

    pub fn add_deposit(&mut self, amount: i64) -> Result<(), StoreError> {
        self.db.bump_stat(self.user_id, StatColumn::Deposit, amount)?;
        self.stats.total_deposited += amount;
        Ok(())
    }

    pub fn add_withdrawal(&mut self, amount: i64) -> Result<(), StoreError> {
        self.db.bump_stat(self.user_id, StatColumn::Withdraw, amount)?;
        self.stats.total_withdrawn += amount;
        Ok(())
    }
}

/// Shared handle to one user's session.
///
/// The async mutex serialises everything that touches the session: the
/// dispatcher holds it for a whole handler invocation, the reconciliation
/// loop for a whole credit. A user's rapid double-send therefore cannot
/// observe a stale balance.
pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Lazy cache of sessions over the durable store.
pub struct SessionStore {
    db: Database,
    cache: Mutex<HashMap<i64, SessionHandle>>,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached session or creates the durable row (idempotently)
    /// and caches it. Racing creations collapse onto one handle.
    pub fn get_or_create(&self, user_id: i64) -> Result<SessionHandle, StoreError> {
        if let Some(handle) = self.cache.lock().get(&user_id) {
            return Ok(handle.clone());
        }

        self.db.ensure_user(user_id)?;
        let row = self.db.load_user(user_id)?;
        let session = Session::from_row(self.db.clone(), row);

        let mut cache = self.cache.lock();
        let handle = cache
            .entry(user_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(session)));
        Ok(handle.clone())
    }

    /// Number of cached sessions.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}
