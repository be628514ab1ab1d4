//! Durable storage: user rows and the processed-transaction dedup set.
//!
//! SQLite behind an r2d2 pool. The schema is created on open; every method
//! is a single statement, so a failed call leaves no partial effect.

use std::collections::HashSet;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::error::StoreError;

/// Connection pool alias.
pub type DbPool = Pool<SqliteConnectionManager>;
/// Pooled connection alias.
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS user_scores (
    user_id   INTEGER PRIMARY KEY,
    score     INTEGER NOT NULL DEFAULT 0,
    state     INTEGER NOT NULL DEFAULT 0,
    bet       INTEGER NOT NULL DEFAULT 0,
    win       INTEGER NOT NULL DEFAULT 0,
    lose      INTEGER NOT NULL DEFAULT 0,
    total_bet INTEGER NOT NULL DEFAULT 0,
    prize     INTEGER NOT NULL DEFAULT 0,
    deposit   INTEGER NOT NULL DEFAULT 0,
    withdraw  INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS transactions (
    tid        INTEGER PRIMARY KEY,
    from_id    INTEGER NOT NULL,
    to_id      INTEGER NOT NULL,
    amount     INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
";

/// One `user_scores` row as stored.
#[derive(Debug, Clone, Default)]
pub struct UserRow {
    pub user_id: i64,
    pub score: i64,
    pub state: i64,
    pub bet: i64,
    pub win: i64,
    pub lose: i64,
    pub total_bet: i64,
    pub prize: i64,
    pub deposit: i64,
    pub withdraw: i64,
}

/// Statistic counters on a user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatColumn {
    Win,
    Lose,
    TotalBet,
    Prize,
    Deposit,
    Withdraw,
}

impl StatColumn {
    fn as_sql(self) -> &'static str {
        match self {
            StatColumn::Win => "win",
            StatColumn::Lose => "lose",
            StatColumn::TotalBet => "total_bet",
            StatColumn::Prize => "prize",
            StatColumn::Deposit => "deposit",
            StatColumn::Withdraw => "withdraw",
        }
    }
}

/// Leaderboard orderings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Board {
    Score,
    Wins,
    Games,
    Profit,
}

impl Board {
    fn value_sql(self) -> &'static str {
        match self {
            Board::Score => "score",
            Board::Wins => "win",
            Board::Games => "win + lose",
            Board::Profit => "prize - total_bet",
        }
    }
}

/// A processed ledger transaction, as persisted for dedup.
#[derive(Debug, Clone)]
pub struct TxRecord {
    pub tid: i64,
    pub from_id: i64,
    pub to_id: i64,
    pub amount: i64,
    pub created_at: i64,
}

/// Pooled handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(4).build(manager)?;
        let db = Self { pool };
        db.conn()?.execute_batch(SCHEMA)?;
        Ok(db)
    }

    fn conn(&self) -> Result<DbConnection, StoreError> {
        Ok(self.pool.get()?)
    }

    // ------------------------------------------------------------------
    // user rows
    // ------------------------------------------------------------------

    /// Creates the default row for a user unless it already exists.
    /// Safe to call concurrently for the same id.
    pub fn ensure_user(&self, user_id: i64) -> Result<(), StoreError> {
        self.conn()?.execute(
            "INSERT OR IGNORE INTO user_scores (user_id) VALUES (?1)",
            params![user_id],
        )?;
        Ok(())
    }

    /// Reads the full row for a user. The row must exist.
    pub fn load_user(&self, user_id: i64) -> Result<UserRow, StoreError> {
        let row = self.conn()?.query_row(
            "SELECT user_id, score, state, bet, win, lose, total_bet, prize, deposit, withdraw
             FROM user_scores WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserRow {
                    user_id: row.get(0)?,
                    score: row.get(1)?,
                    state: row.get(2)?,
                    bet: row.get(3)?,
                    win: row.get(4)?,
                    lose: row.get(5)?,
                    total_bet: row.get(6)?,
                    prize: row.get(7)?,
                    deposit: row.get(8)?,
                    withdraw: row.get(9)?,
                })
            },
        )?;
        Ok(row)
    }

    /// Adds `delta` (possibly negative) to a user's balance.
    pub fn adjust_score(&self, user_id: i64, delta: i64) -> Result<(), StoreError> {
        self.conn()?.execute(
            "UPDATE user_scores SET score = score + ?1 WHERE user_id = ?2",
            params![delta, user_id],
        )?;
        Ok(())
    }

    /// Stores a user's conversation state code.
    pub fn set_state(&self, user_id: i64, code: i64) -> Result<(), StoreError> {
        self.conn()?.execute(
            "UPDATE user_scores SET state = ?1 WHERE user_id = ?2",
            params![code, user_id],
        )?;
        Ok(())
    }

    /// Stores a user's current bet.
    pub fn set_bet(&self, user_id: i64, bet: i64) -> Result<(), StoreError> {
        self.conn()?.execute(
            "UPDATE user_scores SET bet = ?1 WHERE user_id = ?2",
            params![bet, user_id],
        )?;
        Ok(())
    }

    /// Adds `delta` to one statistic counter.
    pub fn bump_stat(&self, user_id: i64, column: StatColumn, delta: i64) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE user_scores SET {col} = {col} + ?1 WHERE user_id = ?2",
            col = column.as_sql()
        );
        self.conn()?.execute(&sql, params![delta, user_id])?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // processed transactions
    // ------------------------------------------------------------------

    /// Records a processed ledger transaction.
    ///
    /// Returns `false` when the id was already recorded; the primary key
    /// on `tid` makes this the authoritative double-credit guard.
    pub fn insert_transaction(&self, record: &TxRecord) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "INSERT OR IGNORE INTO transactions (tid, from_id, to_id, amount, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.tid,
                record.from_id,
                record.to_id,
                record.amount,
                record.created_at
            ],
        )?;
        Ok(changed > 0)
    }

    /// The most recently processed transaction ids, newest first.
    pub fn recent_transaction_ids(&self, limit: usize) -> Result<HashSet<i64>, StoreError> {
        let conn = self.conn()?;
        let mut statement =
            conn.prepare("SELECT tid FROM transactions ORDER BY tid DESC LIMIT ?1")?;
        let ids = statement
            .query_map(params![limit as i64], |row| row.get::<_, i64>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // leaderboards
    // ------------------------------------------------------------------

    /// Top rows for a board: `(user_id, value)`, best first.
    pub fn top_by(&self, board: Board, limit: usize) -> Result<Vec<(i64, i64)>, StoreError> {
        let sql = format!(
            "SELECT user_id, {value} AS value FROM user_scores ORDER BY value DESC LIMIT ?1",
            value = board.value_sql()
        );
        let conn = self.conn()?;
        let mut statement = conn.prepare(&sql)?;
        let rows = statement
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
