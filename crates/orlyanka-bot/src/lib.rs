//! # orlyanka-bot
//!
//! A heads-or-tails betting bot for VK, backed by the VK Coin merchant
//! ledger. The platform plumbing (API client, long-poll feed, execute pool)
//! lives in `orlyanka-vk`; this crate is the game itself.
//!
//! Four cooperative loops share one thread:
//!
//! 1. **dispatch**: consumes the update feed and walks the handler chain
//! 2. **flush**: drains the execute pool into batched API calls
//! 3. **reconcile**: polls the ledger and credits new deposits exactly once
//! 4. **transfer drain**: sends queued withdrawals one at a time
//!
//! They interleave only at await points; per-user work is additionally
//! serialised by the session mutex.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod game;
pub mod handlers;
pub mod ledger;
pub mod messages;
pub mod reconcile;
pub mod session;
pub mod state;
pub mod store;
pub mod top;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::BotConfig;
pub use context::{BotContext, Members};
pub use dispatch::{Dispatcher, Handler, Pattern, Turn};
pub use error::{BotError, BotResult, ConfigError, LedgerError, StoreError};
pub use ledger::{CoinApi, Ledger, TransferQueue};
pub use session::{Session, SessionStore};
pub use state::{State, StateGate};
pub use store::Database;
