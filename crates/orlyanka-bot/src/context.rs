//! The shared collaborator set, built once at startup.
//!
//! Everything long-lived hangs off [`BotContext`]: handlers, the
//! reconciliation loop and the flush loop all receive the same `Arc`, no
//! global statics.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use orlyanka_vk::{ApiCall, ApiTransport, ExecutePool};

use crate::config::BotConfig;
use crate::ledger::{Ledger, TransferQueue};
use crate::session::SessionStore;
use crate::store::Database;

/// Process-wide set of current group members.
#[derive(Default)]
pub struct Members {
    set: Mutex<HashSet<i64>>,
}

impl Members {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: i64) {
        self.set.lock().insert(user_id);
    }

    pub fn remove(&self, user_id: i64) {
        self.set.lock().remove(&user_id);
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.set.lock().contains(&user_id)
    }

    /// Replaces the whole set, used by the startup preload.
    pub fn replace(&self, members: impl IntoIterator<Item = i64>) {
        *self.set.lock() = members.into_iter().collect();
    }

    pub fn len(&self) -> usize {
        self.set.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.lock().is_empty()
    }
}

/// Shared collaborators for handlers and loops.
pub struct BotContext {
    pub config: BotConfig,
    pub api: Arc<dyn ApiTransport>,
    pub pool: ExecutePool,
    pub db: Database,
    pub sessions: SessionStore,
    pub ledger: Arc<dyn Ledger>,
    pub transfers: TransferQueue,
    pub members: Members,
}

impl BotContext {
    /// Queues a plain-text reply through the execute pool.
    pub fn reply(&self, user_id: i64, text: &str) {
        self.pool.enqueue(ApiCall::message(user_id, text));
    }
}
