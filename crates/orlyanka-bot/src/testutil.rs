//! Shared fixtures for module tests: a recording API transport, a scripted
//! ledger and a fully wired [`BotContext`] over a temporary database.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use orlyanka_vk::{ApiResult, ApiTransport, ExecutePool, Message, Update};

use crate::config::BotConfig;
use crate::context::{BotContext, Members};
use crate::error::LedgerError;
use crate::ledger::{Direction, Ledger, Transaction, TransferQueue};
use crate::session::SessionStore;
use crate::store::Database;

/// Records every API call; answers `execute` (and everything else) with `0`.
pub struct RecordingTransport {
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Every `messages.send` fragment submitted so far, as `(user_id, text)`,
    /// in submission order.
    pub fn sent_messages(&self) -> Vec<(i64, String)> {
        let mut out = Vec::new();
        for (method, params) in self.calls.lock().iter() {
            if method != "execute" {
                continue;
            }
            let Some(code) = params.get("code").and_then(Value::as_str) else {
                continue;
            };
            for object in top_level_objects(code) {
                let Ok(value) = serde_json::from_str::<Value>(&object) else {
                    continue;
                };
                if let (Some(user_id), Some(text)) = (
                    value.get("user_id").and_then(Value::as_i64),
                    value.get("message").and_then(Value::as_str),
                ) {
                    out.push((user_id, text.to_string()));
                }
            }
        }
        out
    }
}

#[async_trait]
impl ApiTransport for RecordingTransport {
    async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
        self.calls.lock().push((method.to_string(), params));
        Ok(Value::from(0))
    }
}

/// Extracts top-level `{...}` objects from a VKScript batch body, honoring
/// string literals so braces inside reply texts do not confuse the scan.
fn top_level_objects(code: &str) -> Vec<String> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut current = String::new();

    for ch in code.chars() {
        if depth > 0 {
            current.push(ch);
        }
        match ch {
            '\\' if in_string => escaped = !escaped,
            '"' if !escaped => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    current.push(ch);
                }
                depth += 1;
            }
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    objects.push(std::mem::take(&mut current));
                }
            }
            _ => escaped = false,
        }
        if ch != '\\' {
            escaped = false;
        }
    }
    objects
}

/// Scripted [`Ledger`]: returns fixed transaction lists, records transfers.
#[derive(Default)]
pub struct StubLedger {
    pub to_merchant: Mutex<Vec<Transaction>>,
    pub to_user: Mutex<Vec<Transaction>>,
    pub sent: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl Ledger for StubLedger {
    async fn transactions(&self, direction: Direction) -> Result<Vec<Transaction>, LedgerError> {
        let list = match direction {
            Direction::ToMerchant => self.to_merchant.lock().clone(),
            Direction::ToUser => self.to_user.lock().clone(),
        };
        Ok(list)
    }

    async fn transfer(&self, to_id: i64, amount: i64) -> Result<(), LedgerError> {
        self.sent.lock().push((to_id, amount));
        Ok(())
    }
}

/// Builds a ledger transaction literal.
pub fn tx(id: i64, from_id: i64, to_id: i64, amount: i64, kind: i64, payload: i64) -> Transaction {
    Transaction {
        id,
        from_id,
        to_id,
        amount,
        kind,
        payload,
        external_id: 0,
        created_at: 1_700_000_000 + id,
    }
}

/// Builds an inbound message update.
pub fn message(user_id: i64, text: &str) -> Update {
    Update::MessageNew(Message {
        from_id: user_id,
        peer_id: user_id,
        text: text.to_string(),
        attachments: Vec::new(),
    })
}

/// A wired-up context over a throwaway database.
pub struct TestBed {
    pub ctx: Arc<BotContext>,
    pub transport: Arc<RecordingTransport>,
    pub ledger: Arc<StubLedger>,
    pub transfer_rx: mpsc::UnboundedReceiver<(i64, i64)>,
    _dir: tempfile::TempDir,
}

impl TestBed {
    /// Flushes the pool until empty and returns every reply text so far.
    pub async fn sent_replies(&self) -> Vec<String> {
        while self.ctx.pool.pending() > 0 {
            self.ctx.pool.flush().await;
        }
        self.transport
            .sent_messages()
            .into_iter()
            .map(|(_, text)| text)
            .collect()
    }
}

/// Default test configuration: merchant 777, payload 555.
fn test_config() -> BotConfig {
    BotConfig {
        group_token: "test-token".to_string(),
        group_id: 1,
        merchant_id: 777,
        merchant_key: "test-key".to_string(),
        payload: 555,
        min_bet: 1_000,
        max_bet: 1_000_000,
        win_chance: 45,
        flush_interval_ms: 550,
        reconcile_interval_secs: 2,
        database_path: String::new(),
        log_level: "info".to_string(),
    }
}

/// Builds a [`TestBed`] with the default configuration.
pub fn test_context() -> TestBed {
    test_context_with(|_| {})
}

/// Builds a [`TestBed`] with a tweaked configuration.
pub fn test_context_with(tweak: impl FnOnce(&mut BotConfig)) -> TestBed {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bot.sqlite");
    let db = Database::open(path.to_str().expect("utf-8 path")).expect("open database");

    let transport = RecordingTransport::new();
    let ledger = Arc::new(StubLedger::default());
    let (transfers, transfer_rx) = TransferQueue::new();

    let mut config = test_config();
    tweak(&mut config);

    let ctx = Arc::new(BotContext {
        config,
        api: transport.clone(),
        pool: ExecutePool::new(transport.clone()),
        db: db.clone(),
        sessions: SessionStore::new(db),
        ledger: ledger.clone(),
        transfers,
        members: Members::new(),
    });

    TestBed {
        ctx,
        transport,
        ledger,
        transfer_rx,
        _dir: dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_scan_survives_braces_inside_strings() {
        let code = r#"return [API.messages.send({"message":"смайл }{ :(","user_id":1}),API.messages.send({"message":"ok","user_id":2})];"#;
        let objects = top_level_objects(code);
        assert_eq!(objects.len(), 2);
        let first: Value = serde_json::from_str(&objects[0]).unwrap();
        assert_eq!(first["message"], "смайл }{ :(");
    }
}
