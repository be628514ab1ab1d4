//! Client for the VK Coin merchant ledger.
//!
//! The ledger is an external HTTP service: `tx` lists recent transactions
//! (direction-selected), `send` initiates an outgoing transfer. Outgoing
//! transfers are queued and drained one at a time by [`transfer_loop`] so a
//! slow ledger can never stall a handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::LedgerError;

const MERCHANT_URL: &str = "https://coin-without-bugs.vkforms.ru/merchant/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which listing the `tx` method returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Transfers into the merchant account (deposits).
    ToMerchant,
    /// User-to-user transfers involving the merchant's user identity.
    ToUser,
}

impl Direction {
    fn code(self) -> i64 {
        match self {
            Direction::ToMerchant => 1,
            Direction::ToUser => 2,
        }
    }
}

/// Classification tags the ledger puts on transactions.
pub mod tx_kind {
    /// Plain user-to-user transfer.
    pub const FROM_USER_TO_USER: i64 = 3;
    /// Transfer into a merchant account.
    pub const FROM_USER_TO_MERCHANT: i64 = 4;
}

/// One ledger transaction as reported by `tx`.
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    /// The ledger-unique id used for dedup.
    pub id: i64,
    /// Paying user.
    pub from_id: i64,
    /// Receiving identity (the merchant for deposits).
    pub to_id: i64,
    /// Amount in thousandths; the ledger sometimes reports it as a string.
    #[serde(deserialize_with = "amount_field")]
    pub amount: i64,
    /// Classification tag, see [`tx_kind`].
    #[serde(rename = "type")]
    pub kind: i64,
    /// Deployment payload tag.
    #[serde(default)]
    pub payload: i64,
    /// Caller-supplied external id, unused here.
    #[serde(default)]
    pub external_id: i64,
    /// Unix timestamp of creation.
    #[serde(default)]
    pub created_at: i64,
}

fn amount_field<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// The seam between the reconciliation loop / handlers and the ledger HTTP
/// client. Tests substitute a scripted implementation.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Lists recent transactions in one direction.
    async fn transactions(&self, direction: Direction) -> Result<Vec<Transaction>, LedgerError>;

    /// Sends `amount` thousandths to a user.
    async fn transfer(&self, to_id: i64, amount: i64) -> Result<(), LedgerError>;
}

/// HTTP implementation of [`Ledger`].
pub struct CoinApi {
    client: reqwest::Client,
    merchant_id: i64,
    key: String,
}

impl CoinApi {
    pub fn new(merchant_id: i64, key: impl Into<String>) -> Result<Self, LedgerError> {
        let client = reqwest::ClientBuilder::new()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            merchant_id,
            key: key.into(),
        })
    }

    async fn post(&self, method: &str, mut body: Value) -> Result<Value, LedgerError> {
        let fields = body
            .as_object_mut()
            .ok_or_else(|| LedgerError::Malformed("request body must be an object".to_string()))?;
        fields.insert("merchantId".to_string(), json!(self.merchant_id));
        fields.insert("key".to_string(), json!(self.key));

        debug!(method = %method, "Calling merchant API");

        let response: Value = self
            .client
            .post(format!("{MERCHANT_URL}{method}/"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            return Err(LedgerError::Rejected(message.to_string()));
        }
        response
            .get("response")
            .cloned()
            .ok_or_else(|| LedgerError::Malformed("missing 'response' field".to_string()))
    }
}

#[async_trait]
impl Ledger for CoinApi {
    async fn transactions(&self, direction: Direction) -> Result<Vec<Transaction>, LedgerError> {
        let response = self.post("tx", json!({"tx": [direction.code()]})).await?;
        serde_json::from_value(response).map_err(|e| LedgerError::Malformed(e.to_string()))
    }

    async fn transfer(&self, to_id: i64, amount: i64) -> Result<(), LedgerError> {
        self.post("send", json!({"toId": to_id, "amount": amount}))
            .await?;
        info!(to_id, amount, "Transfer sent");
        Ok(())
    }
}

/// Builds the deposit link: merchant id, amount and payload tag as
/// hex-joined path segments. A trailing `_1` lets the payer edit the amount.
pub fn deposit_url(merchant_id: i64, amount: i64, payload: i64, fixed: bool) -> String {
    let suffix = if fixed { "" } else { "_1" };
    format!("vk.com/coin#m{merchant_id:x}_{amount:x}_{payload:x}{suffix}")
}

// ============================================================================
// Outgoing transfer queue
// ============================================================================

/// Queued outgoing transfer: `(to_id, amount)`.
type Transfer = (i64, i64);

/// Handle used by handlers to queue withdrawals.
#[derive(Clone)]
pub struct TransferQueue {
    tx: mpsc::UnboundedSender<Transfer>,
}

impl TransferQueue {
    /// Creates the queue and hands back the drain side.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Transfer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues one transfer. Never blocks.
    pub fn push(&self, to_id: i64, amount: i64) {
        // The receiver lives as long as the process; a send can only fail
        // during shutdown, when losing the transfer is moot.
        if self.tx.send((to_id, amount)).is_err() {
            warn!(to_id, amount, "Transfer queue is closed, dropping transfer");
        }
    }
}

/// Drains queued withdrawals, one ledger call at a time.
pub async fn transfer_loop(ledger: Arc<dyn Ledger>, mut rx: mpsc::UnboundedReceiver<Transfer>) {
    while let Some((to_id, amount)) = rx.recv().await {
        if let Err(error) = ledger.transfer(to_id, amount).await {
            warn!(%error, to_id, amount, "Outgoing transfer failed");
        }
    }
}
