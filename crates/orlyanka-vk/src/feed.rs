//! The update feed contract and its Bots Long Poll implementation.
//!
//! The dispatch engine only depends on [`UpdateFeed::wait`]; the wire
//! details below are the minimum needed to satisfy it. Every failure mode
//! is treated as transient: log, drop the cached server credentials so the
//! next call re-acquires them, and hand back an empty batch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::ApiTransport;
use crate::error::{ApiError, ApiResult};
use crate::update::Update;

/// Blocking source of inbound updates.
#[async_trait]
pub trait UpdateFeed: Send + Sync {
    /// Blocks until the platform reports new events, then returns the batch.
    ///
    /// An empty batch is a valid outcome: the poll window elapsed without
    /// events, or the feed recovered from a transient failure.
    async fn wait(&self) -> ApiResult<Vec<Update>>;
}

/// Credentials handed out by `groups.getLongPollServer`.
struct ServerState {
    server: String,
    key: String,
    ts: String,
}

impl ServerState {
    fn from_response(response: &Value) -> ApiResult<Self> {
        let field = |name: &str| {
            response
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ApiError::Malformed {
                    method: "groups.getLongPollServer".to_string(),
                    reason: format!("missing '{name}'"),
                })
        };
        Ok(Self {
            server: field("server")?,
            key: field("key")?,
            ts: field("ts")?,
        })
    }
}

/// Bots Long Poll implementation of [`UpdateFeed`].
pub struct LongPollFeed {
    api: Arc<dyn ApiTransport>,
    client: Client,
    group_id: i64,
    wait_secs: u64,
    state: Mutex<Option<ServerState>>,
}

impl LongPollFeed {
    /// Creates a feed for the given group.
    ///
    /// `api` is used to (re-)acquire the long-poll server; the poll requests
    /// themselves go to the handed-out server URL directly.
    pub fn new(api: Arc<dyn ApiTransport>, group_id: i64) -> ApiResult<Self> {
        let wait_secs = 25;
        // The poll holds the connection open for `wait_secs`; give the
        // client room on top of that.
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(wait_secs + 15))
            .build()?;
        Ok(Self {
            api,
            client,
            group_id,
            wait_secs,
            state: Mutex::new(None),
        })
    }

    async fn acquire_server(&self) -> ApiResult<ServerState> {
        let response = self
            .api
            .call("groups.getLongPollServer", json!({"group_id": self.group_id}))
            .await?;
        debug!(group_id = self.group_id, "Acquired long-poll server");
        ServerState::from_response(&response)
    }
}

#[async_trait]
impl UpdateFeed for LongPollFeed {
    async fn wait(&self) -> ApiResult<Vec<Update>> {
        let mut state = self.state.lock().await;
        if state.is_none() {
            *state = Some(self.acquire_server().await?);
        }
        // Just ensured above.
        let Some(server) = state.as_mut() else {
            return Ok(Vec::new());
        };

        let wait = self.wait_secs.to_string();
        let result = self
            .client
            .get(server.server.as_str())
            .query(&[
                ("act", "a_check"),
                ("key", server.key.as_str()),
                ("ts", server.ts.as_str()),
                ("wait", wait.as_str()),
            ])
            .send()
            .await;

        let body: Value = match result {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(error) => {
                    warn!(%error, "Long poll returned a non-JSON body, re-acquiring server");
                    *state = None;
                    return Ok(Vec::new());
                }
            },
            Err(error) => {
                warn!(%error, "Long poll request failed, re-acquiring server");
                *state = None;
                return Ok(Vec::new());
            }
        };

        if let Some(failed) = body.get("failed").and_then(Value::as_i64) {
            // Code 1 means the ts is stale but the credentials still hold;
            // anything else requires fresh credentials.
            if failed == 1 {
                if let Some(ts) = body.get("ts") {
                    server.ts = render_ts(ts);
                }
            } else {
                warn!(failed, "Long poll session expired, re-acquiring server");
                *state = None;
            }
            return Ok(Vec::new());
        }

        if let Some(ts) = body.get("ts") {
            server.ts = render_ts(ts);
        }

        let updates = body
            .get("updates")
            .and_then(Value::as_array)
            .map(|items| items.iter().cloned().map(Update::from_value).collect())
            .unwrap_or_default();

        Ok(updates)
    }
}

/// The server reports `ts` as either a string or a number depending on the
/// endpoint version.
fn render_ts(ts: &Value) -> String {
    match ts {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_state_requires_all_fields() {
        let ok = json!({"server": "https://lp.vk.com/wh1", "key": "k", "ts": "10"});
        let state = ServerState::from_response(&ok).unwrap();
        assert_eq!(state.server, "https://lp.vk.com/wh1");
        assert_eq!(state.ts, "10");

        let missing = json!({"server": "https://lp.vk.com/wh1", "ts": "10"});
        assert!(ServerState::from_response(&missing).is_err());
    }

    #[test]
    fn ts_renders_both_shapes() {
        assert_eq!(render_ts(&json!("42")), "42");
        assert_eq!(render_ts(&json!(42)), "42");
    }
}
