//! Batching of outbound calls into `execute` requests.
//!
//! VK limits how many discrete API calls a group token may make per second,
//! but a single `execute` call may carry up to [`MAX_BATCH`] sub-calls as a
//! VKScript snippet. Handlers therefore never call the API directly for
//! notifications. They enqueue an [`ApiCall`] and the pool flushes the
//! queue on a fixed cadence.
//!
//! Delivery is at-most-once: a failed batch is logged and dropped, never
//! retried. Enqueue order is preserved within and across batches.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::api::ApiTransport;

/// Hard VK limit on sub-calls per `execute` request.
pub const MAX_BATCH: usize = 25;

/// Default flush cadence, chosen to stay under the per-second limit on
/// `execute` submissions.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(550);

// ============================================================================
// ApiCall — one serialized sub-call
// ============================================================================

/// Builder for a single VKScript sub-call, `API.{method}({args})`.
#[derive(Debug, Clone)]
pub struct ApiCall {
    method: String,
    args: Map<String, Value>,
}

impl ApiCall {
    /// Starts a call to the given dotted method name.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Map::new(),
        }
    }

    /// Adds one named argument.
    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// The dominant call in this bot: a plain-text reply to a user.
    pub fn message(user_id: i64, text: impl Into<String>) -> Self {
        Self::new("messages.send")
            .arg("user_id", user_id)
            .arg("random_id", i64::from(rand::random::<i32>()))
            .arg("message", text.into())
    }

    /// Compiles into the VKScript source fragment.
    fn compile(&self) -> String {
        format!("API.{}({})", self.method, Value::Object(self.args.clone()))
    }
}

// ============================================================================
// ExecutePool — the shared FIFO queue and its flush loop
// ============================================================================

/// FIFO pool of pending sub-calls, drained on a fixed cadence.
pub struct ExecutePool {
    api: Arc<dyn ApiTransport>,
    queue: Mutex<VecDeque<String>>,
    flush_interval: Duration,
}

impl ExecutePool {
    /// Creates a pool flushing at [`DEFAULT_FLUSH_INTERVAL`].
    pub fn new(api: Arc<dyn ApiTransport>) -> Self {
        Self::with_interval(api, DEFAULT_FLUSH_INTERVAL)
    }

    /// Creates a pool with a custom flush cadence.
    pub fn with_interval(api: Arc<dyn ApiTransport>, flush_interval: Duration) -> Self {
        Self {
            api,
            queue: Mutex::new(VecDeque::new()),
            flush_interval,
        }
    }

    /// Appends a call to the queue. O(1), never blocks on I/O.
    pub fn enqueue(&self, call: ApiCall) {
        self.queue.lock().push_back(call.compile());
    }

    /// Number of calls currently waiting.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Removes up to [`MAX_BATCH`] entries and wraps them into one VKScript
    /// body. `None` when the queue is empty.
    fn drain_batch(&self) -> Option<String> {
        let mut queue = self.queue.lock();
        if queue.is_empty() {
            return None;
        }
        let take = queue.len().min(MAX_BATCH);
        let batch: Vec<String> = queue.drain(..take).collect();
        Some(format!("return [{}];", batch.join(",")))
    }

    /// Drains one batch and submits it, if anything is pending.
    ///
    /// Submission failures lose the batch: the calls carried here are
    /// user-facing notifications with an at-most-once contract.
    pub async fn flush(&self) {
        let Some(code) = self.drain_batch() else {
            return;
        };
        debug!(len = code.len(), "Submitting execute batch");
        if let Err(error) = self
            .api
            .call("execute", Value::Object(one_field("code", code)))
            .await
        {
            warn!(%error, "Execute batch failed, dropping it");
        }
    }

    /// Runs the flush loop forever.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        loop {
            ticker.tick().await;
            self.flush().await;
        }
    }
}

fn one_field(key: &str, value: String) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(key.to_string(), Value::String(value));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiResult;
    use async_trait::async_trait;
    use serde_json::json;

    /// Records every submitted batch body.
    struct RecordingTransport {
        batches: Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: Mutex::new(Vec::new()),
            })
        }

        fn batches(&self) -> Vec<String> {
            self.batches.lock().clone()
        }
    }

    #[async_trait]
    impl ApiTransport for RecordingTransport {
        async fn call(&self, method: &str, params: Value) -> ApiResult<Value> {
            assert_eq!(method, "execute");
            let code = params["code"].as_str().unwrap().to_string();
            self.batches.lock().push(code);
            Ok(json!([]))
        }
    }

    fn numbered_call(n: usize) -> ApiCall {
        ApiCall::new("messages.send").arg("user_id", n as i64)
    }

    #[test]
    fn compile_produces_vkscript_fragment() {
        let call = ApiCall::new("messages.send")
            .arg("user_id", 42)
            .arg("message", "привет");
        // serde_json renders object keys in sorted order.
        assert_eq!(
            call.compile(),
            r#"API.messages.send({"message":"привет","user_id":42})"#
        );
    }

    #[tokio::test]
    async fn flush_wraps_batch_in_return_statement() {
        let transport = RecordingTransport::new();
        let pool = ExecutePool::new(transport.clone() as Arc<dyn ApiTransport>);

        pool.enqueue(numbered_call(1));
        pool.enqueue(numbered_call(2));
        pool.flush().await;

        let batches = transport.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            r#"return [API.messages.send({"user_id":1}),API.messages.send({"user_id":2})];"#
        );
    }

    #[tokio::test]
    async fn flush_drains_at_most_25_preserving_order() {
        let transport = RecordingTransport::new();
        let pool = ExecutePool::new(transport.clone() as Arc<dyn ApiTransport>);

        for n in 0..30 {
            pool.enqueue(numbered_call(n));
        }
        pool.flush().await;
        assert_eq!(pool.pending(), 5);
        pool.flush().await;
        assert_eq!(pool.pending(), 0);

        let batches = transport.batches();
        assert_eq!(batches.len(), 2);

        // FIFO within and across flushes: ids come out 0..30 in order.
        let combined = batches.join(",");
        let mut last_index = 0;
        for n in 0..30 {
            let needle = format!("{{\"user_id\":{n}}}");
            let at = combined[last_index..]
                .find(&needle)
                .unwrap_or_else(|| panic!("call {n} missing or out of order"));
            last_index += at + needle.len();
        }
        assert_eq!(batches[0].matches("user_id").count(), 25);
        assert_eq!(batches[1].matches("user_id").count(), 5);
    }

    #[tokio::test]
    async fn flush_on_empty_queue_submits_nothing() {
        let transport = RecordingTransport::new();
        let pool = ExecutePool::new(transport.clone() as Arc<dyn ApiTransport>);
        pool.flush().await;
        assert!(transport.batches().is_empty());
    }
}
