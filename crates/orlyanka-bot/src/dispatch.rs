//! The handler chain and the dispatch engine.
//!
//! Message handlers are walked in registration order. A handler runs when
//! its state gate admits the session's current state and its pattern passes;
//! unless it is a fall-through handler the walk stops after it. Membership
//! handlers are a separate kind: no gating, all of them always run.
//!
//! Handler errors are caught and logged right here at the dispatch
//! boundary; one bad update must never take the loop down for everyone.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::{debug, error, warn};

use orlyanka_vk::{Message, Update, UpdateFeed};

use crate::context::BotContext;
use crate::error::BotResult;
use crate::session::Session;
use crate::state::{State, StateGate};

/// Back-off after a failed feed poll.
const FEED_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-invocation data handed to a handler. Valid for one invocation only;
/// nothing here is ever stored on the long-lived session.
pub struct Turn {
    /// The sender.
    pub user_id: i64,
    /// The inbound message text.
    pub text: String,
    /// Non-overlapping regex matches for regex patterns; empty for literals.
    pub captures: Vec<String>,
}

/// Text gate on a message handler.
pub enum Pattern {
    /// The whole text equals the literal.
    Exact(String),
    /// The text contains the literal. The empty literal matches everything.
    Contains(String),
    /// The text has at least one match of the regex.
    Matches(Regex),
}

impl Pattern {
    pub fn exact(literal: impl Into<String>) -> Self {
        Pattern::Exact(literal.into())
    }

    pub fn contains(literal: impl Into<String>) -> Self {
        Pattern::Contains(literal.into())
    }

    pub fn regex(re: Regex) -> Self {
        Pattern::Matches(re)
    }

    /// `Some(matches)` when the text passes this pattern.
    fn check(&self, text: &str) -> Option<Vec<String>> {
        match self {
            Pattern::Exact(literal) => (text == literal.as_str()).then(Vec::new),
            Pattern::Contains(literal) => text.contains(literal.as_str()).then(Vec::new),
            Pattern::Matches(re) => {
                let captures: Vec<String> =
                    re.find_iter(text).map(|m| m.as_str().to_string()).collect();
                if captures.is_empty() { None } else { Some(captures) }
            }
        }
    }
}

/// Boxed message handler body.
///
/// The session is handed in locked for the whole invocation; the handler
/// mutates it freely and the borrow ends when the future resolves.
pub type Action = Arc<
    dyn for<'a> Fn(Arc<BotContext>, &'a mut Session, &'a Turn) -> BoxFuture<'a, BotResult<()>>
        + Send
        + Sync,
>;

/// One registered message handler.
pub struct Handler {
    name: &'static str,
    pattern: Pattern,
    gate: StateGate,
    resets_state: bool,
    is_final: bool,
    action: Action,
}

impl Handler {
    /// Creates a handler gated on any state, final, not resetting.
    pub fn new<A>(name: &'static str, pattern: Pattern, action: A) -> Self
    where
        A: for<'a> Fn(Arc<BotContext>, &'a mut Session, &'a Turn) -> BoxFuture<'a, BotResult<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            pattern,
            gate: StateGate::Any,
            resets_state: false,
            is_final: true,
            action: Arc::new(action),
        }
    }

    /// Restricts the handler to the given states.
    pub fn states(mut self, states: &'static [State]) -> Self {
        self.gate = StateGate::Of(states);
        self
    }

    /// Resets the session to [`State::Menu`] after the handler runs.
    pub fn resets(mut self) -> Self {
        self.resets_state = true;
        self
    }

    /// Lets later handlers see the update too.
    pub fn passthrough(mut self) -> Self {
        self.is_final = false;
        self
    }
}

/// A group membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Joined,
    Left,
}

/// Boxed membership handler body.
pub type MembershipAction =
    Arc<dyn Fn(Arc<BotContext>, i64, MembershipChange) -> BoxFuture<'static, BotResult<()>> + Send + Sync>;

/// One registered membership handler. No pattern, no state gate, never
/// blocks the rest of the chain.
pub struct MembershipHandler {
    name: &'static str,
    action: MembershipAction,
}

impl MembershipHandler {
    pub fn new<A>(name: &'static str, action: A) -> Self
    where
        A: Fn(Arc<BotContext>, i64, MembershipChange) -> BoxFuture<'static, BotResult<()>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name,
            action: Arc::new(action),
        }
    }
}

/// Walks inbound updates through the registered handler chain.
pub struct Dispatcher {
    ctx: Arc<BotContext>,
    handlers: Vec<Handler>,
    membership: Vec<MembershipHandler>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self {
            ctx,
            handlers: Vec::new(),
            membership: Vec::new(),
        }
    }

    /// Appends a message handler. Registration order is match order.
    pub fn register(&mut self, handler: Handler) {
        self.handlers.push(handler);
    }

    /// Appends a membership handler.
    pub fn register_membership(&mut self, handler: MembershipHandler) {
        self.membership.push(handler);
    }

    /// Consumes the feed forever. Feed errors are transient: log, back off,
    /// poll again. The next poll re-fetches the same window.
    pub async fn run(&self, feed: Arc<dyn UpdateFeed>) {
        loop {
            let updates = match feed.wait().await {
                Ok(updates) => updates,
                Err(error) => {
                    warn!(%error, "Update feed failed, retrying");
                    tokio::time::sleep(FEED_RETRY_DELAY).await;
                    continue;
                }
            };
            for update in updates {
                self.dispatch(update).await;
            }
        }
    }

    /// Routes one update.
    pub async fn dispatch(&self, update: Update) {
        match update {
            Update::MessageNew(message) => self.dispatch_message(message).await,
            Update::GroupJoin(change) => {
                self.dispatch_membership(change.user_id, MembershipChange::Joined)
                    .await;
            }
            Update::GroupLeave(change) => {
                self.dispatch_membership(change.user_id, MembershipChange::Left)
                    .await;
            }
            Update::Unknown => {}
        }
    }

    async fn dispatch_membership(&self, user_id: i64, change: MembershipChange) {
        for handler in &self.membership {
            if let Err(error) = (handler.action)(self.ctx.clone(), user_id, change).await {
                error!(%error, user_id, handler = handler.name, "Membership handler failed");
            }
        }
    }

    async fn dispatch_message(&self, message: Message) {
        let handle = match self.ctx.sessions.get_or_create(message.from_id) {
            Ok(handle) => handle,
            Err(error) => {
                error!(%error, user_id = message.from_id, "Session lookup failed");
                return;
            }
        };
        // Held for the whole walk: a user's rapid double-send is processed
        // strictly one message at a time.
        let mut session = handle.lock().await;

        for handler in &self.handlers {
            if !handler.gate.admits(session.state()) {
                continue;
            }
            let Some(captures) = handler.pattern.check(&message.text) else {
                continue;
            };
            let turn = Turn {
                user_id: message.from_id,
                text: message.text.clone(),
                captures,
            };

            debug!(user_id = turn.user_id, handler = handler.name, "Handler matched");
            if let Err(error) = (handler.action)(self.ctx.clone(), &mut session, &turn).await {
                error!(%error, user_id = turn.user_id, handler = handler.name, "Handler failed");
            }
            if handler.resets_state {
                if let Err(error) = session.set_state(State::Menu) {
                    error!(%error, user_id = turn.user_id, "State reset failed");
                }
            }
            if handler.is_final {
                break;
            }
        }
    }
}
