//! Binary entry point: configuration, wiring, and the four loops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use orlyanka_vk::{ApiTransport, ExecutePool, LongPollFeed, VkApi};

use orlyanka_bot::context::{BotContext, Members};
use orlyanka_bot::ledger::{self, CoinApi, TransferQueue};
use orlyanka_bot::session::SessionStore;
use orlyanka_bot::store::Database;
use orlyanka_bot::{BotConfig, Dispatcher, handlers, reconcile};

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .init();
}

/// Seeds the member set from `groups.getMembers`. Advisory only: on failure
/// the set stays empty and fills up from join events.
async fn preload_members(api: &Arc<dyn ApiTransport>, group_id: i64, members: &Members) {
    match api
        .call("groups.getMembers", json!({"group_id": group_id}))
        .await
    {
        Ok(response) => {
            let ids: Vec<i64> = response
                .get("items")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_i64).collect())
                .unwrap_or_default();
            info!(count = ids.len(), "Preloaded group members");
            members.replace(ids);
        }
        Err(error) => warn!(%error, "Member preload failed, starting with an empty set"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::load().context("loading configuration")?;
    init_tracing(&config.log_level);

    let db = Database::open(&config.database_path).context("opening the database")?;
    let api: Arc<dyn ApiTransport> =
        Arc::new(VkApi::new(config.group_token.as_str()).context("building the VK client")?);
    let coin_api = Arc::new(
        CoinApi::new(config.merchant_id, config.merchant_key.as_str())
            .context("building the ledger client")?,
    );
    let (transfers, transfer_rx) = TransferQueue::new();

    let ctx = Arc::new(BotContext {
        pool: ExecutePool::with_interval(
            api.clone(),
            Duration::from_millis(config.flush_interval_ms),
        ),
        sessions: SessionStore::new(db.clone()),
        ledger: coin_api.clone(),
        members: Members::new(),
        api: api.clone(),
        transfers,
        db,
        config,
    });

    preload_members(&api, ctx.config.group_id, &ctx.members).await;

    let feed = Arc::new(
        LongPollFeed::new(api.clone(), ctx.config.group_id).context("building the update feed")?,
    );

    let mut dispatcher = Dispatcher::new(ctx.clone());
    handlers::register_all(&mut dispatcher);

    info!(group_id = ctx.config.group_id, "orlyanka is up");

    tokio::join!(
        dispatcher.run(feed),
        ctx.pool.run(),
        reconcile::run(ctx.clone()),
        ledger::transfer_loop(ctx.ledger.clone(), transfer_rx),
    );

    Ok(())
}
