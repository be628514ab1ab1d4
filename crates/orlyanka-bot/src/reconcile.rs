//! Ledger reconciliation: polls the merchant feed and credits deposits.
//!
//! The feed is overlapping at-least-once: the same transactions show up in
//! poll after poll. The `transactions` primary key is the only thing that
//! makes crediting exactly-once; the id set loaded at the top of each cycle
//! is just a cheap pre-filter.
//!
//! Ordering policy: the id is persisted **before** the credit. A crash
//! between the two loses that one credit permanently; it can never be
//! applied twice.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::context::BotContext;
use crate::error::BotResult;
use crate::ledger::{Direction, Transaction, tx_kind};
use crate::messages;
use crate::store::TxRecord;

/// How many processed ids to preload per cycle.
const RECENT_IDS_LIMIT: usize = 1000;

/// Runs reconciliation forever. Cycle errors are transient: the next cycle
/// re-fetches the same window.
pub async fn run(ctx: Arc<BotContext>) {
    let interval = Duration::from_secs(ctx.config.reconcile_interval_secs);
    loop {
        if let Err(error) = cycle(&ctx).await {
            warn!(%error, "Reconciliation cycle failed");
        }
        tokio::time::sleep(interval).await;
    }
}

/// One reconciliation pass: fetch, filter, dedup, credit, notify.
pub async fn cycle(ctx: &Arc<BotContext>) -> BotResult<()> {
    let seen = ctx.db.recent_transaction_ids(RECENT_IDS_LIMIT)?;

    let mut transactions = ctx.ledger.transactions(Direction::ToMerchant).await?;
    transactions.extend(ctx.ledger.transactions(Direction::ToUser).await?);

    for transaction in transactions {
        // Our own outgoing transfers come back through the feed.
        if transaction.from_id == ctx.config.merchant_id {
            continue;
        }
        // Another deployment sharing the ledger.
        if transaction.payload != ctx.config.payload {
            continue;
        }
        if seen.contains(&transaction.id) {
            continue;
        }
        // Dedup-persist first. `false` means another pass already took it.
        if !ctx.db.insert_transaction(&record(&transaction))? {
            continue;
        }

        let user_id = beneficiary(&transaction, ctx.config.merchant_id);
        let handle = ctx.sessions.get_or_create(user_id)?;
        let mut session = handle.lock().await;
        session.credit(transaction.amount)?;
        session.add_deposit(transaction.amount)?;
        info!(
            tid = transaction.id,
            user_id,
            amount = transaction.amount,
            "Deposit credited"
        );
        ctx.reply(user_id, &messages::credited(transaction.amount));
    }
    Ok(())
}

/// The session a transaction credits.
///
/// Deposits are reported with the merchant as the destination; the session
/// that gets the coins is the paying user's. Plain user-to-user transfers
/// credit the receiving side.
fn beneficiary(transaction: &Transaction, merchant_id: i64) -> i64 {
    if transaction.kind == tx_kind::FROM_USER_TO_MERCHANT || transaction.to_id == merchant_id {
        transaction.from_id
    } else {
        transaction.to_id
    }
}

fn record(transaction: &Transaction) -> TxRecord {
    TxRecord {
        tid: transaction.id,
        from_id: transaction.from_id,
        to_id: transaction.to_id,
        amount: transaction.amount,
        created_at: transaction.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::tx_kind::{FROM_USER_TO_MERCHANT, FROM_USER_TO_USER};
    use crate::testutil::{test_context, tx};

    const MERCHANT: i64 = 777;
    const PAYLOAD: i64 = 555;

    async fn balance_of(ctx: &Arc<BotContext>, user_id: i64) -> i64 {
        let handle = ctx.sessions.get_or_create(user_id).unwrap();
        let balance = handle.lock().await.balance();
        balance
    }

    #[tokio::test]
    async fn repeated_polls_credit_a_transaction_exactly_once() {
        let bed = test_context();
        bed.ledger
            .to_merchant
            .lock()
            .push(tx(1, 10, MERCHANT, 4_000, FROM_USER_TO_MERCHANT, PAYLOAD));

        cycle(&bed.ctx).await.unwrap();
        cycle(&bed.ctx).await.unwrap();
        cycle(&bed.ctx).await.unwrap();

        assert_eq!(balance_of(&bed.ctx, 10).await, 4_000);
        let handle = bed.ctx.sessions.get_or_create(10).unwrap();
        assert_eq!(handle.lock().await.stats().total_deposited, 4_000);

        // Exactly one "credited" notification was queued.
        let replies = bed.sent_replies().await;
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("зачислены"));
    }

    #[tokio::test]
    async fn self_originated_transactions_are_ignored() {
        let bed = test_context();
        bed.ledger
            .to_user
            .lock()
            .push(tx(2, MERCHANT, 10, 9_000, FROM_USER_TO_USER, PAYLOAD));

        cycle(&bed.ctx).await.unwrap();

        assert_eq!(balance_of(&bed.ctx, 10).await, 0);
        assert!(bed.sent_replies().await.is_empty());
    }

    #[tokio::test]
    async fn foreign_payload_transactions_are_ignored() {
        let bed = test_context();
        bed.ledger
            .to_merchant
            .lock()
            .push(tx(3, 10, MERCHANT, 9_000, FROM_USER_TO_MERCHANT, PAYLOAD + 1));

        cycle(&bed.ctx).await.unwrap();

        assert_eq!(balance_of(&bed.ctx, 10).await, 0);
    }

    #[tokio::test]
    async fn user_to_user_transfers_credit_the_receiver() {
        let bed = test_context();
        bed.ledger
            .to_user
            .lock()
            .push(tx(4, 10, 20, 2_500, FROM_USER_TO_USER, PAYLOAD));

        cycle(&bed.ctx).await.unwrap();

        assert_eq!(balance_of(&bed.ctx, 20).await, 2_500);
        assert_eq!(balance_of(&bed.ctx, 10).await, 0);
    }

    #[tokio::test]
    async fn new_transactions_in_later_polls_still_land() {
        let bed = test_context();
        bed.ledger
            .to_merchant
            .lock()
            .push(tx(5, 10, MERCHANT, 1_000, FROM_USER_TO_MERCHANT, PAYLOAD));
        cycle(&bed.ctx).await.unwrap();

        bed.ledger
            .to_merchant
            .lock()
            .push(tx(6, 10, MERCHANT, 2_000, FROM_USER_TO_MERCHANT, PAYLOAD));
        cycle(&bed.ctx).await.unwrap();

        assert_eq!(balance_of(&bed.ctx, 10).await, 3_000);
    }

    #[test]
    fn beneficiary_resolution() {
        let deposit = tx(7, 10, MERCHANT, 1, FROM_USER_TO_MERCHANT, PAYLOAD);
        assert_eq!(beneficiary(&deposit, MERCHANT), 10);

        let transfer = tx(8, 10, 20, 1, FROM_USER_TO_USER, PAYLOAD);
        assert_eq!(beneficiary(&transfer, MERCHANT), 20);
    }
}
