//! The business handler chain.
//!
//! [`register_all`] wires every handler in its match order; the order is
//! part of the behavior (first match wins, see `dispatch`). Anything a user
//! can get wrong (an unparseable amount, a stake they cannot afford)
//! becomes a reply, never an error.

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::info;

use crate::context::BotContext;
use crate::dispatch::{Dispatcher, Handler, MembershipChange, MembershipHandler, Pattern, Turn};
use crate::error::BotResult;
use crate::game;
use crate::ledger;
use crate::messages as msg;
use crate::session::Session;
use crate::state::State;
use crate::top;

/// Button labels, also the literal patterns of the chain.
pub mod buttons {
    pub const HELP: &str = "Помощь";
    pub const START: &str = "Начать";
    pub const BALANCE: &str = "Баланс";
    pub const DEPOSIT: &str = "Пополнить";
    pub const WITHDRAW: &str = "Вывести";
    pub const BET: &str = "Сделать ставку";
    pub const TOP: &str = "Топ";
    pub const BACK: &str = "Назад";
    pub const HEADS: &str = "Орёл";
    pub const TAILS: &str = "Решка";
}

/// Registers the whole chain on a dispatcher.
pub fn register_all(dispatcher: &mut Dispatcher) {
    dispatcher.register_membership(MembershipHandler::new("roster", roster));

    dispatcher.register(
        Handler::new("member-notice", Pattern::contains(""), member_notice).passthrough(),
    );
    dispatcher.register(Handler::new("help", Pattern::exact(buttons::HELP), help).resets());
    dispatcher.register(Handler::new("start", Pattern::exact(buttons::START), help).resets());
    dispatcher.register(Handler::new("balance", Pattern::exact(buttons::BALANCE), balance));
    dispatcher.register(Handler::new("deposit", Pattern::exact(buttons::DEPOSIT), deposit));
    dispatcher.register(
        Handler::new("withdraw-prompt", Pattern::exact(buttons::WITHDRAW), withdraw_prompt)
            .states(&[State::Menu]),
    );
    dispatcher.register(
        Handler::new("bet-prompt", Pattern::exact(buttons::BET), bet_prompt)
            .states(&[State::Menu]),
    );
    dispatcher.register(
        Handler::new("top", Pattern::exact(buttons::TOP), show_top).states(&[State::Menu]),
    );
    dispatcher.register(
        Handler::new("top-back", Pattern::exact(buttons::BACK), help)
            .states(&[State::Top])
            .resets(),
    );
    dispatcher.register(
        Handler::new("bet-amount", amount_pattern(), bet_amount).states(&[State::Bet]),
    );
    dispatcher.register(
        Handler::new("withdraw-amount", amount_pattern(), withdraw_amount)
            .states(&[State::Withdraw])
            .resets(),
    );
    dispatcher.register(
        Handler::new("game-choice", choice_pattern(), game_choice)
            .states(&[State::Game])
            .resets(),
    );
    dispatcher.register(Handler::new("fallback-help", Pattern::contains(""), help));
}

fn amount_pattern() -> Pattern {
    Pattern::regex(Regex::new(game::AMOUNT_PATTERN).expect("amount pattern"))
}

fn choice_pattern() -> Pattern {
    Pattern::regex(Regex::new(&format!("^({}|{})$", buttons::HEADS, buttons::TAILS))
        .expect("choice pattern"))
}

// ============================================================================
// Membership
// ============================================================================

fn roster(
    ctx: Arc<BotContext>,
    user_id: i64,
    change: MembershipChange,
) -> BoxFuture<'static, BotResult<()>> {
    Box::pin(async move {
        match change {
            MembershipChange::Joined => {
                info!(user_id, "Member joined");
                ctx.members.insert(user_id);
            }
            MembershipChange::Left => {
                info!(user_id, "Member left");
                ctx.members.remove(user_id);
            }
        }
        Ok(())
    })
}

/// Fall-through notice: runs on every message, nudges non-members.
fn member_notice<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    _turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        if !ctx.members.contains(session.user_id()) {
            ctx.reply(session.user_id(), msg::NOT_GROUP_MEMBER);
        }
        Ok(())
    })
}

// ============================================================================
// Menu replies
// ============================================================================

fn help<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    _turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        ctx.reply(session.user_id(), msg::COMMANDS);
        Ok(())
    })
}

fn balance<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    _turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        ctx.reply(session.user_id(), &msg::score(session.balance()));
        Ok(())
    })
}

fn deposit<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    _turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        let url = ledger::deposit_url(
            ctx.config.merchant_id,
            ctx.config.min_bet,
            ctx.config.payload,
            false,
        );
        ctx.reply(session.user_id(), &msg::deposit(&url));
        Ok(())
    })
}

fn show_top<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    _turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        let board = top::render(&ctx.db)?;
        session.set_state(State::Top)?;
        ctx.reply(session.user_id(), &board);
        Ok(())
    })
}

// ============================================================================
// Betting flow
// ============================================================================

fn bet_prompt<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    _turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        let min_bet = ctx.config.min_bet;
        if session.balance() < min_bet {
            ctx.reply(
                session.user_id(),
                &msg::short_of(min_bet - session.balance()),
            );
            return Ok(());
        }
        session.set_state(State::Bet)?;
        ctx.reply(session.user_id(), msg::BET_PROMPT);
        Ok(())
    })
}

fn bet_amount<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        let token = turn.captures.first().map(String::as_str).unwrap_or("");
        let Some(amount) = game::parse_amount(token) else {
            ctx.reply(session.user_id(), msg::BAD_AMOUNT);
            return Ok(());
        };
        if amount < ctx.config.min_bet {
            ctx.reply(session.user_id(), &msg::under_min_bet(ctx.config.min_bet));
            return Ok(());
        }
        if amount > ctx.config.max_bet {
            ctx.reply(session.user_id(), &msg::over_max_bet(ctx.config.max_bet));
            return Ok(());
        }
        if !session.try_debit(amount)? {
            ctx.reply(
                session.user_id(),
                &msg::short_of(amount - session.balance()),
            );
            return Ok(());
        }
        session.add_bet(amount)?;
        session.set_bet(amount)?;
        session.set_state(State::Game)?;
        info!(user_id = session.user_id(), amount, "Bet placed");
        ctx.reply(session.user_id(), &msg::bet_made(game::prize(amount)));
        Ok(())
    })
}

fn game_choice<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    _turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        let bet = session.bet();
        session.set_bet(0)?;
        if bet <= 0 {
            // No live stake, only reachable through a stale stored state.
            ctx.reply(session.user_id(), msg::COMMANDS);
            return Ok(());
        }
        if game::win_roll(ctx.config.win_chance) {
            let prize = game::prize(bet);
            session.credit(prize)?;
            session.add_prize(prize)?;
            session.add_win()?;
            info!(user_id = session.user_id(), bet, prize, "Round won");
            ctx.reply(session.user_id(), &msg::win(prize));
        } else {
            session.add_loss()?;
            info!(user_id = session.user_id(), bet, "Round lost");
            ctx.reply(session.user_id(), msg::LOSE);
        }
        Ok(())
    })
}

// ============================================================================
// Withdrawals
// ============================================================================

fn withdraw_prompt<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    _turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        if session.balance() <= 0 {
            ctx.reply(session.user_id(), msg::INSUFFICIENT);
            return Ok(());
        }
        session.set_state(State::Withdraw)?;
        ctx.reply(session.user_id(), msg::WITHDRAW_PROMPT);
        Ok(())
    })
}

fn withdraw_amount<'a>(
    ctx: Arc<BotContext>,
    session: &'a mut Session,
    turn: &'a Turn,
) -> BoxFuture<'a, BotResult<()>> {
    Box::pin(async move {
        let token = turn.captures.first().map(String::as_str).unwrap_or("");
        let Some(amount) = game::parse_amount(token) else {
            ctx.reply(session.user_id(), msg::BAD_AMOUNT);
            return Ok(());
        };
        if !session.try_debit(amount)? {
            ctx.reply(session.user_id(), msg::INSUFFICIENT);
            return Ok(());
        }
        session.add_withdrawal(amount)?;
        ctx.transfers.push(session.user_id(), amount);
        info!(user_id = session.user_id(), amount, "Withdrawal queued");
        ctx.reply(session.user_id(), &msg::sent(amount));
        Ok(())
    })
}
