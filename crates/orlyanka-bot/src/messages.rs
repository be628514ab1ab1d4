//! User-visible reply texts.
//!
//! Balances travel through the system in thousandths of a coin; every
//! formatter here renders them back to coins.

/// Greeting and command overview.
pub const COMMANDS: &str = "✌️ Привет! Со мной можно сыграть в Орлянку!\n\n\
Кнопки ниже — всё, что нужно: сделайте ставку, пополните баланс или выведите выигрыш.";

/// Prompt for a stake amount.
pub const BET_PROMPT: &str = "Пожалуйста, сделайте Вашу ставку:";

/// Prompt for the heads-or-tails choice.
pub const CHOICE_PROMPT: &str = "Орёл или Решка?";

/// Prompt for a withdrawal amount.
pub const WITHDRAW_PROMPT: &str = "Отправьте сумму, которую хотите вывести";

/// Generic insufficient-funds reply.
pub const INSUFFICIENT: &str = "😢 На Вашем балансе недостаточно средств.\n\n\
Пополнить его можно кнопкой \"Пополнить\"";

/// Unparseable amount reply.
pub const BAD_AMOUNT: &str = "Не удалось разобрать сумму, отправьте число";

/// Suggestion shown to non-members.
pub const NOT_GROUP_MEMBER: &str = "Не желаете ли подписаться на нашу группу?";

/// Renders a thousandths amount as coins, trimming trailing zeros.
pub fn format_coins(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.abs();
    let whole = abs / 1000;
    let frac = abs % 1000;
    if frac == 0 {
        format!("{sign}{whole}")
    } else {
        let frac = format!("{frac:03}");
        format!("{sign}{whole}.{}", frac.trim_end_matches('0'))
    }
}

/// Balance reply.
pub fn score(balance: i64) -> String {
    format!("💰 Ваш баланс: {}", format_coins(balance))
}

/// Deposit link reply.
pub fn deposit(url: &str) -> String {
    format!("Пополнить счёт можно по ссылке: {url}")
}

/// Stake-too-small reply.
pub fn under_min_bet(min_bet: i64) -> String {
    format!(
        "Минимальная ставка — {} коинов. Введите Вашу ставку:",
        format_coins(min_bet)
    )
}

/// Stake-too-large reply.
pub fn over_max_bet(max_bet: i64) -> String {
    format!(
        "Ставка слишком высока, максимальная ставка — {} коинов. Введите Вашу ставку:",
        format_coins(max_bet)
    )
}

/// Not-enough-for-this-stake reply.
pub fn short_of(missing: i64) -> String {
    format!(
        "😢 На Вашем балансе не хватает {} монет для этой ставки!\n\n\
Пополнить его можно кнопкой \"Пополнить\"",
        format_coins(missing)
    )
}

/// Stake accepted reply.
pub fn bet_made(prize: i64) -> String {
    format!(
        "Ставка сделана! Сделайте выбор и сорвите куш в размере {} коинов!",
        format_coins(prize)
    )
}

/// Win reply.
pub fn win(prize: i64) -> String {
    format!("🙂 Поздравляю! Вы выиграли {}!", format_coins(prize))
}

/// Loss reply.
pub const LOSE: &str = "😢 Увы, вы проиграли :(";

/// Withdrawal queued reply.
pub fn sent(amount: i64) -> String {
    format!("✅ {} монет отправлено на Ваш счёт!", format_coins(amount))
}

/// Deposit credited reply.
pub fn credited(amount: i64) -> String {
    format!(
        "✅ {} монет успешно зачислены на Ваш баланс!",
        format_coins(amount)
    )
}
