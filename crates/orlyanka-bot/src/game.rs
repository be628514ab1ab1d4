//! Stake parsing and the coin flip itself.

use rand::Rng;

/// Pattern for a stake/withdrawal amount inside a message.
///
/// Accepts `12`, `12.5`, `,5`; comma and dot both work as the decimal
/// separator.
pub const AMOUNT_PATTERN: &str = r"\d*[.,]?\d+";

/// Parses a matched amount token into thousandths of a coin.
///
/// `None` for tokens that do not parse or round to zero or below.
pub fn parse_amount(token: &str) -> Option<i64> {
    let normalized = token.replace(',', ".");
    let coins: f64 = normalized.parse().ok()?;
    let thousandths = (coins * 1000.0).round();
    if !thousandths.is_finite() || thousandths < 1.0 || thousandths > i64::MAX as f64 {
        return None;
    }
    Some(thousandths as i64)
}

/// Rolls the coin: `true` wins with `chance_percent` probability.
pub fn win_roll(chance_percent: u32) -> bool {
    rand::thread_rng().gen_range(0..100) < chance_percent
}

/// Payout for a winning stake.
pub fn prize(bet: i64) -> i64 {
    bet * 2
}
