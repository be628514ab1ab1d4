//! Per-user conversation states.

/// The mode a user's conversation is in. Controls which handlers are
/// eligible for their next message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Idle, showing the main menu.
    #[default]
    Menu,
    /// Waiting for a stake amount.
    Bet,
    /// Waiting for the heads-or-tails choice.
    Game,
    /// Waiting for a withdrawal amount.
    Withdraw,
    /// Browsing the leaderboard.
    Top,
}

impl State {
    /// Stable integer code used in the `user_scores.state` column.
    pub fn code(self) -> i64 {
        match self {
            State::Menu => 0,
            State::Bet => 1,
            State::Game => 2,
            State::Withdraw => 3,
            State::Top => 4,
        }
    }

    /// Decodes a stored code; unknown codes fall back to [`State::Menu`].
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => State::Bet,
            2 => State::Game,
            3 => State::Withdraw,
            4 => State::Top,
            _ => State::Menu,
        }
    }
}

/// A handler's state gate: the wildcard, or an explicit set.
///
/// The wildcard is only ever a gate; no session is ever *in* it.
#[derive(Debug, Clone)]
pub enum StateGate {
    /// Matches in any state.
    Any,
    /// Matches only the listed states.
    Of(&'static [State]),
}

impl StateGate {
    /// Whether a session in `state` passes this gate.
    pub fn admits(&self, state: State) -> bool {
        match self {
            StateGate::Any => true,
            StateGate::Of(states) => states.contains(&state),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for state in [State::Menu, State::Bet, State::Game, State::Withdraw, State::Top] {
            assert_eq!(State::from_code(state.code()), state);
        }
    }

    #[test]
    fn unknown_code_falls_back_to_menu() {
        assert_eq!(State::from_code(99), State::Menu);
        assert_eq!(State::from_code(-1), State::Menu);
    }

    #[test]
    fn gates() {
        assert!(StateGate::Any.admits(State::Game));
        let gate = StateGate::Of(&[State::Bet, State::Withdraw]);
        assert!(gate.admits(State::Bet));
        assert!(!gate.admits(State::Menu));
    }
}
