//! Leaderboard rendering for the `Top` state.

use crate::error::StoreError;
use crate::messages::format_coins;
use crate::store::{Board, Database};

const PLACES: usize = 10;

/// Renders the leaderboards as one plain-text reply.
pub fn render(db: &Database) -> Result<String, StoreError> {
    let boards: [(&str, Board, bool); 3] = [
        ("По балансу", Board::Score, true),
        ("По победам", Board::Wins, false),
        ("По профиту", Board::Profit, true),
    ];

    let mut out = String::from("🏆 Топ игроков");
    for (title, board, in_coins) in boards {
        let rows = db.top_by(board, PLACES)?;
        if rows.is_empty() {
            continue;
        }
        out.push_str(&format!("\n\n{title}:"));
        for (place, (user_id, value)) in rows.iter().enumerate() {
            let rendered = if in_coins {
                format_coins(*value)
            } else {
                value.to_string()
            };
            out.push_str(&format!("\n{}. @id{user_id} — {rendered}", place + 1));
        }
    }
    out.push_str("\n\nНазад — вернуться в меню");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StatColumn;

    #[test]
    fn renders_places_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("top.sqlite").to_str().unwrap()).unwrap();
        for (user, score) in [(1, 5_000), (2, 20_000), (3, 1_000)] {
            db.ensure_user(user).unwrap();
            db.adjust_score(user, score).unwrap();
        }
        db.bump_stat(2, StatColumn::Win, 3).unwrap();

        let text = render(&db).unwrap();
        let second = text.find("@id2").unwrap();
        let first = text.find("@id1").unwrap();
        let third = text.find("@id3").unwrap();
        assert!(second < first && first < third);
        assert!(text.contains("20"));
        assert!(text.contains("По победам"));
    }
}
