use teloxide::utils::markdown;

use crate::ledger::format_units;

/// Format a coin amount for Telegram (no ANSI colors).
pub fn format_coins_tg(units: u64) -> String {
    format!("{} coins", format_units(units))
}

/// Format a card code for Telegram with monospace, truncating long codes.
///
/// Codes are arbitrary user input: truncation counts characters, and the
/// code span is escaped so a backtick inside a code cannot break the
/// message markup.
pub fn format_card_tg(card_code: &str) -> String {
    let chars: Vec<char> = card_code.chars().collect();
    if chars.len() <= 16 {
        format!("`{}`", markdown::escape_code(card_code))
    } else {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 6..].iter().collect();
        format!(
            "`{}...{}`",
            markdown::escape_code(&head),
            markdown::escape_code(&tail)
        )
    }
}

/// Format a timestamp for Telegram.
pub fn format_time_tg(time: &chrono::DateTime<chrono::Utc>) -> String {
    time.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::UNIT_SCALE;

    #[test]
    fn test_format_coins_tg() {
        assert_eq!(format_coins_tg(UNIT_SCALE / 2), "0.50000000 coins");
    }

    #[test]
    fn test_format_card_tg_truncates_long_codes() {
        assert_eq!(format_card_tg("XK-12"), "`XK-12`");
        assert_eq!(
            format_card_tg("CARD-0123456789-ABCDEFGH"),
            "`CARD-012...CDEFGH`"
        );
    }

    #[test]
    fn test_format_card_tg_multibyte_codes() {
        assert_eq!(format_card_tg("ab🎉🎉🎉🎉🎉"), "`ab🎉🎉🎉🎉🎉`");
        assert_eq!(
            format_card_tg("🎴🎴🎴🎴🎴🎴🎴🎴-0123456789"),
            "`🎴🎴🎴🎴🎴🎴🎴🎴...456789`"
        );
    }

    #[test]
    fn test_format_card_tg_escapes_code_span() {
        assert_eq!(format_card_tg("a`b"), "`a\\`b`");
        assert_eq!(format_card_tg("a\\b"), "`a\\\\b`");
    }
}
