// 🏷️ Certificate Numbers - Pattern placeholders filled from a running counter
//
// Pattern language (replace-all, unknown tokens are left as literal text):
//   {NO}          running number, zero padded to width 3 (never truncated)
//   {TINGKAT}     rank, upper-cased
//   {ROMAN_MONTH} month of issue as I..XII
//   {YEAR}        4-digit year of issue
//   {INDUK}       parent series number, filled by the caller (see apply_series)

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const NO_PLACEHOLDER: &str = "{NO}";
pub const RANK_PLACEHOLDER: &str = "{TINGKAT}";
pub const ROMAN_MONTH_PLACEHOLDER: &str = "{ROMAN_MONTH}";
pub const YEAR_PLACEHOLDER: &str = "{YEAR}";
pub const SERIES_PLACEHOLDER: &str = "{INDUK}";

pub const DEFAULT_PATTERN: &str = "{NO}/{INDUK}/{TINGKAT}/{ROMAN_MONTH}/{YEAR}";

const ROMAN_MONTHS: [&str; 12] = [
    "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedNumber {
    pub formatted: String,
    pub next_counter: u64,
}

/// Roman numeral for a calendar month (1..=12).
pub fn to_roman_month(month: u32) -> Option<&'static str> {
    ROMAN_MONTHS.get(month.checked_sub(1)? as usize).copied()
}

/// Substitute the parent series number. Not advanced by `generate`.
pub fn apply_series(pattern: &str, series: &str) -> String {
    pattern.replace(SERIES_PLACEHOLDER, series)
}

/// Generate the next certificate number using today's UTC date.
pub fn generate(pattern: &str, last_counter: u64, rank: &str) -> GeneratedNumber {
    generate_at(pattern, last_counter, rank, Utc::now().date_naive())
}

/// Generate the next certificate number for an explicit date of issue.
pub fn generate_at(pattern: &str, last_counter: u64, rank: &str, date: NaiveDate) -> GeneratedNumber {
    let pattern = if pattern.trim().is_empty() {
        DEFAULT_PATTERN
    } else {
        pattern
    };

    let next_counter = last_counter.saturating_add(1);
    let roman = to_roman_month(date.month()).unwrap_or_default();

    let formatted = pattern
        .replace(NO_PLACEHOLDER, &format!("{:03}", next_counter))
        .replace(RANK_PLACEHOLDER, &rank.to_uppercase())
        .replace(ROMAN_MONTH_PLACEHOLDER, roman)
        .replace(YEAR_PLACEHOLDER, &format!("{:04}", date.year()));

    GeneratedNumber {
        formatted,
        next_counter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feb_8_2026() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 8).unwrap()
    }

    #[test]
    fn test_concrete_scenario() {
        let number = generate_at(
            "{NO}/LB-BIAU/{TINGKAT}/{ROMAN_MONTH}/{YEAR}",
            4,
            "RAMU",
            feb_8_2026(),
        );

        assert_eq!(number.formatted, "005/LB-BIAU/RAMU/II/2026");
        assert_eq!(number.next_counter, 5);
    }

    #[test]
    fn test_padding_grows_but_never_truncates() {
        let date = feb_8_2026();
        assert_eq!(generate_at("{NO}", 0, "RAMU", date).formatted, "001");
        assert_eq!(generate_at("{NO}", 99, "RAMU", date).formatted, "100");
        assert_eq!(generate_at("{NO}", 999, "RAMU", date).formatted, "1000");
    }

    #[test]
    fn test_same_inputs_same_output() {
        let a = generate_at("{NO}-{TINGKAT}-{ROMAN_MONTH}-{YEAR}", 41, "rakit", feb_8_2026());
        let b = generate_at("{NO}-{TINGKAT}-{ROMAN_MONTH}-{YEAR}", 41, "rakit", feb_8_2026());
        assert_eq!(a, b);
        assert_eq!(a.formatted, "042-RAKIT-II-2026");
    }

    #[test]
    fn test_generate_uses_current_date() {
        let number = generate("{NO}-{TINGKAT}", 41, "rakit");
        assert_eq!(number.formatted, "042-RAKIT");
        assert_eq!(number.next_counter, 42);
    }

    #[test]
    fn test_replaces_every_occurrence() {
        let number = generate_at("{NO}:{NO} {TINGKAT}/{TINGKAT}", 6, "terap", feb_8_2026());
        assert_eq!(number.formatted, "007:007 TERAP/TERAP");
    }

    #[test]
    fn test_malformed_tokens_left_alone() {
        let number = generate_at("{N0}/{no}/{TINGKAT/{YEAR}", 0, "RAMU", feb_8_2026());
        assert_eq!(number.formatted, "{N0}/{no}/{TINGKAT/2026");
    }

    #[test]
    fn test_empty_pattern_uses_default() {
        let number = generate_at("  ", 9, "RAKIT", feb_8_2026());
        assert_eq!(number.formatted, "010/{INDUK}/RAKIT/II/2026");
    }

    #[test]
    fn test_series_is_left_to_the_caller() {
        let pattern = apply_series(DEFAULT_PATTERN, "12.045");
        let number = generate_at(&pattern, 0, "RAMU", feb_8_2026());
        assert_eq!(number.formatted, "001/12.045/RAMU/II/2026");
    }

    #[test]
    fn test_roman_months() {
        assert_eq!(to_roman_month(1), Some("I"));
        assert_eq!(to_roman_month(4), Some("IV"));
        assert_eq!(to_roman_month(9), Some("IX"));
        assert_eq!(to_roman_month(12), Some("XII"));
        assert_eq!(to_roman_month(0), None);
        assert_eq!(to_roman_month(13), None);
    }
}
