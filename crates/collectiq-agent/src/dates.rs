//! Follow-up date inference from free-form caller phrases.

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};

/// A date inferred from what the caller said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateGuess {
    pub date: NaiveDate,
    /// Spoken form of what the caller asked for, e.g. "Friday" or "next week".
    pub label: String,
    /// False when nothing in the phrase named a date and the default was used.
    pub recognized: bool,
}

impl DateGuess {
    fn new(date: NaiveDate, label: impl Into<String>) -> Self {
        Self {
            date,
            label: label.into(),
            recognized: true,
        }
    }
}

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

fn tokens(phrase: &str) -> Vec<String> {
    phrase
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_seq(tokens: &[String], seq: &[&str]) -> bool {
    tokens
        .windows(seq.len())
        .any(|w| w.iter().zip(seq).all(|(a, b)| a == b))
}

fn count_word(token: &str) -> Option<u32> {
    if let Ok(n) = token.parse::<u32>() {
        return Some(n);
    }
    let n = match token {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "fourteen" => 14,
        "fifteen" => 15,
        "twenty" => 20,
        "thirty" => 30,
        _ => return None,
    };
    Some(n)
}

#[derive(Clone, Copy)]
enum Unit {
    Day,
    Week,
    Month,
    Year,
}

fn unit_word(token: &str) -> Option<Unit> {
    match token {
        "day" | "days" => Some(Unit::Day),
        "week" | "weeks" => Some(Unit::Week),
        "month" | "months" => Some(Unit::Month),
        "year" | "years" => Some(Unit::Year),
        _ => None,
    }
}

/// First `<count> <unit>` pair, e.g. "in 3 days", "two weeks", "a month".
fn counted_offset(tokens: &[String]) -> Option<(u32, Unit)> {
    tokens.windows(2).find_map(|w| {
        let count = count_word(&w[0])?;
        let unit = unit_word(&w[1])?;
        Some((count, unit))
    })
}

/// "a few days", "a couple of weeks": the unit named after "few" or
/// "couple", days when none is.
fn vague_offset(tokens: &[String]) -> Option<Unit> {
    let at = tokens.iter().position(|t| t == "few" || t == "couple")?;
    let unit = tokens[at + 1..]
        .iter()
        .take(2)
        .find_map(|t| unit_word(t))
        .unwrap_or(Unit::Day);
    Some(unit)
}

/// The next `weekday` strictly after `from`.
pub fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = from.weekday().num_days_from_monday();
    let target = weekday.num_days_from_monday();
    let ahead = (target + 7 - current) % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    plus_days(from, u64::from(ahead))
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let first = date.with_day(1).unwrap_or(date);
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

fn plus_days(date: NaiveDate, days: u64) -> NaiveDate {
    date.checked_add_days(Days::new(days)).unwrap_or(date)
}

fn plus_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months)).unwrap_or(date)
}

/// Infer a follow-up date from `phrase`, relative to `reference`.
///
/// Recognized, in priority order: "day after tomorrow", "tomorrow", later
/// today, weekday names (next occurrence strictly after `reference`),
/// "weekend", counted offsets ("in 3 days", "two weeks"), "next week",
/// "a few days" / "a couple of weeks", "end of the month", "next month" and
/// "next year". Anything else defaults to tomorrow.
pub fn infer_follow_up_date(reference: NaiveDate, phrase: &str) -> DateGuess {
    let tokens = tokens(phrase);

    if contains_seq(&tokens, &["day", "after", "tomorrow"]) {
        return DateGuess::new(plus_days(reference, 2), "the day after tomorrow");
    }
    if tokens.iter().any(|t| t == "tomorrow") {
        return DateGuess::new(plus_days(reference, 1), "tomorrow");
    }
    if contains_seq(&tokens, &["later", "today"])
        || contains_seq(&tokens, &["this", "evening"])
        || contains_seq(&tokens, &["this", "afternoon"])
        || tokens.iter().any(|t| t == "tonight")
    {
        return DateGuess::new(reference, "later today");
    }

    if let Some((label, weekday)) = tokens
        .iter()
        .find_map(|t| WEEKDAYS.iter().find(|(name, _)| t.as_str() == *name))
    {
        let date = next_weekday(reference, *weekday);
        let mut label = label.to_string();
        if let Some(first) = label.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        return DateGuess::new(date, label);
    }

    if tokens.iter().any(|t| t == "weekend") {
        return DateGuess::new(next_weekday(reference, Weekday::Sat), "the weekend");
    }

    if let Some((count, unit)) = counted_offset(&tokens) {
        let (date, label) = match unit {
            Unit::Day => (plus_days(reference, u64::from(count)), plural(count, "day")),
            Unit::Week => (
                plus_days(reference, u64::from(count) * 7),
                plural(count, "week"),
            ),
            Unit::Month => (plus_months(reference, count), plural(count, "month")),
            Unit::Year => (plus_months(reference, count * 12), plural(count, "year")),
        };
        return DateGuess::new(date, format!("in {label}"));
    }

    if contains_seq(&tokens, &["next", "week"]) {
        return DateGuess::new(plus_days(reference, 7), "next week");
    }
    if let Some(unit) = vague_offset(&tokens) {
        return match unit {
            Unit::Day => DateGuess::new(plus_days(reference, 3), "in a few days"),
            Unit::Week => DateGuess::new(plus_days(reference, 14), "in a few weeks"),
            Unit::Month => DateGuess::new(plus_months(reference, 3), "in a few months"),
            Unit::Year => DateGuess::new(plus_months(reference, 24), "in a few years"),
        };
    }
    if contains_seq(&tokens, &["end", "of", "the", "month"])
        || contains_seq(&tokens, &["end", "of", "month"])
    {
        let date = last_day_of_month(reference);
        let date = if date == reference { plus_days(reference, 1) } else { date };
        return DateGuess::new(date, "the end of the month");
    }
    if contains_seq(&tokens, &["next", "month"]) {
        return DateGuess::new(plus_months(reference, 1), "next month");
    }
    if contains_seq(&tokens, &["next", "year"]) {
        return DateGuess::new(plus_months(reference, 12), "next year");
    }

    DateGuess {
        date: plus_days(reference, 1),
        label: "tomorrow".to_string(),
        recognized: false,
    }
}

fn plural(count: u32, unit: &str) -> String {
    if count == 1 {
        format!("one {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2024-01-01 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_next_monday_from_monday_is_a_week_out() {
        let guess = infer_follow_up_date(monday(), "next Monday");
        assert_eq!(guess.date, ymd(2024, 1, 8));
        assert_eq!(guess.label, "Monday");
        assert!(guess.recognized);
    }

    #[test]
    fn test_tomorrow_and_default() {
        assert_eq!(infer_follow_up_date(monday(), "tomorrow please").date, ymd(2024, 1, 2));

        let guess = infer_follow_up_date(monday(), "whenever works");
        assert_eq!(guess.date, ymd(2024, 1, 2));
        assert!(!guess.recognized);
    }

    #[test]
    fn test_weekday_is_strictly_future() {
        assert_eq!(infer_follow_up_date(monday(), "call me Friday").date, ymd(2024, 1, 5));
        assert_eq!(infer_follow_up_date(monday(), "tuesday").date, ymd(2024, 1, 2));
        assert_eq!(infer_follow_up_date(monday(), "Sunday works").date, ymd(2024, 1, 7));
        assert_eq!(infer_follow_up_date(monday(), "call me Friday").label, "Friday");
    }

    #[test]
    fn test_relative_phrases() {
        assert_eq!(infer_follow_up_date(monday(), "the day after tomorrow").date, ymd(2024, 1, 3));
        assert_eq!(infer_follow_up_date(monday(), "next week").date, ymd(2024, 1, 8));
        assert_eq!(infer_follow_up_date(monday(), "in a few days").date, ymd(2024, 1, 4));
        assert_eq!(infer_follow_up_date(monday(), "a couple of days").date, ymd(2024, 1, 4));
        assert_eq!(infer_follow_up_date(monday(), "in 10 days").date, ymd(2024, 1, 11));
        let weeks = infer_follow_up_date(monday(), "in a few weeks");
        assert_eq!((weeks.date, weeks.label.as_str()), (ymd(2024, 1, 15), "in a few weeks"));
        assert_eq!(infer_follow_up_date(monday(), "a couple weeks").date, ymd(2024, 1, 15));
        assert_eq!(infer_follow_up_date(monday(), "in two weeks").date, ymd(2024, 1, 15));
        assert_eq!(infer_follow_up_date(monday(), "over the weekend").date, ymd(2024, 1, 6));
        assert_eq!(infer_follow_up_date(monday(), "this evening").date, monday());
    }

    #[test]
    fn test_end_of_month() {
        assert_eq!(infer_follow_up_date(monday(), "end of the month").date, ymd(2024, 1, 31));
        assert_eq!(infer_follow_up_date(ymd(2024, 2, 10), "end of month").date, ymd(2024, 2, 29));
        // Already the last day: roll to tomorrow.
        assert_eq!(infer_follow_up_date(ymd(2024, 1, 31), "end of the month").date, ymd(2024, 2, 1));
    }

    #[test]
    fn test_far_future_phrases_resolve_beyond_a_month() {
        assert_eq!(infer_follow_up_date(monday(), "next month").date, ymd(2024, 2, 1));
        assert_eq!(infer_follow_up_date(monday(), "in three months").date, ymd(2024, 4, 1));
        assert_eq!(infer_follow_up_date(monday(), "next year").date, ymd(2025, 1, 1));
    }

    #[test]
    fn test_deterministic() {
        let a = infer_follow_up_date(monday(), "maybe Thursday");
        let b = infer_follow_up_date(monday(), "maybe Thursday");
        assert_eq!(a, b);
    }
}
