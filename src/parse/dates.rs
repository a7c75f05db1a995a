use chrono::{Datelike, Duration, NaiveDate, Weekday};

/// Resolve a due-date expression relative to `today`.
///
/// Accepts ISO dates, `today`/`tomorrow`/`yesterday`, weekday names (the next
/// such day on or after `today`), `next week`, and `+Nd` / `+Nw` offsets.
pub fn resolve_date_expr(expr: &str, today: NaiveDate) -> Option<NaiveDate> {
    let expr = expr.trim().to_ascii_lowercase();
    if expr.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(&expr, "%Y-%m-%d") {
        return Some(date);
    }

    match expr.as_str() {
        "today" => return Some(today),
        "tomorrow" => return today.succ_opt(),
        "yesterday" => return today.pred_opt(),
        "next week" => return today.checked_add_signed(Duration::days(7)),
        _ => {}
    }

    if let Some(weekday) = parse_weekday(&expr) {
        return Some(next_weekday(today, weekday));
    }

    if let Some(offset) = expr.strip_prefix('+') {
        let (num, unit) = offset.split_at(offset.len().saturating_sub(1));
        let n: i64 = num.parse().ok()?;
        let days = match unit {
            "d" => n,
            "w" => n * 7,
            _ => return None,
        };
        return today.checked_add_signed(Duration::days(days));
    }

    None
}

fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// The first `weekday` on or after `from`
pub fn next_weekday(from: NaiveDate, weekday: Weekday) -> NaiveDate {
    let ahead = (7 + weekday.num_days_from_monday() as i64
        - from.weekday().num_days_from_monday() as i64)
        % 7;
    from + Duration::days(ahead)
}

/// A `YYYY-MM-DD` prefix on a file name, as used by daily notes
pub fn date_from_file_name(name: &str) -> Option<NaiveDate> {
    let prefix = name.get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}
