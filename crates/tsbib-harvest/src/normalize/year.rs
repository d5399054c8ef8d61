use chrono::{DateTime, Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})(?:[-/](\d{1,2})(?:[-/](\d{1,2}))?)?$").expect("valid regex")
});

/// Year of `YYYY`, `YYYY-MM`, `YYYY-MM-DD` (slashes allowed) or an RFC 3339
/// timestamp. Anything else is unknown.
pub fn parse_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.year());
    }

    let caps = DATE_PREFIX.captures(raw)?;
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    match (caps.get(2), caps.get(3)) {
        (None, _) => Some(year),
        (Some(month), None) => {
            let month: u32 = month.as_str().parse().ok()?;
            (1..=12).contains(&month).then_some(year)
        }
        (Some(month), Some(day)) => {
            let month: u32 = month.as_str().parse().ok()?;
            let day: u32 = day.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day).map(|_| year)
        }
    }
}
