//! Text, counter and timestamp normalization for API payload fields.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use serde_json::Value;

/// Stored for empty or unrecognized time strings.
pub const TIME_UNKNOWN: &str = "未知时间";

/// Stored when a time string looks recognizable but fails to parse.
pub const TIME_PARSE_FAILED: &str = "解析失败";

/// Output format of every normalized timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<.*?>").expect("tag regex is valid"));

static FULL_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}年").expect("year regex is valid"));

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)").expect("number regex is valid"));

static CLOCK_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("clock regex is valid"));

static MONTH_DAY_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}月\d{1,2}日").expect("month-day regex is valid"));

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})月(\d{1,2})日$").expect("month-day regex is valid")
});

static API_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w{3} \w{3} \d{1,2}").expect("api time regex is valid"));

static COUNT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(-?\d+(?:\.\d+)?)").expect("count regex is valid"));

static COUNT_UNIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(亿|万|[kKmMbB])").expect("unit regex is valid"));

/// Strip HTML tags and surrounding whitespace.
pub fn clean_html(text: &str) -> String {
    HTML_TAG.replace_all(text, "").trim().to_string()
}

/// First `max` characters of `text`, with `...` appended when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// First `max` characters of `text` without a marker.
pub fn prefix_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Normalize a Weibo time description relative to the local clock.
pub fn parse_relative_time(raw: &str) -> String {
    parse_relative_time_at(raw, Local::now().naive_local())
}

/// Normalize a Weibo time description relative to `now`.
///
/// Returns [`TIME_UNKNOWN`] for empty or unrecognized input and
/// [`TIME_PARSE_FAILED`] when a recognized shape fails to parse.
pub fn parse_relative_time_at(raw: &str, now: NaiveDateTime) -> String {
    let text = raw.trim();
    if text.is_empty() {
        return TIME_UNKNOWN.to_string();
    }

    match parse_time_shape(text, now) {
        Some(Ok(dt)) => dt.format(TIMESTAMP_FORMAT).to_string(),
        Some(Err(())) => TIME_PARSE_FAILED.to_string(),
        None => TIME_UNKNOWN.to_string(),
    }
}

/// `None` when no known shape matches.
fn parse_time_shape(text: &str, now: NaiveDateTime) -> Option<Result<NaiveDateTime, ()>> {
    if FULL_YEAR.is_match(text) {
        return Some(NaiveDateTime::parse_from_str(text, "%Y年%m月%d日 %H:%M").map_err(|_| ()));
    }

    if text.contains("分钟") {
        return Some(leading_number(text).and_then(|n| shift_back(now, Duration::try_minutes(n))));
    }

    if text.contains("小时") {
        return Some(leading_number(text).and_then(|n| shift_back(now, Duration::try_hours(n))));
    }

    if text.contains("今天") {
        if let Some(result) = at_clock_time(text, now) {
            return Some(result);
        }
    }

    if text.contains("昨天") {
        if let Some(result) = at_clock_time(text, now - Duration::days(1)) {
            return Some(result);
        }
    }

    if MONTH_DAY_PREFIX.is_match(text) {
        return Some(month_day_this_year(text, now.year()));
    }

    if API_TIME.is_match(text) {
        return Some(
            DateTime::parse_from_str(text, "%a %b %d %H:%M:%S %z %Y")
                .map(|dt| dt.naive_local())
                .map_err(|_| ()),
        );
    }

    None
}

fn leading_number(text: &str) -> Result<i64, ()> {
    FIRST_NUMBER
        .captures(text)
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .ok_or(())
}

fn shift_back(now: NaiveDateTime, delta: Option<Duration>) -> Result<NaiveDateTime, ()> {
    delta
        .and_then(|d| now.checked_sub_signed(d))
        .ok_or(())
}

fn at_clock_time(text: &str, day: NaiveDateTime) -> Option<Result<NaiveDateTime, ()>> {
    let caps = CLOCK_TIME.captures(text)?;
    let hour: u32 = caps[1].parse().ok()?;
    let minute: u32 = caps[2].parse().ok()?;
    Some(
        day.with_hour(hour)
            .and_then(|dt| dt.with_minute(minute))
            .and_then(|dt| dt.with_second(0))
            .and_then(|dt| dt.with_nanosecond(0))
            .ok_or(()),
    )
}

fn month_day_this_year(text: &str, year: i32) -> Result<NaiveDateTime, ()> {
    let caps = MONTH_DAY.captures(text).ok_or(())?;
    let month: u32 = caps[1].parse().map_err(|_| ())?;
    let day: u32 = caps[2].parse().map_err(|_| ())?;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or(())
}

/// Parse a display counter such as `"3,200"`, `"2.5万"` or `12`.
pub fn parse_count(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => parse_count_str(s),
        other => parse_count_str(&other.to_string()),
    }
}

/// Parse a counter string, honoring `亿`, `万`, `k`, `m` and `b` units.
pub fn parse_count_str(raw: &str) -> i64 {
    let text = raw.trim().replace(',', "");
    if text.is_empty() {
        return 0;
    }

    let Some(number) = COUNT_NUMBER
        .captures(&text)
        .and_then(|caps| caps[1].parse::<f64>().ok())
    else {
        return 0;
    };

    let multiplier: f64 = match COUNT_UNIT
        .captures(&text)
        .map(|caps| caps[1].to_lowercase())
        .as_deref()
    {
        Some("亿") => 100_000_000.0,
        Some("万") => 10_000.0,
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        Some("b") => 1_000_000_000.0,
        _ => 1.0,
    };

    (number * multiplier) as i64
}
