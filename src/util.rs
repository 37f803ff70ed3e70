// Utility helpers for parsing, descriptive statistics and number formatting.
//
// This module centralizes the "dirty" CSV/number/date handling so the rest
// of the code can assume clean, typed values, and it owns the one rounding
// convention used in every annotation: one decimal for percentages,
// thousands separators for counts.
use chrono::{Datelike, NaiveDate};
use num_format::{Locale, ToFormattedString};
use std::cmp::Ordering;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters (so `NaN`/`inf` never get in).
/// - Strips thousands separators like `","` before parsing.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok()
}

pub fn parse_i32_safe(s: Option<&str>) -> Option<i32> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<i32>().ok()
}

/// Non-negative integer count. `"3.0"` is accepted, `"2.5"` is not.
pub fn parse_count_safe(s: Option<&str>) -> Option<u32> {
    let v = parse_f64_safe(s)?;
    if v < 0.0 || v.fract() != 0.0 || v > f64::from(u32::MAX) {
        return None;
    }
    Some(v as u32)
}

/// 0/1 flag. Also tolerates `"0.0"`/`"1.0"` as written by some exporters.
pub fn parse_flag_safe(s: Option<&str>) -> Option<bool> {
    match parse_count_safe(s)? {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    // Dates are expected in `YYYY-MM-DD` format.
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn year_of(s: Option<&str>) -> Option<i32> {
    parse_date_safe(s).map(|d| d.year())
}

/// Non-empty trimmed text.
pub fn text_safe(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// `num / den`, defined as 0 when the denominator is 0.
pub fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let r = num / den;
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// Share of `part` in `whole` as a percentage, 0 for an empty whole.
pub fn pct(part: u64, whole: u64) -> f64 {
    ratio(part as f64, whole as f64) * 100.0
}

pub fn average(v: &[f64]) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn sorted(mut v: Vec<f64>) -> Vec<f64> {
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Linear-interpolated quantile of an already sorted slice. Used for
/// reported statistics (median, quartiles).
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Nearest-rank percentile of an already sorted slice: the smallest value
/// with at least `q` of the population at or below it. Always an observed
/// value, which keeps a trim threshold from landing inside a gap.
pub fn percentile_nearest_rank(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let q = q.clamp(0.0, 1.0);
    // the epsilon keeps float noise in q * n from pushing the rank up by one
    let rank = (q * sorted.len() as f64 - 1e-9).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus locale-aware thousands separators (`1,234,567.89`).
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: u64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    // a value that rounds to zero never gets a sign
    let is_zero = s.chars().all(|c| c == '0' || c == '.');
    if n < 0.0 && !is_zero {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

/// Percentage with one decimal: `66.7%`.
pub fn format_pct(v: f64) -> String {
    format!("{}%", format_number(v, 1))
}

/// Signed percentage-point difference: `+6.4 pp`, `-2.0 pp`.
pub fn format_pp(v: f64) -> String {
    let body = format_number(v, 1);
    if body.starts_with('-') || body == "0.0" {
        format!("{} pp", body)
    } else {
        format!("+{} pp", body)
    }
}
