//! Row-wise function families (spec §4.B): math, string, date, row-aggregation,
//! conditional. Every function returns `null` on invalid input; none ever panics
//! or raises an error for bad data — only for the wrong arity, which is a
//! programmer/evaluator-internal bug rather than bad data.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde_json::Value;

pub fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn as_str(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string().trim_matches('"').to_string()),
    }
}

fn num(v: Option<f64>) -> Value {
    match v {
        Some(n) if n.is_finite() => serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

// ---- Math ----

pub fn log(x: &Value) -> Value {
    match as_f64(x) {
        Some(v) if v > 0.0 => num(Some(v.ln())),
        _ => Value::Null,
    }
}

pub fn log10(x: &Value) -> Value {
    match as_f64(x) {
        Some(v) if v > 0.0 => num(Some(v.log10())),
        _ => Value::Null,
    }
}

pub fn log2(x: &Value) -> Value {
    match as_f64(x) {
        Some(v) if v > 0.0 => num(Some(v.log2())),
        _ => Value::Null,
    }
}

pub fn sqrt(x: &Value) -> Value {
    match as_f64(x) {
        Some(v) if v >= 0.0 => num(Some(v.sqrt())),
        _ => Value::Null,
    }
}

pub fn abs(x: &Value) -> Value {
    num(as_f64(x).map(f64::abs))
}

pub fn exp(x: &Value) -> Value {
    num(as_f64(x).map(f64::exp))
}

pub fn round(x: &Value, n: Option<&Value>) -> Value {
    let Some(v) = as_f64(x) else { return Value::Null };
    let digits = n.and_then(as_f64).unwrap_or(0.0) as i32;
    let factor = 10f64.powi(digits);
    num(Some((v * factor).round() / factor))
}

pub fn ceil(x: &Value) -> Value {
    num(as_f64(x).map(f64::ceil))
}

pub fn floor(x: &Value) -> Value {
    num(as_f64(x).map(f64::floor))
}

// ---- String ----

pub fn upper(x: &Value) -> Value {
    as_str(x).map(|s| Value::String(s.to_uppercase())).unwrap_or(Value::Null)
}

pub fn lower(x: &Value) -> Value {
    as_str(x).map(|s| Value::String(s.to_lowercase())).unwrap_or(Value::Null)
}

pub fn trim(x: &Value) -> Value {
    as_str(x).map(|s| Value::String(s.trim().to_string())).unwrap_or(Value::Null)
}

pub fn concat(args: &[Value]) -> Value {
    let mut out = String::new();
    let mut any = false;
    for arg in args {
        if let Some(s) = as_str(arg) {
            out.push_str(&s);
            any = true;
        }
    }
    if any {
        Value::String(out)
    } else {
        Value::Null
    }
}

pub fn substr(x: &Value, start: &Value, len: Option<&Value>) -> Value {
    let (Some(s), Some(start)) = (as_str(x), as_f64(start)) else { return Value::Null };
    let chars: Vec<char> = s.chars().collect();
    let start_idx = (start.max(0.0)) as usize;
    if start_idx >= chars.len() {
        return Value::String(String::new());
    }
    let end_idx = match len.and_then(as_f64) {
        Some(l) => (start_idx + l.max(0.0) as usize).min(chars.len()),
        None => chars.len(),
    };
    Value::String(chars[start_idx..end_idx].iter().collect())
}

pub fn str_len(x: &Value) -> Value {
    as_str(x).map(|s| Value::from(s.chars().count() as u64)).unwrap_or(Value::Null)
}

// ---- Date ----

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d.and_hms_opt(0, 0, 0).unwrap());
    }
    None
}

pub fn date_part(x: &Value, unit: &Value) -> Value {
    let (Some(s), Some(unit)) = (as_str(x), as_str(unit)) else { return Value::Null };
    let Some(dt) = parse_datetime(&s) else { return Value::Null };
    let result = match unit.as_str() {
        "year" => dt.year() as f64,
        "month" => dt.month() as f64,
        "day" => dt.day() as f64,
        "hour" => dt.hour() as f64,
        "minute" => dt.minute() as f64,
        "second" => dt.second() as f64,
        "weekday" => dt.weekday().num_days_from_monday() as f64,
        _ => return Value::Null,
    };
    num(Some(result))
}

// ---- Row aggregations (ignore nulls) ----

pub fn row_mean(args: &[Value]) -> Value {
    let values: Vec<f64> = args.iter().filter_map(as_f64).collect();
    if values.is_empty() {
        Value::Null
    } else {
        num(Some(values.iter().sum::<f64>() / values.len() as f64))
    }
}

pub fn row_sum(args: &[Value]) -> Value {
    let values: Vec<f64> = args.iter().filter_map(as_f64).collect();
    if values.is_empty() {
        Value::Null
    } else {
        num(Some(values.iter().sum()))
    }
}

pub fn row_min(args: &[Value]) -> Value {
    args.iter()
        .filter_map(as_f64)
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
        .map(|v| num(Some(v)))
        .unwrap_or(Value::Null)
}

pub fn row_max(args: &[Value]) -> Value {
    args.iter()
        .filter_map(as_f64)
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
        .map(|v| num(Some(v)))
        .unwrap_or(Value::Null)
}

// ---- Conditional ----

pub fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

pub fn if_else(cond: &Value, a: Value, b: Value) -> Value {
    if is_truthy(cond) {
        a
    } else {
        b
    }
}

/// `recode(x, k1, v1, k2, v2, ..., [default])`. `pairs` is every argument after
/// `x`; an odd trailing element is the default value.
pub fn recode(x: &Value, pairs: &[Value]) -> Value {
    let default = if pairs.len() % 2 == 1 {
        pairs.last().cloned()
    } else {
        None
    };
    let pair_count = pairs.len() / 2;
    for i in 0..pair_count {
        if &pairs[i * 2] == x {
            return pairs[i * 2 + 1].clone();
        }
    }
    default.unwrap_or(Value::Null)
}

/// `cut(x, breaks[], labels[])` with half-open bins `[b_i, b_{i+1})`.
pub fn cut(x: &Value, breaks: &[Value], labels: &[Value]) -> Value {
    let Some(v) = as_f64(x) else { return Value::Null };
    let breaks: Vec<f64> = breaks.iter().filter_map(as_f64).collect();
    for i in 0..breaks.len().saturating_sub(1) {
        if v >= breaks[i] && v < breaks[i + 1] {
            return labels.get(i).cloned().unwrap_or(Value::Null);
        }
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn log_family_nulls_on_nonpositive() {
        assert_eq!(log(&json!(-1)), Value::Null);
        assert_eq!(sqrt(&json!(-4)), Value::Null);
        assert!(matches!(sqrt(&json!(4)), Value::Number(_)));
    }

    #[test]
    fn round_respects_digits() {
        assert_eq!(round(&json!(3.14159), Some(&json!(2))), json!(3.14));
        assert_eq!(round(&json!(3.6), None), json!(4.0));
    }

    #[test]
    fn substr_clamps_bounds() {
        assert_eq!(substr(&json!("hello"), &json!(1), Some(&json!(3))), json!("ell"));
        assert_eq!(substr(&json!("hello"), &json!(10), None), json!(""));
    }

    #[test]
    fn row_aggregations_ignore_nulls() {
        let args = vec![json!(1), Value::Null, json!(3)];
        assert_eq!(row_sum(&args), json!(4.0));
        assert_eq!(row_mean(&args), json!(2.0));
        assert_eq!(row_min(&args), json!(1.0));
        assert_eq!(row_max(&args), json!(3.0));
    }

    #[test]
    fn recode_falls_back_to_default() {
        let pairs = vec![json!("A"), json!(1), json!("B"), json!(2), json!(0)];
        assert_eq!(recode(&json!("A"), &pairs), json!(1));
        assert_eq!(recode(&json!("Z"), &pairs), json!(0));
    }

    #[test]
    fn cut_uses_half_open_bins() {
        let breaks = vec![json!(0), json!(10), json!(20)];
        let labels = vec![json!("low"), json!("high")];
        assert_eq!(cut(&json!(5), &breaks, &labels), json!("low"));
        assert_eq!(cut(&json!(10), &breaks, &labels), json!("high"));
        assert_eq!(cut(&json!(25), &breaks, &labels), Value::Null);
    }

    #[test]
    fn date_part_extracts_components() {
        let d = json!("2024-03-15");
        assert_eq!(date_part(&d, &json!("year")), json!(2024.0));
        assert_eq!(date_part(&d, &json!("month")), json!(3.0));
    }
}
