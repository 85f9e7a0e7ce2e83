//! Tolerant field parsing.
//!
//! Every conversion is a pure function from the raw text to either a typed
//! value or [`Parsed::Unparseable`]. Nothing here returns an error: malformed
//! fields become absent values and ingestion continues with partial data.

use crate::temporal::CalendarDate;

/// Quote characters removed from every source field.
pub const QUOTE_CHARS: [char; 2] = ['"', '\''];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Bool,
    Integer,
    Float,
    Date,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Integer(i64),
    Float(f64),
    Date(CalendarDate),
}

impl FieldValue {
    /// Render the value in the form `parse` accepts for its kind.
    pub fn to_canonical_string(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Bool(value) => value.to_string(),
            FieldValue::Integer(value) => value.to_string(),
            FieldValue::Float(value) => value.to_string(),
            FieldValue::Date(date) => date.to_source_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Parsed {
    Value(FieldValue),
    Unparseable,
}

impl Parsed {
    fn from_option(value: Option<FieldValue>) -> Self {
        match value {
            Some(value) => Parsed::Value(value),
            None => Parsed::Unparseable,
        }
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, Parsed::Unparseable)
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Parsed::Value(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            Parsed::Value(FieldValue::Bool(value)) => Some(value),
            _ => None,
        }
    }

    pub fn into_integer(self) -> Option<i64> {
        match self {
            Parsed::Value(FieldValue::Integer(value)) => Some(value),
            _ => None,
        }
    }

    pub fn into_float(self) -> Option<f64> {
        match self {
            Parsed::Value(FieldValue::Float(value)) => Some(value),
            _ => None,
        }
    }

    pub fn into_date(self) -> Option<CalendarDate> {
        match self {
            Parsed::Value(FieldValue::Date(date)) => Some(date),
            _ => None,
        }
    }
}

pub fn strip_quotes(raw: &str) -> String {
    raw.chars().filter(|c| !QUOTE_CHARS.contains(c)).collect()
}

pub fn parse(kind: FieldKind, raw: &str) -> Parsed {
    let cleaned = strip_quotes(raw);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Parsed::Unparseable;
    }
    Parsed::from_option(match kind {
        FieldKind::Text => Some(FieldValue::Text(cleaned.to_string())),
        FieldKind::Bool => parse_bool(cleaned).map(FieldValue::Bool),
        FieldKind::Integer => parse_integer(cleaned).map(FieldValue::Integer),
        FieldKind::Float => parse_float(cleaned).map(FieldValue::Float),
        FieldKind::Date => CalendarDate::parse_source(cleaned).map(FieldValue::Date),
    })
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Accepts plain integers, `1,234,567` digit grouping and integral floats
/// such as `1500000.0`, which is how spreadsheet exports write sales figures.
fn parse_integer(text: &str) -> Option<i64> {
    if let Ok(value) = text.parse::<i64>() {
        return Some(value);
    }
    if is_grouped_integer(text) {
        return text.replace(',', "").parse::<i64>().ok();
    }
    let value = text.parse::<f64>().ok()?;
    let in_range = value >= i64::MIN as f64 && value <= i64::MAX as f64;
    if value.is_finite() && value.fract() == 0.0 && in_range {
        Some(value as i64)
    } else {
        None
    }
}

fn is_grouped_integer(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let mut groups = digits.split(',');
    let head_ok = groups
        .next()
        .map(|head| (1..=3).contains(&head.len()) && head.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false);
    let mut tail_count = 0;
    let tail_ok = groups.all(|group| {
        tail_count += 1;
        group.len() == 3 && group.bytes().all(|b| b.is_ascii_digit())
    });
    head_ok && tail_ok && tail_count > 0
}

/// Accepts `.` as decimal separator, or a single `,` when no `.` is present.
fn parse_float(text: &str) -> Option<f64> {
    let value = match text.parse::<f64>() {
        Ok(value) => value,
        Err(_) if !text.contains('.') && text.matches(',').count() == 1 => {
            text.replace(',', ".").parse::<f64>().ok()?
        }
        Err(_) => return None,
    };
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}
