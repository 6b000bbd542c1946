//! Attribute values read from application objects and used in filters.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Number, Value};

use crate::error::{Result, SearchGateError};
use crate::schema::AttributeType;

/// Format used for calendar dates in documents and filter clauses.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A scalar (or list of scalars) read from an object attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Value as stored in an engine document.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Integer(i) => Value::Number((*i).into()),
            FieldValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            FieldValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
        }
    }

    /// Value as written into a filter clause. Dates and datetimes collapse to a calendar date.
    pub fn to_filter_json(&self) -> Value {
        match self {
            FieldValue::DateTime(dt) => Value::String(dt.date_naive().format(DATE_FORMAT).to_string()),
            FieldValue::List(items) => {
                Value::Array(items.iter().map(|v| v.to_filter_json()).collect())
            }
            other => other.to_json(),
        }
    }

    /// Plain text rendering used for full-text matching; `None` for nulls.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().filter_map(|v| v.as_text()).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(" "))
                }
            }
            other => match other.to_json() {
                Value::String(s) => Some(s),
                v => Some(v.to_string()),
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Calendar year of a date or datetime value.
    pub fn year(&self) -> Option<i32> {
        match self {
            FieldValue::Date(d) => Some(d.year()),
            FieldValue::DateTime(dt) => Some(dt.year()),
            _ => None,
        }
    }

    /// Integer view of the value, accepting integral floats and numeric text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            FieldValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            FieldValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Ordering between two values of compatible kinds.
    ///
    /// Numbers compare numerically, dates compare chronologically (a date
    /// compares against a datetime at midnight UTC) and text compares
    /// lexicographically. Incompatible kinds and nulls are unordered.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        use FieldValue::*;
        match (self, other) {
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Text(a), Text(b)) => Some(a.cmp(b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => Some(a.cmp(b)),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            (Date(a), DateTime(b)) => Some(midnight(a).cmp(b)),
            (DateTime(a), Date(b)) => Some(a.cmp(&midnight(b))),
            (Date(_), Text(s)) | (DateTime(_), Text(s)) => {
                parse_date_text(s).and_then(|parsed| self.compare(&parsed))
            }
            (Text(s), Date(_)) | (Text(s), DateTime(_)) => {
                parse_date_text(s).and_then(|parsed| parsed.compare(other))
            }
            _ => None,
        }
    }

    /// Equality used by filter evaluation; kinds are coerced like [`FieldValue::compare`].
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }

    /// Parse a JSON value into the representation declared for an attribute.
    pub fn from_json(value: &Value, kind: &AttributeType) -> Result<FieldValue> {
        if value.is_null() {
            return Ok(FieldValue::Null);
        }

        if let Value::Array(items) = value {
            let parsed = items
                .iter()
                .map(|item| FieldValue::from_json(item, kind))
                .collect::<Result<Vec<_>>>()?;
            return Ok(FieldValue::List(parsed));
        }

        let invalid = || {
            SearchGateError::schema(format!(
                "Value {value} is not valid for an attribute of type {kind}"
            ))
        };

        match kind {
            AttributeType::Text => match value {
                Value::String(s) => Ok(FieldValue::Text(s.clone())),
                other => Ok(FieldValue::Text(other.to_string())),
            },
            AttributeType::Integer => value
                .as_i64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .map(FieldValue::Integer)
                .ok_or_else(invalid),
            AttributeType::Float => value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                .map(FieldValue::Float)
                .ok_or_else(invalid),
            AttributeType::Boolean => value.as_bool().map(FieldValue::Boolean).ok_or_else(invalid),
            AttributeType::Date => value
                .as_str()
                .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
                .map(FieldValue::Date)
                .ok_or_else(invalid),
            AttributeType::DateTime => value
                .as_str()
                .and_then(parse_datetime)
                .map(FieldValue::DateTime)
                .ok_or_else(invalid),
            AttributeType::Relation { .. } => Err(SearchGateError::schema(
                "Relation attributes do not hold scalar values",
            )),
        }
    }
}

fn midnight(date: &NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or(NaiveDateTime::MIN)
        .and_utc()
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn parse_date_text(s: &str) -> Option<FieldValue> {
    if let Ok(date) = NaiveDate::parse_from_str(s, DATE_FORMAT) {
        return Some(FieldValue::Date(date));
    }
    parse_datetime(s).map(FieldValue::DateTime)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "None"),
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", parts.join(", "))
            }
            other => match other.to_json() {
                Value::String(s) => write!(f, "{s}"),
                v => write!(f, "{v}"),
            },
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::Integer(value as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        FieldValue::List(value.into_iter().map(Into::into).collect())
    }
}
