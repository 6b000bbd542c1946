//! Filter predicate trees.
//!
//! Leaves are `(field, transform, lookup, value)` conditions; inner nodes are
//! conjunctions, disjunctions and negations. Which lookups a backend accepts is
//! decided at compile time, so a tree may hold anything the caller expressed.

use std::fmt;

use crate::error::{Result, SearchGateError};
use crate::object::FieldValue;

/// Lookups that compile to engine clauses.
pub const SUPPORTED_LOOKUPS: &[&str] = &[
    "exact",
    "isnull",
    "startswith",
    "gt",
    "gte",
    "lt",
    "lte",
    "range",
];

/// Date-part extractions that may appear between a field and its lookup.
pub const DATE_TRANSFORMS: &[&str] = &[
    "year",
    "iso_year",
    "quarter",
    "month",
    "week",
    "week_day",
    "iso_week_day",
    "day",
    "date",
    "time",
    "hour",
    "minute",
    "second",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    /// Date part extracted before comparing, e.g. `year`.
    pub transform: Option<String>,
    pub lookup: String,
    pub value: FieldValue,
}

impl Condition {
    /// The condition as written by the caller: `publication_date__year__lt`.
    pub fn expression(&self) -> String {
        match &self.transform {
            Some(transform) => format!("{}__{transform}__{}", self.field, self.lookup),
            None => format!("{}__{}", self.field, self.lookup),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.expression(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Condition(Condition),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// Matches nothing.
    MatchNone,
}

impl Filter {
    pub fn lookup<F, L, V>(field: F, lookup: L, value: V) -> Self
    where
        F: Into<String>,
        L: Into<String>,
        V: Into<FieldValue>,
    {
        Filter::Condition(Condition {
            field: field.into(),
            transform: None,
            lookup: lookup.into(),
            value: value.into(),
        })
    }

    pub fn exact<F: Into<String>, V: Into<FieldValue>>(field: F, value: V) -> Self {
        Filter::lookup(field, "exact", value)
    }

    pub fn isnull<F: Into<String>>(field: F, is_null: bool) -> Self {
        Filter::lookup(field, "isnull", is_null)
    }

    pub fn range<F: Into<String>, V: Into<FieldValue>>(field: F, low: V, high: V) -> Self {
        Filter::lookup(field, "range", FieldValue::List(vec![low.into(), high.into()]))
    }

    /// Condition on an extracted date part.
    pub fn transformed<F, T, L, V>(field: F, transform: T, lookup: L, value: V) -> Self
    where
        F: Into<String>,
        T: Into<String>,
        L: Into<String>,
        V: Into<FieldValue>,
    {
        Filter::Condition(Condition {
            field: field.into(),
            transform: Some(transform.into()),
            lookup: lookup.into(),
            value: value.into(),
        })
    }

    pub fn year<F: Into<String>, L: Into<String>>(field: F, lookup: L, year: i32) -> Self {
        Filter::transformed(field, "year", lookup, year)
    }

    /// Parse a `field[__transform][__lookup]` expression.
    pub fn parse<V: Into<FieldValue>>(expression: &str, value: V) -> Result<Self> {
        let parts: Vec<&str> = expression.split("__").collect();
        let (field, rest) = match parts.split_first() {
            Some((field, rest)) if !field.is_empty() => (*field, rest),
            _ => {
                return Err(SearchGateError::filter(format!(
                    "Cannot parse filter expression \"{expression}\""
                )));
            }
        };

        match rest {
            [] => Ok(Filter::exact(field, value)),
            [part] if DATE_TRANSFORMS.contains(part) => {
                Ok(Filter::transformed(field, *part, "exact", value))
            }
            [lookup] => Ok(Filter::lookup(field, *lookup, value)),
            [transform, lookup] if DATE_TRANSFORMS.contains(transform) => {
                Ok(Filter::transformed(field, *transform, *lookup, value))
            }
            _ => Err(SearchGateError::filter(format!(
                "Cannot apply filter on search results: \"{expression}\" spans a relation, which is not supported."
            ))),
        }
    }

    /// Conjunction, flattening nested conjunctions.
    pub fn and(self, other: Filter) -> Filter {
        let mut children = match self {
            Filter::And(children) => children,
            single => vec![single],
        };
        match other {
            Filter::And(more) => children.extend(more),
            single => children.push(single),
        }
        Filter::And(children)
    }

    /// Disjunction, flattening nested disjunctions.
    pub fn or(self, other: Filter) -> Filter {
        let mut children = match self {
            Filter::Or(children) => children,
            single => vec![single],
        };
        match other {
            Filter::Or(more) => children.extend(more),
            single => children.push(single),
        }
        Filter::Or(children)
    }

    pub fn negate(self) -> Filter {
        match self {
            Filter::Not(inner) => *inner,
            other => Filter::Not(Box::new(other)),
        }
    }

    /// Every leaf condition, depth first.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Filter::Condition(condition) => out.push(condition),
            Filter::And(children) | Filter::Or(children) => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
            Filter::Not(inner) => inner.collect_conditions(out),
            Filter::MatchNone => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expressions() {
        assert_eq!(
            Filter::parse("title", "Test").unwrap(),
            Filter::exact("title", "Test")
        );
        assert_eq!(
            Filter::parse("title__iregex", "h(ea)llo").unwrap(),
            Filter::lookup("title", "iregex", "h(ea)llo")
        );
        assert_eq!(
            Filter::parse("publication_date__year__lt", 1900).unwrap(),
            Filter::year("publication_date", "lt", 1900)
        );
        assert_eq!(
            Filter::parse("publication_date__month", 1).unwrap(),
            Filter::transformed("publication_date", "month", "exact", 1)
        );
        assert!(Filter::parse("authors__name__exact", "x").is_err());
        assert!(Filter::parse("", "x").is_err());
    }

    #[test]
    fn test_combinators_flatten() {
        let filter = Filter::exact("a", 1)
            .and(Filter::exact("b", 2))
            .and(Filter::exact("c", 3));
        match &filter {
            Filter::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected a conjunction, got {other:?}"),
        }
        assert_eq!(filter.conditions().len(), 3);

        let negated = Filter::exact("a", 1).negate();
        assert_eq!(negated.clone().negate(), Filter::exact("a", 1));
    }

    #[test]
    fn test_condition_display() {
        let filter = Filter::lookup("title", "iregex", "h(ea)llo");
        let condition = filter.conditions()[0];
        assert_eq!(condition.to_string(), "title__iregex = h(ea)llo");
    }
}
