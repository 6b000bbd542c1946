//! Free-text query kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SearchGateError;

/// How multiple terms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    #[default]
    Or,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::And => "and",
            Operator::Or => "or",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SearchGateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(Operator::And),
            "or" => Ok(Operator::Or),
            other => Err(SearchGateError::unsupported_query(format!(
                "Unknown operator \"{other}\""
            ))),
        }
    }
}

/// What to match. Phrase and fuzzy queries are separate kinds because they
/// compile to structurally different clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchQuery {
    /// Match every object of the scope.
    MatchAll,
    PlainText {
        text: String,
        #[serde(default)]
        operator: Operator,
    },
    Phrase {
        text: String,
    },
    Fuzzy {
        text: String,
        #[serde(default)]
        operator: Operator,
    },
}

impl SearchQuery {
    pub fn plain<S: Into<String>>(text: S) -> Self {
        SearchQuery::PlainText {
            text: text.into(),
            operator: Operator::Or,
        }
    }

    pub fn phrase<S: Into<String>>(text: S) -> Self {
        SearchQuery::Phrase { text: text.into() }
    }

    pub fn fuzzy<S: Into<String>>(text: S) -> Self {
        SearchQuery::Fuzzy {
            text: text.into(),
            operator: Operator::Or,
        }
    }

    /// Replace the operator of plain-text and fuzzy queries.
    pub fn with_operator(self, operator: Operator) -> Self {
        match self {
            SearchQuery::PlainText { text, .. } => SearchQuery::PlainText { text, operator },
            SearchQuery::Fuzzy { text, .. } => SearchQuery::Fuzzy { text, operator },
            other => other,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            SearchQuery::MatchAll => None,
            SearchQuery::PlainText { text, .. }
            | SearchQuery::Phrase { text }
            | SearchQuery::Fuzzy { text, .. } => Some(text),
        }
    }

    pub fn operator(&self) -> Operator {
        match self {
            SearchQuery::PlainText { operator, .. } | SearchQuery::Fuzzy { operator, .. } => *operator,
            _ => Operator::Or,
        }
    }

    /// A text query with nothing but whitespace cannot match anything.
    pub fn is_blank(&self) -> bool {
        self.text().is_some_and(|t| t.trim().is_empty())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SearchQuery::MatchAll => "MatchAll",
            SearchQuery::PlainText { .. } => "PlainText",
            SearchQuery::Phrase { .. } => "Phrase",
            SearchQuery::Fuzzy { .. } => "Fuzzy",
        }
    }
}

impl From<&str> for SearchQuery {
    fn from(text: &str) -> Self {
        SearchQuery::plain(text)
    }
}

impl From<String> for SearchQuery {
    fn from(text: String) -> Self {
        SearchQuery::plain(text)
    }
}
