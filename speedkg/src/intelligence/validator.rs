use std::sync::LazyLock;

use regex::Regex;

use crate::models::GeneratedQuery;

/// Verbs that must never reach the store, matched case-insensitively
/// anywhere in the text.
pub const DENY_LIST: [&str; 7] = [
    "DELETE", "REMOVE", "DROP", "DETACH", "SET", "CREATE", "MERGE",
];

static LIMIT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("valid regex"));
/// An integer literal that ends the LIMIT expression.
static LIMIT_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+(\d+)(?:\s*$|\s*[;)}\]]|\s+[A-Za-z])").expect("valid regex")
});

/// Which rule rejected a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Query text is empty")]
    Empty,

    #[error("Forbidden operation: {0}")]
    ForbiddenKeyword(&'static str),

    #[error("LIMIT too high: {limit} (max {max})")]
    LimitTooHigh { limit: String, max: u32 },

    #[error("LIMIT must be an integer literal, got: {0}")]
    LimitNotLiteral(String),
}

/// Static safety gate between generated text and the graph store.
///
/// Pure text inspection: deterministic and never touches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryValidator {
    default_limit: u32,
    max_limit: u32,
}

impl Default for QueryValidator {
    fn default() -> Self {
        Self::new(100, 1000)
    }
}

impl QueryValidator {
    pub fn new(default_limit: u32, max_limit: u32) -> Self {
        Self {
            default_limit,
            max_limit,
        }
    }

    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// Returns the text to execute, with a default `LIMIT` appended when the
    /// query has none.
    pub fn validate(&self, text: &str) -> Result<String, ValidationError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty);
        }

        let upper = trimmed.to_uppercase();
        if let Some(keyword) = DENY_LIST.into_iter().find(|keyword| upper.contains(keyword)) {
            return Err(ValidationError::ForbiddenKeyword(keyword));
        }

        for clause in LIMIT_CLAUSE.find_iter(trimmed) {
            let rest = &trimmed[clause.end()..];
            let Some(captures) = LIMIT_LITERAL.captures(rest) else {
                let expression: String = rest.trim_start().chars().take(40).collect();
                return Err(ValidationError::LimitNotLiteral(expression));
            };
            let digits = &captures[1];
            let within = digits
                .parse::<u64>()
                .map(|limit| limit <= u64::from(self.max_limit))
                .unwrap_or(false);
            if !within {
                return Err(ValidationError::LimitTooHigh {
                    limit: digits.to_string(),
                    max: self.max_limit,
                });
            }
        }

        if LIMIT_CLAUSE.is_match(trimmed) {
            return Ok(trimmed.to_string());
        }

        let body = trimmed.trim_end_matches(';').trim_end();
        Ok(format!("{body}\nLIMIT {}", self.default_limit))
    }

    /// Validate a generated query in place, recording the outcome on it.
    pub fn check(&self, mut query: GeneratedQuery) -> (GeneratedQuery, Option<ValidationError>) {
        match self.validate(&query.text) {
            Ok(text) => {
                query.text = text;
                query.is_valid = true;
                query.error = None;
                (query, None)
            }
            Err(error) => {
                query.is_valid = false;
                query.error = Some(error.to_string());
                (query, Some(error))
            }
        }
    }
}
