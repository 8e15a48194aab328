use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One row returned by the graph store: column name to value, in column order.
pub type ResultRow = Map<String, Value>;

/// The user's question as received at the pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    text: String,
    session_id: Option<String>,
}

impl Question {
    pub fn new(text: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            text: text.into(),
            session_id,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

/// Query text produced by the generator and checked by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub text: String,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratedQuery {
    /// Freshly generated text that has not been through validation yet.
    pub fn unvalidated(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_valid: false,
            error: None,
        }
    }
}

/// Parameterised query text sent to the graph store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphQuery {
    pub text: String,
    pub params: Map<String, Value>,
}

impl GraphQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }
}
