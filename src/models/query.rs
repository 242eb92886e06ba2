//! Query-related data models.
//!
//! This module defines positional parameter values and per-statement results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Object or array, bound as jsonb
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

/// Input parameter that can be various JSON types.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParamInput {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// JSON object or array
    Json(JsonValue),
}

impl From<QueryParamInput> for QueryParam {
    fn from(input: QueryParamInput) -> Self {
        match input {
            QueryParamInput::Null => QueryParam::Null,
            QueryParamInput::Bool(v) => QueryParam::Bool(v),
            QueryParamInput::Int(v) => QueryParam::Int(v),
            QueryParamInput::Float(v) => QueryParam::Float(v),
            QueryParamInput::String(v) => QueryParam::String(v),
            QueryParamInput::Json(JsonValue::Null) => QueryParam::Null,
            QueryParamInput::Json(v) => QueryParam::Json(v),
        }
    }
}

/// Convert a list of tool inputs into bindable parameters.
pub fn into_params(inputs: Vec<QueryParamInput>) -> Vec<QueryParam> {
    inputs.into_iter().map(QueryParam::from).collect()
}

/// Rows decoded into ordered column → value maps.
pub type JsonRow = serde_json::Map<String, JsonValue>;

/// Result of one statement whose kind was decided at runtime.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatementOutcome {
    /// The statement produced a row set.
    Rows { data: Vec<JsonRow>, row_count: usize },
    /// The statement produced only a command tag.
    Status { status: String, rows_affected: u64 },
}

impl StatementOutcome {
    pub fn rows(data: Vec<JsonRow>) -> Self {
        let row_count = data.len();
        Self::Rows { data, row_count }
    }

    pub fn status(status: impl Into<String>, rows_affected: u64) -> Self {
        Self::Status {
            status: status.into(),
            rows_affected,
        }
    }
}
