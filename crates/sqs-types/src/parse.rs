//! Parse errors and the engine-boundary classifier.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::config::{Configuration, RunConfig};

/// Numeric error codes used by the engine parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorCode {
    Unknown,
    NotFound,
    TypeError,
    OutOfRange,
    BadValue,
    BadArgument,
}

impl ParseErrorCode {
    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => -1,
            Self::NotFound => 0,
            Self::TypeError => 1,
            Self::OutOfRange => 2,
            Self::BadValue => 3,
            Self::BadArgument => 4,
        }
    }

    /// Codes the engine does not document collapse to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::NotFound,
            1 => Self::TypeError,
            2 => Self::OutOfRange,
            3 => Self::BadValue,
            4 => Self::BadArgument,
            _ => Self::Unknown,
        }
    }
}

impl Serialize for ParseErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for ParseErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_code(i64::deserialize(deserializer)?))
    }
}

/// Rejection reported by the engine parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    /// Flattened identifier of the offending field. Empty when the error
    /// concerns the document as a whole.
    pub key: String,
    pub msg: String,
    pub code: ParseErrorCode,
    /// Name of the documented input parameter, if any.
    pub parameter: Option<String>,
}

pub const UNKNOWN_PARSE_KEY: &str = "unknown";
pub const UNKNOWN_PARSE_MESSAGE: &str =
    "An unknown error occurred while parsing the configuration.";

impl ParseError {
    pub fn new(key: impl Into<String>, msg: impl Into<String>, code: ParseErrorCode) -> Self {
        Self {
            key: key.into(),
            msg: msg.into(),
            code,
            parameter: None,
        }
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    /// Fallback used when the engine faulted instead of answering.
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_PARSE_KEY, UNKNOWN_PARSE_MESSAGE, ParseErrorCode::Unknown)
    }

    /// Builds a parse error from an error-shaped engine object. Missing or
    /// oddly typed fields degrade to their textual form rather than failing.
    fn from_engine_object(fields: &serde_json::Map<String, Configuration>) -> Self {
        let text = |name: &str| match fields.get(name) {
            Some(Configuration::String(s)) => s.clone(),
            Some(Configuration::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let code = fields
            .get("code")
            .and_then(Configuration::as_i64)
            .map(ParseErrorCode::from_code)
            .unwrap_or(ParseErrorCode::Unknown);
        let parameter = fields
            .get("parameter")
            .and_then(Configuration::as_str)
            .map(str::to_string);

        Self {
            key: text("key"),
            msg: text("msg"),
            code,
            parameter,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key.is_empty() {
            write!(f, "{} (code {})", self.msg, self.code.code())
        } else {
            write!(f, "{}: {} (code {})", self.key, self.msg, self.code.code())
        }
    }
}

impl std::error::Error for ParseError {}

/// Exactly one of an accepted configuration or a parse error.
pub type ParseOutcome = Result<RunConfig, ParseError>;

const ERROR_FIELDS: [&str; 3] = ["key", "msg", "code"];

/// Whether a raw engine answer has the shape of a parse error.
///
/// Purely structural: an accepted document that happens to carry all three
/// of `key`, `msg` and `code` at the top level is classified as an error.
pub fn is_error_shaped(output: &Configuration) -> bool {
    output
        .as_object()
        .map(|fields| ERROR_FIELDS.iter().all(|name| fields.contains_key(*name)))
        .unwrap_or(false)
}

/// Wraps the engine's raw parse answer into a [`ParseOutcome`].
pub fn classify(output: Configuration) -> ParseOutcome {
    if is_error_shaped(&output) {
        if let Some(fields) = output.as_object() {
            return Err(ParseError::from_engine_object(fields));
        }
    }
    RunConfig::from_document(output)
}
