//! Configuration values and the validated run configuration.
//!
//! A [`Configuration`] is an untyped JSON tree owned by the caller. The core
//! only ever looks at the three mode selectors and the iteration count; every
//! other field is engine-defined and carried through verbatim.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::parse::{ParseError, ParseErrorCode};

/// Untyped configuration tree as submitted by the user.
pub type Configuration = serde_json::Value;

pub const KEY_PRECISION: &str = "prec";
pub const KEY_SUBLATTICE_MODE: &str = "sublattice_mode";
pub const KEY_ITERATION_MODE: &str = "iteration_mode";
pub const KEY_ITERATIONS: &str = "iterations";

/// Iterations used by random mode when the document does not set any.
pub const DEFAULT_ITERATIONS: u64 = 100_000;

/// Error produced when a mode selector holds an unrecognised value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {field}: {value}. Use {expected}.")]
pub struct ModeParseError {
    pub field: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl ModeParseError {
    fn new(field: &'static str, value: impl fmt::Display, expected: &'static str) -> Self {
        Self {
            field,
            value: value.to_string(),
            expected,
        }
    }

    pub fn into_parse_error(self, key: &str) -> ParseError {
        ParseError::new(key, self.to_string(), ParseErrorCode::BadValue).with_parameter(key)
    }
}

/// Floating point precision the engine computes with.
///
/// Interchangeable with its ordinal: `Single == 0`, `Double == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Single,
    Double,
}

impl Default for Precision {
    fn default() -> Self {
        Self::Single
    }
}

impl Precision {
    pub fn ordinal(self) -> u8 {
        match self {
            Self::Single => 0,
            Self::Double => 1,
        }
    }

    pub fn from_ordinal(ordinal: u64) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Single),
            1 => Some(Self::Double),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
        }
    }

    /// Accepts `"single"`/`"double"` in any case, or the ordinals `0`/`1`.
    pub fn from_value(value: &Configuration) -> Result<Self, ModeParseError> {
        match value {
            Configuration::String(s) => s.parse(),
            Configuration::Number(n) => n
                .as_u64()
                .and_then(Self::from_ordinal)
                .ok_or_else(|| ModeParseError::new(KEY_PRECISION, n, "'double' or 'single'")),
            other => Err(ModeParseError::new(KEY_PRECISION, other, "'double' or 'single'")),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "single" | "0" => Ok(Self::Single),
            "double" | "1" => Ok(Self::Double),
            _ => Err(ModeParseError::new(KEY_PRECISION, s, "'double' or 'single'")),
        }
    }
}

impl<'de> Deserialize<'de> for Precision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Configuration::deserialize(deserializer)?;
        Self::from_value(&value).map_err(de::Error::custom)
    }
}

/// How multiple sublattices are treated by the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SublatticeMode {
    Interact,
    Split,
}

impl Default for SublatticeMode {
    fn default() -> Self {
        Self::Interact
    }
}

impl SublatticeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interact => "interact",
            Self::Split => "split",
        }
    }
}

impl FromStr for SublatticeMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "interact" => Ok(Self::Interact),
            "split" => Ok(Self::Split),
            _ => Err(ModeParseError::new(KEY_SUBLATTICE_MODE, s, "'split' or 'interact'")),
        }
    }
}

/// How the engine walks the configuration space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationMode {
    Random,
    Systematic,
}

impl Default for IterationMode {
    fn default() -> Self {
        Self::Random
    }
}

impl IterationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Systematic => "systematic",
        }
    }
}

impl FromStr for IterationMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "systematic" => Ok(Self::Systematic),
            _ => Err(ModeParseError::new(KEY_ITERATION_MODE, s, "'random' or 'systematic'")),
        }
    }
}

fn parse_named<T: FromStr<Err = ModeParseError>>(
    key: &'static str,
    value: &Configuration,
    expected: &'static str,
) -> Result<T, ParseError> {
    match value.as_str() {
        Some(s) => s.parse().map_err(|e: ModeParseError| e.into_parse_error(key)),
        None => Err(ModeParseError::new(key, value, expected).into_parse_error(key)),
    }
}

/// Rewrites the mode selectors of `config` into their canonical lowercase
/// spelling. Precision ordinals become `"single"`/`"double"`.
///
/// Fields that are absent stay absent. Non-object documents are returned
/// unchanged; rejecting them is the engine's job.
pub fn normalize_modes(config: &Configuration) -> Result<Configuration, ParseError> {
    let mut normalized = config.clone();
    let Some(fields) = normalized.as_object_mut() else {
        return Ok(normalized);
    };

    if let Some(value) = fields.get_mut(KEY_PRECISION) {
        let precision = Precision::from_value(value).map_err(|e| e.into_parse_error(KEY_PRECISION))?;
        *value = Configuration::from(precision.as_str());
    }
    if let Some(value) = fields.get_mut(KEY_SUBLATTICE_MODE) {
        let mode: SublatticeMode =
            parse_named(KEY_SUBLATTICE_MODE, value, "'split' or 'interact'")?;
        *value = Configuration::from(mode.as_str());
    }
    if let Some(value) = fields.get_mut(KEY_ITERATION_MODE) {
        let mode: IterationMode =
            parse_named(KEY_ITERATION_MODE, value, "'random' or 'systematic'")?;
        *value = Configuration::from(mode.as_str());
    }

    Ok(normalized)
}

/// A configuration the engine has accepted.
///
/// The typed selectors are lifted out of the engine's normalised document;
/// the document itself is kept as the immutable snapshot handed to the
/// optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub precision: Precision,
    pub sublattice_mode: SublatticeMode,
    pub iteration_mode: IterationMode,
    /// `None` for systematic runs, which enumerate the whole space.
    pub iterations: Option<u64>,
    pub document: Configuration,
}

impl RunConfig {
    pub fn from_document(document: Configuration) -> Result<Self, ParseError> {
        let fields = document.as_object().ok_or_else(|| {
            ParseError::new("", "the JSON value is not an object", ParseErrorCode::BadValue)
        })?;

        let precision = match fields.get(KEY_PRECISION) {
            Some(value) => {
                Precision::from_value(value).map_err(|e| e.into_parse_error(KEY_PRECISION))?
            }
            None => Precision::default(),
        };
        let sublattice_mode = match fields.get(KEY_SUBLATTICE_MODE) {
            Some(value) => parse_named(KEY_SUBLATTICE_MODE, value, "'split' or 'interact'")?,
            None => SublatticeMode::default(),
        };
        let iteration_mode = match fields.get(KEY_ITERATION_MODE) {
            Some(value) => parse_named(KEY_ITERATION_MODE, value, "'random' or 'systematic'")?,
            None => IterationMode::default(),
        };
        let iterations = match iteration_mode {
            IterationMode::Systematic => None,
            IterationMode::Random => match fields.get(KEY_ITERATIONS) {
                Some(value) => Some(parse_iterations(value)?),
                None => Some(DEFAULT_ITERATIONS),
            },
        };

        Ok(Self {
            precision,
            sublattice_mode,
            iteration_mode,
            iterations,
            document,
        })
    }

    /// Override the precision, keeping the document's `prec` in step.
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        if let Some(fields) = self.document.as_object_mut() {
            fields.insert(KEY_PRECISION.to_string(), Configuration::from(precision.as_str()));
        }
        self
    }
}

fn parse_iterations(value: &Configuration) -> Result<u64, ParseError> {
    let iterations = value.as_f64().ok_or_else(|| {
        ParseError::new(
            KEY_ITERATIONS,
            format!("iterations must be a number, got {value}"),
            ParseErrorCode::TypeError,
        )
        .with_parameter(KEY_ITERATIONS)
    })?;
    if !iterations.is_finite() || iterations < 1.0 {
        return Err(ParseError::new(
            KEY_ITERATIONS,
            format!("iterations must be a positive number, got {value}"),
            ParseErrorCode::OutOfRange,
        )
        .with_parameter(KEY_ITERATIONS));
    }
    Ok(iterations as u64)
}
