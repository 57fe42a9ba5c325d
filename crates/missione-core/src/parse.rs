//! Inbound payload parsing.
//!
//! Clients submit missions in several shapes: a JSON object, a JSON-encoded
//! string of that object, the dashed text form `"4-12-1-2"`, or raw bytes of
//! either text form. [`parse_mission`] resolves all of them through a single
//! dispatch over the [`Payload`] tagged input. Pure function, no side
//! effects; a rejection is a value, never a fault.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::mission::Mission;

/// Dashed text form: four unsigned integers separated by dashes, optional
/// whitespace around each dash. Negative values are unparseable here on
/// purpose; the object form accepts them.
static DASHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\s*-\s*(\d+)\s*-\s*(\d+)\s*-\s*(\d+)$").expect("dashed-form regex")
});

/// The shapes an inbound mission submission can arrive in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Already-decoded JSON, e.g. an `application/json` request body.
    Json(Value),
    /// Plain text: a JSON-encoded object or the dashed form.
    Text(String),
    /// Raw bytes from a binary frame; decoded best-effort as UTF-8.
    Binary(Vec<u8>),
}

/// Why a payload was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A required key is absent from the object form.
    #[error("missing field `{0}`")]
    MissingField(&'static str),
    /// A key is present but its value is not integer-coercible.
    #[error("field `{0}` is not an integer")]
    InvalidField(&'static str),
    /// The JSON payload is not an object (array, scalar, null).
    #[error("payload is not a JSON object")]
    NotAnObject,
    /// The text matches neither a JSON object nor the dashed form.
    #[error("unrecognized mission payload")]
    Unrecognized,
}

/// Parse any accepted payload shape into a validated [`Mission`].
///
/// Precedence: object form first, then (for text and bytes) one level of
/// JSON-string decoding back into the object form, then the dashed form.
/// A JSON *string* payload (a quoted `application/json` body) carries text,
/// so it runs through the text rules like any other string. No partial
/// records, no default-filling of missing fields.
pub fn parse_mission(payload: &Payload) -> Result<Mission, ParseError> {
    match payload {
        Payload::Json(Value::String(text)) => parse_text(text),
        Payload::Json(value) => parse_object(value),
        Payload::Text(text) => parse_text(text),
        Payload::Binary(bytes) => parse_text(&decode_lossy(bytes)),
    }
}

/// Best-effort UTF-8 decode; invalid sequences are dropped rather than
/// rejecting the whole payload.
fn decode_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\u{FFFD}', "")
}

fn parse_object(value: &Value) -> Result<Mission, ParseError> {
    let Value::Object(map) = value else {
        return Err(ParseError::NotAnObject);
    };
    Ok(Mission {
        scaffale: coerce_field(map, "scaffale")?,
        posto: coerce_field(map, "posto")?,
        livello: coerce_field(map, "livello")?,
        missione: coerce_field(map, "missione")?,
    })
}

fn coerce_field(map: &Map<String, Value>, key: &'static str) -> Result<i64, ParseError> {
    let value = map.get(key).ok_or(ParseError::MissingField(key))?;
    coerce_int(value).ok_or(ParseError::InvalidField(key))
}

/// Integer coercion: numbers (integral floats truncated toward zero) and
/// integer-parseable strings. Anything else rejects.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_text(text: &str) -> Result<Mission, ParseError> {
    let text = text.trim();
    // One level of JSON-string wrapping: only an object recurses; any other
    // JSON value falls through to the dashed form.
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if value.is_object() {
            return parse_object(&value);
        }
    }
    let caps = DASHED.captures(text).ok_or(ParseError::Unrecognized)?;
    let field = |i: usize| caps[i].parse::<i64>().map_err(|_| ParseError::Unrecognized);
    Ok(Mission {
        scaffale: field(1)?,
        posto: field(2)?,
        livello: field(3)?,
        missione: field(4)?,
    })
}
