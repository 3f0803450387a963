//! Raw query-string parsing.
//!
//! Splits a percent-encoded query string into a mapping of parameter name to
//! value. Repeated keys accumulate into an ordered list instead of
//! overwriting, so duplicate detection can happen later in the pipeline.

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};

/// Value of a single raw query parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Parameter occurred once.
    Single(String),
    /// Parameter occurred several times, in source order.
    Many(Vec<String>),
}

impl ParamValue {
    /// Returns every value carried by the parameter.
    pub fn values(&self) -> &[String] {
        match self {
            ParamValue::Single(value) => std::slice::from_ref(value),
            ParamValue::Many(values) => values,
        }
    }

    fn push(&mut self, value: String) {
        match self {
            ParamValue::Single(previous) => {
                let first = std::mem::take(previous);
                *self = ParamValue::Many(vec![first, value]);
            }
            ParamValue::Many(values) => values.push(value),
        }
    }
}

/// Parameter name to value mapping produced by [`parse_query_string`] or
/// supplied directly by the caller.
pub type RawParams = BTreeMap<String, ParamValue>;

/// Decodes one query component: `+` becomes a space, then percent-decoding.
pub fn decode_component(raw: &str, parameter: &str) -> Result<String> {
    let malformed = || CompileError::MalformedEncoding {
        parameter: parameter.to_owned(),
    };
    let spaced = raw.replace('+', " ");
    if has_dangling_escape(&spaced) {
        return Err(malformed());
    }
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| malformed())
}

/// `percent_decode_str` passes incomplete escapes through untouched; treat
/// them as malformed instead.
fn has_dangling_escape(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let valid = bytes.len() > idx + 2
                && bytes[idx + 1].is_ascii_hexdigit()
                && bytes[idx + 2].is_ascii_hexdigit();
            if !valid {
                return true;
            }
            idx += 3;
        } else {
            idx += 1;
        }
    }
    false
}

/// Parses a raw query string (optionally prefixed with `?`).
pub fn parse_query_string(raw: &str) -> Result<RawParams> {
    let text = raw.trim();
    let text = text.strip_prefix('?').unwrap_or(text);
    let mut out = RawParams::new();
    for part in text.split('&').filter(|part| !part.is_empty()) {
        let (raw_key, raw_value) = part.split_once('=').unwrap_or((part, ""));
        let key = decode_component(raw_key, "query")?;
        let parameter = if key.is_empty() { "query" } else { key.as_str() };
        let value = decode_component(raw_value, parameter)?;
        match out.get_mut(&key) {
            Some(existing) => existing.push(value),
            None => {
                out.insert(key, ParamValue::Single(value));
            }
        }
    }
    Ok(out)
}

/// Number of key/value pairs, counting each repeated occurrence.
pub fn pair_count(params: &RawParams) -> usize {
    params.values().map(|value| value.values().len()).sum()
}
