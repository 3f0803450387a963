//! SQL fragments and placeholder renumbering.
//!
//! Each fragment numbers its placeholders locally from `$1`. When fragments
//! are concatenated every `$n` is shifted by the number of values already
//! bound, so the combined statement numbers `$1..$N` without gaps.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::adapter::error::{limit_check, AdapterError, AdapterResult};
use crate::adapter::mapping::AdapterLimits;

/// Fragment metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FragmentMeta {
    /// Sorted, de-duplicated trusted expression ids used by the fragment.
    #[serde(default)]
    pub expression_ids: Vec<String>,
}

/// Parameterized SQL text with locally numbered placeholders.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqlFragment {
    /// SQL text using `$1..$n`.
    pub text: String,
    /// Values for `$1..$n`, in order.
    pub values: Vec<Value>,
    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<FragmentMeta>,
}

impl SqlFragment {
    /// Fragment with no placeholders.
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            values: Vec::new(),
            meta: None,
        }
    }

    /// True when there is no SQL text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Checks fragment size against the adapter limits.
pub fn validate_fragment_shape(fragment: &SqlFragment, limits: &AdapterLimits) -> AdapterResult<()> {
    limit_check(
        "max_fragment_text_length",
        limits.max_fragment_text_length,
        fragment.text.chars().count(),
    )?;
    limit_check(
        "max_fragment_values",
        limits.max_fragment_values,
        fragment.values.len(),
    )
}

/// Rewrites `$n` to `$(offset + n)`.
///
/// Placeholders must be canonical (`$` followed by digits without a leading
/// zero), unique, and cover exactly `1..=values.len()`.
pub fn renumber_placeholders(
    label: &str,
    fragment: &SqlFragment,
    offset: usize,
) -> AdapterResult<SqlFragment> {
    let invalid = |reason: &'static str| AdapterError::FragmentInvalid {
        fragment: label.to_owned(),
        reason,
    };
    let text = fragment.text.as_str();
    let bytes = text.as_bytes();
    let mut seen = BTreeSet::new();
    let mut out = String::with_capacity(text.len() + 8);
    let mut copied = 0;
    let mut idx = 0;

    while idx < bytes.len() {
        if bytes[idx] != b'$' {
            idx += 1;
            continue;
        }
        let start = idx + 1;
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        if end == start {
            return Err(invalid("invalid placeholder token form"));
        }
        let digits = &text[start..end];
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(invalid("placeholder must use canonical numeric form"));
        }
        let local: usize = digits
            .parse()
            .map_err(|_| invalid("placeholder index is invalid"))?;
        if local == 0 {
            return Err(invalid("placeholder index is invalid"));
        }
        if local > fragment.values.len() {
            return Err(invalid("placeholder index exceeds fragment values"));
        }
        if !seen.insert(local) {
            return Err(invalid("duplicate placeholder index"));
        }
        out.push_str(&text[copied..idx]);
        out.push('$');
        out.push_str(&(offset + local).to_string());
        copied = end;
        idx = end;
    }
    out.push_str(&text[copied..]);

    if seen.is_empty() && !fragment.values.is_empty() {
        return Err(invalid("fragment values provided without placeholders"));
    }
    // Every index is in 1..=len and unique, so equal counts means no gaps.
    if seen.len() != fragment.values.len() {
        return Err(invalid("placeholder sequence has gaps"));
    }

    Ok(SqlFragment {
        text: out,
        values: fragment.values.clone(),
        meta: fragment.meta.clone(),
    })
}
