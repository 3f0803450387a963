//! Pagination parameters.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, Result};
use crate::query::limits::Limits;
use crate::query::normalize::{NormalizedQuery, NormalizedValue};

/// Validated `page[size]` / `page[number]`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Page size, absent when not requested.
    pub size: Option<u64>,
    /// One-based page number, absent when not requested.
    pub number: Option<u64>,
}

fn invalid(parameter: &str) -> CompileError {
    CompileError::PageParameterInvalid {
        parameter: parameter.to_owned(),
    }
}

fn positive_integer(parameter: &str, value: &NormalizedValue, max: u64) -> Result<u64> {
    let NormalizedValue::Text(text) = value else {
        return Err(invalid(parameter));
    };
    let mut chars = text.chars();
    let canonical = matches!(chars.next(), Some('1'..='9')) && chars.all(|ch| ch.is_ascii_digit());
    if !canonical {
        return Err(invalid(parameter));
    }
    match text.parse::<u64>() {
        Ok(number) if number <= max => Ok(number),
        _ => Err(invalid(parameter)),
    }
}

/// Extracts and validates page parameters. Unknown `page[...]` keys are rejected.
pub fn parse_page(query: &NormalizedQuery, limits: &Limits) -> Result<Page> {
    let mut page = Page::default();
    for (key, value) in query.iter().filter(|(key, _)| key.starts_with("page[")) {
        match key.as_str() {
            "page[size]" => page.size = Some(positive_integer(key, value, limits.max_page_size)?),
            "page[number]" => {
                page.number = Some(positive_integer(key, value, limits.max_page_number)?)
            }
            _ => return Err(invalid(key)),
        }
    }
    Ok(page)
}
