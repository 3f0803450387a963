//! Policy artifact hygiene.
//!
//! With `security.validate_artifacts` enabled, field definitions are scanned
//! for write-policy flags and for sensitive fields exposed to filtering,
//! selection or sorting. Sensitivity is either explicit (`sensitive: true`)
//! or inferred from the field name against a deny-pattern list.

use regex::Regex;

use crate::error::{CompileError, Result};
use crate::query::policy::Policy;

/// Name fragments treated as sensitive when the policy configures none.
pub const DEFAULT_SENSITIVE_PATTERNS: [&str; 6] = [
    "password",
    "password_hash",
    "secret",
    "api_key",
    "access_token",
    "refresh_token",
];

/// Keys that only make sense in write policies.
pub const WRITE_POLICY_KEYS: [&str; 5] = ["writable", "writeable", "updatable", "mutable", "createable"];

/// Whether `unknown_field` should be reported as `field_not_allowed`.
pub fn hardened_field_errors(policy: &Policy) -> bool {
    policy
        .security
        .as_ref()
        .is_some_and(|security| security.hardened_mode)
}

struct SensitiveNames {
    patterns: Vec<Regex>,
}

impl SensitiveNames {
    fn new(configured: &[String]) -> Result<Self> {
        let sources: Vec<String> = if configured.is_empty() {
            DEFAULT_SENSITIVE_PATTERNS
                .iter()
                .map(|pattern| pattern.to_string())
                .collect()
        } else {
            configured.iter().map(|pattern| pattern.to_lowercase()).collect()
        };
        let patterns = sources
            .iter()
            .map(|pattern| {
                Regex::new(&format!(
                    "(^|[^a-z0-9]){}([^a-z0-9]|$)",
                    regex::escape(pattern)
                ))
                .map_err(|_| CompileError::Internal)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    fn matches(&self, field: &str) -> bool {
        let lower = field.to_lowercase();
        self.patterns.iter().any(|pattern| pattern.is_match(&lower))
    }
}

/// Runs artifact validation when the policy enables it.
pub fn validate_policy_artifacts(policy: &Policy) -> Result<()> {
    let Some(security) = policy.security.as_ref().filter(|s| s.validate_artifacts) else {
        return Ok(());
    };
    let names = if security.use_name_heuristics.unwrap_or(true) {
        Some(SensitiveNames::new(&security.sensitive_field_deny_patterns)?)
    } else {
        None
    };

    for (field, def) in &policy.fields {
        if let Some(key) = WRITE_POLICY_KEYS
            .iter()
            .find(|key| def.extra.contains_key(**key))
        {
            return Err(CompileError::WriteFlagInPolicy {
                field: field.clone(),
                key: (*key).to_owned(),
            });
        }

        let sensitive =
            def.sensitive || names.as_ref().is_some_and(|names| names.matches(field));
        if sensitive && (def.filterable || def.selectable || def.sortable) {
            return Err(CompileError::SensitiveFieldExposed {
                field: field.clone(),
            });
        }
    }
    Ok(())
}
