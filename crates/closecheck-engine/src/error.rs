//! Error taxonomy for the engine.
//!
//! Only two arms of the review-failure taxonomy surface as Rust errors:
//! - Configuration: a rule's config payload failed validation (bad type or
//!   bad decimal/date literal; unknown fields are ignored).
//! - Internal: an unexpected failure inside a rule body.
//!
//! Both are caught by the runner and converted into a NEEDS_REVIEW result
//! for that rule only; nothing escapes a run. The remaining arms — missing
//! data, unresolvable ambiguity, business mismatches — are ordinary
//! statuses on a result, produced inside the rules themselves.

use thiserror::Error;

/// A rule config payload failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("configuration for rule `{rule_id}` is invalid: {message}")]
pub struct ConfigError {
    pub rule_id: String,
    pub message: String,
}

/// A rule could not produce a business result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("internal rule error: {0}")]
    Internal(String),
}

/// Registration rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate rule id registered: {0}")]
    DuplicateRuleId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display_names_the_rule() {
        let err = ConfigError {
            rule_id: "BS-PETTY-CASH-MATCH".to_string(),
            message: "invalid type: string \"x\", expected a decimal".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("BS-PETTY-CASH-MATCH"));
        assert!(rendered.contains("invalid type"));

        let as_rule_error: RuleError = err.into();
        assert!(matches!(as_rule_error, RuleError::Configuration(_)));
    }
}
