//! Rule statuses, severities, and the worst-wins aggregation lattice.
//!
//! Invariants:
//! - The lattice order is `FAIL > NEEDS_REVIEW > WARN > PASS >
//!   NOT_APPLICABLE`; every rule that aggregates per-account sub-results
//!   combines them with [`RuleStatus::worst`].
//! - Severity is a fixed derivative of status. Status already encodes
//!   urgency; severity exists so callers can sort and route without knowing
//!   rule internals.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RuleStatus
// ---------------------------------------------------------------------------

/// Outcome of evaluating one rule (or one per-account sub-check).
///
/// Variants are declared in ascending lattice order so that `Ord` is the
/// worst-wins ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleStatus {
    /// Rule does not apply to this client/period.
    NotApplicable,
    /// All checks passed exactly.
    Pass,
    /// Condition holds only within a configured tolerance, or a disclosure
    /// the reviewer should see.
    Warn,
    /// Data was missing, ambiguous, or invalid; a human must look.
    NeedsReview,
    /// A business condition is violated.
    Fail,
}

impl RuleStatus {
    /// Worst status across `statuses` per the lattice; an empty iterator
    /// yields `NotApplicable`.
    pub fn worst<I: IntoIterator<Item = RuleStatus>>(statuses: I) -> RuleStatus {
        statuses
            .into_iter()
            .max()
            .unwrap_or(RuleStatus::NotApplicable)
    }

    /// Whether this outcome requires a `human_action` on the result.
    pub fn needs_human_action(self) -> bool {
        matches!(
            self,
            RuleStatus::Warn | RuleStatus::NeedsReview | RuleStatus::Fail
        )
    }

    /// Canonical wire string (`"PASS"`, `"NEEDS_REVIEW"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            RuleStatus::NotApplicable => "NOT_APPLICABLE",
            RuleStatus::Pass => "PASS",
            RuleStatus::Warn => "WARN",
            RuleStatus::NeedsReview => "NEEDS_REVIEW",
            RuleStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Triage severity derived from status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => f.write_str("INFO"),
            Severity::Low => f.write_str("LOW"),
            Severity::Medium => f.write_str("MEDIUM"),
            Severity::High => f.write_str("HIGH"),
            Severity::Critical => f.write_str("CRITICAL"),
        }
    }
}

/// Fixed status → severity mapping (firm policy).
pub fn severity_for_status(status: RuleStatus) -> Severity {
    match status {
        RuleStatus::Pass => Severity::Info,
        RuleStatus::Warn => Severity::Low,
        RuleStatus::Fail => Severity::High,
        RuleStatus::NeedsReview => Severity::Medium,
        RuleStatus::NotApplicable => Severity::Info,
    }
}

// ---------------------------------------------------------------------------
// MissingDataPolicy
// ---------------------------------------------------------------------------

/// Where a rule routes "required input absent" outcomes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingDataPolicy {
    #[default]
    NeedsReview,
    NotApplicable,
}

impl MissingDataPolicy {
    pub fn as_status(self) -> RuleStatus {
        match self {
            MissingDataPolicy::NeedsReview => RuleStatus::NeedsReview,
            MissingDataPolicy::NotApplicable => RuleStatus::NotApplicable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- Lattice --

    #[test]
    fn worst_follows_lattice_order() {
        assert_eq!(
            RuleStatus::worst([RuleStatus::Pass, RuleStatus::Warn]),
            RuleStatus::Warn
        );
        assert_eq!(
            RuleStatus::worst([RuleStatus::Warn, RuleStatus::NeedsReview]),
            RuleStatus::NeedsReview
        );
        assert_eq!(
            RuleStatus::worst([
                RuleStatus::NeedsReview,
                RuleStatus::Fail,
                RuleStatus::Pass
            ]),
            RuleStatus::Fail
        );
        assert_eq!(
            RuleStatus::worst([RuleStatus::NotApplicable, RuleStatus::Pass]),
            RuleStatus::Pass
        );
    }

    #[test]
    fn worst_of_empty_is_not_applicable() {
        assert_eq!(RuleStatus::worst([]), RuleStatus::NotApplicable);
    }

    // -- Severity mapping --

    #[test]
    fn severity_is_fixed_per_status() {
        assert_eq!(severity_for_status(RuleStatus::Pass), Severity::Info);
        assert_eq!(severity_for_status(RuleStatus::Warn), Severity::Low);
        assert_eq!(severity_for_status(RuleStatus::Fail), Severity::High);
        assert_eq!(
            severity_for_status(RuleStatus::NeedsReview),
            Severity::Medium
        );
        assert_eq!(
            severity_for_status(RuleStatus::NotApplicable),
            Severity::Info
        );
    }

    // -- Wire format --

    #[test]
    fn status_serializes_as_screaming_snake() {
        let json = serde_json::to_string(&RuleStatus::NeedsReview).expect("serialize");
        assert_eq!(json, "\"NEEDS_REVIEW\"");
        let restored: RuleStatus = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, RuleStatus::NeedsReview);
    }

    #[test]
    fn missing_data_policy_default_is_needs_review() {
        assert_eq!(
            MissingDataPolicy::default().as_status(),
            RuleStatus::NeedsReview
        );
    }
}
