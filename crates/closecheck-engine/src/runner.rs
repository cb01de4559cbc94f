//! The rule runner.
//!
//! Executes every registered rule against one context, in registration
//! order, and aggregates a [`RuleRunReport`]. Each rule runs in isolation:
//! a configuration or internal failure becomes a NEEDS_REVIEW result for
//! that rule alone, never a crashed run. The whole contract of the engine
//! is "always produce a report".
//!
//! The runner also records structured audit events (one per evaluation,
//! plus per-kind counters) that hosts can drain and ship; the report itself
//! stays byte-for-byte deterministic.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::registry::RuleRegistry;
use crate::result::RuleResult;
use crate::rule::Rule;
use crate::status::RuleStatus;

// ---------------------------------------------------------------------------
// RuleRunReport
// ---------------------------------------------------------------------------

/// One full MER run: per-rule results in registration order plus a status
/// histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRunReport {
    pub period_end: NaiveDate,
    pub results: Vec<RuleResult>,
    pub totals: BTreeMap<RuleStatus, u64>,
}

impl RuleRunReport {
    /// Result for `rule_id`, if that rule ran.
    pub fn result(&self, rule_id: &str) -> Option<&RuleResult> {
        self.results.iter().find(|r| r.rule_id == rule_id)
    }

    /// Histogram count for one status.
    pub fn total(&self, status: RuleStatus) -> u64 {
        self.totals.get(&status).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// Structured audit record for one runner action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Event kind: `rule_evaluated` or `rule_isolated`.
    pub event: String,
    pub rule_id: String,
    pub status: String,
}

// ---------------------------------------------------------------------------
// RulesRunner
// ---------------------------------------------------------------------------

/// Executes registered rules against contexts.
pub struct RulesRunner<'a> {
    registry: &'a RuleRegistry,
    events: Vec<RunEvent>,
    event_counts: BTreeMap<String, u64>,
}

impl<'a> RulesRunner<'a> {
    pub fn new(registry: &'a RuleRegistry) -> Self {
        Self {
            registry,
            events: Vec::new(),
            event_counts: BTreeMap::new(),
        }
    }

    /// Run every registered rule against `ctx`.
    pub fn run(&mut self, ctx: &RuleContext) -> RuleRunReport {
        self.run_selected(ctx, None)
    }

    /// Run only the listed rule ids (registration order is preserved).
    pub fn run_rules(&mut self, ctx: &RuleContext, rule_ids: &[&str]) -> RuleRunReport {
        self.run_selected(ctx, Some(rule_ids))
    }

    fn run_selected(&mut self, ctx: &RuleContext, rule_ids: Option<&[&str]>) -> RuleRunReport {
        let mut results = Vec::new();
        for rule in self.registry.iter() {
            if let Some(wanted) = rule_ids {
                if !wanted.contains(&rule.rule_id()) {
                    continue;
                }
            }
            let result = self.evaluate_isolated(rule, ctx);
            self.record(&result);
            results.push(result);
        }

        let mut totals: BTreeMap<RuleStatus, u64> = BTreeMap::new();
        for result in &results {
            *totals.entry(result.status).or_insert(0) += 1;
        }

        RuleRunReport {
            period_end: ctx.period_end,
            results,
            totals,
        }
    }

    fn evaluate_isolated(&mut self, rule: &dyn Rule, ctx: &RuleContext) -> RuleResult {
        match rule.evaluate(ctx) {
            Ok(result) => result,
            Err(RuleError::Configuration(err)) => {
                self.count("rule_isolated");
                RuleResult::builder(rule.spec(), RuleStatus::NeedsReview)
                    .summary(format!("configuration invalid: {err}"))
                    .human_action(
                        "Fix this rule's client configuration payload; \
                         see the summary for the validation failure.",
                    )
                    .build()
            }
            Err(RuleError::Internal(message)) => {
                self.count("rule_isolated");
                RuleResult::builder(rule.spec(), RuleStatus::NeedsReview)
                    .summary(format!("internal error: {message}"))
                    .human_action(
                        "Re-run the review; if the error persists, escalate with the summary.",
                    )
                    .build()
            }
        }
    }

    fn record(&mut self, result: &RuleResult) {
        self.count("rule_evaluated");
        self.events.push(RunEvent {
            event: "rule_evaluated".to_string(),
            rule_id: result.rule_id.clone(),
            status: result.status.to_string(),
        });
    }

    fn count(&mut self, event: &str) {
        *self.event_counts.entry(event.to_string()).or_insert(0) += 1;
    }

    /// Drain accumulated audit events.
    pub fn drain_events(&mut self) -> Vec<RunEvent> {
        std::mem::take(&mut self.events)
    }

    /// Per-kind event counters.
    pub fn event_counts(&self) -> &BTreeMap<String, u64> {
        &self.event_counts
    }
}
