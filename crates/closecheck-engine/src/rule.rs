//! The rule contract.
//!
//! A rule is a named evaluator: static metadata plus one pure operation
//! `evaluate(context) → result`. Rules must not perform I/O or mutate the
//! context, and must be deterministic for identical inputs. Every rule
//! honors the shared preamble: `enabled=false` yields NOT_APPLICABLE
//! without evaluation, and amounts are quantized when the client configured
//! an increment.

use serde_json::Value;

use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::RuleResult;

/// Static metadata identifying a rule in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleSpec {
    pub rule_id: &'static str,
    pub rule_title: &'static str,
    /// Which best-practices checklist section this rule enforces.
    pub best_practices_reference: &'static str,
    /// Upstream systems the rule's inputs come from.
    pub sources: &'static [&'static str],
}

/// A registered balance-sheet control.
pub trait Rule: Send + Sync {
    /// Catalog metadata.
    fn spec(&self) -> &'static RuleSpec;

    /// JSON-schema-shaped description of this rule's config payload.
    fn config_schema(&self) -> Value;

    /// Evaluate against an immutable context. `Err` is reserved for
    /// configuration and internal failures; every business outcome is `Ok`.
    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError>;

    fn rule_id(&self) -> &'static str {
        self.spec().rule_id
    }

    fn rule_title(&self) -> &'static str {
        self.spec().rule_title
    }
}
