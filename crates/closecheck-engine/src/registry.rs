//! The rule registry.
//!
//! Holds every registered rule in registration order; the runner executes
//! in this order and the catalog enumerates it. Registration is explicit —
//! call [`crate::rules::register_builtin_rules`] (or
//! [`RuleRegistry::with_builtin_rules`]) at startup rather than relying on
//! construction side effects — and duplicate ids are rejected loudly.

use std::collections::BTreeSet;

use crate::error::RegistryError;
use crate::rule::Rule;

/// Ordered collection of registered rules.
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Box<dyn Rule>>,
    ids: BTreeSet<&'static str>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in balance-sheet catalog.
    pub fn with_builtin_rules() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        crate::rules::register_builtin_rules(&mut registry)?;
        Ok(registry)
    }

    /// Register a rule; rejects a second rule with the same id.
    pub fn register(&mut self, rule: Box<dyn Rule>) -> Result<(), RegistryError> {
        let rule_id = rule.rule_id();
        if !self.ids.insert(rule_id) {
            return Err(RegistryError::DuplicateRuleId(rule_id.to_string()));
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Rules in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    /// Rule ids in registration order.
    pub fn ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.rule_id()).collect()
    }

    /// Look a rule up by id.
    pub fn get(&self, rule_id: &str) -> Option<&dyn Rule> {
        self.rules
            .iter()
            .find(|r| r.rule_id() == rule_id)
            .map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("rules", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuleContext;
    use crate::error::RuleError;
    use crate::result::RuleResult;
    use crate::rule::RuleSpec;
    use crate::status::RuleStatus;
    use serde_json::Value;

    static SPEC_A: RuleSpec = RuleSpec {
        rule_id: "BS-TEST-A",
        rule_title: "A",
        best_practices_reference: "",
        sources: &[],
    };

    struct StubRule(&'static RuleSpec);

    impl Rule for StubRule {
        fn spec(&self) -> &'static RuleSpec {
            self.0
        }

        fn config_schema(&self) -> Value {
            Value::Null
        }

        fn evaluate(&self, _ctx: &RuleContext) -> Result<RuleResult, RuleError> {
            Ok(RuleResult::builder(self.0, RuleStatus::Pass).build())
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = RuleRegistry::new();
        registry.register(Box::new(StubRule(&SPEC_A))).expect("first");
        let err = registry
            .register(Box::new(StubRule(&SPEC_A)))
            .expect_err("duplicate");
        assert_eq!(err, RegistryError::DuplicateRuleId("BS-TEST-A".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn builtin_registration_is_ordered_and_unique() {
        let registry = RuleRegistry::with_builtin_rules().expect("builtin");
        let ids = registry.ids();
        assert!(ids.len() >= 20, "catalog has {} rules", ids.len());
        let unique: std::collections::BTreeSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        // Registering the builtins twice must fail loudly.
        let mut registry = RuleRegistry::with_builtin_rules().expect("builtin");
        assert!(crate::rules::register_builtin_rules(&mut registry).is_err());
        assert!(registry.get(ids[0]).is_some());
    }
}
