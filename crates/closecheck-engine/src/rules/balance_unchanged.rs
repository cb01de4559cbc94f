//! Leaf balances identical to the prior month. An unchanged balance often
//! means a missed accrual, amortization, or revaluation entry.

use serde_json::{json, Value};

use crate::config::{config_schema, BalanceUnchangedRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::{RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-BALANCE-UNCHANGED-PRIOR-MONTH",
    rule_title: "Balances unchanged vs prior month",
    best_practices_reference:
        "Significant balances should be reviewed monthly; unchanged balances can indicate \
         missed updates",
    sources: &["QBO (Balance Sheet)"],
};

pub struct BalanceUnchangedPriorMonth;

impl Rule for BalanceUnchangedPriorMonth {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "BalanceUnchangedRuleConfig",
            json!({
                "include_zero_balances": {"type": "boolean", "default": false},
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: BalanceUnchangedRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }

        let Some(prior) = ctx.prior_balance_sheet.as_ref() else {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary(format!(
                    "Missing prior month Balance Sheet snapshot for {}.",
                    ctx.period_end.format("%Y-%m-%d"),
                ))
                .human_action("Add the prior month Balance Sheet snapshot to enable this review.")
                .build());
        };

        let mut unchanged: Vec<RuleResultDetail> = Vec::new();
        for acct in ctx.balance_sheet.leaf_accounts() {
            let Some(prior_balance) = prior.balance_of(&acct.account_ref) else {
                continue;
            };
            let current_q = cfg.common.quantize(acct.balance);
            let prior_q = cfg.common.quantize(prior_balance);
            if !cfg.include_zero_balances && current_q.is_zero() {
                continue;
            }
            if current_q != prior_q {
                continue;
            }
            unchanged.push(
                RuleResultDetail::new(acct.account_ref.clone(), "SAME (unchanged vs prior month).")
                    .with("account_name", acct.name.clone())
                    .with("period_end", ctx.period_end)
                    .with("prior_period_end", prior.as_of_date)
                    .with("current_balance", current_q)
                    .with("prior_balance", prior_q)
                    .with("flag", "SAME")
                    .with("status", RuleStatus::Warn),
            );
        }

        if unchanged.is_empty() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::Pass)
                .summary(format!(
                    "No unchanged balances detected versus {}.",
                    prior.as_of_date.format("%Y-%m-%d"),
                ))
                .build());
        }

        let count = unchanged.len();
        Ok(RuleResult::builder(&SPEC, RuleStatus::Warn)
            .summary(format!(
                "{count} balance(s) unchanged vs {}.",
                prior.as_of_date.format("%Y-%m-%d"),
            ))
            .details(unchanged)
            .human_action("Confirm whether each unchanged balance is expected for the period.")
            .build())
    }
}
