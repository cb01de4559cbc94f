//! Clearing accounts outside the current-asset types (payroll clearing,
//! liability-side holding accounts). No tolerance applies here: any
//! non-zero balance fails.

use serde_json::{json, Value};

use crate::config::{config_schema, NonSalesClearingRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::{RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::rules::name_matches_any;
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-CLEARING-ACCOUNTS-NON-SALES-ZERO",
    rule_title: "Non-sales clearing accounts should be zero at period end",
    best_practices_reference: "Clearing accounts (non-sales)",
    sources: &["QBO"],
};

pub struct ClearingAccountsNonSalesZero;

impl Rule for ClearingAccountsNonSalesZero {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "NonSalesClearingRuleConfig",
            json!({
                "name_patterns": {
                    "type": "array",
                    "items": {"type": "string"},
                    "default": ["clearing"],
                },
                "current_asset_types": {"type": "array", "items": {"type": "string"}},
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: NonSalesClearingRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let missing_status = cfg.common.missing_status();

        let clearing_accounts: Vec<_> = ctx
            .balance_sheet
            .leaf_accounts()
            .filter(|a| !a.name.is_empty() && name_matches_any(&a.name, &cfg.name_patterns))
            .collect();
        if clearing_accounts.is_empty() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary("No clearing accounts found on Balance Sheet.")
                .build());
        }

        let mut statuses = Vec::new();
        let mut details = Vec::new();
        let mut non_sales = Vec::new();
        for acct in &clearing_accounts {
            if acct.account_type.trim().is_empty() {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(
                        acct.account_ref.clone(),
                        "Clearing account missing account type; cannot classify sales vs non-sales.",
                    )
                    .with("account_name", acct.name.clone())
                    .with("period_end", ctx.period_end)
                    .with("status", missing_status),
                );
                continue;
            }
            let is_current_asset = cfg
                .current_asset_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(acct.account_type.trim()));
            if !is_current_asset {
                non_sales.push(*acct);
            }
        }

        if non_sales.is_empty() {
            let overall = RuleStatus::worst(statuses);
            let (summary, human_action) = if overall == RuleStatus::NotApplicable {
                (
                    "No non-sales clearing accounts found on Balance Sheet.".to_string(),
                    None,
                )
            } else {
                (
                    "Missing data prevented evaluation of non-sales clearing accounts."
                        .to_string(),
                    Some(
                        "Provide account types for clearing accounts to classify \
                         sales vs non-sales."
                            .to_string(),
                    ),
                )
            };
            return Ok(RuleResult::builder(&SPEC, overall)
                .summary(summary)
                .details(details)
                .maybe_human_action(human_action)
                .build());
        }

        for acct in non_sales {
            let balance_q = cfg.common.quantize(acct.balance);
            let status = if balance_q.is_zero() {
                RuleStatus::Pass
            } else {
                RuleStatus::Fail
            };
            statuses.push(status);
            details.push(
                RuleResultDetail::new(
                    acct.account_ref.clone(),
                    "Non-sales clearing account balance evaluated.",
                )
                .with("account_name", acct.name.clone())
                .with("account_type", acct.account_type.clone())
                .with("period_end", ctx.period_end)
                .with("balance", balance_q)
                .with("status", status),
            );
        }

        let overall = RuleStatus::worst(statuses);
        let period = ctx.period_end.format("%Y-%m-%d");
        let summary = match overall {
            RuleStatus::Pass => {
                format!("All non-sales clearing accounts are zero as of {period}.")
            }
            RuleStatus::Fail => format!(
                "One or more non-sales clearing accounts are non-zero as of {period}."
            ),
            RuleStatus::NeedsReview => {
                format!("Missing data prevented evaluation as of {period}.")
            }
            _ => "Not applicable.".to_string(),
        };
        let human_action = overall.needs_human_action().then(|| {
            "Investigate non-sales clearing account balances and clear them to zero \
             at period end."
                .to_string()
        });

        Ok(RuleResult::builder(&SPEC, overall)
            .summary(summary)
            .details(details)
            .maybe_human_action(human_action)
            .build())
    }
}
