//! Petty cash tie-out between the books and the client's count sheet.

use serde_json::{json, Value};

use crate::config::{config_schema, PettyCashRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-PETTY-CASH-MATCH",
    rule_title: "Petty cash matches the client's supporting document",
    best_practices_reference: "Petty cash",
    sources: &["QBO", "Client supporting document"],
};

pub struct PettyCashMatch;

impl Rule for PettyCashMatch {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "PettyCashRuleConfig",
            json!({
                "account_ref": {"type": "string"},
                "account_name": {"type": "string"},
                "evidence_type": {"type": "string", "default": "petty_cash_support"},
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: PettyCashRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let period = ctx.period_end.format("%Y-%m-%d");

        if cfg.account_ref.is_empty() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NeedsReview)
                .summary(format!(
                    "Petty cash account not configured for period end {period}."
                ))
                .human_action("Configure the petty cash account ref for this client.")
                .build());
        }

        let Some(bs_balance) = ctx.account_balance(&cfg.account_ref) else {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary(format!(
                    "Petty cash account not found in balance sheet snapshot as of {period}."
                ))
                .detail(
                    RuleResultDetail::new(
                        cfg.account_ref.clone(),
                        "Account not found in balance sheet snapshot.",
                    )
                    .with("account_name", cfg.account_name.clone())
                    .with("period_end", ctx.period_end)
                    .with("status", RuleStatus::NotApplicable),
                )
                .human_action(
                    "Confirm whether petty cash exists in the books and map the correct \
                     petty cash account.",
                )
                .build());
        };

        let evidence_item = ctx.evidence.first(&cfg.evidence_type);
        let support_amount = evidence_item.and_then(|i| i.amount);
        let Some(support_amount) = support_amount else {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NeedsReview)
                .summary(format!(
                    "Missing petty cash supporting document amount for {period}; cannot verify."
                ))
                .evidence_opt(evidence_item)
                .human_action(
                    "Request/attach the petty cash supporting document (or extracted \
                     amount) for this period end.",
                )
                .build());
        };

        let bs_q = cfg.common.quantize(bs_balance);
        let support_q = cfg.common.quantize(support_amount);
        let difference = (bs_q - support_q).abs();

        let (status, summary) = if difference.is_zero() {
            (
                RuleStatus::Pass,
                format!("Petty cash matches exactly as of {period}."),
            )
        } else {
            (
                RuleStatus::Fail,
                format!("Petty cash does not match support as of {period} (diff {difference})."),
            )
        };
        let human_action = (status != RuleStatus::Pass).then(|| {
            "Verify petty cash support and explain the variance; correct entries or \
             update the support."
                .to_string()
        });

        Ok(RuleResult::builder(&SPEC, status)
            .summary(summary)
            .detail(
                RuleResultDetail::new(
                    cfg.account_ref.clone(),
                    "Petty cash compared to supporting document.",
                )
                .with("account_name", cfg.account_name.clone())
                .with("period_end", ctx.period_end)
                .with("bs_balance", bs_q)
                .with("support_amount", support_q)
                .with("difference", difference)
                .with(
                    "evidence_uri",
                    DetailValue::opt_text(evidence_item.and_then(|i| i.uri.as_deref())),
                )
                .with("status", status),
            )
            .evidence_opt(evidence_item)
            .maybe_human_action(human_action)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testkit::{account, configure, context, evidence};
    use crate::status::Severity;
    use rust_decimal_macros::dec;

    fn configured_ctx(balance: rust_decimal::Decimal) -> crate::context::RuleContext {
        let mut ctx = context(vec![account("acct::PC", "Petty Cash", "Bank", "", balance)]);
        configure(
            &mut ctx,
            "BS-PETTY-CASH-MATCH",
            serde_json::json!({"account_ref": "acct::PC", "account_name": "Petty Cash"}),
        );
        ctx
    }

    #[test]
    fn exact_match_passes() {
        let mut ctx = configured_ctx(dec!(200.00));
        ctx.evidence
            .items
            .push(evidence("petty_cash_support", Some(dec!(200.00)), None));
        let result = PettyCashMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
        assert_eq!(result.evidence_used.len(), 1);
    }

    #[test]
    fn mismatch_fails_with_difference() {
        let mut ctx = configured_ctx(dec!(250.00));
        ctx.evidence
            .items
            .push(evidence("petty_cash_support", Some(dec!(200.00)), None));
        let result = PettyCashMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::Fail);
        assert_eq!(result.severity, Severity::High);
        assert_eq!(
            result.details[0].values.get("difference"),
            Some(&DetailValue::Amount(dec!(50.00)))
        );
    }

    #[test]
    fn missing_evidence_needs_review() {
        let ctx = configured_ctx(dec!(250.00));
        let result = PettyCashMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn unconfigured_account_needs_review() {
        let ctx = context(vec![]);
        let result = PettyCashMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        assert!(result.summary.contains("not configured"));
    }

    #[test]
    fn account_missing_from_sheet_is_not_applicable() {
        let mut ctx = context(vec![]);
        configure(
            &mut ctx,
            "BS-PETTY-CASH-MATCH",
            serde_json::json!({"account_ref": "acct::PC"}),
        );
        let result = PettyCashMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NotApplicable);
    }
}
