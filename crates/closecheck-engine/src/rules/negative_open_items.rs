//! Negative open AP/AR items (credits, overpayments, miscoded entries).

use serde_json::{json, Value};

use crate::amount::parse_decimal;
use crate::config::{config_schema, NegativeOpenItemsRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evidence::EvidenceItem;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-AP-AR-NEGATIVE-OPEN-ITEMS",
    rule_title: "Negative open AP/AR items identified",
    best_practices_reference: "Accounts Payable/Receivable",
    sources: &["QBO (Aged Payables/Receivables Detail)"],
};

const SAMPLE_CAP: usize = 25;

fn negative_open_items(items: &[&serde_json::Map<String, Value>]) -> Vec<DetailValue> {
    let mut out = Vec::new();
    for item in items {
        let Some(balance) = item.get("open_balance").and_then(parse_decimal) else {
            continue;
        };
        if balance.is_sign_negative() && !balance.is_zero() {
            let name = ["name", "vendor", "customer"]
                .iter()
                .find_map(|k| item.get(*k).and_then(Value::as_str))
                .unwrap_or("")
                .to_string();
            out.push(DetailValue::Map(std::collections::BTreeMap::from([
                ("name".to_string(), DetailValue::Text(name)),
                ("open_balance".to_string(), DetailValue::Amount(balance)),
            ])));
        }
    }
    out
}

pub struct ApArNegativeOpenItems;

impl Rule for ApArNegativeOpenItems {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "NegativeOpenItemsRuleConfig",
            json!({
                "ap_detail_rows_evidence_type": {"type": "string", "default": "ap_aging_detail_rows"},
                "ar_detail_rows_evidence_type": {"type": "string", "default": "ar_aging_detail_rows"},
                "require_evidence_as_of_date_match_period_end": {"type": "boolean", "default": true},
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: NegativeOpenItemsRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let missing_status = cfg.common.missing_status();
        let period = ctx.period_end.format("%Y-%m-%d");

        let missing = |label: &str, item: Option<&EvidenceItem>| {
            RuleResult::builder(&SPEC, missing_status)
                .summary(format!(
                    "Missing {label} aging detail rows for {period}; cannot verify."
                ))
                .evidence_opt(item)
                .human_action(format!(
                    "Provide {label} aging detail report rows as of period end."
                ))
                .build()
        };

        let ap_detail = ctx.evidence.first(&cfg.ap_detail_rows_evidence_type);
        let ar_detail = ctx.evidence.first(&cfg.ar_detail_rows_evidence_type);
        let Some(ap_detail) = ap_detail.filter(|i| i.amount.is_some()) else {
            return Ok(missing("AP", ap_detail));
        };
        let Some(ar_detail) = ar_detail.filter(|i| i.amount.is_some()) else {
            return Ok(missing("AR", ar_detail));
        };

        if cfg.require_evidence_as_of_date_match_period_end {
            for (label, item) in [("AP", ap_detail), ("AR", ar_detail)] {
                if item.as_of_date != Some(ctx.period_end) {
                    return Ok(RuleResult::builder(&SPEC, missing_status)
                        .summary(format!(
                            "{label} aging detail as-of date is missing or does not match \
                             period end; cannot verify."
                        ))
                        .evidence(item)
                        .human_action(format!(
                            "Provide the {label} aging detail report as of the period end date."
                        ))
                        .build());
                }
            }
        }

        let (Some(ap_items), Some(ar_items)) = (ap_detail.meta_items(), ar_detail.meta_items())
        else {
            return Ok(RuleResult::builder(&SPEC, missing_status)
                .summary("Missing AP/AR aging detail items; cannot verify.")
                .evidence(ap_detail)
                .evidence(ar_detail)
                .human_action(
                    "Provide AP/AR aging detail items (with open balance) as of period end.",
                )
                .build());
        };

        let ap_negatives = negative_open_items(&ap_items);
        let ar_negatives = negative_open_items(&ar_items);
        let has_negatives = !ap_negatives.is_empty() || !ar_negatives.is_empty();
        let status = if has_negatives {
            RuleStatus::NeedsReview
        } else {
            RuleStatus::Pass
        };
        let summary = if has_negatives {
            "Negative open AP/AR items detected; review credits/overpayments."
        } else {
            "No negative open AP/AR items detected."
        };
        let human_action = has_negatives.then(|| {
            "Investigate negative open balances (credits/overpayments) and document support."
                .to_string()
        });

        let side_detail = |key: &str, message: &str, negatives: Vec<DetailValue>| {
            RuleResultDetail::new(key, message)
                .with("period_end", ctx.period_end)
                .with("negative_item_count", negatives.len())
                .with(
                    "negative_items",
                    negatives.into_iter().take(SAMPLE_CAP).collect::<Vec<_>>(),
                )
                .with("status", status)
        };

        Ok(RuleResult::builder(&SPEC, status)
            .summary(summary)
            .detail(side_detail(
                "ap_negative_open_items",
                "AP negative open items.",
                ap_negatives,
            ))
            .detail(side_detail(
                "ar_negative_open_items",
                "AR negative open items.",
                ar_negatives,
            ))
            .evidence(ap_detail)
            .evidence(ar_detail)
            .maybe_human_action(human_action)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testkit::{context, evidence_with_meta, period_end};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn ctx_with(ap_items: Value, ar_items: Value) -> crate::context::RuleContext {
        let mut ctx = context(vec![]);
        ctx.evidence.items.push(evidence_with_meta(
            "ap_aging_detail_rows",
            Some(dec!(100)),
            Some(period_end()),
            json!({"items": ap_items}),
        ));
        ctx.evidence.items.push(evidence_with_meta(
            "ar_aging_detail_rows",
            Some(dec!(100)),
            Some(period_end()),
            json!({"items": ar_items}),
        ));
        ctx
    }

    #[test]
    fn all_positive_open_balances_pass() {
        let ctx = ctx_with(
            json!([{"name": "Vendor", "open_balance": "55.00"}]),
            json!([{"name": "Customer", "open_balance": 12.5}]),
        );
        let result = ApArNegativeOpenItems.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
    }

    #[test]
    fn negative_open_balance_needs_review() {
        let ctx = ctx_with(
            json!([{"name": "Vendor", "open_balance": "-25.00"}]),
            json!([]),
        );
        let result = ApArNegativeOpenItems.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        assert_eq!(
            result.details[0].values.get("negative_item_count"),
            Some(&DetailValue::Int(1))
        );
        assert_eq!(
            result.details[1].values.get("negative_item_count"),
            Some(&DetailValue::Int(0))
        );
    }

    #[test]
    fn missing_report_routes_to_missing_policy() {
        let ctx = context(vec![]);
        let result = ApArNegativeOpenItems.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn as_of_mismatch_routes_to_missing_policy() {
        let mut ctx = ctx_with(json!([]), json!([]));
        ctx.evidence.items[1].as_of_date = Some(crate::rules::testkit::date(2025, 11, 30));
        let result = ApArNegativeOpenItems.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        assert!(result.summary.contains("AR"));
    }

    #[test]
    fn rows_without_items_meta_route_to_missing_policy() {
        let mut ctx = context(vec![]);
        ctx.evidence.items.push(evidence_with_meta(
            "ap_aging_detail_rows",
            Some(dec!(100)),
            Some(period_end()),
            json!({}),
        ));
        ctx.evidence.items.push(evidence_with_meta(
            "ar_aging_detail_rows",
            Some(dec!(100)),
            Some(period_end()),
            json!({"items": []}),
        ));
        let result = ApArNegativeOpenItems.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }
}
