//! Generic year-end batch adjustment names left in AP/AR detail
//! ("YE adj", "Year End Review supplier", ...). These placeholders hide the
//! real supplier/customer breakdown and must be recoded.

use serde_json::{json, Value};

use crate::config::{config_schema, YearEndBatchRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evidence::EvidenceItem;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::rules::name_matches_any;
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    // Historical id; the underscores after "YEAR" are load-bearing for
    // existing client configs.
    rule_id: "BS-AP-AR-YEAR_END_BATCH_ADJUSTMENTS",
    rule_title: "Year-end AP/AR batch adjustments not left as generic supplier/customer",
    best_practices_reference: "Accounts Payable/Receivable → Year End Adjustments",
    sources: &["QBO (Aged Payables/Receivables Detail)"],
};

const SAMPLE_CAP: usize = 25;

fn generic_prefixes() -> [&'static str; 3] {
    ["ye ", "y/e ", "year end"]
}

fn find_generic_names(
    items: &[&serde_json::Map<String, Value>],
    patterns: &[String],
) -> Vec<DetailValue> {
    let mut flagged = Vec::new();
    for item in items {
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        if name.is_empty() {
            continue;
        }
        let lowered = name.to_lowercase();
        let generic = name_matches_any(name, patterns)
            || generic_prefixes().iter().any(|p| lowered.starts_with(p));
        if generic {
            flagged.push(DetailValue::Map(std::collections::BTreeMap::from([(
                "name".to_string(),
                DetailValue::Text(name.to_string()),
            )])));
        }
    }
    flagged
}

pub struct ApArYearEndBatchAdjustments;

impl Rule for ApArYearEndBatchAdjustments {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "YearEndBatchRuleConfig",
            json!({
                "name_patterns": {
                    "type": "array",
                    "items": {"type": "string"},
                    "default": ["yer supplier", "year-end review", "ye adj", "year end", "y/e"],
                },
                "ap_detail_rows_evidence_type": {"type": "string", "default": "ap_aging_detail_rows"},
                "ar_detail_rows_evidence_type": {"type": "string", "default": "ar_aging_detail_rows"},
                "require_evidence_as_of_date_match_period_end": {"type": "boolean", "default": true},
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: YearEndBatchRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let period = ctx.period_end.format("%Y-%m-%d");

        let ap_detail = ctx.evidence.first(&cfg.ap_detail_rows_evidence_type);
        let ar_detail = ctx.evidence.first(&cfg.ar_detail_rows_evidence_type);
        if ap_detail.is_none() && ar_detail.is_none() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary(format!(
                    "No AP/AR aging detail evidence for {period}; not applicable."
                ))
                .build());
        }

        if cfg.require_evidence_as_of_date_match_period_end {
            for (label, item) in [("AP", ap_detail), ("AR", ar_detail)] {
                if let Some(item) = item {
                    if item.as_of_date != Some(ctx.period_end) {
                        return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                            .summary(format!(
                                "{label} aging detail as-of date missing or does not match \
                                 period end; not applicable."
                            ))
                            .evidence(item)
                            .build());
                    }
                }
            }
        }

        fn items_of(item: Option<&EvidenceItem>) -> Option<Option<Vec<&serde_json::Map<String, serde_json::Value>>>> {
            item.map(|i| i.meta_items())
        }
        let ap_items = items_of(ap_detail);
        let ar_items = items_of(ar_detail);
        if ap_items == Some(None) || ar_items == Some(None) {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary("AP/AR aging detail items missing; not applicable.")
                .evidence_opt(ap_detail)
                .evidence_opt(ar_detail)
                .build());
        }

        let ap_flagged =
            find_generic_names(&ap_items.flatten().unwrap_or_default(), &cfg.name_patterns);
        let ar_flagged =
            find_generic_names(&ar_items.flatten().unwrap_or_default(), &cfg.name_patterns);

        let has_flagged = !ap_flagged.is_empty() || !ar_flagged.is_empty();
        let status = if has_flagged {
            RuleStatus::NeedsReview
        } else {
            RuleStatus::Pass
        };
        let summary = if has_flagged {
            "Generic year-end AP/AR batch adjustment names detected; review required."
        } else {
            "No generic year-end AP/AR batch adjustment names detected."
        };
        let human_action = has_flagged.then(|| {
            "Replace generic year-end adjustment names with the proper supplier/customer \
             breakdown and clear the items."
                .to_string()
        });

        let side_detail = |key: &str, message: &str, flagged: Vec<DetailValue>| {
            RuleResultDetail::new(key, message)
                .with("period_end", ctx.period_end)
                .with("flagged_count", flagged.len())
                .with(
                    "flagged_items",
                    flagged.into_iter().take(SAMPLE_CAP).collect::<Vec<_>>(),
                )
                .with("status", status)
        };

        Ok(RuleResult::builder(&SPEC, status)
            .summary(summary)
            .detail(side_detail(
                "ap_generic_names",
                "AP aging detail generic year-end names.",
                ap_flagged,
            ))
            .detail(side_detail(
                "ar_generic_names",
                "AR aging detail generic year-end names.",
                ar_flagged,
            ))
            .evidence_opt(ap_detail)
            .evidence_opt(ar_detail)
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

    fn ctx_with(ap_items: Value) -> crate::context::RuleContext {
        let mut ctx = context(vec![]);
        ctx.evidence.items.push(evidence_with_meta(
            "ap_aging_detail_rows",
            Some(dec!(100)),
            Some(period_end()),
            json!({"items": ap_items}),
        ));
        ctx
    }

    #[test]
    fn ordinary_supplier_names_pass() {
        let ctx = ctx_with(json!([
            {"name": "Acme Industrial", "open_balance": "10"},
            {"name": "Yearling Farms", "open_balance": "20"},
        ]));
        let result = ApArYearEndBatchAdjustments.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
    }

    #[test]
    fn pattern_match_needs_review() {
        let ctx = ctx_with(json!([{"name": "2024 Year-End Review supplier"}]));
        let result = ApArYearEndBatchAdjustments.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        assert_eq!(
            result.details[0].values.get("flagged_count"),
            Some(&DetailValue::Int(1))
        );
    }

    #[test]
    fn ye_prefix_needs_review() {
        let ctx = ctx_with(json!([{"name": "YE accrual batch"}]));
        let result = ApArYearEndBatchAdjustments.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn no_evidence_is_not_applicable() {
        let ctx = context(vec![]);
        let result = ApArYearEndBatchAdjustments.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NotApplicable);
    }

    #[test]
    fn date_mismatch_is_not_applicable() {
        let mut ctx = ctx_with(json!([]));
        ctx.evidence.items[0].as_of_date = Some(crate::rules::testkit::date(2025, 11, 30));
        let result = ApArYearEndBatchAdjustments.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NotApplicable);
    }
}
