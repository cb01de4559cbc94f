//! AP/AR open items older than the aging threshold, plus a summary-vs-detail
//! cross-check of the over-threshold reports.
//!
//! Age is judged by `txn_date` when present, otherwise by the adapter's
//! `days_past_due` / `age_days`, an explicit `over_threshold` flag, or the
//! aging bucket label. Items with an amount but no age signal at all make
//! the report unusable and route to the missing-data policy.

use std::collections::BTreeMap;

use chrono::Duration;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::amount::parse_decimal;
use crate::calendar::parse_date;
use crate::config::{config_schema, AgedItemsRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evidence::EvidenceItem;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-AP-AR-ITEMS-OLDER-THAN-60-DAYS",
    rule_title: "AP/AR items older than 60 days flagged",
    best_practices_reference: "Accounts Payable/Receivable",
    sources: &["QBO (AP/AR Aging Summary + Detail)"],
};

const SAMPLE_CAP: usize = 25;

struct OverItem {
    name: String,
    amount: Decimal,
    fields: BTreeMap<String, DetailValue>,
}

fn item_name(item: &serde_json::Map<String, Value>) -> String {
    for key in ["name", "vendor", "customer"] {
        if let Some(Value::String(s)) = item.get(key) {
            if !s.trim().is_empty() {
                return s.trim().to_string();
            }
        }
    }
    String::new()
}

fn age_days(item: &serde_json::Map<String, Value>) -> Option<i64> {
    for key in ["days_past_due", "age_days"] {
        match item.get(key) {
            Some(Value::Number(n)) => return n.as_i64(),
            Some(Value::String(s)) => return s.trim().parse::<i64>().ok(),
            _ => {}
        }
    }
    None
}

fn filter_over_threshold(
    items: &[&serde_json::Map<String, Value>],
    cutoff: chrono::NaiveDate,
    threshold_days: i64,
) -> (Vec<OverItem>, usize) {
    let mut over = Vec::new();
    let mut invalid_count = 0usize;
    for item in items {
        let txn_date = ["txn_date", "date", "transaction_date"]
            .iter()
            .find_map(|key| item.get(*key).and_then(parse_date));
        let amount = item.get("amount").and_then(parse_decimal);
        let days = age_days(item);
        let bucket = item
            .get("age_bucket")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_lowercase();
        let over_flag = item.get("over_threshold") == Some(&Value::Bool(true));

        let has_age = txn_date.is_some() || days.is_some() || !bucket.is_empty() || over_flag;
        let Some(amount) = amount else {
            invalid_count += 1;
            continue;
        };
        if !has_age {
            invalid_count += 1;
            continue;
        }

        let is_over = if let Some(txn_date) = txn_date {
            txn_date < cutoff
        } else if let Some(days) = days {
            days >= threshold_days
        } else if over_flag {
            true
        } else {
            bucket.contains("61") || bucket.contains("90") || bucket.contains("over")
        };
        if !is_over {
            continue;
        }

        let name = item_name(item);
        let mut fields = BTreeMap::new();
        fields.insert(
            "id".to_string(),
            DetailValue::Text(
                ["id", "txn_id"]
                    .iter()
                    .find_map(|k| item.get(*k).and_then(Value::as_str))
                    .unwrap_or("")
                    .to_string(),
            ),
        );
        fields.insert("name".to_string(), DetailValue::Text(name.clone()));
        fields.insert("txn_date".to_string(), DetailValue::opt_date(txn_date));
        fields.insert("amount".to_string(), DetailValue::Amount(amount));
        fields.insert(
            "age_bucket".to_string(),
            item.get("age_bucket")
                .map(DetailValue::from_json)
                .unwrap_or(DetailValue::Null),
        );
        over.push(OverItem {
            name,
            amount,
            fields,
        });
    }
    (over, invalid_count)
}

fn totals_by_name(items: &[&serde_json::Map<String, Value>]) -> BTreeMap<String, Decimal> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for item in items {
        let name = item_name(item);
        let Some(amount) = item.get("amount").and_then(parse_decimal) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        *totals.entry(name).or_insert(Decimal::ZERO) += amount;
    }
    totals
}

fn over_totals_by_name(items: &[OverItem]) -> BTreeMap<String, Decimal> {
    let mut totals: BTreeMap<String, Decimal> = BTreeMap::new();
    for item in items {
        if item.name.is_empty() {
            continue;
        }
        *totals.entry(item.name.clone()).or_insert(Decimal::ZERO) += item.amount;
    }
    totals
}

fn diff_by_name(
    detail_totals: &BTreeMap<String, Decimal>,
    summary_totals: &BTreeMap<String, Decimal>,
) -> Vec<DetailValue> {
    let mut names: Vec<&String> = detail_totals.keys().chain(summary_totals.keys()).collect();
    names.sort();
    names.dedup();
    let mut diffs = Vec::new();
    for name in names {
        let d = detail_totals.get(name).copied().unwrap_or(Decimal::ZERO);
        let s = summary_totals.get(name).copied().unwrap_or(Decimal::ZERO);
        if d != s {
            diffs.push(DetailValue::Map(BTreeMap::from([
                ("name".to_string(), DetailValue::Text(name.clone())),
                ("detail_total".to_string(), DetailValue::Amount(d)),
                ("summary_total".to_string(), DetailValue::Amount(s)),
                ("difference".to_string(), DetailValue::Amount((d - s).abs())),
            ])));
        }
    }
    diffs
}

fn total_row(calc: Decimal, summary: Decimal) -> DetailValue {
    DetailValue::Map(BTreeMap::from([
        ("name".to_string(), DetailValue::Text("__TOTAL__".to_string())),
        ("detail_total".to_string(), DetailValue::Amount(calc)),
        ("summary_total".to_string(), DetailValue::Amount(summary)),
        (
            "difference".to_string(),
            DetailValue::Amount((calc - summary).abs()),
        ),
    ]))
}

fn missing_result(ctx: &RuleContext, status: RuleStatus, label: &str, item: Option<&EvidenceItem>) -> RuleResult {
    RuleResult::builder(&SPEC, status)
        .summary(format!(
            "Missing {label} aging total for {}; cannot verify.",
            ctx.period_end.format("%Y-%m-%d"),
        ))
        .evidence_opt(item)
        .human_action("Provide AP/AR aging summary and detail totals as of period end.")
        .build()
}

pub struct ApArItemsOlderThanThreshold;

impl Rule for ApArItemsOlderThanThreshold {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "AgedItemsRuleConfig",
            json!({
                "age_threshold_days": {"type": "integer", "default": 60},
                "ap_summary_evidence_type": {"type": "string", "default": "ap_aging_summary_over_60"},
                "ap_detail_evidence_type": {"type": "string", "default": "ap_aging_detail_over_60"},
                "ar_summary_evidence_type": {"type": "string", "default": "ar_aging_summary_over_60"},
                "ar_detail_evidence_type": {"type": "string", "default": "ar_aging_detail_over_60"},
                "require_evidence_as_of_date_match_period_end": {"type": "boolean", "default": true},
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: AgedItemsRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let missing_status = cfg.common.missing_status();
        let threshold_days = cfg.age_threshold_days.max(0);
        let cutoff = ctx.period_end - Duration::days(threshold_days);

        let mut checked: Vec<&EvidenceItem> = Vec::new();
        let required = [
            ("AP summary", ctx.evidence.first(&cfg.ap_summary_evidence_type)),
            ("AP detail", ctx.evidence.first(&cfg.ap_detail_evidence_type)),
            ("AR summary", ctx.evidence.first(&cfg.ar_summary_evidence_type)),
            ("AR detail", ctx.evidence.first(&cfg.ar_detail_evidence_type)),
        ];
        for (label, item) in required {
            let Some(item) = item else {
                return Ok(missing_result(ctx, missing_status, label, None));
            };
            if item.amount.is_none() {
                return Ok(missing_result(ctx, missing_status, label, Some(item)));
            }
            if cfg.require_evidence_as_of_date_match_period_end
                && item.as_of_date != Some(ctx.period_end)
            {
                return Ok(RuleResult::builder(&SPEC, missing_status)
                    .summary(format!(
                        "{label} aging report as-of date is missing or does not match \
                         period end; cannot verify."
                    ))
                    .evidence(item)
                    .human_action("Provide AP/AR aging reports as of the period end date.")
                    .build());
            }
            checked.push(item);
        }
        let (ap_summary, ap_detail, ar_summary, ar_detail) =
            (checked[0], checked[1], checked[2], checked[3]);

        let items = [
            ap_summary.meta_items(),
            ap_detail.meta_items(),
            ar_summary.meta_items(),
            ar_detail.meta_items(),
        ];
        let (Some(ap_summary_items), Some(ap_detail_items), Some(ar_summary_items), Some(ar_detail_items)) = (
            items[0].clone(),
            items[1].clone(),
            items[2].clone(),
            items[3].clone(),
        ) else {
            return Ok(RuleResult::builder(&SPEC, missing_status)
                .summary("Missing item-level metadata for AP/AR aging reports; cannot verify.")
                .evidence(ap_summary)
                .evidence(ap_detail)
                .evidence(ar_summary)
                .evidence(ar_detail)
                .human_action(
                    "Provide item-level metadata for AP/AR aging reports (items older \
                     than threshold).",
                )
                .build());
        };

        let (ap_over, ap_invalid) =
            filter_over_threshold(&ap_detail_items, cutoff, threshold_days);
        let (ar_over, ar_invalid) =
            filter_over_threshold(&ar_detail_items, cutoff, threshold_days);
        if ap_invalid > 0 || ar_invalid > 0 {
            return Ok(RuleResult::builder(&SPEC, missing_status)
                .summary("Some AP/AR detail items are missing dates or amounts; cannot verify.")
                .evidence(ap_detail)
                .evidence(ar_detail)
                .human_action("Ensure AP/AR detail items include valid dates and amounts.")
                .build());
        }

        let ap_detail_totals = over_totals_by_name(&ap_over);
        let ar_detail_totals = over_totals_by_name(&ar_over);
        let ap_summary_totals = totals_by_name(&ap_summary_items);
        let ar_summary_totals = totals_by_name(&ar_summary_items);

        let mut ap_discrepancies = diff_by_name(&ap_detail_totals, &ap_summary_totals);
        let mut ar_discrepancies = diff_by_name(&ar_detail_totals, &ar_summary_totals);

        let quantize = |v: Decimal| cfg.common.quantize(v);
        let ap_over_total = quantize(ap_detail.amount.unwrap_or(Decimal::ZERO));
        let ar_over_total = quantize(ar_detail.amount.unwrap_or(Decimal::ZERO));
        let ap_summary_total = quantize(ap_summary.amount.unwrap_or(Decimal::ZERO));
        let ar_summary_total = quantize(ar_summary.amount.unwrap_or(Decimal::ZERO));
        let ap_calc_total: Decimal = ap_detail_totals.values().copied().sum();
        let ar_calc_total: Decimal = ar_detail_totals.values().copied().sum();
        if ap_calc_total != ap_over_total || ap_calc_total != ap_summary_total {
            ap_discrepancies.push(total_row(ap_calc_total, ap_summary_total));
        }
        if ar_calc_total != ar_over_total || ar_calc_total != ar_summary_total {
            ar_discrepancies.push(total_row(ar_calc_total, ar_summary_total));
        }

        let has_old = !ap_over.is_empty() || !ar_over.is_empty();
        let has_discrepancy = !ap_discrepancies.is_empty() || !ar_discrepancies.is_empty();
        let (status, summary, human_action) = if has_old || has_discrepancy {
            (
                RuleStatus::NeedsReview,
                "AP/AR items older than threshold detected or report discrepancies found."
                    .to_string(),
                Some(
                    "Review AP/AR items older than the threshold and reconcile summary vs \
                     detail report discrepancies."
                        .to_string(),
                ),
            )
        } else {
            (
                RuleStatus::Pass,
                "No AP/AR items older than the threshold and reports reconcile.".to_string(),
                None,
            )
        };

        let side_detail = |key: &str,
                           message: &str,
                           over: &[OverItem],
                           invalid: usize,
                           over_total: Decimal,
                           summary_total: Decimal,
                           discrepancies: Vec<DetailValue>| {
            let sample: Vec<DetailValue> = over
                .iter()
                .take(SAMPLE_CAP)
                .map(|i| DetailValue::Map(i.fields.clone()))
                .collect();
            RuleResultDetail::new(key, message)
                .with("period_end", ctx.period_end)
                .with("threshold_days", threshold_days as usize)
                .with("cutoff_date", cutoff)
                .with("over_threshold_count", over.len())
                .with("over_threshold_items", sample)
                .with("invalid_items_count", invalid)
                .with("detail_total_over_threshold", over_total)
                .with("summary_total_over_threshold", summary_total)
                .with("discrepancies", discrepancies)
                .with("status", status)
        };

        Ok(RuleResult::builder(&SPEC, status)
            .summary(summary)
            .detail(side_detail(
                "ap_over_60",
                "AP items older than threshold.",
                &ap_over,
                ap_invalid,
                ap_over_total,
                ap_summary_total,
                ap_discrepancies,
            ))
            .detail(side_detail(
                "ar_over_60",
                "AR items older than threshold.",
                &ar_over,
                ar_invalid,
                ar_over_total,
                ar_summary_total,
                ar_discrepancies,
            ))
            .evidence(ap_summary)
            .evidence(ap_detail)
            .evidence(ar_summary)
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

    fn four_reports(
        ap_summary_items: Value,
        ap_detail_items: Value,
        ap_amounts: (Decimal, Decimal),
    ) -> crate::context::RuleContext {
        let mut ctx = context(vec![]);
        ctx.evidence.items.push(evidence_with_meta(
            "ap_aging_summary_over_60",
            Some(ap_amounts.0),
            Some(period_end()),
            json!({"items": ap_summary_items}),
        ));
        ctx.evidence.items.push(evidence_with_meta(
            "ap_aging_detail_over_60",
            Some(ap_amounts.1),
            Some(period_end()),
            json!({"items": ap_detail_items}),
        ));
        ctx.evidence.items.push(evidence_with_meta(
            "ar_aging_summary_over_60",
            Some(dec!(0)),
            Some(period_end()),
            json!({"items": []}),
        ));
        ctx.evidence.items.push(evidence_with_meta(
            "ar_aging_detail_over_60",
            Some(dec!(0)),
            Some(period_end()),
            json!({"items": []}),
        ));
        ctx
    }

    #[test]
    fn clean_reports_pass() {
        // Period end 2025-12-31, cutoff 2025-11-01; the only item is recent.
        let ctx = four_reports(
            json!([]),
            json!([{"name": "Vendor A", "amount": "100.00", "txn_date": "2025-12-05"}]),
            (dec!(0), dec!(0)),
        );
        let result = ApArItemsOlderThanThreshold.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
        assert_eq!(result.evidence_used.len(), 4);
    }

    #[test]
    fn old_item_by_txn_date_needs_review() {
        let ctx = four_reports(
            json!([{"name": "Vendor A", "amount": "100.00"}]),
            json!([{"name": "Vendor A", "amount": "100.00", "txn_date": "2025-09-15"}]),
            (dec!(100.00), dec!(100.00)),
        );
        let result = ApArItemsOlderThanThreshold.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        let ap = &result.details[0];
        assert_eq!(ap.values.get("over_threshold_count"), Some(&DetailValue::Int(1)));
        assert_eq!(
            ap.values.get("cutoff_date"),
            Some(&DetailValue::Text("2025-11-01".to_string()))
        );
    }

    #[test]
    fn old_item_by_age_bucket_needs_review() {
        let ctx = four_reports(
            json!([{"name": "Vendor B", "amount": "40.00"}]),
            json!([{"name": "Vendor B", "amount": "40.00", "age_bucket": "91 and over"}]),
            (dec!(40.00), dec!(40.00)),
        );
        let result = ApArItemsOlderThanThreshold.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn summary_detail_name_discrepancy_needs_review() {
        // No items over threshold, but the summary names a vendor the detail
        // does not.
        let ctx = four_reports(
            json!([{"name": "Vendor C", "amount": "75.00"}]),
            json!([]),
            (dec!(75.00), dec!(0)),
        );
        let result = ApArItemsOlderThanThreshold.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        let ap = &result.details[0];
        match ap.values.get("discrepancies") {
            Some(DetailValue::List(diffs)) => assert!(!diffs.is_empty()),
            other => panic!("unexpected discrepancies: {other:?}"),
        }
    }

    #[test]
    fn item_without_age_signal_routes_to_missing_policy() {
        let ctx = four_reports(
            json!([]),
            json!([{"name": "Vendor D", "amount": "10.00"}]),
            (dec!(0), dec!(0)),
        );
        let result = ApArItemsOlderThanThreshold.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn missing_report_routes_to_missing_policy() {
        let ctx = context(vec![]);
        let result = ApArItemsOlderThanThreshold.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        assert!(result.summary.contains("AP summary"));
    }

    #[test]
    fn as_of_mismatch_routes_to_missing_policy() {
        let mut ctx = four_reports(json!([]), json!([]), (dec!(0), dec!(0)));
        ctx.evidence.items[0].as_of_date = Some(crate::rules::testkit::date(2025, 11, 30));
        let result = ApArItemsOlderThanThreshold.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }
}
