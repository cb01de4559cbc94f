//! Stale uncleared reconciliation items.
//!
//! Only the "as at statement end" section of the reconciliation report is
//! judged; the "after date" section is counted and ignored. An item is
//! stale when its transaction date is strictly earlier than the statement
//! end shifted back by the configured number of calendar months.

use serde_json::{json, Value};

use crate::calendar::{parse_date, shift_months};
use crate::config::{config_schema, UnclearedItemsRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::snapshot::{latest_reconciliation, ReconciliationSnapshot};
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-UNCLEARED-ITEMS-INVESTIGATED-AND-FLAGGED",
    rule_title: "Uncleared transactions are investigated and explained",
    best_practices_reference: "Bank reconciliations → Uncleared items",
    sources: &["Reconciliation report (detailed)"],
};

fn string_field(item: &serde_json::Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        if let Some(Value::String(s)) = item.get(*key) {
            if !s.is_empty() {
                return s.clone();
            }
        }
    }
    String::new()
}

fn evaluate_one(
    ctx: &RuleContext,
    rec: &ReconciliationSnapshot,
    cfg: &UnclearedItemsRuleConfig,
    account_name_fallback: &str,
) -> (RuleStatus, RuleResultDetail) {
    let account_name = if rec.account_name.is_empty() {
        account_name_fallback.to_string()
    } else {
        rec.account_name.clone()
    };
    let missing_status = cfg.common.missing_status();

    let Some(as_at_date) = rec.statement_end_date else {
        return (
            missing_status,
            RuleResultDetail::new(
                rec.account_ref.clone(),
                "Missing statement end date; cannot evaluate uncleared item age.",
            )
            .with("account_name", account_name)
            .with("period_end", ctx.period_end)
            .with("status", missing_status),
        );
    };

    let uncleared = rec.uncleared_items();
    let Some(as_at_items) = uncleared.as_at else {
        return (
            missing_status,
            RuleResultDetail::new(
                rec.account_ref.clone(),
                "Missing uncleared items (as at statement end date) in reconciliation metadata.",
            )
            .with("account_name", account_name)
            .with("period_end", ctx.period_end)
            .with("as_at_date", as_at_date)
            .with("status", missing_status),
        );
    };

    let threshold_date = shift_months(as_at_date, -(cfg.months_old_threshold as i32));

    let mut flagged: Vec<(String, DetailValue)> = Vec::new();
    let mut invalid_count = 0usize;
    for item in &as_at_items {
        let txn_date = ["txn_date", "date", "transaction_date"]
            .iter()
            .find_map(|key| item.get(*key).and_then(parse_date));
        let Some(txn_date) = txn_date else {
            invalid_count += 1;
            continue;
        };
        if txn_date < threshold_date {
            let mut fields = std::collections::BTreeMap::new();
            fields.insert("txn_date".to_string(), DetailValue::date(txn_date));
            fields.insert(
                "description".to_string(),
                DetailValue::Text(string_field(item, &["description", "memo", "name"])),
            );
            fields.insert(
                "amount".to_string(),
                item.get("amount")
                    .map(DetailValue::from_json)
                    .unwrap_or(DetailValue::Null),
            );
            fields.insert(
                "type".to_string(),
                DetailValue::Text(string_field(item, &["type", "txn_type"])),
            );
            fields.insert(
                "reference".to_string(),
                DetailValue::Text(string_field(item, &["reference", "ref"])),
            );
            flagged.push((
                txn_date.format("%Y-%m-%d").to_string(),
                DetailValue::Map(fields),
            ));
        }
    }

    let status = if invalid_count > 0 {
        missing_status
    } else if !flagged.is_empty() {
        cfg.stale_item_status
    } else {
        RuleStatus::Pass
    };

    flagged.sort_by(|a, b| a.0.cmp(&b.0));
    let flagged_count = flagged.len();
    let sample: Vec<DetailValue> = flagged
        .into_iter()
        .take(cfg.max_flagged_items_in_detail)
        .map(|(_, v)| v)
        .collect();
    let ignored_after_count = uncleared.after_date.map(|v| v.len()).unwrap_or(0);

    let detail = RuleResultDetail::new(
        rec.account_ref.clone(),
        "Uncleared items age evaluated (as at statement end date; 'after date' items ignored).",
    )
    .with("account_name", account_name)
    .with("period_end", ctx.period_end)
    .with("as_at_date", as_at_date)
    .with("months_old_threshold", cfg.months_old_threshold as usize)
    .with("threshold_date", threshold_date)
    .with("uncleared_items_as_at_count", as_at_items.len())
    .with("uncleared_items_after_date_ignored_count", ignored_after_count)
    .with("invalid_uncleared_item_date_count", invalid_count)
    .with("flagged_uncleared_items_count", flagged_count)
    .with("flagged_uncleared_items_sample", sample)
    .with("status", status);

    (status, detail)
}

pub struct UnclearedItemsInvestigatedAndFlagged;

impl Rule for UnclearedItemsInvestigatedAndFlagged {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "UnclearedItemsRuleConfig",
            json!({
                "expected_accounts": {"type": "array", "items": {"type": "string"}},
                "months_old_threshold": {"type": "integer", "default": 2},
                "stale_item_status": {
                    "type": "string",
                    "enum": ["WARN", "FAIL"],
                    "default": "WARN",
                },
                "max_flagged_items_in_detail": {"type": "integer", "default": 20},
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: UnclearedItemsRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let missing_status = cfg.common.missing_status();
        let period = ctx.period_end.format("%Y-%m-%d");

        let required_refs: Vec<String> = if cfg.expected_accounts.is_empty() {
            let mut seen = std::collections::BTreeSet::new();
            ctx.reconciliations
                .iter()
                .filter(|r| seen.insert(r.account_ref.clone()))
                .map(|r| r.account_ref.clone())
                .collect()
        } else {
            cfg.expected_accounts.clone()
        };

        if required_refs.is_empty() {
            return Ok(RuleResult::builder(&SPEC, missing_status)
                .summary(format!(
                    "No reconciliation snapshots provided for {period}; cannot evaluate \
                     uncleared items."
                ))
                .human_action(
                    "Provide reconciliation detailed report data (uncleared items as at \
                     statement end date).",
                )
                .build());
        }

        let mut statuses = Vec::new();
        let mut details = Vec::new();
        for account_ref in &required_refs {
            let account_name = ctx.account_name(account_ref).to_string();
            let Some(latest) = latest_reconciliation(&ctx.reconciliations, account_ref) else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(
                        account_ref.clone(),
                        "Missing reconciliation snapshot for this account; cannot evaluate \
                         uncleared items.",
                    )
                    .with("account_name", account_name)
                    .with("period_end", ctx.period_end)
                    .with(
                        "expected_from_maintenance",
                        !cfg.expected_accounts.is_empty(),
                    )
                    .with("status", missing_status),
                );
                continue;
            };
            let (status, detail) = evaluate_one(ctx, latest, &cfg, &account_name);
            statuses.push(status);
            details.push(detail);
        }

        let overall = RuleStatus::worst(statuses);
        let exemplar = RuleResult::exemplar_detail(&details, overall);
        let summary = match overall {
            RuleStatus::Pass => {
                "No stale uncleared items detected (across evaluated accounts).".to_string()
            }
            RuleStatus::Warn | RuleStatus::Fail => {
                let (name, as_at) = exemplar
                    .map(|d| {
                        let text = |key: &str| match d.values.get(key) {
                            Some(DetailValue::Text(s)) => s.clone(),
                            _ => String::new(),
                        };
                        (text("account_name"), text("as_at_date"))
                    })
                    .unwrap_or_default();
                format!(
                    "Uncleared items older than {} month(s) exist for '{name}' as of \
                     {as_at}; investigate and explain.",
                    cfg.months_old_threshold,
                )
            }
            RuleStatus::NeedsReview => {
                format!("Missing data prevented evaluation of uncleared items as of {period}.")
            }
            _ => "Not applicable.".to_string(),
        };
        let human_action = overall.needs_human_action().then(|| {
            format!(
                "Review uncleared items as at the reconciliation statement end date; flag \
                 any items older than {} month(s) and check with the client for \
                 explanations or corrections.",
                cfg.months_old_threshold,
            )
        });

        Ok(RuleResult::builder(&SPEC, overall)
            .summary(summary)
            .details(details)
            .maybe_human_action(human_action)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testkit::{account, configure, context, date};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn reconciliation_with_items(items: Value) -> ReconciliationSnapshot {
        ReconciliationSnapshot {
            account_ref: "acct::BANK1".to_string(),
            account_name: "Chequing".to_string(),
            statement_end_date: Some(date(2025, 11, 30)),
            statement_ending_balance: Some(dec!(1000)),
            book_balance_as_of_statement_end: Some(dec!(1000)),
            book_balance_as_of_period_end: None,
            source: String::new(),
            meta: serde_json::from_value(
                json!({"uncleared_items": {"as_at": items, "after_date": [{"txn_date": "2025-12-02"}]}}),
            )
            .expect("meta"),
        }
    }

    fn ctx_with(items: Value) -> crate::context::RuleContext {
        let mut ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", "", dec!(1000))]);
        ctx.reconciliations.push(reconciliation_with_items(items));
        ctx
    }

    #[test]
    fn stale_item_warns_and_recent_item_does_not() {
        // Statement end 2025-11-30, threshold 2 months → stale before 2025-09-30.
        let ctx = ctx_with(json!([
            {"txn_date": "2025-08-15", "description": "stale cheque", "amount": "120.00"},
            {"txn_date": "2025-10-20", "description": "recent", "amount": "80.00"},
        ]));
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Warn);
        let detail = &result.details[0];
        assert_eq!(
            detail.values.get("flagged_uncleared_items_count"),
            Some(&DetailValue::Int(1))
        );
        assert_eq!(
            detail.values.get("threshold_date"),
            Some(&DetailValue::Text("2025-09-30".to_string()))
        );
        assert_eq!(
            detail.values.get("uncleared_items_after_date_ignored_count"),
            Some(&DetailValue::Int(1))
        );
    }

    #[test]
    fn boundary_item_on_threshold_date_is_not_stale() {
        let ctx = ctx_with(json!([{"txn_date": "2025-09-30", "description": "boundary"}]));
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
    }

    #[test]
    fn slash_dates_parse_and_flag() {
        let ctx = ctx_with(json!([{"txn_date": "15/08/2025", "description": "old emt"}]));
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Warn);
    }

    #[test]
    fn unparseable_item_date_routes_to_missing_policy() {
        let ctx = ctx_with(json!([{"txn_date": "soon", "description": "???"}]));
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn stale_item_status_can_be_fail() {
        let mut ctx = ctx_with(json!([{"txn_date": "2025-01-15", "description": "ancient"}]));
        configure(
            &mut ctx,
            "BS-UNCLEARED-ITEMS-INVESTIGATED-AND-FLAGGED",
            json!({"stale_item_status": "FAIL"}),
        );
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Fail);
    }

    #[test]
    fn flagged_sample_is_capped_and_sorted() {
        let items: Vec<Value> = (1..=25)
            .map(|day| json!({"txn_date": format!("2025-03-{day:02}"), "description": "old"}))
            .collect();
        let mut ctx = ctx_with(Value::Array(items));
        configure(
            &mut ctx,
            "BS-UNCLEARED-ITEMS-INVESTIGATED-AND-FLAGGED",
            json!({"max_flagged_items_in_detail": 5}),
        );
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        let detail = &result.details[0];
        assert_eq!(
            detail.values.get("flagged_uncleared_items_count"),
            Some(&DetailValue::Int(25))
        );
        match detail.values.get("flagged_uncleared_items_sample") {
            Some(DetailValue::List(sample)) => {
                assert_eq!(sample.len(), 5);
                match &sample[0] {
                    DetailValue::Map(fields) => assert_eq!(
                        fields.get("txn_date"),
                        Some(&DetailValue::Text("2025-03-01".to_string()))
                    ),
                    other => panic!("unexpected sample entry: {other:?}"),
                }
            }
            other => panic!("unexpected sample: {other:?}"),
        }
    }

    #[test]
    fn expected_account_without_snapshot_follows_missing_policy() {
        let mut ctx = context(vec![]);
        configure(
            &mut ctx,
            "BS-UNCLEARED-ITEMS-INVESTIGATED-AND-FLAGGED",
            json!({"expected_accounts": ["acct::BANK1"]}),
        );
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn no_snapshots_at_all_follows_missing_policy() {
        let ctx = context(vec![]);
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn missing_uncleared_meta_follows_missing_policy() {
        let mut ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", "", dec!(1000))]);
        ctx.reconciliations.push(ReconciliationSnapshot {
            account_ref: "acct::BANK1".to_string(),
            account_name: "Chequing".to_string(),
            statement_end_date: Some(date(2025, 11, 30)),
            statement_ending_balance: Some(dec!(1000)),
            book_balance_as_of_statement_end: Some(dec!(1000)),
            book_balance_as_of_period_end: None,
            source: String::new(),
            meta: BTreeMap::new(),
        });
        let result = UnclearedItemsInvestigatedAndFlagged
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }
}
