//! Working-paper balances (prepaids, deferred revenue, accruals) tied to
//! the balance sheet.
//!
//! With one in-scope account a single working-paper amount suffices; with
//! several, each evidence item must name its account via
//! `meta.account_name_match`. Ambiguity is never resolved silently.

use serde_json::{json, Value};

use crate::config::{config_schema, WorkingPaperRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evidence::EvidenceItem;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::rules::name_matches_any;
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-WORKING-PAPER-RECONCILES",
    rule_title: "Working paper balances reconcile to Balance Sheet",
    best_practices_reference: "Prepayments/Deferred Revenue/Accruals",
    sources: &["Working papers (schedules)", "QBO (Balance Sheet)"],
};

fn evidence_matches_account(item: &EvidenceItem, account_name: &str) -> bool {
    match item.meta.get("account_name_match").and_then(Value::as_str) {
        Some(needle) if !needle.trim().is_empty() => account_name
            .to_lowercase()
            .contains(&needle.trim().to_lowercase()),
        _ => false,
    }
}

pub struct WorkingPaperReconciles;

impl Rule for WorkingPaperReconciles {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "WorkingPaperRuleConfig",
            json!({
                "name_patterns": {
                    "type": "array",
                    "items": {"type": "string"},
                    "default": ["prepaid", "deferred revenue", "accrual"],
                },
                "evidence_type": {"type": "string", "default": "working_paper_balance"},
                "require_evidence_as_of_date_match_period_end": {"type": "boolean", "default": true},
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: WorkingPaperRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let period = ctx.period_end.format("%Y-%m-%d");

        let in_scope: Vec<_> = ctx
            .balance_sheet
            .leaf_accounts()
            .filter(|a| !a.name.is_empty() && name_matches_any(&a.name, &cfg.name_patterns))
            .collect();
        if in_scope.is_empty() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary(format!(
                    "No in-scope working paper accounts found as of {period}."
                ))
                .build());
        }

        let evidence_items = ctx.evidence.all(&cfg.evidence_type);
        if evidence_items.is_empty() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NeedsReview)
                .summary(format!(
                    "Missing working paper balances for {period}; cannot verify."
                ))
                .human_action("Provide the working paper balances as of period end.")
                .build());
        }

        if cfg.require_evidence_as_of_date_match_period_end {
            for item in &evidence_items {
                if item.as_of_date != Some(ctx.period_end) {
                    return Ok(RuleResult::builder(&SPEC, RuleStatus::NeedsReview)
                        .summary(
                            "Working paper as-of date is missing or does not match period \
                             end; cannot verify.",
                        )
                        .evidence(item)
                        .human_action(
                            "Provide working paper balances as of the period end date.",
                        )
                        .build());
                }
            }
        }

        if in_scope.len() > 1 && evidence_items.len() == 1 {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NeedsReview)
                .summary(
                    "Multiple in-scope accounts but only one working paper balance \
                     provided; cannot verify.",
                )
                .details(
                    in_scope
                        .iter()
                        .map(|acct| {
                            RuleResultDetail::new(
                                acct.account_ref.clone(),
                                "In-scope account without clear working paper match.",
                            )
                            .with("account_name", acct.name.clone())
                            .with("period_end", ctx.period_end)
                            .with("status", RuleStatus::NeedsReview)
                        })
                        .collect(),
                )
                .evidence(evidence_items[0])
                .human_action(
                    "Provide account-specific working paper balances or map by account name.",
                )
                .build());
        }

        let mut details = Vec::new();
        let mut used: Vec<&EvidenceItem> = Vec::new();
        let mut failures = 0usize;
        for acct in &in_scope {
            let matched = if evidence_items.len() == 1 {
                Some(evidence_items[0])
            } else {
                evidence_items
                    .iter()
                    .copied()
                    .find(|item| evidence_matches_account(item, &acct.name))
            };
            let Some((item, amount)) = matched.and_then(|i| i.amount.map(|a| (i, a))) else {
                let mut builder = RuleResult::builder(&SPEC, RuleStatus::NeedsReview)
                    .summary(
                        "Missing working paper balance for an in-scope account; cannot verify.",
                    )
                    .detail(
                        RuleResultDetail::new(
                            acct.account_ref.clone(),
                            "Working paper balance missing for account.",
                        )
                        .with("account_name", acct.name.clone())
                        .with("period_end", ctx.period_end)
                        .with("status", RuleStatus::NeedsReview),
                    )
                    .human_action("Provide a working paper balance for the in-scope account.");
                for item in &evidence_items {
                    builder = builder.evidence(item);
                }
                return Ok(builder.build());
            };

            used.push(item);
            let bs_q = cfg.common.quantize(acct.balance);
            let wp_q = cfg.common.quantize(amount);
            let difference = (bs_q - wp_q).abs();
            let status = if difference.is_zero() {
                RuleStatus::Pass
            } else {
                failures += 1;
                RuleStatus::Fail
            };
            details.push(
                RuleResultDetail::new(
                    acct.account_ref.clone(),
                    "Working paper balance compared to Balance Sheet.",
                )
                .with("account_name", acct.name.clone())
                .with("period_end", ctx.period_end)
                .with("bs_balance", bs_q)
                .with("working_paper_balance", wp_q)
                .with("difference", difference)
                .with("evidence_type", cfg.evidence_type.clone())
                .with("evidence_as_of_date", DetailValue::opt_date(item.as_of_date))
                .with("working_paper_uri", DetailValue::opt_text(item.uri.as_deref()))
                .with("status", status),
            );
        }

        let status = if failures > 0 {
            RuleStatus::Fail
        } else {
            RuleStatus::Pass
        };
        let summary = if failures > 0 {
            format!(
                "Working paper balances do not match Balance Sheet for {failures} account(s)."
            )
        } else {
            format!("Working paper balances reconcile to Balance Sheet as of {period}.")
        };
        let human_action = (failures > 0).then(|| {
            "Reconcile working paper balances to the Balance Sheet and document adjustments."
                .to_string()
        });

        let mut builder = RuleResult::builder(&SPEC, status)
            .summary(summary)
            .details(details)
            .maybe_human_action(human_action);
        for item in used {
            builder = builder.evidence(item);
        }
        Ok(builder.build())
    }
}
