//! AP / AR subledger reconciliation: the aging reports must tie to the
//! balance sheet.
//!
//! The balance-sheet side prefers a single "Total Accounts Payable /
//! Receivable" summary row; otherwise configured refs are summed; otherwise
//! name inference picks accounts by name or the `A/P` / `A/R` token
//! (matched as a full token, never inside a longer word). Both the aging
//! summary total and the aging detail total must equal the sheet exactly.

use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::config::{config_schema, SubledgerRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evidence::EvidenceItem;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::rules::{contains_token, name_contains};
use crate::status::RuleStatus;

static AP_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-AP-SUBLEDGER-RECONCILES",
    rule_title: "Aged Payables Detail reconciles to Balance Sheet",
    best_practices_reference: "Accounts Payable/Receivable",
    sources: &["QBO"],
};

static AR_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-AR-SUBLEDGER-RECONCILES",
    rule_title: "Aged Receivables Detail reconciles to Balance Sheet",
    best_practices_reference: "Accounts Payable/Receivable",
    sources: &["QBO"],
};

struct SubledgerSide {
    spec: &'static RuleSpec,
    label: &'static str,
    full_name: &'static str,
    token: &'static str,
    default_summary_type: &'static str,
    default_detail_type: &'static str,
    aggregate_key: &'static str,
}

static AP_SIDE: SubledgerSide = SubledgerSide {
    spec: &AP_SPEC,
    label: "AP",
    full_name: "accounts payable",
    token: "a/p",
    default_summary_type: "ap_aging_summary_total",
    default_detail_type: "ap_aging_detail_total",
    aggregate_key: "ap_aging_totals",
};

static AR_SIDE: SubledgerSide = SubledgerSide {
    spec: &AR_SPEC,
    label: "AR",
    full_name: "accounts receivable",
    token: "a/r",
    default_summary_type: "ar_aging_summary_total",
    default_detail_type: "ar_aging_detail_total",
    aggregate_key: "ar_aging_totals",
};

fn is_total_row(name: &str, side: &SubledgerSide) -> bool {
    let lowered = name.trim().to_lowercase();
    if !lowered.contains("total") {
        return false;
    }
    lowered.contains(side.full_name) || contains_token(&lowered, side.token)
}

fn missing_evidence_result(
    side: &SubledgerSide,
    ctx: &RuleContext,
    which: &str,
    item: Option<&EvidenceItem>,
) -> RuleResult {
    RuleResult::builder(side.spec, RuleStatus::NeedsReview)
        .summary(format!(
            "Missing {} aging {which} total for {}; cannot verify.",
            side.label,
            ctx.period_end.format("%Y-%m-%d"),
        ))
        .evidence_opt(item)
        .human_action(format!(
            "Provide the {} aging {which} total as of period end.",
            side.label,
        ))
        .build()
}

fn as_of_mismatch_result(
    side: &SubledgerSide,
    which: &str,
    item: &EvidenceItem,
) -> RuleResult {
    RuleResult::builder(side.spec, RuleStatus::NeedsReview)
        .summary(format!(
            "{} aging {which} as-of date is missing or does not match period end; \
             cannot verify.",
            side.label,
        ))
        .evidence(item)
        .human_action(format!(
            "Provide the {} aging {which} report as of the period end date.",
            side.label,
        ))
        .build()
}

fn evaluate_subledger(
    side: &SubledgerSide,
    ctx: &RuleContext,
    cfg: &SubledgerRuleConfig,
) -> RuleResult {
    let period = ctx.period_end.format("%Y-%m-%d");

    // Balance-sheet side: a single total row, else configured refs, else
    // name inference.
    let total_matches: Vec<_> = ctx
        .balance_sheet
        .accounts
        .iter()
        .filter(|a| is_total_row(&a.name, side))
        .collect();
    if total_matches.len() > 1 {
        return RuleResult::builder(side.spec, RuleStatus::NeedsReview)
            .summary(format!(
                "Multiple {} total lines found in Balance Sheet as of {period}; cannot verify.",
                side.label,
            ))
            .details(
                total_matches
                    .iter()
                    .map(|acct| {
                        RuleResultDetail::new(
                            acct.account_ref.clone(),
                            format!("Multiple {} total lines matched.", side.label),
                        )
                        .with("account_name", acct.name.clone())
                        .with("period_end", ctx.period_end)
                        .with("status", RuleStatus::NeedsReview)
                    })
                    .collect(),
            )
            .human_action(format!(
                "Use a single {} total line or configure specific account refs.",
                side.label,
            ))
            .build();
    }

    let mut accounts_to_eval: Vec<(String, String, Decimal)> = Vec::new();
    let mut used_name_inference = false;
    let mut used_total_line = false;
    let mut missing_refs: Vec<String> = Vec::new();

    if let Some(total) = total_matches.first() {
        accounts_to_eval.push((total.account_ref.clone(), total.name.clone(), total.balance));
        used_total_line = true;
    } else if !cfg.account_refs.is_empty() {
        for account_ref in &cfg.account_refs {
            match ctx.account_balance(account_ref) {
                Some(balance) => accounts_to_eval.push((
                    account_ref.clone(),
                    ctx.account_name(account_ref).to_string(),
                    balance,
                )),
                None => missing_refs.push(account_ref.clone()),
            }
        }
    } else if cfg.allow_name_inference {
        used_name_inference = true;
        let name_match = if cfg.account_name_match.trim().is_empty() {
            side.full_name
        } else {
            cfg.account_name_match.trim()
        };
        for acct in ctx.balance_sheet.leaf_accounts() {
            if name_contains(&acct.name, name_match) || contains_token(&acct.name, side.token) {
                accounts_to_eval.push((acct.account_ref.clone(), acct.name.clone(), acct.balance));
            }
        }
    }

    if accounts_to_eval.is_empty() && missing_refs.is_empty() {
        return RuleResult::builder(side.spec, RuleStatus::NotApplicable)
            .summary(format!(
                "No {} accounts found as of {period}.",
                side.full_name
            ))
            .human_action(format!(
                "Configure {} account refs or a name match to enable this rule.",
                side.label,
            ))
            .build();
    }

    if !missing_refs.is_empty() {
        return RuleResult::builder(side.spec, RuleStatus::NeedsReview)
            .summary(format!(
                "Some configured {} accounts were missing from the Balance Sheet as of \
                 {period}; cannot verify.",
                side.label,
            ))
            .details(
                missing_refs
                    .iter()
                    .map(|account_ref| {
                        RuleResultDetail::new(
                            account_ref.clone(),
                            "Configured account not found in balance sheet snapshot.",
                        )
                        .with("period_end", ctx.period_end)
                        .with("status", RuleStatus::NeedsReview)
                    })
                    .collect(),
            )
            .human_action(format!(
                "Confirm {} account refs and ensure the Balance Sheet snapshot is complete.",
                side.label,
            ))
            .build();
    }

    // Evidence side: summary and detail totals, as-of period end.
    let summary_type = if cfg.summary_evidence_type.is_empty() {
        side.default_summary_type
    } else {
        cfg.summary_evidence_type.as_str()
    };
    let detail_type = if cfg.detail_evidence_type.is_empty() {
        side.default_detail_type
    } else {
        cfg.detail_evidence_type.as_str()
    };
    let summary_item = ctx.evidence.first(summary_type);
    let detail_item = ctx.evidence.first(detail_type);

    let Some((summary_item, summary_amount)) =
        summary_item.and_then(|i| i.amount.map(|a| (i, a)))
    else {
        return missing_evidence_result(side, ctx, "summary", summary_item);
    };
    let Some((detail_item, detail_amount)) = detail_item.and_then(|i| i.amount.map(|a| (i, a)))
    else {
        return missing_evidence_result(side, ctx, "detail", detail_item);
    };

    if cfg.require_evidence_as_of_date_match_period_end {
        if summary_item.as_of_date != Some(ctx.period_end) {
            return as_of_mismatch_result(side, "summary", summary_item);
        }
        if detail_item.as_of_date != Some(ctx.period_end) {
            return as_of_mismatch_result(side, "detail", detail_item);
        }
    }

    let bs_total: Decimal = accounts_to_eval.iter().map(|(_, _, b)| *b).sum();
    let bs_q = cfg.common.quantize(bs_total);
    let summary_q = cfg.common.quantize(summary_amount);
    let detail_q = cfg.common.quantize(detail_amount);
    let diff_summary = (bs_q - summary_q).abs();
    let diff_detail = (bs_q - detail_q).abs();

    let status = if diff_summary.is_zero() && diff_detail.is_zero() {
        RuleStatus::Pass
    } else {
        RuleStatus::Fail
    };
    let summary = if status == RuleStatus::Pass {
        format!(
            "{} aging totals reconcile to the Balance Sheet as of {period}.",
            side.label,
        )
    } else {
        format!(
            "{} aging totals do not reconcile to the Balance Sheet as of {period}.",
            side.label,
        )
    };
    let human_action = (status != RuleStatus::Pass).then(|| {
        format!(
            "Reconcile the {} aging summary/detail totals to the Balance Sheet and \
             resolve discrepancies.",
            side.label,
        )
    });

    let mut details: Vec<RuleResultDetail> = accounts_to_eval
        .iter()
        .map(|(account_ref, name, balance)| {
            RuleResultDetail::new(
                account_ref.clone(),
                format!("{} account included in Balance Sheet total.", side.label),
            )
            .with("account_name", name.clone())
            .with("period_end", ctx.period_end)
            .with("balance", cfg.common.quantize(*balance))
            .with("inferred_by_name_match", used_name_inference)
            .with("used_total_line", used_total_line)
        })
        .collect();
    details.push(
        RuleResultDetail::new(
            side.aggregate_key,
            format!(
                "{} aging totals compared to Balance Sheet total.",
                side.label
            ),
        )
        .with("period_end", ctx.period_end)
        .with("bs_total", bs_q)
        .with("summary_total", summary_q)
        .with("detail_total", detail_q)
        .with("summary_difference", diff_summary)
        .with("detail_difference", diff_detail)
        .with("summary_evidence_type", summary_type)
        .with("detail_evidence_type", detail_type)
        .with(
            "summary_evidence_as_of_date",
            DetailValue::opt_date(summary_item.as_of_date),
        )
        .with(
            "detail_evidence_as_of_date",
            DetailValue::opt_date(detail_item.as_of_date),
        )
        .with("status", status),
    );

    RuleResult::builder(side.spec, status)
        .summary(summary)
        .details(details)
        .evidence(summary_item)
        .evidence(detail_item)
        .maybe_human_action(human_action)
        .build()
}

fn subledger_schema() -> Value {
    config_schema(
        "SubledgerRuleConfig",
        json!({
            "account_refs": {"type": "array", "items": {"type": "string"}},
            "allow_name_inference": {"type": "boolean", "default": true},
            "account_name_match": {"type": "string"},
            "summary_evidence_type": {"type": "string"},
            "detail_evidence_type": {"type": "string"},
            "require_evidence_as_of_date_match_period_end": {"type": "boolean", "default": true},
        }),
    )
}

pub struct ApSubledgerReconciles;

impl Rule for ApSubledgerReconciles {
    fn spec(&self) -> &'static RuleSpec {
        &AP_SPEC
    }

    fn config_schema(&self) -> Value {
        subledger_schema()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: SubledgerRuleConfig = ctx.client_config.rule_config(AP_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&AP_SPEC));
        }
        Ok(evaluate_subledger(&AP_SIDE, ctx, &cfg))
    }
}

pub struct ArSubledgerReconciles;

impl Rule for ArSubledgerReconciles {
    fn spec(&self) -> &'static RuleSpec {
        &AR_SPEC
    }

    fn config_schema(&self) -> Value {
        subledger_schema()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: SubledgerRuleConfig = ctx.client_config.rule_config(AR_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&AR_SPEC));
        }
        Ok(evaluate_subledger(&AR_SIDE, ctx, &cfg))
    }
}
