//! Intercompany / shareholder balances reconciled against counterpart
//! balance sheets.
//!
//! Two controls share this evaluator: the AP/AR "due to/due from" check and
//! the broader intercompany-loan check. Scope is matched by account-name
//! patterns; the counterparty is the text after the matched pattern in the
//! account name; absolute balances must agree (sign conventions differ
//! between the two sets of books).

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::amount::parse_decimal;
use crate::config::{config_schema, IntercompanyRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::status::RuleStatus;

static AP_AR_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-AP-AR-INTERCOMPANY-OR-SHAREHOLDER-PAID",
    rule_title: "Intercompany/shareholder-paid balances identified",
    best_practices_reference: "Accounts Payable/Receivable",
    sources: &["QBO (Balance Sheet)", "Counterparty Balance Sheets"],
};

static LOANS_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-INTERCOMPANY-BALANCES-RECONCILE",
    rule_title: "Intercompany loan balances reconcile across related companies",
    best_practices_reference: "Intercompany Loans",
    sources: &["QBO (Balance Sheet)", "Counterparty Balance Sheets"],
};

fn ap_ar_default_patterns() -> Vec<String> {
    ["due to", "due from", "intercompany", "inter-company"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn loans_default_patterns() -> Vec<String> {
    [
        "due to",
        "due from",
        "intercompany",
        "inter-company",
        "intercompany loan",
        "loan from",
        "loan to",
        "shareholder loan",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

const SAMPLE_CAP: usize = 25;

/// Text after the first matched pattern, e.g. "Due from Northco Ltd" with
/// pattern "due from" → "Northco Ltd". Falls back to the whole name.
fn extract_counterparty(name: &str, patterns: &[String]) -> String {
    let lowered = name.to_lowercase();
    for pattern in patterns {
        let p = pattern.trim().to_lowercase();
        if p.is_empty() {
            continue;
        }
        if let Some(at) = lowered.find(&p) {
            // Slice the original name; fall through if lowercasing shifted
            // byte offsets (non-ASCII names).
            let candidate = name.get(at + p.len()..).map(str::trim).unwrap_or("");
            if !candidate.is_empty() {
                return candidate.to_string();
            }
        }
    }
    name.to_string()
}

struct Mismatch {
    account_name: String,
    balance: Decimal,
    counterparty: String,
    counterparty_balance: Option<Decimal>,
    reason: &'static str,
}

fn mismatch_value(m: &Mismatch) -> DetailValue {
    DetailValue::Map(BTreeMap::from([
        (
            "account_name".to_string(),
            DetailValue::Text(m.account_name.clone()),
        ),
        ("balance".to_string(), DetailValue::Amount(m.balance)),
        (
            "counterparty".to_string(),
            DetailValue::Text(m.counterparty.clone()),
        ),
        (
            "counterparty_balance".to_string(),
            DetailValue::opt_amount(m.counterparty_balance),
        ),
        ("reason".to_string(), DetailValue::Text(m.reason.to_string())),
    ]))
}

fn evaluate_intercompany(
    spec: &'static RuleSpec,
    default_patterns: Vec<String>,
    summary_key: &str,
    ctx: &RuleContext,
    cfg: &IntercompanyRuleConfig,
) -> RuleResult {
    let missing_status = cfg.common.missing_status();
    let period = ctx.period_end.format("%Y-%m-%d");
    let patterns: Vec<String> = if cfg.name_patterns.is_empty() {
        default_patterns
    } else {
        cfg.name_patterns
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect()
    };

    let in_scope: Vec<_> = ctx
        .balance_sheet
        .leaf_accounts()
        .filter(|acct| {
            let lowered = acct.name.to_lowercase();
            patterns.iter().any(|p| lowered.contains(p))
        })
        .filter(|acct| !(cfg.non_zero_only && acct.balance.is_zero()))
        .collect();

    if in_scope.is_empty() {
        return RuleResult::builder(spec, RuleStatus::NotApplicable)
            .summary(format!("No intercompany balances found as of {period}."))
            .build();
    }

    let Some(evidence_item) = ctx.evidence.first(&cfg.evidence_type) else {
        return RuleResult::builder(spec, missing_status)
            .summary(format!(
                "Intercompany balances detected but no counterpart Balance Sheet evidence \
                 provided for {period}."
            ))
            .human_action(
                "Provide counterpart company Balance Sheet evidence for intercompany balances.",
            )
            .build();
    };
    if cfg.require_evidence_as_of_date_match_period_end
        && evidence_item.as_of_date != Some(ctx.period_end)
    {
        return RuleResult::builder(spec, missing_status)
            .summary(
                "Counterpart Balance Sheet evidence date missing or does not match period \
                 end; cannot verify.",
            )
            .evidence(evidence_item)
            .human_action("Provide counterpart Balance Sheets as of period end.")
            .build();
    }

    let Some(counterpart_items) = evidence_item.meta_items() else {
        return RuleResult::builder(spec, missing_status)
            .summary("Counterpart Balance Sheet evidence missing items; cannot verify.")
            .evidence(evidence_item)
            .human_action("Provide intercompany balances from counterpart Balance Sheets.")
            .build();
    };

    let mut counterpart_map: BTreeMap<String, Decimal> = BTreeMap::new();
    for item in &counterpart_items {
        let counterparty = ["counterparty", "company"]
            .iter()
            .find_map(|k| item.get(*k).and_then(Value::as_str))
            .unwrap_or("")
            .trim()
            .to_string();
        let Some(balance) = item.get("balance").and_then(parse_decimal) else {
            continue;
        };
        if counterparty.is_empty() {
            continue;
        }
        counterpart_map.insert(counterparty.to_lowercase(), balance);
    }

    let mut mismatches: Vec<Mismatch> = Vec::new();
    let mut details: Vec<RuleResultDetail> = Vec::new();
    for acct in &in_scope {
        let balance_q = cfg.common.quantize(acct.balance);
        let counterparty = extract_counterparty(&acct.name, &patterns);
        let counterpart_balance = counterpart_map.get(&counterparty.to_lowercase()).copied();
        let mismatch = match counterpart_balance {
            None => Some(Mismatch {
                account_name: acct.name.clone(),
                balance: balance_q,
                counterparty: counterparty.clone(),
                counterparty_balance: None,
                reason: "missing_counterparty_balance",
            }),
            Some(cp) => {
                let cp_q = cfg.common.quantize(cp);
                (balance_q.abs() != cp_q.abs()).then(|| Mismatch {
                    account_name: acct.name.clone(),
                    balance: balance_q,
                    counterparty: counterparty.clone(),
                    counterparty_balance: Some(cp_q),
                    reason: "amount_mismatch",
                })
            }
        };
        let detail_status = if mismatch.is_some() {
            RuleStatus::NeedsReview
        } else {
            RuleStatus::Pass
        };
        if let Some(m) = mismatch {
            mismatches.push(m);
        }
        details.push(
            RuleResultDetail::new(
                acct.account_ref.clone(),
                "Intercompany balance evaluated.",
            )
            .with("account_name", acct.name.clone())
            .with("period_end", ctx.period_end)
            .with("balance", balance_q)
            .with("counterparty", counterparty)
            .with(
                "counterparty_balance",
                DetailValue::opt_amount(counterpart_balance),
            )
            .with("status", detail_status),
        );
    }

    let status = if mismatches.is_empty() {
        RuleStatus::Pass
    } else {
        RuleStatus::NeedsReview
    };
    let summary = if mismatches.is_empty() {
        format!("Intercompany balances match counterpart Balance Sheets as of {period}.")
    } else {
        "Intercompany balances require review (missing or mismatched counterpart balances)."
            .to_string()
    };
    let human_action = (!mismatches.is_empty())
        .then(|| "Confirm counterpart balances and reconcile intercompany accounts.".to_string());

    details.push(
        RuleResultDetail::new(summary_key, "Intercompany balance comparison summary.")
            .with("period_end", ctx.period_end)
            .with("mismatch_count", mismatches.len())
            .with(
                "mismatches",
                mismatches
                    .iter()
                    .take(SAMPLE_CAP)
                    .map(mismatch_value)
                    .collect::<Vec<_>>(),
            )
            .with("status", status),
    );

    RuleResult::builder(spec, status)
        .summary(summary)
        .details(details)
        .evidence(evidence_item)
        .maybe_human_action(human_action)
        .build()
}

fn intercompany_schema(default_patterns: &[String]) -> Value {
    config_schema(
        "IntercompanyRuleConfig",
        json!({
            "name_patterns": {
                "type": "array",
                "items": {"type": "string"},
                "default": default_patterns,
            },
            "evidence_type": {"type": "string", "default": "intercompany_balance_sheet"},
            "non_zero_only": {"type": "boolean", "default": true},
            "require_evidence_as_of_date_match_period_end": {"type": "boolean", "default": true},
        }),
    )
}

pub struct ApArIntercompanyOrShareholderPaid;

impl Rule for ApArIntercompanyOrShareholderPaid {
    fn spec(&self) -> &'static RuleSpec {
        &AP_AR_SPEC
    }

    fn config_schema(&self) -> Value {
        intercompany_schema(&ap_ar_default_patterns())
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: IntercompanyRuleConfig = ctx.client_config.rule_config(AP_AR_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&AP_AR_SPEC));
        }
        Ok(evaluate_intercompany(
            &AP_AR_SPEC,
            ap_ar_default_patterns(),
            "intercompany_summary",
            ctx,
            &cfg,
        ))
    }
}

pub struct IntercompanyBalancesReconcile;

impl Rule for IntercompanyBalancesReconcile {
    fn spec(&self) -> &'static RuleSpec {
        &LOANS_SPEC
    }

    fn config_schema(&self) -> Value {
        intercompany_schema(&loans_default_patterns())
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: IntercompanyRuleConfig = ctx.client_config.rule_config(LOANS_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&LOANS_SPEC));
        }
        Ok(evaluate_intercompany(
            &LOANS_SPEC,
            loans_default_patterns(),
            "intercompany_loan_summary",
            ctx,
            &cfg,
        ))
    }
}
