//! Bank and credit-card accounts reconciled through period end.
//!
//! Scope comes from the maintenance list when configured, otherwise it is
//! inferred from balance-sheet type/subtype; inference never guesses by
//! account name. Four checks per account, worst-wins:
//! coverage (statement reaches period end), statement tie-out (register vs
//! statement), attachment tie-out (statement vs the filed bank statement),
//! and period-end tie-out (rolled-forward register vs balance sheet).

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::config::{config_schema, BankReconciledRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evidence::EvidenceItem;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::snapshot::{latest_reconciliation, AccountBalance, ReconciliationSnapshot};
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-BANK-RECONCILED-THROUGH-PERIOD-END",
    rule_title: "Bank/credit card accounts reconciled through statement date",
    best_practices_reference: "Bank reconciliations → Banks and Credit cards",
    sources: &["QBO (reports/exports)", "Bank statements (evidence)"],
};

const SAMPLE_CAP: usize = 20;

fn is_bank_or_credit_card(acct: &AccountBalance) -> bool {
    let type_l = acct.account_type.trim().to_lowercase();
    let subtype_l = acct.subtype.trim().to_lowercase();
    if type_l.is_empty() && subtype_l.is_empty() {
        return false;
    }
    ["bank", "credit", "card"]
        .iter()
        .any(|needle| type_l.contains(needle) || subtype_l.contains(needle))
}

/// Infer bank/cc scope from type/subtype. Any leaf account missing both
/// makes the whole inference unsafe (`None` plus a review detail); the rule
/// never falls back to guessing by name.
fn infer_scope(ctx: &RuleContext) -> (Option<Vec<String>>, Option<RuleResultDetail>) {
    let mut missing_type_refs: Vec<String> = Vec::new();
    let mut inferred: Vec<String> = Vec::new();
    for acct in ctx.balance_sheet.leaf_accounts() {
        if !acct.has_classification() {
            missing_type_refs.push(acct.account_ref.clone());
            continue;
        }
        if is_bank_or_credit_card(acct) {
            inferred.push(acct.account_ref.clone());
        }
    }
    if !missing_type_refs.is_empty() {
        let sample: Vec<DetailValue> = missing_type_refs
            .iter()
            .take(SAMPLE_CAP)
            .map(|r| DetailValue::Text(r.clone()))
            .collect();
        let detail = RuleResultDetail::new(
            "scope",
            "Cannot infer bank/cc scope because some Balance Sheet accounts are missing \
             type/subtype.",
        )
        .with("period_end", ctx.period_end)
        .with("missing_type_account_refs", sample)
        .with("missing_type_account_count", missing_type_refs.len())
        .with("status", RuleStatus::NeedsReview);
        return (None, Some(detail));
    }
    inferred.sort();
    (Some(inferred), None)
}

fn determine_scope(cfg: &BankReconciledRuleConfig, inferred: &[String]) -> Vec<String> {
    let exclude: BTreeSet<&String> = cfg.exclude_accounts.iter().collect();
    if !cfg.expected_accounts.is_empty() {
        let mut refs: Vec<String> = cfg
            .expected_accounts
            .iter()
            .filter(|r| !exclude.contains(r))
            .cloned()
            .collect();
        refs.sort();
        refs.dedup();
        return refs;
    }
    let mut refs: BTreeSet<String> = inferred.iter().cloned().collect();
    refs.extend(cfg.include_accounts.iter().cloned());
    refs.into_iter().filter(|r| !exclude.contains(r)).collect()
}

/// Compare the maintenance list against the inferred bank/cc population.
fn check_maintenance_count(
    ctx: &RuleContext,
    cfg: &BankReconciledRuleConfig,
    inferred: Option<&[String]>,
) -> Option<(RuleStatus, RuleResultDetail)> {
    if cfg.expected_accounts.is_empty() {
        return None;
    }
    let Some(inferred) = inferred else {
        return Some((
            RuleStatus::NeedsReview,
            RuleResultDetail::new(
                "scope_count",
                "Cannot compare maintenance list to Balance Sheet bank/cc count \
                 (missing type/subtype).",
            )
            .with("period_end", ctx.period_end)
            .with("maintenance_account_count", cfg.expected_accounts.len())
            .with("status", RuleStatus::NeedsReview),
        ));
    };

    let maintenance_set: BTreeSet<&String> = cfg.expected_accounts.iter().collect();
    let inferred_set: BTreeSet<&String> = inferred.iter().collect();
    if cfg.expected_accounts.len() != inferred.len() {
        let missing_in_bs: Vec<DetailValue> = maintenance_set
            .difference(&inferred_set)
            .take(SAMPLE_CAP)
            .map(|r| DetailValue::Text((*r).clone()))
            .collect();
        let extra_in_bs: Vec<DetailValue> = inferred_set
            .difference(&maintenance_set)
            .take(SAMPLE_CAP)
            .map(|r| DetailValue::Text((*r).clone()))
            .collect();
        return Some((
            RuleStatus::Fail,
            RuleResultDetail::new(
                "scope_count",
                "Maintenance bank/cc account count does not match Balance Sheet bank/cc count.",
            )
            .with("period_end", ctx.period_end)
            .with("maintenance_account_count", cfg.expected_accounts.len())
            .with("balance_sheet_bank_cc_count", inferred.len())
            .with("missing_in_balance_sheet", missing_in_bs)
            .with("extra_in_balance_sheet", extra_in_bs)
            .with("status", RuleStatus::Fail),
        ));
    }
    Some((
        RuleStatus::Pass,
        RuleResultDetail::new(
            "scope_count",
            "Maintenance bank/cc account count matches Balance Sheet bank/cc count.",
        )
        .with("period_end", ctx.period_end)
        .with("maintenance_account_count", cfg.expected_accounts.len())
        .with("balance_sheet_bank_cc_count", inferred.len())
        .with("status", RuleStatus::Pass),
    ))
}

fn find_attachment<'a>(
    ctx: &'a RuleContext,
    cfg: &BankReconciledRuleConfig,
    account_ref: &str,
) -> Option<&'a EvidenceItem> {
    ctx.evidence.items.iter().find(|item| {
        item.evidence_type == cfg.statement_balance_attachment_evidence_type
            && item.meta_account_ref() == Some(account_ref)
    })
}

struct TieOut {
    status: RuleStatus,
    detail: RuleResultDetail,
    evidence: Option<EvidenceItem>,
}

fn evaluate_one(
    ctx: &RuleContext,
    rec: &ReconciliationSnapshot,
    cfg: &BankReconciledRuleConfig,
    balance_sheet_balance: Option<Decimal>,
    account_name_fallback: &str,
) -> TieOut {
    let account_name = if rec.account_name.is_empty() {
        account_name_fallback.to_string()
    } else {
        rec.account_name.clone()
    };
    let missing_status = cfg.common.missing_status();
    let missing = |message: &str, extra: Vec<(&str, DetailValue)>| {
        let mut detail = RuleResultDetail::new(rec.account_ref.clone(), message)
            .with("account_name", account_name.clone())
            .with("period_end", ctx.period_end)
            .with("status", missing_status);
        for (key, value) in extra {
            detail = detail.with(key, value);
        }
        TieOut {
            status: missing_status,
            detail,
            evidence: None,
        }
    };

    let Some(statement_end) = rec.statement_end_date else {
        return missing(
            "Missing statement end date; cannot verify reconciliation through period end.",
            Vec::new(),
        );
    };

    if cfg.require_statement_end_date_gte_period_end && statement_end < ctx.period_end {
        let detail = RuleResultDetail::new(
            rec.account_ref.clone(),
            "Statement end date is before MER period end; not reconciled through period end.",
        )
        .with("account_name", account_name.clone())
        .with("statement_end_date", statement_end)
        .with("period_end", ctx.period_end)
        .with("coverage", RuleStatus::Fail)
        .with("status", RuleStatus::Fail);
        return TieOut {
            status: RuleStatus::Fail,
            detail,
            evidence: None,
        };
    }

    let Some(statement_balance) = rec.statement_ending_balance else {
        return missing(
            "Missing statement ending balance; cannot tie out.",
            vec![("statement_end_date", DetailValue::date(statement_end))],
        );
    };
    let Some(book_at_statement_end) = rec.book_balance_as_of_statement_end else {
        return missing(
            "Missing book/register balance as of statement end date; cannot tie out.",
            vec![
                ("statement_end_date", DetailValue::date(statement_end)),
                (
                    "statement_ending_balance",
                    DetailValue::Amount(statement_balance),
                ),
            ],
        );
    };

    let statement_end_q = cfg.common.quantize(book_at_statement_end);
    let statement_bal_q = cfg.common.quantize(statement_balance);
    let statement_diff = (statement_end_q - statement_bal_q).abs();
    let statement_status = if statement_diff.is_zero() {
        RuleStatus::Pass
    } else {
        RuleStatus::Fail
    };

    let mut statuses = vec![statement_status];
    let bs_q = balance_sheet_balance.map(|b| cfg.common.quantize(b));

    // Period-end tie-out: rolled-forward register must equal the sheet.
    let mut period_end_status: Option<RuleStatus> = None;
    let mut period_end_diff: Option<Decimal> = None;
    if cfg.require_book_balance_as_of_period_end_ties_to_balance_sheet {
        let status = match (bs_q, rec.book_balance_as_of_period_end) {
            (Some(bs), Some(book_pe)) => {
                let diff = (cfg.common.quantize(book_pe) - bs).abs();
                period_end_diff = Some(diff);
                if diff.is_zero() {
                    RuleStatus::Pass
                } else {
                    RuleStatus::Fail
                }
            }
            _ => missing_status,
        };
        period_end_status = Some(status);
        statuses.push(status);
    }

    // Statement ending balance vs the balance sheet.
    let mut statement_vs_bs_status: Option<RuleStatus> = None;
    let mut statement_vs_bs_diff: Option<Decimal> = None;
    if cfg.require_statement_balance_matches_balance_sheet {
        let status = match bs_q {
            Some(bs) => {
                let diff = (statement_bal_q - bs).abs();
                statement_vs_bs_diff = Some(diff);
                if diff.is_zero() {
                    RuleStatus::Pass
                } else {
                    RuleStatus::Fail
                }
            }
            None => missing_status,
        };
        statement_vs_bs_status = Some(status);
        statuses.push(status);
    }

    // Attachment tie-out: statement balance must match the filed statement.
    let mut attachment_status: Option<RuleStatus> = None;
    let mut attachment_diff: Option<Decimal> = None;
    let mut attachment_amount: Option<Decimal> = None;
    let mut attachment_statement_end: Option<NaiveDate> = None;
    let mut attachment_uri: Option<String> = None;
    let mut attachment_item: Option<EvidenceItem> = None;
    if cfg.require_statement_balance_matches_attachment {
        let found = find_attachment(ctx, cfg, &rec.account_ref);
        let status = match found.and_then(|item| item.amount.map(|a| (item, a))) {
            None => missing_status,
            Some((item, amount)) => {
                attachment_item = Some(item.clone());
                attachment_amount = Some(cfg.common.quantize(amount));
                attachment_statement_end = item.statement_end_date;
                attachment_uri = item.uri.clone();
                match item.statement_end_date {
                    Some(att_end) if att_end != statement_end => RuleStatus::Fail,
                    _ => {
                        let diff = (statement_bal_q
                            - attachment_amount.unwrap_or(Decimal::ZERO))
                        .abs();
                        attachment_diff = Some(diff);
                        if diff.is_zero() {
                            RuleStatus::Pass
                        } else {
                            RuleStatus::Fail
                        }
                    }
                }
            }
        };
        attachment_status = Some(status);
        statuses.push(status);
    }

    let status = RuleStatus::worst(statuses);
    let detail = RuleResultDetail::new(
        rec.account_ref.clone(),
        "Account reconciliation tie-out evaluated.",
    )
    .with("account_name", account_name)
    .with("period_end", ctx.period_end)
    .with("statement_end_date", statement_end)
    .with("statement_ending_balance", statement_bal_q)
    .with("book_balance_as_of_statement_end", statement_end_q)
    .with("statement_tie_difference", statement_diff)
    .with("statement_tie_status", statement_status)
    .with("balance_sheet_balance", DetailValue::opt_amount(bs_q))
    .with(
        "book_balance_as_of_period_end",
        DetailValue::opt_amount(rec.book_balance_as_of_period_end.map(|b| cfg.common.quantize(b))),
    )
    .with("period_end_tie_difference", DetailValue::opt_amount(period_end_diff))
    .with(
        "period_end_tie_status",
        period_end_status.map(DetailValue::from).unwrap_or(DetailValue::Null),
    )
    .with(
        "statement_balance_matches_balance_sheet_difference",
        DetailValue::opt_amount(statement_vs_bs_diff),
    )
    .with(
        "statement_balance_matches_balance_sheet_status",
        statement_vs_bs_status.map(DetailValue::from).unwrap_or(DetailValue::Null),
    )
    .with(
        "statement_balance_attachment_evidence_type",
        cfg.statement_balance_attachment_evidence_type.clone(),
    )
    .with(
        "attachment_statement_end_date",
        DetailValue::opt_date(attachment_statement_end),
    )
    .with("attachment_amount", DetailValue::opt_amount(attachment_amount))
    .with("attachment_uri", DetailValue::opt_text(attachment_uri.as_deref()))
    .with("attachment_balance_difference", DetailValue::opt_amount(attachment_diff))
    .with(
        "attachment_status",
        attachment_status.map(DetailValue::from).unwrap_or(DetailValue::Null),
    )
    .with("status", status);

    TieOut {
        status,
        detail,
        evidence: attachment_item,
    }
}

pub struct BankReconciledThroughPeriodEnd;

impl Rule for BankReconciledThroughPeriodEnd {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "BankReconciledRuleConfig",
            json!({
                "include_accounts": {"type": "array", "items": {"type": "string"}},
                "exclude_accounts": {"type": "array", "items": {"type": "string"}},
                "expected_accounts": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "explicit maintenance scope; overrides inference",
                },
                "require_statement_end_date_gte_period_end": {"type": "boolean", "default": true},
                "require_book_balance_as_of_period_end_ties_to_balance_sheet": {
                    "type": "boolean",
                    "default": true,
                },
                "require_statement_balance_matches_balance_sheet": {
                    "type": "boolean",
                    "default": true,
                },
                "require_statement_balance_matches_attachment": {
                    "type": "boolean",
                    "default": true,
                },
                "statement_balance_attachment_evidence_type": {
                    "type": "string",
                    "default": "statement_balance_attachment",
                },
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: BankReconciledRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let missing_status = cfg.common.missing_status();
        let period = ctx.period_end.format("%Y-%m-%d");

        let (inferred, infer_detail) = infer_scope(ctx);
        if inferred.is_none() && cfg.expected_accounts.is_empty() {
            let mut builder = RuleResult::builder(&SPEC, RuleStatus::NeedsReview)
                .summary(format!(
                    "Cannot determine bank/credit card reconciliation scope for {period}; \
                     account type/subtype data is missing."
                ))
                .human_action(
                    "Ensure the adapter provides Balance Sheet account type/subtype to \
                     infer bank/cc scope.",
                );
            if let Some(detail) = infer_detail {
                builder = builder.detail(detail);
            }
            return Ok(builder.build());
        }

        let required_refs = determine_scope(&cfg, inferred.as_deref().unwrap_or(&[]));
        if required_refs.is_empty() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary(format!(
                    "No bank/credit card accounts in-scope as of {period}."
                ))
                .build());
        }

        let mut statuses: Vec<RuleStatus> = Vec::new();
        let mut details: Vec<RuleResultDetail> = Vec::new();
        let mut evidence_used: Vec<EvidenceItem> = Vec::new();

        if let Some(detail) = infer_detail {
            statuses.push(RuleStatus::NeedsReview);
            details.push(detail);
        }
        if let Some((status, detail)) =
            check_maintenance_count(ctx, &cfg, inferred.as_deref())
        {
            statuses.push(status);
            details.push(detail);
        }

        for account_ref in &required_refs {
            let account_name = ctx.account_name(account_ref).to_string();
            let Some(latest) = latest_reconciliation(&ctx.reconciliations, account_ref) else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(
                        account_ref.clone(),
                        "Missing reconciliation snapshot for this account.",
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
            let outcome = evaluate_one(
                ctx,
                latest,
                &cfg,
                ctx.account_balance(account_ref),
                &account_name,
            );
            statuses.push(outcome.status);
            details.push(outcome.detail);
            if let Some(item) = outcome.evidence {
                evidence_used.push(item);
            }
        }

        let overall = RuleStatus::worst(statuses);
        let exemplar = RuleResult::exemplar_detail(&details, overall);
        let summary = match overall {
            RuleStatus::Pass => format!(
                "All {} account(s) are reconciled through {period} and tie out exactly.",
                required_refs.len(),
            ),
            RuleStatus::Fail => match exemplar {
                Some(d) if d.key == "scope_count" => format!(
                    "Maintenance bank/cc account count does not match Balance Sheet \
                     bank/cc count as of {period}."
                ),
                Some(d) => {
                    let name = match d.values.get("account_name") {
                        Some(DetailValue::Text(s)) => s.clone(),
                        _ => String::new(),
                    };
                    format!(
                        "Account '{name}' is not reconciled through period end or fails \
                         tie-out as of {period}."
                    )
                }
                None => format!(
                    "One or more accounts fail reconciliation tie-out as of {period}."
                ),
            },
            RuleStatus::NeedsReview => format!(
                "Missing data prevented evaluation for one or more accounts as of {period}."
            ),
            _ => "Not applicable.".to_string(),
        };
        let human_action = overall.needs_human_action().then(|| {
            "Verify reconciliation status through MER period end, confirm statement \
             ending balances against bank statements, and tie out register/book balances \
             to the Balance Sheet; explain or correct any variances."
                .to_string()
        });

        let mut builder = RuleResult::builder(&SPEC, overall)
            .summary(summary)
            .details(details)
            .maybe_human_action(human_action);
        for item in &evidence_used {
            builder = builder.evidence(item);
        }
        Ok(builder.build())
    }
}
