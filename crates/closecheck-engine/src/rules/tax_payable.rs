//! Tax payable and suspense balances reconciled to the most recent expected
//! return, net of payments made through period end.
//!
//! Accounts are mapped to agencies by name: the agency's display name
//! first, then GST/HST to the revenue agency and PST to the finance
//! ministry. The expected filing period rolls the same cadence as the
//! filings check. Refunds that remain unissued past the grace period warn;
//! a negative payable outside a refund scenario warns as a placement
//! anomaly.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::amount::parse_decimal;
use crate::calendar::{expected_period_end, parse_date, FilingCadence};
use crate::config::{config_schema, TaxPayableRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evidence::EvidenceItem;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::rules::tax_filings::{parse_agencies, TaxAgency};
use crate::snapshot::AccountBalance;
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-TAX-PAYABLE-AND-SUSPENSE-RECONCILE-TO-RETURN",
    rule_title: "Tax payable/suspense reconcile to most recent return",
    best_practices_reference: "Tax accounts",
    sources: &["QBO (Balance Sheet)", "Tax return export", "Tax payment export"],
};

struct TaxReturnAmount {
    agency_id: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    file_date: Option<NaiveDate>,
    net_tax_amount_due: Option<Decimal>,
}

struct TaxPayment {
    payment_date: Option<NaiveDate>,
    payment_amount: Option<Decimal>,
    refund: bool,
    agency_id: Option<String>,
}

fn parse_return_amounts(item: &EvidenceItem) -> Vec<TaxReturnAmount> {
    item.meta_items()
        .unwrap_or_default()
        .into_iter()
        .map(|entry| TaxReturnAmount {
            agency_id: entry
                .get("agency_id")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            start_date: entry.get("start_date").and_then(parse_date),
            end_date: entry.get("end_date").and_then(parse_date),
            file_date: entry.get("file_date").and_then(parse_date),
            net_tax_amount_due: entry.get("net_tax_amount_due").and_then(parse_decimal),
        })
        .collect()
}

fn parse_payments(item: &EvidenceItem) -> Vec<TaxPayment> {
    item.meta_items()
        .unwrap_or_default()
        .into_iter()
        .map(|entry| TaxPayment {
            payment_date: entry.get("payment_date").and_then(parse_date),
            payment_amount: entry.get("payment_amount").and_then(parse_decimal),
            refund: entry.get("refund") == Some(&Value::Bool(true)),
            agency_id: entry
                .get("agency_id")
                .and_then(Value::as_str)
                .map(|s| s.to_string()),
        })
        .collect()
}

fn infer_agency_for_account(account_name: &str, agencies: &[TaxAgency]) -> Option<String> {
    let lowered = account_name.to_lowercase();
    for agency in agencies {
        if !agency.display_name.is_empty()
            && lowered.contains(&agency.display_name.to_lowercase())
        {
            return Some(agency.agency_id.clone());
        }
    }
    if lowered.contains("gst") || lowered.contains("hst") {
        for agency in agencies {
            if agency.display_name.to_lowercase().contains("revenue agency") {
                return Some(agency.agency_id.clone());
            }
        }
    }
    if lowered.contains("pst") {
        for agency in agencies {
            if agency.display_name.to_lowercase().contains("finance") {
                return Some(agency.agency_id.clone());
            }
        }
    }
    None
}

fn is_payable_name(name: &str) -> bool {
    name.to_lowercase().contains("payable")
}

fn is_suspense_name(name: &str) -> bool {
    let lowered = name.to_lowercase();
    // "suspence" shows up in real charts of accounts.
    lowered.contains("suspense") || lowered.contains("suspence")
}

pub struct TaxPayableAndSuspenseReconcileToReturn;

impl Rule for TaxPayableAndSuspenseReconcileToReturn {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "TaxPayableRuleConfig",
            json!({
                "account_name_patterns": {"type": "array", "items": {"type": "string"}},
                "tax_agencies_evidence_type": {"type": "string", "default": "tax_agencies"},
                "tax_returns_evidence_type": {"type": "string", "default": "tax_returns"},
                "tax_payments_evidence_type": {"type": "string", "default": "tax_payments"},
                "refund_grace_days": {"type": "integer", "default": 60},
                "delinquent_status": {
                    "type": "string",
                    "enum": ["WARN", "FAIL", "NEEDS_REVIEW"],
                    "default": "FAIL",
                },
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: TaxPayableRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let missing_status = cfg.common.missing_status();
        let period = ctx.period_end.format("%Y-%m-%d");

        let agencies_item = ctx.evidence.first(&cfg.tax_agencies_evidence_type);
        let returns_item = ctx.evidence.first(&cfg.tax_returns_evidence_type);
        let payments_item = ctx.evidence.first(&cfg.tax_payments_evidence_type);
        let (Some(agencies_item), Some(returns_item), Some(payments_item)) =
            (agencies_item, returns_item, payments_item)
        else {
            return Ok(RuleResult::builder(&SPEC, missing_status)
                .summary("Missing tax agency/return/payment data; cannot reconcile tax balances.")
                .evidence_opt(agencies_item)
                .evidence_opt(returns_item)
                .evidence_opt(payments_item)
                .human_action("Provide tax agency, return, and payment exports.")
                .build());
        };

        let agencies = parse_agencies(agencies_item);
        let returns = parse_return_amounts(returns_item);
        let payments = parse_payments(payments_item);
        if agencies.is_empty() || returns.is_empty() {
            return Ok(RuleResult::builder(&SPEC, missing_status)
                .summary("Tax agency/return data is empty; cannot reconcile tax balances.")
                .evidence(agencies_item)
                .evidence(returns_item)
                .evidence(payments_item)
                .human_action("Confirm the tax agency and tax return exports contain data.")
                .build());
        }

        let scope_accounts: Vec<&AccountBalance> = ctx
            .balance_sheet
            .leaf_accounts()
            .filter(|a| {
                !a.name.is_empty()
                    && cfg
                        .account_name_patterns
                        .iter()
                        .any(|p| a.name.to_lowercase().contains(&p.to_lowercase()))
            })
            .collect();
        if scope_accounts.is_empty() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary("No tax payable/suspense accounts found on Balance Sheet.")
                .build());
        }

        let mut statuses = Vec::new();
        let mut details = Vec::new();

        // Group accounts by inferred agency; unmapped accounts go to review.
        let mut accounts_by_agency: Vec<(String, Vec<&AccountBalance>)> = Vec::new();
        for acct in &scope_accounts {
            let Some(agency_id) = infer_agency_for_account(&acct.name, &agencies) else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(
                        acct.account_ref.clone(),
                        "Tax account could not be mapped to a tax agency.",
                    )
                    .with("account_name", acct.name.clone())
                    .with("balance", acct.balance)
                    .with("period_end", ctx.period_end)
                    .with("status", missing_status),
                );
                continue;
            };
            match accounts_by_agency.iter_mut().find(|(id, _)| *id == agency_id) {
                Some((_, group)) => group.push(*acct),
                None => accounts_by_agency.push((agency_id, vec![*acct])),
            }
        }

        let payments_mapped = payments.iter().any(|p| p.agency_id.is_some());

        for (agency_id, accounts) in &accounts_by_agency {
            let agency_name = agencies
                .iter()
                .find(|a| &a.agency_id == agency_id)
                .map(|a| a.display_name.clone())
                .unwrap_or_else(|| agency_id.clone());
            let agency_returns: Vec<&TaxReturnAmount> =
                returns.iter().filter(|r| &r.agency_id == agency_id).collect();
            let filed: Vec<&&TaxReturnAmount> = agency_returns
                .iter()
                .filter(|r| r.file_date.is_some())
                .collect();
            let Some(latest_filed) = filed
                .iter()
                .max_by_key(|r| r.end_date.or(r.file_date).unwrap_or(NaiveDate::MIN))
            else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(
                        agency_id.clone(),
                        "No filed tax returns found for agency.",
                    )
                    .with("agency_name", agency_name)
                    .with("period_end", ctx.period_end)
                    .with("status", missing_status),
                );
                continue;
            };

            let cadence = match (latest_filed.start_date, latest_filed.end_date) {
                (Some(start), Some(end)) => FilingCadence::from_period(start, end),
                _ => None,
            };
            let Some(cadence) = cadence else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(
                        agency_id.clone(),
                        "Unable to infer filing cadence for agency.",
                    )
                    .with("agency_name", agency_name)
                    .with("period_end", ctx.period_end)
                    .with("status", missing_status),
                );
                continue;
            };

            let Some(anchor_end) = agency_returns.iter().filter_map(|r| r.end_date).max()
            else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(
                        agency_id.clone(),
                        "Unable to determine expected filing period end.",
                    )
                    .with("agency_name", agency_name)
                    .with("period_end", ctx.period_end)
                    .with("status", missing_status),
                );
                continue;
            };
            let expected_end = expected_period_end(ctx.period_end, cadence, anchor_end);

            // Target return: the expected period if filed, else the latest
            // return on or before it.
            let target = agency_returns
                .iter()
                .find(|r| r.end_date == Some(expected_end))
                .copied()
                .or_else(|| {
                    agency_returns
                        .iter()
                        .filter(|r| r.end_date.is_some_and(|d| d <= expected_end))
                        .max_by_key(|r| r.end_date.unwrap_or(NaiveDate::MIN))
                        .copied()
                });
            let Some((target, net_due)) =
                target.and_then(|r| r.net_tax_amount_due.map(|n| (r, n)))
            else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(
                        agency_id.clone(),
                        "No return found for expected filing period.",
                    )
                    .with("agency_name", agency_name)
                    .with("period_end", ctx.period_end)
                    .with("expected_period_end", expected_end)
                    .with("status", missing_status),
                );
                continue;
            };

            let payable_only: Decimal = accounts
                .iter()
                .filter(|a| is_payable_name(&a.name))
                .map(|a| a.balance)
                .sum();
            let suspense_only: Decimal = accounts
                .iter()
                .filter(|a| is_suspense_name(&a.name))
                .map(|a| a.balance)
                .sum();
            let actual_total = cfg.common.quantize(payable_only + suspense_only);

            let mut net_payments = Decimal::ZERO;
            if payments_mapped {
                for payment in payments.iter().filter(|p| {
                    p.agency_id.as_deref() == Some(agency_id.as_str())
                }) {
                    let (Some(amount), Some(date)) =
                        (payment.payment_amount, payment.payment_date)
                    else {
                        continue;
                    };
                    if date > ctx.period_end {
                        continue;
                    }
                    net_payments += if payment.refund { -amount } else { amount };
                }
            }
            let expected_total = cfg.common.quantize(net_due - net_payments);
            let difference = (actual_total - expected_total).abs();

            let mut core_status = if difference.is_zero() {
                RuleStatus::Pass
            } else {
                cfg.delinquent_status
            };

            // Refund scenarios: a filed refund that never arrived goes stale.
            let mut note: Option<String> = None;
            if net_due < Decimal::ZERO && core_status == RuleStatus::Pass {
                note = Some(
                    "Refund indicated on latest return; refund may not have been issued yet."
                        .to_string(),
                );
                if let Some(file_date) = target.file_date {
                    let days_since_file =
                        ctx.period_end.signed_duration_since(file_date).num_days();
                    if days_since_file > cfg.refund_grace_days {
                        core_status = RuleStatus::Warn;
                    }
                }
            }

            let mut placement_warning: Option<String> = None;
            if payable_only < Decimal::ZERO {
                if net_due < Decimal::ZERO && core_status == RuleStatus::Pass {
                    placement_warning =
                        Some("Payable is negative; refund/credit scenario.".to_string());
                } else {
                    core_status = RuleStatus::worst([core_status, RuleStatus::Warn]);
                    placement_warning = Some(
                        "Payable is negative; verify refund/overpayment/coding.".to_string(),
                    );
                }
            }

            statuses.push(core_status);
            details.push(
                RuleResultDetail::new(
                    agency_id.clone(),
                    "Tax payable/suspense balance reconciled to expected return.",
                )
                .with("agency_name", agency_name)
                .with("period_end", ctx.period_end)
                .with("expected_period_end", expected_end)
                .with("return_start_date", DetailValue::opt_date(target.start_date))
                .with("return_end_date", DetailValue::opt_date(target.end_date))
                .with("return_file_date", DetailValue::opt_date(target.file_date))
                .with("return_net_tax_due", net_due)
                .with("net_payments", net_payments)
                .with("payments_mapped_to_agency", payments_mapped)
                .with("expected_total", expected_total)
                .with("actual_total", actual_total)
                .with("difference", difference)
                .with("payable_only", payable_only)
                .with("suspense_only", suspense_only)
                .with("note", DetailValue::opt_text(note.as_deref()))
                .with(
                    "placement_warning",
                    DetailValue::opt_text(placement_warning.as_deref()),
                )
                .with("status", core_status),
            );
        }

        let overall = RuleStatus::worst(statuses);
        let summary = if overall == RuleStatus::Pass {
            format!(
                "Tax payable/suspense balances reconcile to expected returns as of {period}."
            )
        } else {
            "Tax payable/suspense balances require review against the most recent returns."
                .to_string()
        };
        let human_action = overall.needs_human_action().then(|| {
            "Reconcile tax payable/suspense balances to the expected return and payments."
                .to_string()
        });

        Ok(RuleResult::builder(&SPEC, overall)
            .summary(summary)
            .details(details)
            .evidence(agencies_item)
            .evidence(returns_item)
            .evidence(payments_item)
            .maybe_human_action(human_action)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testkit::{account, context, evidence_with_meta};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn tax_ctx(
        accounts: Vec<AccountBalance>,
        returns: Value,
        payments: Value,
    ) -> crate::context::RuleContext {
        let mut ctx = context(accounts);
        ctx.evidence.items.push(evidence_with_meta(
            "tax_agencies",
            None,
            None,
            json!({"items": [
                {"id": "3", "display_name": "Canada Revenue Agency", "tax_tracked_on_sales": true},
                {"id": "5", "display_name": "Ministry of Finance", "tax_tracked_on_sales": true},
            ]}),
        ));
        ctx.evidence.items.push(evidence_with_meta(
            "tax_returns",
            None,
            None,
            json!({"items": returns}),
        ));
        ctx.evidence.items.push(evidence_with_meta(
            "tax_payments",
            None,
            None,
            json!({"items": payments}),
        ));
        ctx
    }

    #[test]
    fn payable_net_of_payment_reconciles() {
        // Expected period Q3 (anchor 2025-09-30); net due 5000, paid 2000
        // before period end → expected combined balance 3000.
        let ctx = tax_ctx(
            vec![account(
                "acct::GST",
                "GST/HST Payable",
                "Other Current Liability",
                "",
                dec!(3000.00),
            )],
            json!([
                {"agency_id": "3", "start_date": "2025-07-01", "end_date": "2025-09-30",
                 "file_date": "2025-10-20", "net_tax_amount_due": "5000.00"},
            ]),
            json!([
                {"agency_id": "3", "payment_date": "2025-11-15", "payment_amount": "2000.00"},
            ]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
        let detail = &result.details[0];
        assert_eq!(
            detail.values.get("expected_total"),
            Some(&DetailValue::Amount(dec!(3000.00)))
        );
    }

    #[test]
    fn combined_mismatch_is_delinquent() {
        let ctx = tax_ctx(
            vec![
                account("acct::GST", "GST/HST Payable", "Other Current Liability", "", dec!(4000.00)),
                account("acct::SUSP", "GST/HST Suspense", "Other Current Liability", "", dec!(100.00)),
            ],
            json!([
                {"agency_id": "3", "start_date": "2025-07-01", "end_date": "2025-09-30",
                 "file_date": "2025-10-20", "net_tax_amount_due": "5000.00"},
            ]),
            json!([]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Fail);
        let detail = &result.details[0];
        assert_eq!(
            detail.values.get("difference"),
            Some(&DetailValue::Amount(dec!(900.00)))
        );
    }

    #[test]
    fn suspense_combines_with_payable() {
        let ctx = tax_ctx(
            vec![
                account("acct::GST", "GST/HST Payable", "Other Current Liability", "", dec!(4000.00)),
                account("acct::SUSP", "GST/HST Suspense", "Other Current Liability", "", dec!(1000.00)),
            ],
            json!([
                {"agency_id": "3", "start_date": "2025-07-01", "end_date": "2025-09-30",
                 "file_date": "2025-10-20", "net_tax_amount_due": "5000.00"},
            ]),
            json!([]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
    }

    #[test]
    fn stale_refund_warns() {
        // Refund filed 2025-09-01, more than 60 days before period end, and
        // the books still carry the matching negative balance.
        let ctx = tax_ctx(
            vec![account(
                "acct::GST",
                "GST/HST Payable",
                "Other Current Liability",
                "",
                dec!(-750.00),
            )],
            json!([
                {"agency_id": "3", "start_date": "2025-07-01", "end_date": "2025-09-30",
                 "file_date": "2025-09-01", "net_tax_amount_due": "-750.00"},
            ]),
            json!([]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Warn);
    }

    #[test]
    fn negative_payable_in_refund_scenario_stays_pass() {
        // Refund filed within the grace window: the negative payable is a
        // refund/credit note, not a placement anomaly.
        let ctx = tax_ctx(
            vec![account(
                "acct::GST",
                "GST/HST Payable",
                "Other Current Liability",
                "",
                dec!(-5000.00),
            )],
            json!([
                {"agency_id": "3", "start_date": "2025-07-01", "end_date": "2025-09-30",
                 "file_date": "2025-11-20", "net_tax_amount_due": "-5000.00"},
            ]),
            json!([]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
        let detail = &result.details[0];
        assert!(matches!(
            detail.values.get("placement_warning"),
            Some(DetailValue::Text(_))
        ));
    }

    #[test]
    fn negative_payable_with_positive_due_warns() {
        let ctx = tax_ctx(
            vec![
                account("acct::GST", "GST/HST Payable", "Other Current Liability", "", dec!(-300.00)),
                account("acct::SUSP", "GST/HST Suspense", "Other Current Liability", "", dec!(800.00)),
            ],
            json!([
                {"agency_id": "3", "start_date": "2025-07-01", "end_date": "2025-09-30",
                 "file_date": "2025-10-20", "net_tax_amount_due": "500.00"},
            ]),
            json!([]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        // Combined total ties out, but the payable itself sits negative.
        assert_eq!(result.status, RuleStatus::Warn);
    }

    #[test]
    fn pst_account_maps_to_finance_ministry() {
        let ctx = tax_ctx(
            vec![account(
                "acct::PST",
                "PST Payable",
                "Other Current Liability",
                "",
                dec!(200.00),
            )],
            json!([
                {"agency_id": "5", "start_date": "2025-11-01", "end_date": "2025-11-30",
                 "file_date": "2025-12-10", "net_tax_amount_due": "200.00"},
            ]),
            json!([]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
        assert_eq!(result.details[0].key, "5");
    }

    #[test]
    fn unmapped_account_routes_to_missing_policy() {
        let ctx = tax_ctx(
            vec![account(
                "acct::QST",
                "QST Payable",
                "Other Current Liability",
                "",
                dec!(10.00),
            )],
            json!([]),
            json!([]),
        );
        // Returns list empty → early missing-data exit.
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn unmapped_payments_are_ignored() {
        // Payments carry no agency ids at all: reconcile against the raw
        // net due rather than subtracting unattributable cash.
        let ctx = tax_ctx(
            vec![account(
                "acct::GST",
                "GST/HST Payable",
                "Other Current Liability",
                "",
                dec!(5000.00),
            )],
            json!([
                {"agency_id": "3", "start_date": "2025-07-01", "end_date": "2025-09-30",
                 "file_date": "2025-10-20", "net_tax_amount_due": "5000.00"},
            ]),
            json!([
                {"payment_date": "2025-11-15", "payment_amount": "2000.00"},
            ]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
    }

    #[test]
    fn no_tax_accounts_is_not_applicable() {
        let ctx = tax_ctx(
            vec![account("acct::BANK", "Chequing", "Bank", "", dec!(1))],
            json!([{"agency_id": "3", "start_date": "2025-07-01", "end_date": "2025-09-30",
                    "file_date": "2025-10-20", "net_tax_amount_due": "1.00"}]),
            json!([]),
        );
        let result = TaxPayableAndSuspenseReconcileToReturn
            .evaluate(&ctx)
            .expect("evaluate");
        assert_eq!(result.status, RuleStatus::NotApplicable);
    }
}
