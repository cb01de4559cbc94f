//! End-to-end scenarios for the MER balance-sheet review engine: concrete
//! reviewer-visible outcomes plus the universal engine invariants
//! (determinism, disabled→NOT_APPLICABLE, registration-order reporting).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use closecheck_engine::config::ClientRulesConfig;
use closecheck_engine::context::RuleContext;
use closecheck_engine::evidence::{EvidenceBundle, EvidenceItem};
use closecheck_engine::registry::RuleRegistry;
use closecheck_engine::runner::RulesRunner;
use closecheck_engine::snapshot::{
    AccountBalance, BalanceSheetSnapshot, ProfitAndLossSnapshot, ReconciliationSnapshot,
};
use closecheck_engine::status::{RuleStatus, Severity};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn period_end() -> NaiveDate {
    date(2025, 12, 31)
}

fn account(
    account_ref: &str,
    name: &str,
    account_type: &str,
    balance: Decimal,
) -> AccountBalance {
    AccountBalance {
        account_ref: account_ref.to_string(),
        name: name.to_string(),
        account_type: account_type.to_string(),
        subtype: String::new(),
        balance,
    }
}

fn context(accounts: Vec<AccountBalance>) -> RuleContext {
    RuleContext {
        period_end: period_end(),
        balance_sheet: BalanceSheetSnapshot {
            as_of_date: period_end(),
            currency: "USD".to_string(),
            accounts,
        },
        prior_balance_sheet: None,
        profit_and_loss: None,
        evidence: EvidenceBundle::default(),
        reconciliations: Vec::new(),
        client_config: ClientRulesConfig::default(),
    }
}

fn evidence(
    evidence_type: &str,
    amount: Option<Decimal>,
    as_of_date: Option<NaiveDate>,
    meta: serde_json::Value,
) -> EvidenceItem {
    EvidenceItem {
        evidence_type: evidence_type.to_string(),
        source: "test".to_string(),
        as_of_date,
        statement_end_date: None,
        amount,
        uri: None,
        meta: serde_json::from_value(meta).expect("meta map"),
    }
}

fn bank_reconciliation(statement_end: NaiveDate) -> ReconciliationSnapshot {
    ReconciliationSnapshot {
        account_ref: "acct::BANK1".to_string(),
        account_name: "Chequing".to_string(),
        statement_end_date: Some(statement_end),
        statement_ending_balance: Some(dec!(1000.00)),
        book_balance_as_of_statement_end: Some(dec!(1000.00)),
        book_balance_as_of_period_end: Some(dec!(1000.00)),
        source: String::new(),
        meta: BTreeMap::new(),
    }
}

fn bank_attachment(statement_end: NaiveDate) -> EvidenceItem {
    let mut item = evidence(
        "statement_balance_attachment",
        Some(dec!(1000.00)),
        None,
        json!({"account_ref": "acct::BANK1"}),
    );
    item.statement_end_date = Some(statement_end);
    item
}

fn run(ctx: &RuleContext) -> closecheck_engine::runner::RuleRunReport {
    let registry = RuleRegistry::with_builtin_rules().expect("builtin registry");
    RulesRunner::new(&registry).run(ctx)
}

// -- Concrete scenarios (period_end = 2025-12-31) --

#[test]
fn bank_reconciled_clean_pass() {
    let mut ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", dec!(1000.00))]);
    ctx.reconciliations.push(bank_reconciliation(period_end()));
    ctx.evidence.items.push(bank_attachment(period_end()));

    let report = run(&ctx);
    let result = report
        .result("BS-BANK-RECONCILED-THROUGH-PERIOD-END")
        .expect("bank rule ran");
    assert_eq!(result.status, RuleStatus::Pass);
    assert_eq!(result.severity, Severity::Info);
    assert!(result.human_action.is_none());
}

#[test]
fn bank_statement_coverage_failure() {
    let mut ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", dec!(1000.00))]);
    ctx.reconciliations
        .push(bank_reconciliation(date(2025, 11, 30)));
    ctx.evidence.items.push(bank_attachment(date(2025, 11, 30)));

    let report = run(&ctx);
    let result = report
        .result("BS-BANK-RECONCILED-THROUGH-PERIOD-END")
        .expect("bank rule ran");
    assert_eq!(result.status, RuleStatus::Fail);
    assert_eq!(result.severity, Severity::High);
    let coverage = result.details[0]
        .values
        .get("coverage")
        .expect("coverage check recorded");
    assert_eq!(
        serde_json::to_value(coverage).expect("serialize"),
        json!("FAIL")
    );
}

#[test]
fn clearing_account_within_tolerance_warns() {
    let mut ctx = context(vec![account(
        "acct::CLR",
        "Shopify Clearing",
        "Other Current Asset",
        dec!(5.00),
    )]);
    ctx.profit_and_loss = Some(ProfitAndLossSnapshot {
        period_start: date(2025, 12, 1),
        period_end: period_end(),
        currency: "USD".to_string(),
        totals: BTreeMap::from([("revenue".to_string(), dec!(100000.00))]),
    });
    ctx.client_config.rules.insert(
        "BS-CLEARING-ACCOUNTS-ZERO".to_string(),
        json!({"default_threshold": {"floor_amount": "0", "pct_of_revenue": "0.001"}}),
    );

    let report = run(&ctx);
    let result = report
        .result("BS-CLEARING-ACCOUNTS-ZERO")
        .expect("clearing rule ran");
    assert_eq!(result.status, RuleStatus::Warn);
    assert_eq!(result.severity, Severity::Low);
}

#[test]
fn petty_cash_mismatch_fails_with_difference() {
    let mut ctx = context(vec![account(
        "acct::PC",
        "Petty Cash",
        "Bank",
        dec!(250.00),
    )]);
    ctx.evidence.items.push(evidence(
        "petty_cash_support",
        Some(dec!(200.00)),
        Some(period_end()),
        json!({}),
    ));
    ctx.client_config.rules.insert(
        "BS-PETTY-CASH-MATCH".to_string(),
        json!({"account_ref": "acct::PC", "account_name": "Petty Cash"}),
    );

    let report = run(&ctx);
    let result = report.result("BS-PETTY-CASH-MATCH").expect("petty cash ran");
    assert_eq!(result.status, RuleStatus::Fail);
    assert_eq!(result.severity, Severity::High);
    assert_eq!(
        serde_json::to_value(result.details[0].values.get("difference").expect("diff"))
            .expect("serialize"),
        json!("50.00")
    );
}

#[test]
fn tax_filings_delinquent_quarterly_filer_fails() {
    let mut ctx = context(vec![]);
    ctx.evidence.items.push(evidence(
        "tax_agencies",
        None,
        None,
        json!({"items": [
            {"id": "3", "display_name": "CRA GST", "last_file_date": "2025-07-20",
             "tax_tracked_on_sales": true},
        ]}),
    ));
    ctx.evidence.items.push(evidence(
        "tax_returns",
        None,
        None,
        json!({"items": [
            {"agency_id": "3", "start_date": "2025-01-01", "end_date": "2025-03-31",
             "file_date": "2025-04-20"},
            {"agency_id": "3", "start_date": "2025-04-01", "end_date": "2025-06-30",
             "file_date": "2025-07-20"},
        ]}),
    ));

    let report = run(&ctx);
    let result = report
        .result("BS-TAX-FILINGS-UP-TO-DATE")
        .expect("tax filings ran");
    assert_eq!(result.status, RuleStatus::Fail);
    assert_eq!(result.severity, Severity::High);
    assert_eq!(
        serde_json::to_value(
            result.details[0]
                .values
                .get("expected_period_end")
                .expect("expected period end")
        )
        .expect("serialize"),
        json!("2025-09-30")
    );
}

#[test]
fn stale_uncleared_item_warns_and_counts_one() {
    let mut ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", dec!(1000.00))]);
    let mut rec = bank_reconciliation(date(2025, 11, 30));
    rec.meta = serde_json::from_value(json!({
        "uncleared_items": {
            "as_at": [
                {"txn_date": "2025-08-15", "description": "stale cheque", "amount": "120.00"},
                {"txn_date": "2025-10-20", "description": "recent emt", "amount": "45.00"},
            ],
            "after_date": [],
        }
    }))
    .expect("meta");
    ctx.reconciliations.push(rec);

    let report = run(&ctx);
    let result = report
        .result("BS-UNCLEARED-ITEMS-INVESTIGATED-AND-FLAGGED")
        .expect("uncleared rule ran");
    assert_eq!(result.status, RuleStatus::Warn);
    assert_eq!(result.severity, Severity::Low);
    assert_eq!(
        serde_json::to_value(
            result.details[0]
                .values
                .get("flagged_uncleared_items_count")
                .expect("count")
        )
        .expect("serialize"),
        json!(1)
    );
}

// -- Universal invariants --

#[test]
fn identical_runs_are_byte_identical() {
    let mut ctx = context(vec![
        account("acct::BANK1", "Chequing", "Bank", dec!(1000.00)),
        account("acct::CLR", "Shopify Clearing", "Other Current Asset", dec!(5.00)),
    ]);
    ctx.reconciliations.push(bank_reconciliation(period_end()));
    ctx.evidence.items.push(bank_attachment(period_end()));

    let first = serde_json::to_string(&run(&ctx)).expect("serialize");
    let second = serde_json::to_string(&run(&ctx)).expect("serialize");
    assert_eq!(first, second);
}

#[test]
fn mutating_a_report_does_not_affect_later_runs() {
    let ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", dec!(100))]);
    let mut first = run(&ctx);
    first.results.clear();
    first.totals.clear();
    let second = run(&ctx);
    assert!(!second.results.is_empty());
}

#[test]
fn disabling_every_rule_yields_not_applicable_across_the_board() {
    let registry = RuleRegistry::with_builtin_rules().expect("builtin registry");
    let mut ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", dec!(100))]);
    for rule_id in registry.ids() {
        ctx.client_config
            .rules
            .insert(rule_id.to_string(), json!({"enabled": false}));
    }
    let report = RulesRunner::new(&registry).run(&ctx);
    assert_eq!(report.results.len(), registry.len());
    for result in &report.results {
        assert_eq!(result.status, RuleStatus::NotApplicable, "{}", result.rule_id);
        assert_eq!(result.severity, Severity::Info, "{}", result.rule_id);
        assert!(result.details.is_empty(), "{}", result.rule_id);
    }
    assert_eq!(
        report.total(RuleStatus::NotApplicable),
        registry.len() as u64
    );
}

#[test]
fn results_come_back_in_registration_order() {
    let registry = RuleRegistry::with_builtin_rules().expect("builtin registry");
    let ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", dec!(100))]);
    let report = RulesRunner::new(&registry).run(&ctx);
    let result_ids: Vec<&str> = report.results.iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(result_ids, registry.ids());
}

#[test]
fn totals_histogram_accounts_for_every_rule() {
    let registry = RuleRegistry::with_builtin_rules().expect("builtin registry");
    let ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", dec!(100))]);
    let report = RulesRunner::new(&registry).run(&ctx);
    let counted: u64 = report.totals.values().sum();
    assert_eq!(counted, registry.len() as u64);
}

#[test]
fn quantization_makes_sub_quantum_drift_invisible() {
    // Two contexts whose amounts differ by less than half a cent must
    // produce the same status when quantized to cents.
    let build = |support: Decimal| {
        let mut ctx = context(vec![account("acct::PC", "Petty Cash", "Bank", dec!(250.00))]);
        ctx.evidence.items.push(evidence(
            "petty_cash_support",
            Some(support),
            Some(period_end()),
            json!({}),
        ));
        ctx.client_config.rules.insert(
            "BS-PETTY-CASH-MATCH".to_string(),
            json!({"account_ref": "acct::PC", "amount_quantize": "0.01"}),
        );
        ctx
    };
    let exact = run(&build(dec!(250.00)));
    let drifted = run(&build(dec!(250.002)));
    assert_eq!(
        exact.result("BS-PETTY-CASH-MATCH").expect("ran").status,
        drifted.result("BS-PETTY-CASH-MATCH").expect("ran").status,
    );
    assert_eq!(
        exact.result("BS-PETTY-CASH-MATCH").expect("ran").status,
        RuleStatus::Pass
    );
}

#[test]
fn config_payload_with_wrong_type_isolates_to_one_rule() {
    let mut ctx = context(vec![account("acct::BANK1", "Chequing", "Bank", dec!(100))]);
    ctx.client_config.rules.insert(
        "BS-PETTY-CASH-MATCH".to_string(),
        json!({"enabled": "definitely"}),
    );
    let report = run(&ctx);
    let result = report.result("BS-PETTY-CASH-MATCH").expect("ran");
    assert_eq!(result.status, RuleStatus::NeedsReview);
    assert!(result.summary.starts_with("configuration invalid:"));
    // Every other rule still produced a result.
    let registry = RuleRegistry::with_builtin_rules().expect("builtin registry");
    assert_eq!(report.results.len(), registry.len());
}
