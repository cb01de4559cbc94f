//! Loan and investment balances tied to an external schedule or statement.
//!
//! One evaluator, two controls. The target account comes from config or
//! from name inference; more than one inferred match is ambiguity the rule
//! refuses to resolve. The evidence amount must be as of period end and
//! equal the book balance exactly.

use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::config::{config_schema, StatementMatchRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::rules::name_contains;
use crate::status::RuleStatus;

static LOAN_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-LOAN-BALANCE-MATCH",
    rule_title: "Loan balance matches the loan schedule",
    best_practices_reference:
        "Loans/investments schedules or statements should be available and reconciled monthly",
    sources: &["Loan schedule (evidence)", "QBO (Balance Sheet)"],
};

static INVESTMENT_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-INVESTMENT-BALANCE-MATCH",
    rule_title: "Investment balance matches the statement",
    best_practices_reference:
        "Loans/investments schedules or statements should be available and reconciled monthly",
    sources: &["Investment statement (evidence)", "QBO (Balance Sheet)"],
};

struct StatementSide {
    spec: &'static RuleSpec,
    noun: &'static str,
    default_name_match: &'static str,
    default_evidence_type: &'static str,
    evidence_noun: &'static str,
}

static LOAN_SIDE: StatementSide = StatementSide {
    spec: &LOAN_SPEC,
    noun: "loan",
    default_name_match: "loan",
    default_evidence_type: "loan_schedule_balance",
    evidence_noun: "schedule",
};

static INVESTMENT_SIDE: StatementSide = StatementSide {
    spec: &INVESTMENT_SPEC,
    noun: "investment",
    default_name_match: "investment",
    default_evidence_type: "investment_statement_balance",
    evidence_noun: "statement",
};

fn evaluate_statement_match(
    side: &StatementSide,
    ctx: &RuleContext,
    cfg: &StatementMatchRuleConfig,
) -> RuleResult {
    let period = ctx.period_end.format("%Y-%m-%d");

    let mut accounts: Vec<(String, String, Decimal)> = Vec::new();
    let mut used_name_inference = false;
    if !cfg.account_ref.is_empty() {
        match ctx.account_balance(&cfg.account_ref) {
            Some(balance) => {
                accounts.push((cfg.account_ref.clone(), cfg.account_name.clone(), balance))
            }
            None => {
                return RuleResult::builder(side.spec, RuleStatus::NotApplicable)
                    .summary(format!(
                        "{} account not found in Balance Sheet snapshot as of {period}.",
                        capitalize(side.noun),
                    ))
                    .detail(
                        RuleResultDetail::new(
                            cfg.account_ref.clone(),
                            "Account not found in balance sheet snapshot.",
                        )
                        .with("account_name", cfg.account_name.clone())
                        .with("period_end", ctx.period_end)
                        .with("status", RuleStatus::NotApplicable),
                    )
                    .human_action(format!(
                        "Confirm whether the {} exists in the books and map the correct \
                         {} account.",
                        side.noun, side.noun,
                    ))
                    .build();
            }
        }
    } else if cfg.allow_name_inference {
        used_name_inference = true;
        let pattern = if cfg.account_name_match.trim().is_empty() {
            side.default_name_match
        } else {
            cfg.account_name_match.trim()
        };
        for acct in ctx.balance_sheet.leaf_accounts() {
            if name_contains(&acct.name, pattern) {
                accounts.push((acct.account_ref.clone(), acct.name.clone(), acct.balance));
            }
        }
    }

    if accounts.is_empty() {
        return RuleResult::builder(side.spec, RuleStatus::NotApplicable)
            .summary(format!("No {} account found as of {period}.", side.noun))
            .human_action(format!(
                "Configure the {} account ref or name match to enable this rule.",
                side.noun,
            ))
            .build();
    }
    if accounts.len() > 1 {
        return RuleResult::builder(side.spec, RuleStatus::NeedsReview)
            .summary(format!(
                "Multiple {} accounts matched for {period}; cannot verify.",
                side.noun,
            ))
            .details(
                accounts
                    .iter()
                    .map(|(account_ref, name, _)| {
                        RuleResultDetail::new(
                            account_ref.clone(),
                            format!("Multiple {} accounts matched by name inference.", side.noun),
                        )
                        .with("account_name", name.clone())
                        .with("period_end", ctx.period_end)
                        .with("inferred_by_name_match", true)
                        .with("status", RuleStatus::NeedsReview)
                    })
                    .collect(),
            )
            .human_action(format!(
                "Configure a specific {} account ref to evaluate this rule.",
                side.noun,
            ))
            .build();
    }

    let (account_ref, account_name, balance) = &accounts[0];
    let evidence_type = if cfg.evidence_type.is_empty() {
        side.default_evidence_type
    } else {
        cfg.evidence_type.as_str()
    };
    let evidence_item = ctx.evidence.first(evidence_type);
    let Some((evidence_item, evidence_amount)) =
        evidence_item.and_then(|i| i.amount.map(|a| (i, a)))
    else {
        let bs_q = cfg.common.quantize(*balance);
        return RuleResult::builder(side.spec, RuleStatus::NeedsReview)
            .summary(format!(
                "Missing {} {} balance for {period}; cannot verify.",
                side.noun, side.evidence_noun,
            ))
            .detail(
                RuleResultDetail::new(
                    account_ref.clone(),
                    format!(
                        "{} balance needs {} evidence to verify.",
                        capitalize(side.noun),
                        side.evidence_noun,
                    ),
                )
                .with("account_name", account_name.clone())
                .with("period_end", ctx.period_end)
                .with("bs_balance", bs_q)
                .with("evidence_type", evidence_type)
                .with("inferred_by_name_match", used_name_inference)
                .with("missing_evidence", true)
                .with("status", RuleStatus::NeedsReview),
            )
            .evidence_opt(evidence_item)
            .human_action(format!(
                "Request/attach the {} {} (or extracted balance) as of period end.",
                side.noun, side.evidence_noun,
            ))
            .build();
    };

    if cfg.require_evidence_as_of_date_match_period_end
        && evidence_item.as_of_date != Some(ctx.period_end)
    {
        return RuleResult::builder(side.spec, RuleStatus::NeedsReview)
            .summary(format!(
                "{} {} as-of date is missing or does not match period end; cannot verify.",
                capitalize(side.noun),
                side.evidence_noun,
            ))
            .evidence(evidence_item)
            .human_action(format!(
                "Provide a {} {} as of the period end date.",
                side.noun, side.evidence_noun,
            ))
            .build();
    }

    let bs_q = cfg.common.quantize(*balance);
    let evidence_q = cfg.common.quantize(evidence_amount);
    let difference = (bs_q - evidence_q).abs();
    let (status, summary) = if difference.is_zero() {
        (
            RuleStatus::Pass,
            format!(
                "{} balance matches the {} as of {period}.",
                capitalize(side.noun),
                side.evidence_noun,
            ),
        )
    } else {
        (
            RuleStatus::Fail,
            format!(
                "{} balance does not match the {} as of {period} (diff {difference}).",
                capitalize(side.noun),
                side.evidence_noun,
            ),
        )
    };
    let human_action = (status != RuleStatus::Pass).then(|| {
        format!(
            "Verify the {} {} balance and reconcile the books to it; explain any variance.",
            side.noun, side.evidence_noun,
        )
    });

    RuleResult::builder(side.spec, status)
        .summary(summary)
        .detail(
            RuleResultDetail::new(
                account_ref.clone(),
                format!(
                    "{} balance compared to {}.",
                    capitalize(side.noun),
                    side.evidence_noun,
                ),
            )
            .with("account_name", account_name.clone())
            .with("period_end", ctx.period_end)
            .with("bs_balance", bs_q)
            .with(format!("{}_balance", side.evidence_noun).as_str(), evidence_q)
            .with("difference", difference)
            .with("evidence_type", evidence_type)
            .with(
                "evidence_as_of_date",
                DetailValue::opt_date(evidence_item.as_of_date),
            )
            .with("inferred_by_name_match", used_name_inference)
            .with("status", status),
        )
        .evidence(evidence_item)
        .maybe_human_action(human_action)
        .build()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn statement_match_schema() -> Value {
    config_schema(
        "StatementMatchRuleConfig",
        json!({
            "account_ref": {"type": "string"},
            "account_name": {"type": "string"},
            "allow_name_inference": {"type": "boolean", "default": true},
            "account_name_match": {"type": "string"},
            "evidence_type": {"type": "string"},
            "require_evidence_as_of_date_match_period_end": {"type": "boolean", "default": true},
        }),
    )
}

pub struct LoanBalanceMatch;

impl Rule for LoanBalanceMatch {
    fn spec(&self) -> &'static RuleSpec {
        &LOAN_SPEC
    }

    fn config_schema(&self) -> Value {
        statement_match_schema()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: StatementMatchRuleConfig = ctx.client_config.rule_config(LOAN_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&LOAN_SPEC));
        }
        Ok(evaluate_statement_match(&LOAN_SIDE, ctx, &cfg))
    }
}

pub struct InvestmentBalanceMatch;

impl Rule for InvestmentBalanceMatch {
    fn spec(&self) -> &'static RuleSpec {
        &INVESTMENT_SPEC
    }

    fn config_schema(&self) -> Value {
        statement_match_schema()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: StatementMatchRuleConfig =
            ctx.client_config.rule_config(INVESTMENT_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&INVESTMENT_SPEC));
        }
        Ok(evaluate_statement_match(&INVESTMENT_SIDE, ctx, &cfg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testkit::{account, configure, context, evidence, period_end};
    use rust_decimal_macros::dec;

    #[test]
    fn matching_loan_balance_passes() {
        let mut ctx = context(vec![account(
            "acct::LOAN",
            "Equipment Loan",
            "Long Term Liability",
            "",
            dec!(-42000.00),
        )]);
        ctx.evidence.items.push(evidence(
            "loan_schedule_balance",
            Some(dec!(-42000.00)),
            Some(period_end()),
        ));
        let result = LoanBalanceMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::Pass);
    }

    #[test]
    fn loan_mismatch_fails() {
        let mut ctx = context(vec![account(
            "acct::LOAN",
            "Equipment Loan",
            "Long Term Liability",
            "",
            dec!(-42000.00),
        )]);
        ctx.evidence.items.push(evidence(
            "loan_schedule_balance",
            Some(dec!(-41000.00)),
            Some(period_end()),
        ));
        let result = LoanBalanceMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::Fail);
        assert_eq!(
            result.details[0].values.get("difference"),
            Some(&DetailValue::Amount(dec!(1000.00)))
        );
    }

    #[test]
    fn multiple_inferred_loans_need_review() {
        let ctx = context(vec![
            account("acct::L1", "Vehicle Loan", "Long Term Liability", "", dec!(-1)),
            account("acct::L2", "Equipment Loan", "Long Term Liability", "", dec!(-2)),
        ]);
        let result = LoanBalanceMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        assert_eq!(result.details.len(), 2);
    }

    #[test]
    fn no_loan_account_is_not_applicable() {
        let ctx = context(vec![account("acct::BANK", "Chequing", "Bank", "", dec!(1))]);
        let result = LoanBalanceMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NotApplicable);
    }

    #[test]
    fn missing_schedule_evidence_needs_review() {
        let ctx = context(vec![account(
            "acct::LOAN",
            "Equipment Loan",
            "Long Term Liability",
            "",
            dec!(-42000.00),
        )]);
        let result = LoanBalanceMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
        assert_eq!(
            result.details[0].values.get("missing_evidence"),
            Some(&DetailValue::Bool(true))
        );
    }

    #[test]
    fn evidence_date_mismatch_needs_review() {
        let mut ctx = context(vec![account(
            "acct::INV",
            "Investment - GIC",
            "Other Asset",
            "",
            dec!(10000),
        )]);
        ctx.evidence.items.push(evidence(
            "investment_statement_balance",
            Some(dec!(10000)),
            Some(crate::rules::testkit::date(2025, 11, 30)),
        ));
        let result = InvestmentBalanceMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NeedsReview);
    }

    #[test]
    fn configured_ref_not_on_sheet_is_not_applicable() {
        let mut ctx = context(vec![]);
        configure(
            &mut ctx,
            "BS-INVESTMENT-BALANCE-MATCH",
            serde_json::json!({"account_ref": "acct::INV"}),
        );
        let result = InvestmentBalanceMatch.evaluate(&ctx).expect("evaluate");
        assert_eq!(result.status, RuleStatus::NotApplicable);
    }
}
