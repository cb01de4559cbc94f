//! Interim accounts that should net to zero at period end: Undeposited
//! Funds and sales clearing accounts.
//!
//! Both rules share one evaluator. A balance is judged against an allowed
//! variance (`max(floor, |revenue| * pct)`): exactly zero passes, within
//! the variance warns, beyond it fails. A non-zero balance with no
//! configured threshold routes to `unconfigured_threshold_policy` — the
//! firm has not decided the tolerance yet, so a human does.

use serde_json::{json, Value};

use crate::amount::VarianceThreshold;
use crate::config::{config_schema, ZeroBalanceRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::rules::name_contains;
use crate::status::RuleStatus;

static UNDEPOSITED_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-UNDEPOSITED-FUNDS-ZERO",
    rule_title: "Undeposited Funds should be zero at period end",
    best_practices_reference: "Bank reconciliations",
    sources: &["QBO"],
};

static CLEARING_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-CLEARING-ACCOUNTS-ZERO",
    rule_title: "Clearing accounts should be zero at period end",
    best_practices_reference: "Clearing accounts (a $0 balance)",
    sources: &["QBO"],
};

// ---------------------------------------------------------------------------
// Shared evaluator
// ---------------------------------------------------------------------------

struct ScopeEntry {
    account_ref: String,
    account_name: String,
    threshold: Option<VarianceThreshold>,
}

struct ZeroBalanceStyle {
    /// Noun used in summaries, e.g. "Undeposited Funds account".
    noun: &'static str,
    /// Name substring for inference.
    infer_pattern: &'static str,
    /// Whether inferred accounts must carry a current-asset type.
    classify_inferred: bool,
}

fn resolve_scope(
    ctx: &RuleContext,
    cfg: &ZeroBalanceRuleConfig,
    style: &ZeroBalanceStyle,
) -> (Vec<ScopeEntry>, Vec<RuleResultDetail>, bool) {
    if !cfg.accounts.is_empty() {
        let scope = cfg
            .accounts
            .iter()
            .map(|a| ScopeEntry {
                account_ref: a.account_ref.clone(),
                account_name: a.account_name.clone(),
                threshold: a.threshold.clone(),
            })
            .collect();
        return (scope, Vec::new(), false);
    }
    if !cfg.allow_name_inference {
        return (Vec::new(), Vec::new(), false);
    }

    let mut scope = Vec::new();
    let mut classification_issues = Vec::new();
    for acct in ctx.balance_sheet.leaf_accounts() {
        if !name_contains(&acct.name, style.infer_pattern) {
            continue;
        }
        if style.classify_inferred {
            if !acct.has_classification() {
                classification_issues.push(
                    RuleResultDetail::new(
                        acct.account_ref.clone(),
                        "Account matched by name but has no type/subtype; cannot classify.",
                    )
                    .with("account_name", acct.name.clone())
                    .with("period_end", ctx.period_end)
                    .with("status", RuleStatus::NeedsReview),
                );
                continue;
            }
            let is_current_asset = cfg
                .current_asset_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(acct.account_type.trim()));
            if !is_current_asset {
                // Non-sales clearing accounts are a separate control.
                continue;
            }
        }
        scope.push(ScopeEntry {
            account_ref: acct.account_ref.clone(),
            account_name: acct.name.clone(),
            threshold: None,
        });
    }
    (scope, classification_issues, true)
}

fn evaluate_zero_balance(
    spec: &'static RuleSpec,
    style: &ZeroBalanceStyle,
    ctx: &RuleContext,
    cfg: &ZeroBalanceRuleConfig,
) -> RuleResult {
    let missing_status = cfg.common.missing_status();
    let (scope, classification_issues, used_name_inference) = resolve_scope(ctx, cfg, style);

    if scope.is_empty() && classification_issues.is_empty() {
        return RuleResult::builder(spec, RuleStatus::NeedsReview)
            .summary(format!(
                "No {} configured or matched for period end {}.",
                style.noun,
                ctx.period_end.format("%Y-%m-%d"),
            ))
            .human_action(format!(
                "Configure {} refs for this client and set acceptable variances (recommended).",
                style.noun,
            ))
            .build();
    }

    let revenue_total = ctx.revenue_total();
    let default_threshold_configured = cfg.default_threshold.is_configured();
    let has_any_threshold =
        default_threshold_configured || scope.iter().any(|a| a.threshold.is_some());

    let mut statuses: Vec<RuleStatus> = Vec::new();
    let mut details: Vec<RuleResultDetail> = Vec::new();
    for issue in classification_issues {
        statuses.push(RuleStatus::NeedsReview);
        details.push(issue);
    }

    for entry in &scope {
        let Some(balance) = ctx.account_balance(&entry.account_ref) else {
            statuses.push(missing_status);
            details.push(
                RuleResultDetail::new(
                    entry.account_ref.clone(),
                    "Account not found in balance sheet snapshot.",
                )
                .with("account_name", entry.account_name.clone())
                .with("period_end", ctx.period_end)
                .with("status", missing_status),
            );
            continue;
        };

        let threshold = entry
            .threshold
            .clone()
            .unwrap_or_else(|| cfg.default_threshold.clone());
        let threshold_configured = default_threshold_configured || entry.threshold.is_some();
        let balance_q = cfg.common.quantize(balance);
        let abs_balance = balance_q.abs();
        let allowed = cfg.common.quantize(threshold.allowed_variance(revenue_total));

        let status = if abs_balance.is_zero() {
            RuleStatus::Pass
        } else if !threshold_configured {
            cfg.unconfigured_threshold_policy
        } else if abs_balance <= allowed {
            RuleStatus::Warn
        } else {
            RuleStatus::Fail
        };

        statuses.push(status);
        details.push(
            RuleResultDetail::new(entry.account_ref.clone(), "Account balance evaluated.")
                .with("account_name", entry.account_name.clone())
                .with("period_end", ctx.period_end)
                .with("balance", balance_q)
                .with("abs_balance", abs_balance)
                .with("allowed_variance", allowed)
                .with("revenue_total", DetailValue::opt_amount(revenue_total))
                .with("threshold_floor_amount", threshold.floor_amount)
                .with("threshold_pct_of_revenue", threshold.pct_of_revenue)
                .with("threshold_configured", threshold_configured)
                .with("inferred_by_name_match", used_name_inference)
                .with("status", status),
        );
    }

    let overall = RuleStatus::worst(statuses);
    let period = ctx.period_end.format("%Y-%m-%d");
    let exemplar = RuleResult::exemplar_detail(&details, overall);
    let balance_of = |d: &RuleResultDetail, key: &str| match d.values.get(key) {
        Some(DetailValue::Amount(v)) => v.to_string(),
        _ => String::new(),
    };

    let summary = match (overall, exemplar) {
        (RuleStatus::Pass, _) => format!(
            "All {} {}(s) are exactly zero as of {period}.",
            scope.len(),
            style.noun,
        ),
        (RuleStatus::Warn, Some(d)) => format!(
            "{} '{}' is non-zero ({}) as of {period} ({} allowed); verify.",
            style.noun,
            d.values
                .get("account_name")
                .and_then(|v| match v {
                    DetailValue::Text(s) => Some(s.clone()),
                    _ => None,
                })
                .unwrap_or_default(),
            balance_of(d, "balance"),
            balance_of(d, "allowed_variance"),
        ),
        (RuleStatus::Fail, Some(d)) => format!(
            "{} exceeds allowed variance ({} vs {}) as of {period}.",
            style.noun,
            balance_of(d, "balance"),
            balance_of(d, "allowed_variance"),
        ),
        (RuleStatus::NeedsReview, _) => format!(
            "Missing data prevented evaluation for one or more accounts as of {period}."
        ),
        _ => "Not applicable.".to_string(),
    };

    let mut human_action = None;
    if overall.needs_human_action() {
        let mut action = format!(
            "Verify {} activity near period end and explain any non-zero balances; \
             adjust tolerances per account if warranted.",
            style.noun,
        );
        if !has_any_threshold {
            action.push_str(
                " Note: no acceptable variance was configured; set thresholds \
                 (floor and/or % of revenue).",
            );
        }
        if used_name_inference {
            action.push_str(&format!(
                " Note: accounts were inferred by name match ('{}').",
                style.infer_pattern,
            ));
        }
        human_action = Some(action);
    }

    RuleResult::builder(spec, overall)
        .summary(summary)
        .details(details)
        .maybe_human_action(human_action)
        .build()
}

fn zero_balance_schema(title: &str) -> Value {
    config_schema(
        title,
        json!({
            "accounts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "account_ref": {"type": "string"},
                        "account_name": {"type": "string"},
                        "threshold": {
                            "type": ["object", "null"],
                            "properties": {
                                "floor_amount": {"type": "string"},
                                "pct_of_revenue": {"type": "string"},
                            },
                        },
                    },
                    "required": ["account_ref"],
                },
            },
            "default_threshold": {
                "type": "object",
                "properties": {
                    "floor_amount": {"type": "string"},
                    "pct_of_revenue": {"type": "string"},
                },
            },
            "allow_name_inference": {"type": "boolean", "default": true},
            "unconfigured_threshold_policy": {
                "type": "string",
                "enum": ["PASS", "WARN", "FAIL", "NEEDS_REVIEW", "NOT_APPLICABLE"],
                "default": "NEEDS_REVIEW",
            },
            "current_asset_types": {"type": "array", "items": {"type": "string"}},
        }),
    )
}

// ---------------------------------------------------------------------------
// BS-UNDEPOSITED-FUNDS-ZERO
// ---------------------------------------------------------------------------

pub struct UndepositedFundsZero;

impl Rule for UndepositedFundsZero {
    fn spec(&self) -> &'static RuleSpec {
        &UNDEPOSITED_SPEC
    }

    fn config_schema(&self) -> Value {
        zero_balance_schema("ZeroBalanceRuleConfig")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: ZeroBalanceRuleConfig = ctx.client_config.rule_config(UNDEPOSITED_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&UNDEPOSITED_SPEC));
        }
        let style = ZeroBalanceStyle {
            noun: "Undeposited Funds account",
            infer_pattern: "undeposited",
            classify_inferred: false,
        };
        Ok(evaluate_zero_balance(&UNDEPOSITED_SPEC, &style, ctx, &cfg))
    }
}

// ---------------------------------------------------------------------------
// BS-CLEARING-ACCOUNTS-ZERO
// ---------------------------------------------------------------------------

pub struct ClearingAccountsZero;

impl Rule for ClearingAccountsZero {
    fn spec(&self) -> &'static RuleSpec {
        &CLEARING_SPEC
    }

    fn config_schema(&self) -> Value {
        zero_balance_schema("ZeroBalanceRuleConfig")
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: ZeroBalanceRuleConfig = ctx.client_config.rule_config(CLEARING_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&CLEARING_SPEC));
        }
        let style = ZeroBalanceStyle {
            noun: "clearing account",
            infer_pattern: "clearing",
            classify_inferred: true,
        };
        Ok(evaluate_zero_balance(&CLEARING_SPEC, &style, ctx, &cfg))
    }
}
