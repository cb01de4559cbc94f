//! Plooto payment-platform accounts: the clearing account must net to zero,
//! and any Plooto Instant float is disclosed to the reviewer.

use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::config::{config_schema, NamedAccountRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::result::{RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::rules::name_contains;
use crate::status::RuleStatus;

static CLEARING_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-PLOOTO-CLEARING-ZERO",
    rule_title: "Plooto Clearing should be zero at period end",
    best_practices_reference: "Plooto",
    sources: &["QBO (Balance Sheet)"],
};

static INSTANT_SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-PLOOTO-INSTANT-BALANCE-DISCLOSURE",
    rule_title: "Plooto Instant balance identified and disclosed",
    best_practices_reference: "Plooto",
    sources: &["QBO (Balance Sheet)"],
};

fn named_account_schema() -> Value {
    config_schema(
        "NamedAccountRuleConfig",
        json!({
            "account_ref": {"type": "string"},
            "account_name": {"type": "string"},
            "allow_name_inference": {"type": "boolean", "default": true},
            "account_name_match": {"type": "string"},
        }),
    )
}

/// Locate target accounts by configured ref, else by name substring.
/// `Err(detail)` means a configured ref was missing from the sheet.
#[allow(clippy::type_complexity)]
fn locate_accounts(
    ctx: &RuleContext,
    cfg: &NamedAccountRuleConfig,
    default_name_match: &str,
) -> Result<(Vec<(String, String, Decimal)>, bool), RuleResultDetail> {
    if !cfg.account_ref.is_empty() {
        return match ctx.account_balance(&cfg.account_ref) {
            Some(balance) => Ok((
                vec![(cfg.account_ref.clone(), cfg.account_name.clone(), balance)],
                false,
            )),
            None => Err(RuleResultDetail::new(
                cfg.account_ref.clone(),
                "Account not found in balance sheet snapshot.",
            )
            .with("account_name", cfg.account_name.clone())
            .with("period_end", ctx.period_end)),
        };
    }
    let mut found = Vec::new();
    if cfg.allow_name_inference {
        let pattern = if cfg.account_name_match.trim().is_empty() {
            default_name_match
        } else {
            cfg.account_name_match.trim()
        };
        for acct in ctx.balance_sheet.leaf_accounts() {
            if name_contains(&acct.name, pattern) {
                found.push((acct.account_ref.clone(), acct.name.clone(), acct.balance));
            }
        }
    }
    Ok((found, true))
}

// ---------------------------------------------------------------------------
// BS-PLOOTO-CLEARING-ZERO
// ---------------------------------------------------------------------------

pub struct PlootoClearingZero;

impl Rule for PlootoClearingZero {
    fn spec(&self) -> &'static RuleSpec {
        &CLEARING_SPEC
    }

    fn config_schema(&self) -> Value {
        named_account_schema()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: NamedAccountRuleConfig = ctx.client_config.rule_config(CLEARING_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&CLEARING_SPEC));
        }
        let missing_status = cfg.common.missing_status();
        let period = ctx.period_end.format("%Y-%m-%d");

        let (accounts, used_name_inference) =
            match locate_accounts(ctx, &cfg, "Plooto Clearing") {
                Ok(found) => found,
                Err(detail) => {
                    return Ok(RuleResult::builder(&CLEARING_SPEC, missing_status)
                        .summary(format!(
                            "Plooto Clearing account not found in Balance Sheet snapshot \
                             as of {period}; cannot verify."
                        ))
                        .detail(detail.with("status", missing_status))
                        .human_action(
                            "Confirm whether Plooto Clearing exists in the books and map \
                             the correct Balance Sheet account.",
                        )
                        .build());
                }
            };

        if accounts.is_empty() {
            return Ok(RuleResult::builder(&CLEARING_SPEC, RuleStatus::NotApplicable)
                .summary(format!("No Plooto Clearing account found as of {period}."))
                .build());
        }

        let mut statuses = Vec::new();
        let mut details = Vec::new();
        for (account_ref, account_name, balance) in &accounts {
            let balance_q = cfg.common.quantize(*balance);
            let status = if balance_q.is_zero() {
                RuleStatus::Pass
            } else {
                RuleStatus::Fail
            };
            statuses.push(status);
            details.push(
                RuleResultDetail::new(account_ref.clone(), "Plooto Clearing balance evaluated.")
                    .with("account_name", account_name.clone())
                    .with("period_end", ctx.period_end)
                    .with("balance", balance_q)
                    .with("inferred_by_name_match", used_name_inference)
                    .with("status", status),
            );
        }

        let overall = RuleStatus::worst(statuses);
        let exemplar = RuleResult::exemplar_detail(&details, RuleStatus::Fail);
        let (summary, human_action) = if overall == RuleStatus::Pass {
            (
                format!("Plooto Clearing balance is zero as of {period}."),
                None,
            )
        } else {
            let summary = match exemplar.and_then(|d| match d.values.get("balance") {
                Some(crate::result::DetailValue::Amount(v)) => Some(*v),
                _ => None,
            }) {
                Some(balance) => format!(
                    "Plooto Clearing balance is non-zero as of {period} (balance {balance})."
                ),
                None => format!("Plooto Clearing balance is non-zero as of {period}."),
            };
            (
                summary,
                Some(
                    "Investigate Plooto Clearing activity near period end and clear any \
                     non-zero balance."
                        .to_string(),
                ),
            )
        };

        Ok(RuleResult::builder(&CLEARING_SPEC, overall)
            .summary(summary)
            .details(details)
            .maybe_human_action(human_action)
            .build())
    }
}

// ---------------------------------------------------------------------------
// BS-PLOOTO-INSTANT-BALANCE-DISCLOSURE
// ---------------------------------------------------------------------------

/// Disclosure only: a non-zero Plooto Instant float warns the reviewer; no
/// external evidence is required.
pub struct PlootoInstantBalanceDisclosure;

impl Rule for PlootoInstantBalanceDisclosure {
    fn spec(&self) -> &'static RuleSpec {
        &INSTANT_SPEC
    }

    fn config_schema(&self) -> Value {
        named_account_schema()
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: NamedAccountRuleConfig = ctx.client_config.rule_config(INSTANT_SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&INSTANT_SPEC));
        }
        let missing_status = cfg.common.missing_status();
        let period = ctx.period_end.format("%Y-%m-%d");

        let (accounts, used_name_inference) = match locate_accounts(ctx, &cfg, "Plooto Instant")
        {
            Ok(found) => found,
            Err(detail) => {
                return Ok(RuleResult::builder(&INSTANT_SPEC, missing_status)
                    .summary(format!(
                        "Plooto Instant account not found in Balance Sheet snapshot \
                         as of {period}; cannot verify."
                    ))
                    .detail(detail.with("status", missing_status))
                    .human_action(
                        "Confirm whether Plooto Instant exists in the books and map the \
                         correct Balance Sheet account.",
                    )
                    .build());
            }
        };

        if accounts.is_empty() {
            return Ok(RuleResult::builder(&INSTANT_SPEC, missing_status)
                .summary(format!("No Plooto Instant account found as of {period}."))
                .human_action(
                    "Confirm whether the client uses Plooto Instant; map or configure \
                     the account if so.",
                )
                .build());
        }

        let mut statuses = Vec::new();
        let mut details = Vec::new();
        for (account_ref, account_name, balance) in &accounts {
            let balance_q = cfg.common.quantize(*balance);
            let status = if balance_q.is_zero() {
                RuleStatus::Pass
            } else {
                RuleStatus::Warn
            };
            statuses.push(status);
            details.push(
                RuleResultDetail::new(
                    account_ref.clone(),
                    "Plooto Instant balance disclosed.",
                )
                .with("account_name", account_name.clone())
                .with("period_end", ctx.period_end)
                .with("balance", balance_q)
                .with("inferred_by_name_match", used_name_inference)
                .with("status", status),
            );
        }

        let overall = RuleStatus::worst(statuses);
        let (summary, human_action) = if overall == RuleStatus::Pass {
            (
                format!("Plooto Instant balance is zero as of {period}."),
                None,
            )
        } else {
            (
                format!(
                    "Plooto Instant carries a balance as of {period}; disclose it in the \
                     review notes."
                ),
                Some(
                    "Note the Plooto Instant float in the MER notes and confirm the \
                     client expects it."
                        .to_string(),
                ),
            )
        };

        Ok(RuleResult::builder(&INSTANT_SPEC, overall)
            .summary(summary)
            .details(details)
            .maybe_human_action(human_action)
            .build())
    }
}
