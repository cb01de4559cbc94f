//! The immutable input envelope a run evaluates against.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ClientRulesConfig;
use crate::evidence::EvidenceBundle;
use crate::snapshot::{BalanceSheetSnapshot, ProfitAndLossSnapshot, ReconciliationSnapshot};

/// Everything a rule may read: snapshots, evidence, reconciliations, and the
/// client's per-rule configuration. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleContext {
    /// The MER date the review is as-of.
    pub period_end: NaiveDate,
    pub balance_sheet: BalanceSheetSnapshot,
    /// Prior month's balance sheet, when available.
    #[serde(default)]
    pub prior_balance_sheet: Option<BalanceSheetSnapshot>,
    #[serde(default)]
    pub profit_and_loss: Option<ProfitAndLossSnapshot>,
    #[serde(default)]
    pub evidence: EvidenceBundle,
    #[serde(default)]
    pub reconciliations: Vec<ReconciliationSnapshot>,
    #[serde(default)]
    pub client_config: ClientRulesConfig,
}

impl RuleContext {
    /// Balance of `account_ref` on the current balance sheet.
    pub fn account_balance(&self, account_ref: &str) -> Option<Decimal> {
        self.balance_sheet.balance_of(account_ref)
    }

    /// Display name of `account_ref`, when the balance sheet has the row.
    pub fn account_name(&self, account_ref: &str) -> &str {
        self.balance_sheet
            .account(account_ref)
            .map(|a| a.name.as_str())
            .unwrap_or("")
    }

    /// Period revenue from the P&L totals, when reported.
    pub fn revenue_total(&self) -> Option<Decimal> {
        self.profit_and_loss
            .as_ref()
            .and_then(|pnl| pnl.total(ProfitAndLossSnapshot::REVENUE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::AccountBalance;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    #[test]
    fn accessors_read_the_snapshots() {
        let ctx = RuleContext {
            period_end: NaiveDate::from_ymd_opt(2025, 12, 31).expect("date"),
            balance_sheet: BalanceSheetSnapshot {
                as_of_date: NaiveDate::from_ymd_opt(2025, 12, 31).expect("date"),
                currency: "USD".to_string(),
                accounts: vec![AccountBalance {
                    account_ref: "acct::PC".to_string(),
                    name: "Petty Cash".to_string(),
                    account_type: String::new(),
                    subtype: String::new(),
                    balance: dec!(250),
                }],
            },
            prior_balance_sheet: None,
            profit_and_loss: Some(ProfitAndLossSnapshot {
                period_start: NaiveDate::from_ymd_opt(2025, 12, 1).expect("date"),
                period_end: NaiveDate::from_ymd_opt(2025, 12, 31).expect("date"),
                currency: "USD".to_string(),
                totals: BTreeMap::from([("revenue".to_string(), dec!(100000))]),
            }),
            evidence: EvidenceBundle::default(),
            reconciliations: Vec::new(),
            client_config: ClientRulesConfig::default(),
        };
        assert_eq!(ctx.account_balance("acct::PC"), Some(dec!(250)));
        assert_eq!(ctx.account_name("acct::PC"), "Petty Cash");
        assert_eq!(ctx.account_name("acct::NONE"), "");
        assert_eq!(ctx.revenue_total(), Some(dec!(100000)));
    }
}
