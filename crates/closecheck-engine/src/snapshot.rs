//! Canonical accounting snapshots consumed by the rules.
//!
//! All snapshots are immutable once built by an adapter; rules only read.
//!
//! Invariants:
//! - A balance sheet holds at most one row per `account_ref`, except
//!   aggregate lines whose ref carries the `report::` prefix; those are
//!   never leaf accounts.
//! - Reconciliation metadata carries uncleared items in one of two accepted
//!   shapes; the nested `uncleared_items.{as_at,after_date}` form is
//!   canonical, the flat `uncleared_items_as_at` keys are an adapter
//!   convenience.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix marking aggregate ("report total") rows on a balance sheet.
pub const REPORT_TOTAL_PREFIX: &str = "report::";

fn default_currency() -> String {
    "USD".to_string()
}

// ---------------------------------------------------------------------------
// AccountBalance / BalanceSheetSnapshot
// ---------------------------------------------------------------------------

/// One balance-sheet row as of the snapshot date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalance {
    /// Stable opaque identifier; non-empty.
    pub account_ref: String,
    /// Display name.
    pub name: String,
    /// Free-form classification (e.g. `Bank`, `Credit Card`).
    #[serde(rename = "type", default)]
    pub account_type: String,
    #[serde(default)]
    pub subtype: String,
    /// Exact decimal; may be negative.
    pub balance: Decimal,
}

impl AccountBalance {
    /// Whether this row is an aggregate report line rather than an account.
    pub fn is_report_total(&self) -> bool {
        self.account_ref.starts_with(REPORT_TOTAL_PREFIX)
    }

    /// Whether classification data (type/subtype) is present at all.
    pub fn has_classification(&self) -> bool {
        !self.account_type.trim().is_empty() || !self.subtype.trim().is_empty()
    }
}

/// Balance sheet as of a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheetSnapshot {
    pub as_of_date: NaiveDate,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub accounts: Vec<AccountBalance>,
}

impl BalanceSheetSnapshot {
    /// Row for `account_ref`, if present.
    pub fn account(&self, account_ref: &str) -> Option<&AccountBalance> {
        self.accounts.iter().find(|a| a.account_ref == account_ref)
    }

    /// Balance of `account_ref`, if present.
    pub fn balance_of(&self, account_ref: &str) -> Option<Decimal> {
        self.account(account_ref).map(|a| a.balance)
    }

    /// Leaf rows only (aggregate `report::` lines excluded).
    pub fn leaf_accounts(&self) -> impl Iterator<Item = &AccountBalance> {
        self.accounts.iter().filter(|a| !a.is_report_total())
    }
}

// ---------------------------------------------------------------------------
// ProfitAndLossSnapshot
// ---------------------------------------------------------------------------

/// P&L totals for the period ending at the MER date. The engine only ever
/// reads the `revenue` total; absence is permitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfitAndLossSnapshot {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub totals: BTreeMap<String, Decimal>,
}

impl ProfitAndLossSnapshot {
    /// Label under which adapters report period revenue.
    pub const REVENUE: &'static str = "revenue";

    pub fn total(&self, label: &str) -> Option<Decimal> {
        self.totals.get(label).copied()
    }
}

// ---------------------------------------------------------------------------
// ReconciliationSnapshot
// ---------------------------------------------------------------------------

/// One bank/credit-card reconciliation as produced by the reconciliation
/// report adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSnapshot {
    pub account_ref: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub statement_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub statement_ending_balance: Option<Decimal>,
    /// Register balance as of the statement end date.
    #[serde(default)]
    pub book_balance_as_of_statement_end: Option<Decimal>,
    /// Register balance rolled forward to the MER date.
    #[serde(default)]
    pub book_balance_as_of_period_end: Option<Decimal>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

/// Uncleared items split out of reconciliation metadata. `after_date` is
/// accepted but rules ignore it beyond counting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnclearedItems<'a> {
    pub as_at: Option<Vec<&'a serde_json::Map<String, Value>>>,
    pub after_date: Option<Vec<&'a serde_json::Map<String, Value>>>,
}

fn object_list(value: Option<&Value>) -> Option<Vec<&serde_json::Map<String, Value>>> {
    match value {
        Some(Value::Array(entries)) => {
            Some(entries.iter().filter_map(|e| e.as_object()).collect())
        }
        _ => None,
    }
}

impl ReconciliationSnapshot {
    /// Extract uncleared items, accepting either metadata shape.
    pub fn uncleared_items(&self) -> UnclearedItems<'_> {
        if let Some(Value::Object(bucket)) = self.meta.get("uncleared_items") {
            return UnclearedItems {
                as_at: object_list(bucket.get("as_at")),
                after_date: object_list(bucket.get("after_date")),
            };
        }
        UnclearedItems {
            as_at: object_list(self.meta.get("uncleared_items_as_at")),
            after_date: object_list(self.meta.get("uncleared_items_after_date")),
        }
    }
}

/// Latest snapshot for an account by statement end date; snapshots without a
/// statement end date sort first.
pub fn latest_reconciliation<'a>(
    reconciliations: &'a [ReconciliationSnapshot],
    account_ref: &str,
) -> Option<&'a ReconciliationSnapshot> {
    reconciliations
        .iter()
        .filter(|r| r.account_ref == account_ref)
        .max_by_key(|r| r.statement_end_date.unwrap_or(NaiveDate::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn account(account_ref: &str, balance: Decimal) -> AccountBalance {
        AccountBalance {
            account_ref: account_ref.to_string(),
            name: account_ref.to_string(),
            account_type: String::new(),
            subtype: String::new(),
            balance,
        }
    }

    // -- Balance sheet --

    #[test]
    fn report_total_rows_are_not_leaves() {
        let sheet = BalanceSheetSnapshot {
            as_of_date: date(2025, 12, 31),
            currency: default_currency(),
            accounts: vec![
                account("acct::1", dec!(10)),
                account("report::Total Accounts Payable", dec!(10)),
            ],
        };
        let leaves: Vec<_> = sheet.leaf_accounts().collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].account_ref, "acct::1");
        assert_eq!(sheet.balance_of("acct::1"), Some(dec!(10)));
        assert_eq!(sheet.balance_of("acct::2"), None);
    }

    // -- P&L --

    #[test]
    fn revenue_total_lookup() {
        let pnl = ProfitAndLossSnapshot {
            period_start: date(2025, 12, 1),
            period_end: date(2025, 12, 31),
            currency: default_currency(),
            totals: BTreeMap::from([("revenue".to_string(), dec!(100000))]),
        };
        assert_eq!(pnl.total(ProfitAndLossSnapshot::REVENUE), Some(dec!(100000)));
        assert_eq!(pnl.total("cogs"), None);
    }

    // -- Reconciliation metadata shapes --

    fn reconciliation_with_meta(meta: Value) -> ReconciliationSnapshot {
        ReconciliationSnapshot {
            account_ref: "acct::BANK1".to_string(),
            account_name: "Chequing".to_string(),
            statement_end_date: Some(date(2025, 11, 30)),
            statement_ending_balance: Some(dec!(1000)),
            book_balance_as_of_statement_end: Some(dec!(1000)),
            book_balance_as_of_period_end: None,
            source: String::new(),
            meta: serde_json::from_value(meta).expect("meta map"),
        }
    }

    #[test]
    fn uncleared_items_nested_shape() {
        let rec = reconciliation_with_meta(json!({
            "uncleared_items": {
                "as_at": [{"txn_date": "2025-08-15", "amount": "12.00"}],
                "after_date": [{"txn_date": "2025-12-02", "amount": "5.00"}],
            }
        }));
        let items = rec.uncleared_items();
        assert_eq!(items.as_at.map(|v| v.len()), Some(1));
        assert_eq!(items.after_date.map(|v| v.len()), Some(1));
    }

    #[test]
    fn uncleared_items_flat_shape() {
        let rec = reconciliation_with_meta(json!({
            "uncleared_items_as_at": [{"txn_date": "15/08/2025"}],
        }));
        let items = rec.uncleared_items();
        assert_eq!(items.as_at.map(|v| v.len()), Some(1));
        assert!(items.after_date.is_none());
    }

    #[test]
    fn uncleared_items_missing_is_none() {
        let rec = reconciliation_with_meta(json!({}));
        assert!(rec.uncleared_items().as_at.is_none());
    }

    #[test]
    fn non_object_entries_are_dropped() {
        let rec = reconciliation_with_meta(json!({
            "uncleared_items": {"as_at": [{"txn_date": "2025-08-15"}, "noise", 3]},
        }));
        assert_eq!(rec.uncleared_items().as_at.map(|v| v.len()), Some(1));
    }

    // -- Latest reconciliation --

    #[test]
    fn latest_reconciliation_prefers_newest_statement() {
        let mut older = reconciliation_with_meta(json!({}));
        older.statement_end_date = Some(date(2025, 10, 31));
        let newer = reconciliation_with_meta(json!({}));
        let recs = vec![older, newer];
        let latest = latest_reconciliation(&recs, "acct::BANK1").expect("snapshot");
        assert_eq!(latest.statement_end_date, Some(date(2025, 11, 30)));
        assert!(latest_reconciliation(&recs, "acct::OTHER").is_none());
    }
}
