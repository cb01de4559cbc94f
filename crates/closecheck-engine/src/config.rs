//! Per-client rule configuration.
//!
//! The client envelope maps rule id → raw JSON payload. Each rule
//! deserializes its own typed payload on evaluation: unknown rule ids are
//! ignored, a missing entry means defaults, unknown fields inside a payload
//! are ignored, and a bad type or bad decimal literal is fatal for that rule
//! only (the runner turns it into NEEDS_REVIEW).
//!
//! Every payload carries the common trio: `enabled` (default true),
//! `missing_data_policy`, and the optional `amount_quantize` increment.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::amount::{quantize, VarianceThreshold};
use crate::error::ConfigError;
use crate::status::{MissingDataPolicy, RuleStatus};

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// ClientRulesConfig
// ---------------------------------------------------------------------------

/// Client-level configuration envelope keyed by rule id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientRulesConfig {
    #[serde(default)]
    pub rules: BTreeMap<String, Value>,
}

impl ClientRulesConfig {
    /// Typed payload for `rule_id`; defaults when the entry is missing.
    pub fn rule_config<T>(&self, rule_id: &str) -> Result<T, ConfigError>
    where
        T: DeserializeOwned + Default,
    {
        match self.rules.get(rule_id) {
            None => Ok(T::default()),
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|err| ConfigError {
                rule_id: rule_id.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// CommonRuleConfig
// ---------------------------------------------------------------------------

/// Fields shared by every rule payload (flattened into each config).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonRuleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub missing_data_policy: MissingDataPolicy,
    /// Decimal increment (e.g. `"0.01"`) for quantized comparisons; unset
    /// means exact.
    #[serde(default)]
    pub amount_quantize: Option<Decimal>,
}

impl Default for CommonRuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            missing_data_policy: MissingDataPolicy::default(),
            amount_quantize: None,
        }
    }
}

impl CommonRuleConfig {
    /// Quantize per this payload's increment.
    pub fn quantize(&self, value: Decimal) -> Decimal {
        quantize(value, self.amount_quantize)
    }

    /// Status that "required input absent" routes to.
    pub fn missing_status(&self) -> RuleStatus {
        self.missing_data_policy.as_status()
    }
}

/// Default account types treated as current assets when classifying
/// clearing accounts.
pub fn default_current_asset_types() -> Vec<String> {
    vec![
        "Bank".to_string(),
        "Accounts Receivable".to_string(),
        "Other Current Asset".to_string(),
        "Cash and Cash Equivalents".to_string(),
    ]
}

// ---------------------------------------------------------------------------
// Per-rule payloads
// ---------------------------------------------------------------------------

/// Per-account override for the zero-balance rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountThresholdOverride {
    pub account_ref: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub threshold: Option<VarianceThreshold>,
}

/// Undeposited-funds / clearing-accounts zero checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroBalanceRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    /// Explicit scope; preferred over inference.
    #[serde(default)]
    pub accounts: Vec<AccountThresholdOverride>,
    #[serde(default)]
    pub default_threshold: VarianceThreshold,
    /// Infer scope by name substring when no accounts are configured.
    #[serde(default = "default_true")]
    pub allow_name_inference: bool,
    /// Outcome for a non-zero balance when no threshold is configured.
    #[serde(default = "needs_review_status")]
    pub unconfigured_threshold_policy: RuleStatus,
    /// Types an inferred clearing account must have to stay in scope.
    #[serde(default = "default_current_asset_types")]
    pub current_asset_types: Vec<String>,
}

fn needs_review_status() -> RuleStatus {
    RuleStatus::NeedsReview
}

fn warn_status() -> RuleStatus {
    RuleStatus::Warn
}

fn fail_status() -> RuleStatus {
    RuleStatus::Fail
}

impl Default for ZeroBalanceRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            accounts: Vec::new(),
            default_threshold: VarianceThreshold::default(),
            allow_name_inference: true,
            unconfigured_threshold_policy: RuleStatus::NeedsReview,
            current_asset_types: default_current_asset_types(),
        }
    }
}

/// Non-sales clearing accounts (clearing accounts outside the current-asset
/// types).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NonSalesClearingRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default = "default_clearing_patterns")]
    pub name_patterns: Vec<String>,
    #[serde(default = "default_current_asset_types")]
    pub current_asset_types: Vec<String>,
}

fn default_clearing_patterns() -> Vec<String> {
    vec!["clearing".to_string()]
}

impl Default for NonSalesClearingRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            name_patterns: default_clearing_patterns(),
            current_asset_types: default_current_asset_types(),
        }
    }
}

/// Petty-cash tie-out to the client's supporting document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PettyCashRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    pub account_ref: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default = "default_petty_cash_evidence")]
    pub evidence_type: String,
}

fn default_petty_cash_evidence() -> String {
    "petty_cash_support".to_string()
}

impl Default for PettyCashRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            account_ref: String::new(),
            account_name: String::new(),
            evidence_type: default_petty_cash_evidence(),
        }
    }
}

/// Bank/credit-card reconciliation coverage and tie-outs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankReconciledRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    /// Refinements on the inferred scope.
    #[serde(default)]
    pub include_accounts: Vec<String>,
    #[serde(default)]
    pub exclude_accounts: Vec<String>,
    /// Explicit maintenance list; when set it is the scope, and its size is
    /// checked against the inferred bank/cc count.
    #[serde(default)]
    pub expected_accounts: Vec<String>,
    #[serde(default = "default_true")]
    pub require_statement_end_date_gte_period_end: bool,
    #[serde(default = "default_true")]
    pub require_book_balance_as_of_period_end_ties_to_balance_sheet: bool,
    #[serde(default = "default_true")]
    pub require_statement_balance_matches_balance_sheet: bool,
    #[serde(default = "default_true")]
    pub require_statement_balance_matches_attachment: bool,
    #[serde(default = "default_statement_attachment_evidence")]
    pub statement_balance_attachment_evidence_type: String,
}

fn default_statement_attachment_evidence() -> String {
    "statement_balance_attachment".to_string()
}

impl Default for BankReconciledRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            include_accounts: Vec::new(),
            exclude_accounts: Vec::new(),
            expected_accounts: Vec::new(),
            require_statement_end_date_gte_period_end: true,
            require_book_balance_as_of_period_end_ties_to_balance_sheet: true,
            require_statement_balance_matches_balance_sheet: true,
            require_statement_balance_matches_attachment: true,
            statement_balance_attachment_evidence_type: default_statement_attachment_evidence(),
        }
    }
}

/// Stale uncleared reconciliation items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnclearedItemsRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    /// When set, missing any listed account snapshot routes to the missing
    /// data policy; when empty, every provided snapshot is evaluated.
    #[serde(default)]
    pub expected_accounts: Vec<String>,
    /// Items strictly older than this many calendar months (as of statement
    /// end) are stale.
    #[serde(default = "default_months_old")]
    pub months_old_threshold: u32,
    #[serde(default = "warn_status")]
    pub stale_item_status: RuleStatus,
    #[serde(default = "default_max_flagged")]
    pub max_flagged_items_in_detail: usize,
}

fn default_months_old() -> u32 {
    2
}

fn default_max_flagged() -> usize {
    20
}

impl Default for UnclearedItemsRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            expected_accounts: Vec::new(),
            months_old_threshold: 2,
            stale_item_status: RuleStatus::Warn,
            max_flagged_items_in_detail: 20,
        }
    }
}

/// Rules that target one named account (Plooto Clearing / Plooto Instant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedAccountRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default)]
    pub account_ref: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default = "default_true")]
    pub allow_name_inference: bool,
    /// Substring to match; empty means the rule's built-in name.
    #[serde(default)]
    pub account_name_match: String,
}

impl Default for NamedAccountRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            account_ref: String::new(),
            account_name: String::new(),
            allow_name_inference: true,
            account_name_match: String::new(),
        }
    }
}

/// AP/AR subledger reconciliation to the balance sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubledgerRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default)]
    pub account_refs: Vec<String>,
    #[serde(default = "default_true")]
    pub allow_name_inference: bool,
    /// Substring for name inference; empty means the rule's built-in match.
    #[serde(default)]
    pub account_name_match: String,
    /// Evidence types; empty means the rule's built-in types.
    #[serde(default)]
    pub summary_evidence_type: String,
    #[serde(default)]
    pub detail_evidence_type: String,
    #[serde(default = "default_true")]
    pub require_evidence_as_of_date_match_period_end: bool,
}

impl Default for SubledgerRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            account_refs: Vec::new(),
            allow_name_inference: true,
            account_name_match: String::new(),
            summary_evidence_type: String::new(),
            detail_evidence_type: String::new(),
            require_evidence_as_of_date_match_period_end: true,
        }
    }
}

/// AP/AR items older than the aging threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgedItemsRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default = "default_age_threshold_days")]
    pub age_threshold_days: i64,
    #[serde(default = "default_ap_summary_over")]
    pub ap_summary_evidence_type: String,
    #[serde(default = "default_ap_detail_over")]
    pub ap_detail_evidence_type: String,
    #[serde(default = "default_ar_summary_over")]
    pub ar_summary_evidence_type: String,
    #[serde(default = "default_ar_detail_over")]
    pub ar_detail_evidence_type: String,
    #[serde(default = "default_true")]
    pub require_evidence_as_of_date_match_period_end: bool,
}

fn default_age_threshold_days() -> i64 {
    60
}

fn default_ap_summary_over() -> String {
    "ap_aging_summary_over_60".to_string()
}

fn default_ap_detail_over() -> String {
    "ap_aging_detail_over_60".to_string()
}

fn default_ar_summary_over() -> String {
    "ar_aging_summary_over_60".to_string()
}

fn default_ar_detail_over() -> String {
    "ar_aging_detail_over_60".to_string()
}

impl Default for AgedItemsRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            age_threshold_days: 60,
            ap_summary_evidence_type: default_ap_summary_over(),
            ap_detail_evidence_type: default_ap_detail_over(),
            ar_summary_evidence_type: default_ar_summary_over(),
            ar_detail_evidence_type: default_ar_detail_over(),
            require_evidence_as_of_date_match_period_end: true,
        }
    }
}

/// Negative open AP/AR items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeOpenItemsRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default = "default_ap_detail_rows")]
    pub ap_detail_rows_evidence_type: String,
    #[serde(default = "default_ar_detail_rows")]
    pub ar_detail_rows_evidence_type: String,
    #[serde(default = "default_true")]
    pub require_evidence_as_of_date_match_period_end: bool,
}

fn default_ap_detail_rows() -> String {
    "ap_aging_detail_rows".to_string()
}

fn default_ar_detail_rows() -> String {
    "ar_aging_detail_rows".to_string()
}

impl Default for NegativeOpenItemsRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            ap_detail_rows_evidence_type: default_ap_detail_rows(),
            ar_detail_rows_evidence_type: default_ar_detail_rows(),
            require_evidence_as_of_date_match_period_end: true,
        }
    }
}

/// Intercompany / shareholder balance reconciliation against counterpart
/// balance sheets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntercompanyRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    /// Account-name patterns; empty means the rule's built-in set.
    #[serde(default)]
    pub name_patterns: Vec<String>,
    #[serde(default = "default_intercompany_evidence")]
    pub evidence_type: String,
    /// Skip zero balances when scoping.
    #[serde(default = "default_true")]
    pub non_zero_only: bool,
    #[serde(default = "default_true")]
    pub require_evidence_as_of_date_match_period_end: bool,
}

fn default_intercompany_evidence() -> String {
    "intercompany_balance_sheet".to_string()
}

impl Default for IntercompanyRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            name_patterns: Vec::new(),
            evidence_type: default_intercompany_evidence(),
            non_zero_only: true,
            require_evidence_as_of_date_match_period_end: true,
        }
    }
}

/// Generic year-end batch adjustment names in AP/AR detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearEndBatchRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default = "default_year_end_patterns")]
    pub name_patterns: Vec<String>,
    #[serde(default = "default_ap_detail_rows")]
    pub ap_detail_rows_evidence_type: String,
    #[serde(default = "default_ar_detail_rows")]
    pub ar_detail_rows_evidence_type: String,
    #[serde(default = "default_true")]
    pub require_evidence_as_of_date_match_period_end: bool,
}

fn default_year_end_patterns() -> Vec<String> {
    vec![
        "yer supplier".to_string(),
        "year-end review".to_string(),
        "ye adj".to_string(),
        "year end".to_string(),
        "y/e".to_string(),
    ]
}

impl Default for YearEndBatchRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            name_patterns: default_year_end_patterns(),
            ap_detail_rows_evidence_type: default_ap_detail_rows(),
            ar_detail_rows_evidence_type: default_ar_detail_rows(),
            require_evidence_as_of_date_match_period_end: true,
        }
    }
}

/// Loan / investment balance tie-out to a schedule or statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementMatchRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default)]
    pub account_ref: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default = "default_true")]
    pub allow_name_inference: bool,
    /// Substring for name inference; empty means the rule's built-in match.
    #[serde(default)]
    pub account_name_match: String,
    /// Evidence type; empty means the rule's built-in type.
    #[serde(default)]
    pub evidence_type: String,
    #[serde(default = "default_true")]
    pub require_evidence_as_of_date_match_period_end: bool,
}

impl Default for StatementMatchRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            account_ref: String::new(),
            account_name: String::new(),
            allow_name_inference: true,
            account_name_match: String::new(),
            evidence_type: String::new(),
            require_evidence_as_of_date_match_period_end: true,
        }
    }
}

/// Working-paper balances (prepaids, deferred revenue, accruals).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingPaperRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default = "default_working_paper_patterns")]
    pub name_patterns: Vec<String>,
    #[serde(default = "default_working_paper_evidence")]
    pub evidence_type: String,
    #[serde(default = "default_true")]
    pub require_evidence_as_of_date_match_period_end: bool,
}

fn default_working_paper_patterns() -> Vec<String> {
    vec![
        "prepaid".to_string(),
        "deferred revenue".to_string(),
        "accrual".to_string(),
    ]
}

fn default_working_paper_evidence() -> String {
    "working_paper_balance".to_string()
}

impl Default for WorkingPaperRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            name_patterns: default_working_paper_patterns(),
            evidence_type: default_working_paper_evidence(),
            require_evidence_as_of_date_match_period_end: true,
        }
    }
}

/// Sales-tax filing cadence check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxFilingsRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default = "default_tax_agencies_evidence")]
    pub tax_agencies_evidence_type: String,
    #[serde(default = "default_tax_returns_evidence")]
    pub tax_returns_evidence_type: String,
    #[serde(default = "default_exclude_agency_patterns")]
    pub exclude_agency_name_patterns: Vec<String>,
    #[serde(default = "fail_status")]
    pub delinquent_status: RuleStatus,
}

fn default_tax_agencies_evidence() -> String {
    "tax_agencies".to_string()
}

fn default_tax_returns_evidence() -> String {
    "tax_returns".to_string()
}

fn default_tax_payments_evidence() -> String {
    "tax_payments".to_string()
}

fn default_exclude_agency_patterns() -> Vec<String> {
    vec!["no tax agency".to_string()]
}

impl Default for TaxFilingsRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            tax_agencies_evidence_type: default_tax_agencies_evidence(),
            tax_returns_evidence_type: default_tax_returns_evidence(),
            exclude_agency_name_patterns: default_exclude_agency_patterns(),
            delinquent_status: RuleStatus::Fail,
        }
    }
}

/// Tax payable/suspense reconciliation to the expected return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxPayableRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default = "default_tax_account_patterns")]
    pub account_name_patterns: Vec<String>,
    #[serde(default = "default_tax_agencies_evidence")]
    pub tax_agencies_evidence_type: String,
    #[serde(default = "default_tax_returns_evidence")]
    pub tax_returns_evidence_type: String,
    #[serde(default = "default_tax_payments_evidence")]
    pub tax_payments_evidence_type: String,
    /// Days after filing before an unissued refund is worth a warning.
    #[serde(default = "default_refund_grace_days")]
    pub refund_grace_days: i64,
    #[serde(default = "fail_status")]
    pub delinquent_status: RuleStatus,
}

fn default_tax_account_patterns() -> Vec<String> {
    vec![
        "gst/hst payable".to_string(),
        "gst payable".to_string(),
        "hst payable".to_string(),
        "pst payable".to_string(),
        "gst/hst suspense".to_string(),
        "gst suspense".to_string(),
        "hst suspense".to_string(),
        "pst suspense".to_string(),
        "tax suspense".to_string(),
    ]
}

fn default_refund_grace_days() -> i64 {
    60
}

impl Default for TaxPayableRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            account_name_patterns: default_tax_account_patterns(),
            tax_agencies_evidence_type: default_tax_agencies_evidence(),
            tax_returns_evidence_type: default_tax_returns_evidence(),
            tax_payments_evidence_type: default_tax_payments_evidence(),
            refund_grace_days: 60,
            delinquent_status: RuleStatus::Fail,
        }
    }
}

/// Balances unchanged versus the prior month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceUnchangedRuleConfig {
    #[serde(flatten)]
    pub common: CommonRuleConfig,
    #[serde(default)]
    pub include_zero_balances: bool,
}

impl Default for BalanceUnchangedRuleConfig {
    fn default() -> Self {
        Self {
            common: CommonRuleConfig::default(),
            include_zero_balances: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Config schema documents
// ---------------------------------------------------------------------------

/// Properties every rule payload supports.
fn common_properties() -> Vec<(&'static str, Value)> {
    vec![
        ("enabled", json!({"type": "boolean", "default": true})),
        (
            "missing_data_policy",
            json!({"type": "string", "enum": ["NEEDS_REVIEW", "NOT_APPLICABLE"], "default": "NEEDS_REVIEW"}),
        ),
        (
            "amount_quantize",
            json!({"type": ["string", "null"], "description": "decimal increment for quantized comparisons, e.g. \"0.01\""}),
        ),
    ]
}

/// JSON-schema-shaped document for a config payload: the given properties
/// plus the common trio. Unknown fields are tolerated on input.
pub fn config_schema(title: &str, properties: Value) -> Value {
    let mut props = match properties {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    for (key, schema) in common_properties() {
        props.entry(key.to_string()).or_insert(schema);
    }
    json!({
        "title": title,
        "type": "object",
        "additionalProperties": true,
        "properties": Value::Object(props),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn missing_entry_yields_defaults() {
        let config = ClientRulesConfig::default();
        let cfg: PettyCashRuleConfig = config
            .rule_config("BS-PETTY-CASH-MATCH")
            .expect("defaults");
        assert!(cfg.common.enabled);
        assert_eq!(cfg.evidence_type, "petty_cash_support");
        assert!(cfg.account_ref.is_empty());
    }

    #[test]
    fn payload_overrides_and_ignores_unknown_fields() {
        let config = ClientRulesConfig {
            rules: BTreeMap::from([(
                "BS-PETTY-CASH-MATCH".to_string(),
                json!({
                    "enabled": false,
                    "account_ref": "acct::PC",
                    "amount_quantize": "0.01",
                    "some_future_field": 42,
                }),
            )]),
        };
        let cfg: PettyCashRuleConfig = config
            .rule_config("BS-PETTY-CASH-MATCH")
            .expect("payload");
        assert!(!cfg.common.enabled);
        assert_eq!(cfg.account_ref, "acct::PC");
        assert_eq!(cfg.common.amount_quantize, Some(dec!(0.01)));
        assert_eq!(cfg.common.quantize(dec!(1.005)), dec!(1.00));
    }

    #[test]
    fn bad_payload_type_is_a_config_error() {
        let config = ClientRulesConfig {
            rules: BTreeMap::from([(
                "BS-PETTY-CASH-MATCH".to_string(),
                json!({"enabled": "definitely"}),
            )]),
        };
        let err = config
            .rule_config::<PettyCashRuleConfig>("BS-PETTY-CASH-MATCH")
            .expect_err("bad type");
        assert_eq!(err.rule_id, "BS-PETTY-CASH-MATCH");
    }

    #[test]
    fn bad_decimal_literal_is_a_config_error() {
        let config = ClientRulesConfig {
            rules: BTreeMap::from([(
                "BS-CLEARING-ACCOUNTS-ZERO".to_string(),
                json!({"amount_quantize": "not-a-decimal"}),
            )]),
        };
        assert!(config
            .rule_config::<ZeroBalanceRuleConfig>("BS-CLEARING-ACCOUNTS-ZERO")
            .is_err());
    }

    #[test]
    fn schema_carries_common_properties() {
        let schema = config_schema(
            "PettyCashRuleConfig",
            json!({"account_ref": {"type": "string"}}),
        );
        assert_eq!(schema["title"], json!("PettyCashRuleConfig"));
        assert!(schema["properties"]["enabled"].is_object());
        assert!(schema["properties"]["account_ref"].is_object());
        assert!(schema["properties"]["amount_quantize"].is_object());
    }

    #[test]
    fn unknown_rule_ids_are_ignored() {
        let config = ClientRulesConfig {
            rules: BTreeMap::from([("BS-NO-SUCH-RULE".to_string(), json!({"enabled": false}))]),
        };
        // Reading a different rule's config is unaffected.
        let cfg: BalanceUnchangedRuleConfig = config
            .rule_config("BS-BALANCE-UNCHANGED-PRIOR-MONTH")
            .expect("defaults");
        assert!(cfg.common.enabled);
    }
}
