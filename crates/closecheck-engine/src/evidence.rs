//! Supporting evidence consumed by the rules.
//!
//! Evidence arrives as an unordered bundle of typed items (bank statement
//! attachments, aging report totals, tax exports, working papers). Rules key
//! on `evidence_type`, and sometimes on `meta.account_ref`; "the evidence of
//! type X" always means the first item of that type in bundle order, which
//! keeps lookups deterministic.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// EvidenceItem
// ---------------------------------------------------------------------------

/// One piece of supporting evidence from the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Non-empty type tag rules key on (e.g. `statement_balance_attachment`).
    pub evidence_type: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub as_of_date: Option<NaiveDate>,
    #[serde(default)]
    pub statement_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub uri: Option<String>,
    /// Per-type payload; see the evidence manifest contract.
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

impl EvidenceItem {
    /// `meta.items[]` as a list of objects. `None` when the key is absent or
    /// not a list; non-object entries are dropped.
    pub fn meta_items(&self) -> Option<Vec<&serde_json::Map<String, Value>>> {
        match self.meta.get("items") {
            Some(Value::Array(entries)) => {
                Some(entries.iter().filter_map(|e| e.as_object()).collect())
            }
            _ => None,
        }
    }

    /// `meta.account_ref` as a string, if present.
    pub fn meta_account_ref(&self) -> Option<&str> {
        self.meta.get("account_ref").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// EvidenceBundle
// ---------------------------------------------------------------------------

/// Unordered collection of evidence items for one review period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    #[serde(default)]
    pub items: Vec<EvidenceItem>,
}

impl EvidenceBundle {
    /// First item of the given type, in bundle order.
    pub fn first(&self, evidence_type: &str) -> Option<&EvidenceItem> {
        self.items.iter().find(|i| i.evidence_type == evidence_type)
    }

    /// All items of the given type, in bundle order.
    pub fn all(&self, evidence_type: &str) -> Vec<&EvidenceItem> {
        self.items
            .iter()
            .filter(|i| i.evidence_type == evidence_type)
            .collect()
    }
}
