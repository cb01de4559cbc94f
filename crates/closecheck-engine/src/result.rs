//! Rule results: structured findings, the result builder, detail values.
//!
//! A result is created once per evaluation and never mutated. `details[]`
//! preserves insertion order of evaluation (observable and tested); the
//! values inside a detail are a stable ordered map. Decimal fields serialize
//! as strings so exactness survives the wire.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::evidence::EvidenceItem;
use crate::rule::RuleSpec;
use crate::status::{severity_for_status, RuleStatus, Severity};

// ---------------------------------------------------------------------------
// DetailValue
// ---------------------------------------------------------------------------

/// One field of a structured finding: string, flag, count, exact decimal, or
/// a nested sample (lists of objects for flagged-item samples).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Null,
    Bool(bool),
    Int(i64),
    Amount(Decimal),
    Text(String),
    List(Vec<DetailValue>),
    Map(BTreeMap<String, DetailValue>),
}

impl DetailValue {
    /// ISO-formatted date field.
    pub fn date(d: NaiveDate) -> DetailValue {
        DetailValue::Text(d.format("%Y-%m-%d").to_string())
    }

    /// ISO-formatted date or null.
    pub fn opt_date(d: Option<NaiveDate>) -> DetailValue {
        d.map(DetailValue::date).unwrap_or(DetailValue::Null)
    }

    /// Exact decimal or null.
    pub fn opt_amount(d: Option<Decimal>) -> DetailValue {
        d.map(DetailValue::Amount).unwrap_or(DetailValue::Null)
    }

    /// Text or null.
    pub fn opt_text(s: Option<&str>) -> DetailValue {
        s.map(|s| DetailValue::Text(s.to_string()))
            .unwrap_or(DetailValue::Null)
    }

    /// Carry a raw metadata value into a finding (used for item samples).
    pub fn from_json(value: &Value) -> DetailValue {
        match value {
            Value::Null => DetailValue::Null,
            Value::Bool(b) => DetailValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DetailValue::Int(i),
                None => n
                    .to_string()
                    .parse::<Decimal>()
                    .map(DetailValue::Amount)
                    .unwrap_or_else(|_| DetailValue::Text(n.to_string())),
            },
            Value::String(s) => DetailValue::Text(s.clone()),
            Value::Array(entries) => {
                DetailValue::List(entries.iter().map(DetailValue::from_json).collect())
            }
            Value::Object(map) => DetailValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), DetailValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        DetailValue::Bool(v)
    }
}

impl From<i64> for DetailValue {
    fn from(v: i64) -> Self {
        DetailValue::Int(v)
    }
}

impl From<usize> for DetailValue {
    fn from(v: usize) -> Self {
        DetailValue::Int(v as i64)
    }
}

impl From<Decimal> for DetailValue {
    fn from(v: Decimal) -> Self {
        DetailValue::Amount(v)
    }
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        DetailValue::Text(v.to_string())
    }
}

impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        DetailValue::Text(v)
    }
}

impl From<NaiveDate> for DetailValue {
    fn from(v: NaiveDate) -> Self {
        DetailValue::date(v)
    }
}

impl From<RuleStatus> for DetailValue {
    fn from(v: RuleStatus) -> Self {
        DetailValue::Text(v.as_str().to_string())
    }
}

impl From<Vec<DetailValue>> for DetailValue {
    fn from(v: Vec<DetailValue>) -> Self {
        DetailValue::List(v)
    }
}

impl From<BTreeMap<String, DetailValue>> for DetailValue {
    fn from(v: BTreeMap<String, DetailValue>) -> Self {
        DetailValue::Map(v)
    }
}

// ---------------------------------------------------------------------------
// RuleResultDetail
// ---------------------------------------------------------------------------

/// One structured finding, keyed by an identifier (usually an account ref).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResultDetail {
    pub key: String,
    pub message: String,
    #[serde(default)]
    pub values: BTreeMap<String, DetailValue>,
}

impl RuleResultDetail {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add a value field.
    pub fn with(mut self, key: &str, value: impl Into<DetailValue>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// The per-check status recorded on this finding, if any.
    pub fn status_value(&self) -> Option<&DetailValue> {
        self.values.get("status")
    }
}

// ---------------------------------------------------------------------------
// RuleResult
// ---------------------------------------------------------------------------

/// Outcome of evaluating one rule against a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub rule_title: String,
    #[serde(default)]
    pub best_practices_reference: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub status: RuleStatus,
    pub severity: Severity,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: Vec<RuleResultDetail>,
    #[serde(default)]
    pub evidence_used: Vec<EvidenceItem>,
    #[serde(default)]
    pub human_action: Option<String>,
}

impl RuleResult {
    /// Start a result for `spec` with the given status; severity is the
    /// fixed derivative of status.
    pub fn builder(spec: &RuleSpec, status: RuleStatus) -> RuleResultBuilder {
        RuleResultBuilder {
            result: RuleResult {
                rule_id: spec.rule_id.to_string(),
                rule_title: spec.rule_title.to_string(),
                best_practices_reference: spec.best_practices_reference.to_string(),
                sources: spec.sources.iter().map(|s| s.to_string()).collect(),
                status,
                severity: severity_for_status(status),
                summary: String::new(),
                details: Vec::new(),
                evidence_used: Vec::new(),
                human_action: None,
            },
        }
    }

    /// The uniform `enabled=false` outcome.
    pub fn disabled(spec: &RuleSpec) -> RuleResult {
        RuleResult::builder(spec, RuleStatus::NotApplicable)
            .summary("Rule disabled by client configuration.")
            .build()
    }

    /// First detail whose recorded per-check status equals `status`; rules
    /// use this to pick a summary exemplar.
    pub fn exemplar_detail<'a>(
        details: &'a [RuleResultDetail],
        status: RuleStatus,
    ) -> Option<&'a RuleResultDetail> {
        let wanted = DetailValue::from(status);
        details.iter().find(|d| d.status_value() == Some(&wanted))
    }
}

/// Builder for [`RuleResult`].
#[derive(Debug)]
pub struct RuleResultBuilder {
    result: RuleResult,
}

impl RuleResultBuilder {
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.result.summary = summary.into();
        self
    }

    pub fn detail(mut self, detail: RuleResultDetail) -> Self {
        self.result.details.push(detail);
        self
    }

    pub fn details(mut self, details: Vec<RuleResultDetail>) -> Self {
        self.result.details.extend(details);
        self
    }

    pub fn evidence(mut self, item: &EvidenceItem) -> Self {
        self.result.evidence_used.push(item.clone());
        self
    }

    pub fn evidence_opt(mut self, item: Option<&EvidenceItem>) -> Self {
        if let Some(item) = item {
            self.result.evidence_used.push(item.clone());
        }
        self
    }

    pub fn human_action(mut self, action: impl Into<String>) -> Self {
        self.result.human_action = Some(action.into());
        self
    }

    pub fn maybe_human_action(mut self, action: Option<String>) -> Self {
        self.result.human_action = action;
        self
    }

    pub fn build(self) -> RuleResult {
        self.result
    }
}
