//! Sales-tax filings completed through the most recent expected period.
//!
//! Cadence is inferred per agency from the latest filed return's period
//! length (day span); the expected period end rolls that cadence forward
//! from the agency's own anchor. A period that closes on the review date is
//! not yet expected to be filed. Ambiguous cadences are never guessed.

use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::calendar::{expected_period_end, parse_date, FilingCadence};
use crate::config::{config_schema, TaxFilingsRuleConfig};
use crate::context::RuleContext;
use crate::error::RuleError;
use crate::evidence::EvidenceItem;
use crate::result::{DetailValue, RuleResult, RuleResultDetail};
use crate::rule::{Rule, RuleSpec};
use crate::status::RuleStatus;

static SPEC: RuleSpec = RuleSpec {
    rule_id: "BS-TAX-FILINGS-UP-TO-DATE",
    rule_title: "Sales tax filings completed through most recent period",
    best_practices_reference: "Tax accounts",
    sources: &["Tax agency export", "Tax return export"],
};

pub(crate) struct TaxAgency {
    pub agency_id: String,
    pub display_name: String,
    pub tax_tracked_on_sales: bool,
}

pub(crate) struct TaxReturn {
    pub agency_id: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub file_date: Option<NaiveDate>,
}

fn string_of(item: &serde_json::Map<String, Value>, key: &str) -> String {
    match item.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn parse_agencies(item: &EvidenceItem) -> Vec<TaxAgency> {
    item.meta_items()
        .unwrap_or_default()
        .into_iter()
        .map(|entry| TaxAgency {
            agency_id: string_of(entry, "id"),
            display_name: string_of(entry, "display_name"),
            tax_tracked_on_sales: entry.get("tax_tracked_on_sales") == Some(&Value::Bool(true)),
        })
        .collect()
}

pub(crate) fn parse_returns(item: &EvidenceItem) -> Vec<TaxReturn> {
    item.meta_items()
        .unwrap_or_default()
        .into_iter()
        .map(|entry| TaxReturn {
            agency_id: string_of(entry, "agency_id"),
            start_date: entry.get("start_date").and_then(parse_date),
            end_date: entry.get("end_date").and_then(parse_date),
            file_date: entry.get("file_date").and_then(parse_date),
        })
        .collect()
}

pub struct TaxFilingsUpToDate;

impl Rule for TaxFilingsUpToDate {
    fn spec(&self) -> &'static RuleSpec {
        &SPEC
    }

    fn config_schema(&self) -> Value {
        config_schema(
            "TaxFilingsRuleConfig",
            json!({
                "tax_agencies_evidence_type": {"type": "string", "default": "tax_agencies"},
                "tax_returns_evidence_type": {"type": "string", "default": "tax_returns"},
                "exclude_agency_name_patterns": {
                    "type": "array",
                    "items": {"type": "string"},
                    "default": ["no tax agency"],
                },
                "delinquent_status": {
                    "type": "string",
                    "enum": ["WARN", "FAIL", "NEEDS_REVIEW"],
                    "default": "FAIL",
                },
            }),
        )
    }

    fn evaluate(&self, ctx: &RuleContext) -> Result<RuleResult, RuleError> {
        let cfg: TaxFilingsRuleConfig = ctx.client_config.rule_config(SPEC.rule_id)?;
        if !cfg.common.enabled {
            return Ok(RuleResult::disabled(&SPEC));
        }
        let missing_status = cfg.common.missing_status();

        let agencies_item = ctx.evidence.first(&cfg.tax_agencies_evidence_type);
        let returns_item = ctx.evidence.first(&cfg.tax_returns_evidence_type);
        let (Some(agencies_item), Some(returns_item)) = (agencies_item, returns_item) else {
            return Ok(RuleResult::builder(&SPEC, missing_status)
                .summary("Missing tax agency/return data; cannot verify filings.")
                .evidence_opt(agencies_item)
                .evidence_opt(returns_item)
                .human_action("Provide tax agency and tax return exports.")
                .build());
        };

        let agencies = parse_agencies(agencies_item);
        let returns = parse_returns(returns_item);
        if agencies.is_empty() || returns.is_empty() {
            return Ok(RuleResult::builder(&SPEC, missing_status)
                .summary("Tax agency/return data is empty; cannot verify filings.")
                .evidence(agencies_item)
                .evidence(returns_item)
                .human_action("Confirm the tax agency and tax return exports contain data.")
                .build());
        }

        let sales_agencies: Vec<&TaxAgency> = agencies
            .iter()
            .filter(|agency| {
                agency.tax_tracked_on_sales
                    && !cfg.exclude_agency_name_patterns.iter().any(|p| {
                        agency
                            .display_name
                            .to_lowercase()
                            .contains(&p.to_lowercase())
                    })
            })
            .collect();
        if sales_agencies.is_empty() {
            return Ok(RuleResult::builder(&SPEC, RuleStatus::NotApplicable)
                .summary("No sales tax agencies tracked on sales; not applicable.")
                .evidence(agencies_item)
                .build());
        }

        let mut statuses = Vec::new();
        let mut details = Vec::new();
        for agency in &sales_agencies {
            let key = if agency.agency_id.is_empty() {
                agency.display_name.clone()
            } else {
                agency.agency_id.clone()
            };
            let filed: Vec<&TaxReturn> = returns
                .iter()
                .filter(|r| r.agency_id == agency.agency_id && r.file_date.is_some())
                .collect();
            let Some(latest_filed) = filed
                .iter()
                .max_by_key(|r| r.end_date.or(r.file_date).unwrap_or(NaiveDate::MIN))
            else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(key, "No filed tax returns found for agency.")
                        .with("agency_name", agency.display_name.clone())
                        .with("period_end", ctx.period_end)
                        .with("status", missing_status),
                );
                continue;
            };
            let (Some(start), Some(end)) = (latest_filed.start_date, latest_filed.end_date)
            else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(key, "Latest filed return missing period dates.")
                        .with("agency_name", agency.display_name.clone())
                        .with("period_end", ctx.period_end)
                        .with("status", missing_status),
                );
                continue;
            };

            let Some(cadence) = FilingCadence::from_period(start, end) else {
                statuses.push(missing_status);
                details.push(
                    RuleResultDetail::new(key, "Unable to infer tax filing cadence for agency.")
                        .with("agency_name", agency.display_name.clone())
                        .with("period_end", ctx.period_end)
                        .with("latest_filed_start", start)
                        .with("latest_filed_end", end)
                        .with("status", missing_status),
                );
                continue;
            };
            let expected = expected_period_end(ctx.period_end, cadence, end);

            let status = if end >= expected {
                RuleStatus::Pass
            } else {
                cfg.delinquent_status
            };
            statuses.push(status);
            details.push(
                RuleResultDetail::new(key, "Tax filing cadence evaluated for agency.")
                    .with("agency_name", agency.display_name.clone())
                    .with("period_end", ctx.period_end)
                    .with("latest_filed_start", start)
                    .with("latest_filed_end", end)
                    .with(
                        "latest_file_date",
                        DetailValue::opt_date(latest_filed.file_date),
                    )
                    .with("expected_period_end", expected)
                    .with("cadence_months", cadence.months() as i64)
                    .with("status", status),
            );
        }

        let overall = RuleStatus::worst(statuses);
        let summary = if overall == RuleStatus::Pass {
            format!(
                "Sales tax filings are up to date through {}.",
                ctx.period_end.format("%Y-%m-%d"),
            )
        } else if overall == missing_status {
            "Missing or incomplete tax return data; cannot verify filings.".to_string()
        } else {
            "Sales tax filings are not up to date for one or more agencies.".to_string()
        };
        let human_action = overall.needs_human_action().then(|| {
            if overall == cfg.delinquent_status {
                "File missing sales tax returns and document filing periods.".to_string()
            } else {
                "Provide complete tax agency/return data for each sales tax agency.".to_string()
            }
        });

        Ok(RuleResult::builder(&SPEC, overall)
            .summary(summary)
            .details(details)
            .evidence(agencies_item)
            .evidence(returns_item)
            .maybe_human_action(human_action)
            .build())
    }
}
