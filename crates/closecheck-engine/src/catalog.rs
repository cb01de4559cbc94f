//! Machine-readable catalog of registered rules.
//!
//! The catalog lists each rule's identity, references, and config schema so
//! operators can see what a client can configure. Building it is
//! side-effect-free; dumping writes JSON or YAML to a caller-supplied sink.
//! Entries are sorted by rule id for stable diffs.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::registry::RuleRegistry;

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub rule_id: String,
    pub rule_title: String,
    #[serde(default)]
    pub best_practices_reference: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub config_schema: Value,
}

/// Catalog dump failure.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to serialize catalog: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to serialize catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to write catalog: {0}")]
    Io(#[from] io::Error),
}

/// Catalog rows for every registered rule, sorted by rule id.
pub fn build_catalog(registry: &RuleRegistry) -> Vec<CatalogEntry> {
    let mut entries: Vec<CatalogEntry> = registry
        .iter()
        .map(|rule| {
            let spec = rule.spec();
            CatalogEntry {
                rule_id: spec.rule_id.to_string(),
                rule_title: spec.rule_title.to_string(),
                best_practices_reference: spec.best_practices_reference.to_string(),
                sources: spec.sources.iter().map(|s| s.to_string()).collect(),
                config_schema: rule.config_schema(),
            }
        })
        .collect();
    entries.sort_by(|a, b| a.rule_id.cmp(&b.rule_id));
    entries
}

/// Write the catalog as pretty JSON.
pub fn write_json<W: io::Write>(entries: &[CatalogEntry], sink: &mut W) -> Result<(), CatalogError> {
    serde_json::to_writer_pretty(&mut *sink, entries)?;
    sink.write_all(b"\n")?;
    Ok(())
}

/// Write the catalog as YAML.
pub fn write_yaml<W: io::Write>(entries: &[CatalogEntry], sink: &mut W) -> Result<(), CatalogError> {
    serde_yaml::to_writer(sink, entries)?;
    Ok(())
}
