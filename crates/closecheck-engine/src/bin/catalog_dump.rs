//! Dump the registered rule catalog to stdout as JSON or YAML.

use std::io::{self, Write};
use std::process::ExitCode;

use closecheck_engine::catalog::{build_catalog, write_json, write_yaml};
use closecheck_engine::registry::RuleRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

fn parse_args() -> Result<Format, String> {
    let mut format = Format::Yaml;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--format" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--format requires a value (json|yaml)".to_string())?;
                format = match value.as_str() {
                    "json" => Format::Json,
                    "yaml" => Format::Yaml,
                    other => return Err(format!("unknown format: {other}")),
                };
            }
            "--help" | "-h" => {
                println!("usage: closecheck_catalog_dump [--format json|yaml]");
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(format)
}

fn run() -> Result<(), String> {
    let format = parse_args()?;
    let registry = RuleRegistry::with_builtin_rules().map_err(|e| e.to_string())?;
    let entries = build_catalog(&registry);
    let stdout = io::stdout();
    let mut sink = stdout.lock();
    match format {
        Format::Json => write_json(&entries, &mut sink).map_err(|e| e.to_string())?,
        Format::Yaml => write_yaml(&entries, &mut sink).map_err(|e| e.to_string())?,
    }
    sink.flush().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}
