//! Inspect command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use keyward_core::cbor::{DecodeLimits, Value};
use keyward_core::AttestationObject;
use serde_json::json;
use tracing::info;

use super::authdata;
use crate::input;

/// Execute the inspect command.
pub fn execute(file: PathBuf, json: bool, quiet: bool) -> Result<()> {
    let raw = input::read_input(&file)?;
    info!(path = %file.display(), bytes = raw.len(), "Read input");

    let bytes = input::attestation_object_bytes(&raw)?;
    let object = AttestationObject::parse(&bytes, DecodeLimits::default())
        .context("Malformed attestation object")?;
    info!(fmt = %object.fmt, flags = %object.auth_data.flags, "Decoded attestation object");

    let statement = StatementSummary::from_value(&object.statement);

    if json {
        let value = json!({
            "fmt": object.fmt,
            "statement": {
                "fields": statement.fields,
                "alg": statement.alg,
                "certificates": statement.certificates,
            },
            "authenticatorData": authdata::to_json(&object.auth_data),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if !quiet {
        println!("{} {}", "Attestation format:".bold(), object.fmt.cyan());
        if statement.fields.is_empty() {
            println!("   {} (empty)", "Statement:".dimmed());
        } else {
            println!("   {} {}", "Statement:".dimmed(), statement.fields.join(", "));
        }
        if let Some(alg) = statement.alg {
            println!("   {} {alg}", "Statement alg:".dimmed());
        }
        if statement.certificates > 0 {
            println!("   {} {}", "Certificates:".dimmed(), statement.certificates);
        }
        println!();
        authdata::print_report(&object.auth_data);
    }
    Ok(())
}

/// The parts of `attStmt` worth showing without verifying anything.
struct StatementSummary {
    fields: Vec<String>,
    alg: Option<i64>,
    certificates: usize,
}

impl StatementSummary {
    fn from_value(statement: &Value) -> Self {
        let fields = statement
            .as_map()
            .unwrap_or_default()
            .iter()
            .filter_map(|(key, _)| key.as_text().map(str::to_string))
            .collect();
        let alg = statement.map_get_text("alg").and_then(Value::as_i64);
        let certificates = statement
            .map_get_text("x5c")
            .and_then(Value::as_array)
            .map_or(0, <[Value]>::len);

        Self {
            fields,
            alg,
            certificates,
        }
    }
}
