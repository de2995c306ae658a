//! Export transforms for SIEM and log pipelines.
//!
//! Pure data reshaping: no hashing, no signing.

use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use serde_json::{json, Value};

use crate::error::{ReceiptError, Result};
use crate::receipt::Receipt;

const SOURCE: &str = "sonate";

const CSV_COLUMNS: [&str; 11] = [
    "id",
    "timestamp",
    "session_id",
    "agent_did",
    "human_did",
    "mode",
    "policy_version",
    "previous_hash",
    "chain_hash",
    "chain_length",
    "signed",
];

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Pretty-printed JSON array.
    Json,
    /// One receipt per line.
    Jsonl,
    /// Flattened summary columns with a header row.
    Csv,
    /// Splunk HTTP Event Collector events, one per line.
    Splunk,
    /// Datadog log intake JSON array.
    Datadog,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Json,
        ExportFormat::Jsonl,
        ExportFormat::Csv,
        ExportFormat::Splunk,
        ExportFormat::Datadog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
            Self::Splunk => "splunk",
            Self::Datadog => "datadog",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ReceiptError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ReceiptError::UnknownFormat(s.to_owned()))
    }
}

/// Render receipts in the given format.
pub fn export_receipts(receipts: &[Receipt], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(receipts)?),
        ExportFormat::Jsonl => lines(
            receipts
                .iter()
                .map(|r| serde_json::to_value(r).map_err(ReceiptError::from)),
        ),
        ExportFormat::Csv => Ok(to_csv(receipts)),
        ExportFormat::Splunk => lines(receipts.iter().map(splunk_event)),
        ExportFormat::Datadog => {
            let entries = receipts
                .iter()
                .map(datadog_entry)
                .collect::<Result<Vec<_>>>()?;
            Ok(serde_json::to_string(&entries)?)
        }
    }
}

fn lines(values: impl Iterator<Item = Result<Value>>) -> Result<String> {
    let mut out = String::new();
    for value in values {
        out.push_str(&serde_json::to_string(&value?)?);
        out.push('\n');
    }
    Ok(out)
}

/// Epoch milliseconds of the receipt timestamp, if it parses.
fn epoch_millis(receipt: &Receipt) -> Option<i64> {
    DateTime::parse_from_rfc3339(&receipt.timestamp)
        .ok()
        .map(|t| t.timestamp_millis())
}

fn splunk_event(receipt: &Receipt) -> Result<Value> {
    // HEC wants epoch seconds
    let time = epoch_millis(receipt).map(|ms| ms as f64 / 1000.0);
    Ok(json!({
        "time": time,
        "source": SOURCE,
        "sourcetype": "sonate:receipt",
        "host": receipt.agent_did,
        "event": serde_json::to_value(receipt)?,
    }))
}

fn datadog_entry(receipt: &Receipt) -> Result<Value> {
    Ok(json!({
        "ddsource": SOURCE,
        "service": "sonate-receipts",
        "ddtags": format!("session_id:{},mode:{}", receipt.session_id, receipt.mode),
        "timestamp": epoch_millis(receipt),
        "message": format!("trust receipt {}", receipt.id),
        "receipt": serde_json::to_value(receipt)?,
    }))
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

fn to_csv(receipts: &[Receipt]) -> String {
    let mut out = CSV_COLUMNS.join(",");
    out.push('\n');
    for r in receipts {
        let row = [
            r.id.clone(),
            r.timestamp.clone(),
            r.session_id.clone(),
            r.agent_did.clone(),
            r.human_did.clone(),
            r.mode.clone(),
            r.policy_version.clone(),
            r.chain.previous_hash.clone(),
            r.chain.chain_hash.clone(),
            r.chain.chain_length.to_string(),
            r.is_signed().to_string(),
        ];
        let row: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}
