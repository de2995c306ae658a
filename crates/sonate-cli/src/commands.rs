use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use colored::Colorize;
use serde_json::{json, Value};

use sonate_core::{Keypair, PublicKey};
use sonate_receipts::{
    export_receipts, verify_receipt_json, verify_receipts_json, BatchVerification, Receipt,
    ReceiptVerification, VerifyOptions,
};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::Verify(args) => cmd_verify(args),
        Command::Export(args) => cmd_export(args),
        Command::Keygen(args) => cmd_keygen(args),
    }
}

/// A receipts file holds either one receipt object or an array of them.
enum ReceiptsFile {
    Single(Value),
    Batch(Vec<Value>),
}

impl ReceiptsFile {
    fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(match serde_json::from_str::<Value>(text).context("file is not valid JSON")? {
            Value::Array(items) => Self::Batch(items),
            other => Self::Single(other),
        })
    }

    fn into_values(self) -> Vec<Value> {
        match self {
            Self::Single(value) => vec![value],
            Self::Batch(values) => values,
        }
    }
}

fn read_receipts(path: &Path) -> anyhow::Result<ReceiptsFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    ReceiptsFile::parse(&text).with_context(|| format!("parsing {}", path.display()))
}

fn verify_options(args: &VerifyArgs) -> anyhow::Result<VerifyOptions> {
    let mut options = VerifyOptions::default();
    if let Some(hex) = &args.public_key {
        let key = PublicKey::from_hex(hex.trim()).context("invalid --public-key")?;
        options = options.with_public_key(key);
    }
    if let Some(hash) = &args.previous_hash {
        options = options.with_previous_hash(hash.trim());
    }
    Ok(options)
}

fn cmd_verify(args: VerifyArgs) -> anyhow::Result<ExitCode> {
    let options = verify_options(&args)?;
    let valid = match read_receipts(&args.file)? {
        ReceiptsFile::Single(value) => {
            let report = verify_receipt_json(&value, &options);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(None, &report);
            }
            report.is_valid()
        }
        ReceiptsFile::Batch(values) => {
            let report = verify_receipts_json(&values, &options);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_batch(&report);
            }
            report.is_valid()
        }
    };

    tracing::debug!(file = %args.file.display(), valid, "verification finished");
    Ok(if valid { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn print_report(index: Option<usize>, report: &ReceiptVerification) {
    let label = index.map_or_else(|| "receipt".to_string(), |i| format!("receipt #{i}"));
    let failed = report.failed_checks();
    if failed.is_empty() {
        println!("{} {} valid", "✓".green().bold(), label);
    } else {
        println!("{} {} failed: {}", "✗".red().bold(), label, failed.join(", ").red());
    }
    if report.signature_valid.is_none() {
        let note = if report.signature_present {
            "signature not checked (no public key)"
        } else {
            "unsigned"
        };
        println!("  {}", note.dimmed());
    }
    for issue in &report.issues {
        println!("  {issue}");
    }
}

fn print_batch(report: &BatchVerification) {
    for (i, receipt) in report.receipts.iter().enumerate() {
        print_report(Some(i), receipt);
    }
    for link in report.links.iter().filter(|l| !l.linked) {
        println!(
            "{} receipt #{} does not follow receipt #{}",
            "✗".red().bold(),
            link.index,
            link.index - 1
        );
    }
    if report.chain_continuous {
        println!("Chain: {} receipts, continuity {}", report.receipts.len(), "✓".green());
    } else {
        println!("Chain: {} receipts, continuity {}", report.receipts.len(), "broken".red());
    }
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<ExitCode> {
    let receipts = read_receipts(&args.file)?
        .into_values()
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            serde_json::from_value::<Receipt>(value).with_context(|| format!("receipt #{i}"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let out = export_receipts(&receipts, args.format.into())?;
    print!("{out}");
    if !out.is_empty() && !out.ends_with('\n') {
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_keygen(args: KeygenArgs) -> anyhow::Result<ExitCode> {
    let keypair = Keypair::generate();
    let secret = hex::encode(keypair.seed());
    let public = keypair.public_key().to_hex();
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "secret_key": secret, "public_key": public }))?
        );
    } else {
        println!("secret_key: {secret}");
        println!("public_key: {public}");
    }
    Ok(ExitCode::SUCCESS)
}
