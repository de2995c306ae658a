use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sonate_receipts::ExportFormat;

#[derive(Parser)]
#[command(
    name = "sonate",
    about = "SONATE trust receipts: verify, export, and key generation",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Verify a receipt or an ordered batch of receipts
    Verify(VerifyArgs),
    /// Convert receipts for log pipelines
    Export(ExportArgs),
    /// Generate an Ed25519 key pair
    Keygen(KeygenArgs),
}

#[derive(Args)]
pub struct VerifyArgs {
    /// JSON file holding one receipt object or an array of receipts
    pub file: PathBuf,
    /// Hex public key; enables the signature check
    #[arg(long, env = "SONATE_PUBLIC_KEY")]
    pub public_key: Option<String>,
    /// Required chain.previous_hash of the (first) receipt
    #[arg(long)]
    pub previous_hash: Option<String>,
    /// Print the verification report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    /// JSON file holding one receipt object or an array of receipts
    pub file: PathBuf,
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: FormatArg,
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Print the key pair as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum FormatArg {
    Json,
    Jsonl,
    Csv,
    Splunk,
    Datadog,
}

impl From<FormatArg> for ExportFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Jsonl => ExportFormat::Jsonl,
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Splunk => ExportFormat::Splunk,
            FormatArg::Datadog => ExportFormat::Datadog,
        }
    }
}
