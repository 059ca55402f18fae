use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "kubenav",
    version,
    about = "Point-and-select terminal navigator for Kubernetes workloads, config and secrets."
)]
pub struct CliArgs {
    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long)]
    pub all_namespaces: bool,

    /// Label selector applied to resource lists (for example: app=web,tier!=cache)
    #[arg(short = 'l', long)]
    pub selector: Option<String>,

    /// Auto-refresh interval for resource lists in milliseconds
    #[arg(long)]
    pub refresh_ms: Option<u64>,

    /// Number of lines fetched for snapshot logs
    #[arg(long)]
    pub tail_lines: Option<i64>,

    /// Timeout for single-shot cluster calls in seconds
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write tracing output to this file instead of discarding it
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
