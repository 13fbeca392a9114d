use clap::{Parser, Subcommand};

use crate::query::DEFAULT_MAX_WORKERS;

#[derive(Parser, Debug)]
#[command(name = "painel-onco")]
#[command(about = "Query case counts from the DATASUS Painel Oncológico", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one query against the portal and print the result.
    Query(QueryArgs),
    /// Serve the dashboard HTTP API.
    Serve(ServeArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct QueryArgs {
    /// Diagnosis year (2013..=2025).
    #[arg(long)]
    pub year: u16,

    /// Sum regional totals across the inclusive range year..=through-year.
    #[arg(long)]
    pub through_year: Option<u16>,

    /// Sex filter: ALL, M or F.
    #[arg(long, default_value = "ALL")]
    pub sex: String,

    /// Age bracket label, e.g. "50 a 54 anos".
    #[arg(long)]
    pub age_group: Option<String>,

    /// Detailed CID-10 code, e.g. C50.
    #[arg(long)]
    pub cid: Option<String>,

    /// Region filter: Norte, Nordeste, Sudeste, Sul or Centro-Oeste.
    #[arg(long)]
    pub region: Option<String>,

    /// Break national counts down across all age brackets.
    #[arg(long, default_value_t = false)]
    pub by_age: bool,

    /// Break national counts down across the full detailed CID list.
    #[arg(long, default_value_t = false)]
    pub by_cid: bool,

    /// Reconstruct regional totals by summing one sub-query per CID code.
    #[arg(long, default_value_t = false)]
    pub aggregate_cids: bool,

    /// Fan multi-request operations out over a worker pool.
    #[arg(long, default_value_t = false)]
    pub parallel: bool,

    /// Max concurrent in-flight portal requests (clamped to 32).
    #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
    pub max_workers: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per request for transient portal failures.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Output format: table or json.
    #[arg(long, default_value = "table")]
    pub format: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8780)]
    pub port: u16,

    /// Per-request timeout in seconds for upstream portal calls.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per upstream request for transient portal failures.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,
}
