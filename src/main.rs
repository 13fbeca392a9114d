use anyhow::Context;
use clap::Parser;

use painel_onco::cli::{Args, Command};
use painel_onco::{report, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    match args.cmd {
        Command::Query(cmd) => report::run(cmd).await.context("query failed"),
        Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
    }
}
