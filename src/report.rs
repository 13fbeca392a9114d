//! `query` subcommand: runs one operation and prints the result.

use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::QueryArgs;
use crate::client::{ClientOptions, PainelClient};
use crate::filters::{AGE_GROUPS, CID_CODES, Cid, Region, Sex, age_group};
use crate::query::{FanOut, Query};
use crate::table::{Cell, ResultTable};

enum Format {
    Table,
    Json,
}

pub async fn run(args: QueryArgs) -> Result<()> {
    let format = match args.format.as_str() {
        "table" => Format::Table,
        "json" => Format::Json,
        other => bail!("unknown output format {other:?} (use table or json)"),
    };

    let exclusive = [
        args.through_year.is_some(),
        args.by_age,
        args.by_cid,
        args.aggregate_cids,
    ];
    if exclusive.iter().filter(|flag| **flag).count() > 1 {
        bail!("--through-year, --by-age, --by-cid and --aggregate-cids are mutually exclusive");
    }

    let sex = Sex::parse(&args.sex)?;
    let fan = if args.parallel {
        FanOut::parallel(args.max_workers)
    } else {
        FanOut::sequential()
    };

    let opts = ClientOptions {
        timeout: Duration::from_secs(args.timeout_secs),
        max_retries: args.max_retries,
        ..ClientOptions::default()
    };
    let client = PainelClient::connect(opts)
        .await
        .context("connecting to the portal")?;

    let table = if let Some(through) = args.through_year {
        let progress = fan_progress((through as usize).saturating_sub(args.year as usize) + 1);
        let result = client
            .region_totals_over_years(args.year..=through, sex, fan, progress.as_ref())
            .await;
        finish_progress(progress);
        result?
    } else if args.by_age {
        let progress = fan_progress(AGE_GROUPS.len());
        let result = client
            .breakdown_by_age(args.year, sex, fan, progress.as_ref())
            .await;
        finish_progress(progress);
        result?
    } else if args.by_cid {
        let progress = fan_progress(CID_CODES.len());
        let result = client
            .breakdown_by_cid(args.year, sex, fan, progress.as_ref())
            .await;
        finish_progress(progress);
        result?
    } else if args.aggregate_cids {
        let progress = fan_progress(CID_CODES.len());
        let result = client
            .region_totals_over_cids(args.year, sex, fan, progress.as_ref())
            .await;
        finish_progress(progress);
        result?
    } else {
        let query = Query {
            year: args.year,
            sex,
            age_group: args.age_group.as_deref().map(age_group).transpose()?,
            cid: args.cid.as_deref().map(Cid::parse).transpose()?,
            region: args.region.as_deref().map(Region::parse).transpose()?,
        };
        client.query(&query).await?
    };

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&table)?),
        Format::Table => print_table(&table),
    }
    Ok(())
}

fn fan_progress(len: usize) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} {prefix:.bold} [{elapsed_precise}] [{bar:32.cyan/blue}] {pos}/{len} {msg}",
    ) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_prefix("PAINEL");
    bar.enable_steady_tick(Duration::from_millis(250));
    Some(bar)
}

fn finish_progress(progress: Option<ProgressBar>) {
    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
}

fn print_table(table: &ResultTable) {
    let width = table
        .rows
        .iter()
        .map(|row| row.label.chars().count())
        .max()
        .unwrap_or(0);
    for row in &table.rows {
        match &row.cell {
            Cell::Count(count) => {
                println!("{:<width$}  {:>12}", row.label, count.formatted);
            }
            Cell::Missing { reason } => {
                println!("{:<width$}  {:>12}  ({reason})", row.label, "missing");
            }
        }
    }
}
