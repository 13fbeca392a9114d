//! Query orchestration: parameter validation, point queries, and the
//! bounded fan-out used by breakdown and aggregate operations.
//!
//! Fan-outs keep at most `max_workers` requests in flight and merge after
//! every worker settles. A failed sub-query becomes an explicit missing
//! marker in the result; only a fan-out where every sub-query failed is
//! reported as an error.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;

use futures::{StreamExt, stream::FuturesUnordered};
use indicatif::ProgressBar;

use crate::client::PainelClient;
use crate::error::{Error, Result};
use crate::filters::{self, AGE_GROUPS, AgeGroup, Cid, Region, Sex};
use crate::parse::parse_region_body;
use crate::payload::tabulation_payload;
use crate::table::ResultTable;

pub const DEFAULT_MAX_WORKERS: usize = 12;
/// Worker counts above this have shown no throughput gain against the portal.
pub const MAX_WORKERS_CAP: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    pub parallel: bool,
    pub max_workers: usize,
}

impl Default for FanOut {
    fn default() -> Self {
        FanOut {
            parallel: false,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl FanOut {
    pub fn sequential() -> Self {
        FanOut::default()
    }

    pub fn parallel(max_workers: usize) -> Self {
        FanOut {
            parallel: true,
            max_workers,
        }
    }

    fn workers(self) -> usize {
        self.max_workers.clamp(1, MAX_WORKERS_CAP)
    }
}

/// One point-query parameter set. Mode priority when querying: detailed
/// CID, then age bracket, then plain region totals filtered by sex.
#[derive(Debug, Clone, Copy)]
pub struct Query {
    pub year: u16,
    pub sex: Sex,
    pub age_group: Option<AgeGroup>,
    pub cid: Option<Cid>,
    pub region: Option<Region>,
}

impl Query {
    pub fn year(year: u16) -> Self {
        Query {
            year,
            sex: Sex::All,
            age_group: None,
            cid: None,
            region: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        filters::validate_year(self.year)?;
        Ok(())
    }

    /// Human-readable filter tag used in errors and logs.
    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("ano={}", self.year),
            format!("sexo={}", self.sex.as_str()),
        ];
        if let Some(bracket) = self.age_group {
            parts.push(format!("faixa={}", bracket.label));
        }
        if let Some(cid) = self.cid {
            parts.push(format!("cid={}", cid.code()));
        }
        if let Some(region) = self.region {
            parts.push(format!("regiao={}", region.name()));
        }
        parts.join(" ")
    }
}

#[derive(Debug, Clone)]
struct Shard {
    label: String,
    year: u16,
    age: Option<AgeGroup>,
    cid: Option<Cid>,
}

#[derive(Debug, Clone)]
enum ShardOutcome {
    Counts(BTreeMap<Region, u64>),
    /// Portal answered "no records" for this shard.
    Empty,
    Failed(String),
}

impl PainelClient {
    /// Single fetch and parse for one parameter set. The result always
    /// carries a `Total` row; a region filter reduces it to that region
    /// plus `Total`.
    pub async fn query(&self, query: &Query) -> Result<ResultTable> {
        query.validate()?;
        let filter = query.describe();
        let payload = tabulation_payload(query.year, query.sex, query.age_group, query.cid);
        let body = self.post_tabulation(&payload, &filter).await?;
        let counts = parse_region_body(&body, &filter)?;

        let mut table = ResultTable::new();
        for region in Region::ALL {
            if let Some(value) = counts.get(&region) {
                table.push_count(region.name(), *value);
            }
        }
        let table = table.finish_with_total();
        Ok(match query.region {
            Some(region) => table.filtered_to(region.name()),
            None => table,
        })
    }

    /// National counts per age bracket, one sub-query per bracket.
    pub async fn breakdown_by_age(
        &self,
        year: u16,
        sex: Sex,
        fan: FanOut,
        progress: Option<&ProgressBar>,
    ) -> Result<ResultTable> {
        filters::validate_year(year)?;
        let shards = AGE_GROUPS
            .iter()
            .map(|bracket| Shard {
                label: bracket.label.to_string(),
                year,
                age: Some(*bracket),
                cid: None,
            })
            .collect();
        let settled = self.run_shards(shards, sex, fan, progress).await;
        bucket_table(
            AGE_GROUPS.iter().map(|bracket| bracket.label),
            settled,
            &format!("ano={year} sexo={} por faixa", sex.as_str()),
        )
    }

    /// National counts per detailed CID code, one sub-query per code.
    pub async fn breakdown_by_cid(
        &self,
        year: u16,
        sex: Sex,
        fan: FanOut,
        progress: Option<&ProgressBar>,
    ) -> Result<ResultTable> {
        filters::validate_year(year)?;
        let shards = Cid::all()
            .map(|cid| Shard {
                label: cid.code().to_string(),
                year,
                age: None,
                cid: Some(cid),
            })
            .collect();
        let settled = self.run_shards(shards, sex, fan, progress).await;
        bucket_table(
            Cid::all().map(|cid| cid.code()),
            settled,
            &format!("ano={year} sexo={} por cid", sex.as_str()),
        )
    }

    /// Regional totals reconstructed by summing one sub-query per detailed
    /// CID code. Failed codes appear as missing markers below the regions.
    pub async fn region_totals_over_cids(
        &self,
        year: u16,
        sex: Sex,
        fan: FanOut,
        progress: Option<&ProgressBar>,
    ) -> Result<ResultTable> {
        filters::validate_year(year)?;
        let shards = Cid::all()
            .map(|cid| Shard {
                label: cid.code().to_string(),
                year,
                age: None,
                cid: Some(cid),
            })
            .collect();
        let settled = self.run_shards(shards, sex, fan, progress).await;
        aggregate_table(
            settled,
            &format!("ano={year} sexo={} agregado por cid", sex.as_str()),
        )
    }

    /// Regional totals summed across an inclusive year range, one
    /// sub-query per year.
    pub async fn region_totals_over_years(
        &self,
        years: RangeInclusive<u16>,
        sex: Sex,
        fan: FanOut,
        progress: Option<&ProgressBar>,
    ) -> Result<ResultTable> {
        filters::validate_year(*years.start())?;
        filters::validate_year(*years.end())?;
        if years.is_empty() {
            return Err(Error::invalid(format!(
                "empty year range {}..={}",
                years.start(),
                years.end()
            )));
        }
        let filter = format!(
            "ano={}..={} sexo={}",
            years.start(),
            years.end(),
            sex.as_str()
        );
        let shards = years
            .map(|year| Shard {
                label: year.to_string(),
                year,
                age: None,
                cid: None,
            })
            .collect();
        let settled = self.run_shards(shards, sex, fan, progress).await;
        aggregate_table(settled, &filter)
    }

    async fn run_shards(
        &self,
        shards: Vec<Shard>,
        sex: Sex,
        fan: FanOut,
        progress: Option<&ProgressBar>,
    ) -> Vec<(String, ShardOutcome)> {
        if !fan.parallel {
            let mut settled = Vec::with_capacity(shards.len());
            for shard in shards {
                let done = self.fetch_shard(shard, sex).await;
                if let Some(bar) = progress {
                    bar.inc(1);
                }
                settled.push(done);
            }
            return settled;
        }

        let workers = fan.workers();
        let mut queue = shards.into_iter();
        let mut in_flight = FuturesUnordered::new();
        for _ in 0..workers {
            if let Some(shard) = queue.next() {
                in_flight.push(self.fetch_shard(shard, sex));
            }
        }

        let mut settled = Vec::new();
        while let Some(done) = in_flight.next().await {
            if let Some(bar) = progress {
                bar.inc(1);
            }
            settled.push(done);
            if let Some(shard) = queue.next() {
                in_flight.push(self.fetch_shard(shard, sex));
            }
        }
        settled
    }

    async fn fetch_shard(&self, shard: Shard, sex: Sex) -> (String, ShardOutcome) {
        let query = Query {
            year: shard.year,
            sex,
            age_group: shard.age,
            cid: shard.cid,
            region: None,
        };
        let filter = query.describe();
        let payload = tabulation_payload(shard.year, sex, shard.age, shard.cid);

        let outcome = match self.post_tabulation(&payload, &filter).await {
            Ok(body) => match parse_region_body(&body, &filter) {
                Ok(counts) => ShardOutcome::Counts(counts),
                Err(Error::NoData { .. }) => ShardOutcome::Empty,
                Err(err) => {
                    tracing::warn!(%filter, error = %err, "sub-query parse failed");
                    ShardOutcome::Failed(err.to_string())
                }
            },
            Err(err) => {
                tracing::warn!(%filter, error = %err, "sub-query request failed");
                ShardOutcome::Failed(err.to_string())
            }
        };
        (shard.label, outcome)
    }
}

/// Builds a bucket table in canonical label order from settled shards.
/// A bucket with no records counts as zero; a failed bucket becomes a
/// missing marker.
fn bucket_table<'a>(
    order: impl IntoIterator<Item = &'a str>,
    settled: Vec<(String, ShardOutcome)>,
    filter: &str,
) -> Result<ResultTable> {
    let mut by_label: HashMap<String, ShardOutcome> = settled.into_iter().collect();
    let mut table = ResultTable::new();
    let mut failed = 0usize;
    let mut total = 0usize;

    for label in order {
        total += 1;
        match by_label.remove(label) {
            Some(ShardOutcome::Counts(counts)) => {
                table.push_count(label, counts.values().sum());
            }
            Some(ShardOutcome::Empty) => table.push_count(label, 0),
            Some(ShardOutcome::Failed(reason)) => {
                failed += 1;
                table.push_missing(label, reason);
            }
            None => {
                failed += 1;
                table.push_missing(label, "sub-query was not executed");
            }
        }
    }

    if total > 0 && failed == total {
        return Err(Error::AllShardsFailed {
            filter: filter.to_string(),
            total,
        });
    }
    Ok(table.finish_with_total())
}

/// Sums settled shard counts per region (join-then-aggregate). Failed
/// shards are listed as missing markers after the region rows, sorted by
/// label so the output does not depend on completion order.
fn aggregate_table(settled: Vec<(String, ShardOutcome)>, filter: &str) -> Result<ResultTable> {
    let total = settled.len();
    let mut sums: BTreeMap<Region, u64> = BTreeMap::new();
    let mut failures: Vec<(String, String)> = Vec::new();
    let mut succeeded = 0usize;

    for (label, outcome) in settled {
        match outcome {
            ShardOutcome::Counts(counts) => {
                succeeded += 1;
                for (region, value) in counts {
                    *sums.entry(region).or_insert(0) += value;
                }
            }
            ShardOutcome::Empty => succeeded += 1,
            ShardOutcome::Failed(reason) => failures.push((label, reason)),
        }
    }

    if total > 0 && succeeded == 0 {
        return Err(Error::AllShardsFailed {
            filter: filter.to_string(),
            total,
        });
    }

    let mut table = ResultTable::new();
    for region in Region::ALL {
        if let Some(value) = sums.get(&region) {
            table.push_count(region.name(), *value);
        }
    }
    failures.sort();
    for (label, reason) in failures {
        table.push_missing(label, reason);
    }
    Ok(table.finish_with_total())
}
