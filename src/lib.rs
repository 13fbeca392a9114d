//! Client, CLI and dashboard backend for the DATASUS Painel Oncológico.
//!
//! The portal publishes Brazilian national oncology case counts behind a
//! TabNet form endpoint. This crate builds the form payloads, manages the
//! required session cookie, parses the tabulated responses into structured
//! per-region or per-bucket tables, and fans breakdown queries out over a
//! bounded worker pool.

pub mod cli;
pub mod client;
pub mod constants;
pub mod error;
pub mod filters;
pub mod parse;
pub mod payload;
pub mod query;
pub mod report;
pub mod server;
pub mod table;

pub use client::{ClientOptions, PainelClient};
pub use error::{Error, Result};
pub use filters::{AGE_GROUPS, CID_CODES, AgeGroup, Cid, Region, Sex};
pub use query::{DEFAULT_MAX_WORKERS, FanOut, MAX_WORKERS_CAP, Query};
pub use table::{Cell, Count, ResultTable, TOTAL_LABEL};

/// One-call convenience wrapper over a fresh session, mirroring the
/// portal-facing signature `(ano, sexo, faixa_etaria, cid, regiao,
/// paralelo, max_workers)`.
///
/// Mode priority matches [`Query`]: a `cid` wins over `faixa_etaria`,
/// which wins over plain region totals. Every shape here resolves to a
/// single portal request, so `paralelo` and `max_workers` only matter for
/// the breakdown operations on [`PainelClient`]; they are accepted for
/// signature parity and passed through unused otherwise.
#[allow(clippy::too_many_arguments, unused_variables)]
pub async fn consulta_onco(
    ano: u16,
    sexo: &str,
    faixa_etaria: Option<&str>,
    cid: Option<&str>,
    regiao: Option<&str>,
    paralelo: bool,
    max_workers: usize,
) -> Result<ResultTable> {
    let query = Query {
        year: ano,
        sex: Sex::parse(sexo)?,
        age_group: faixa_etaria.map(filters::age_group).transpose()?,
        cid: cid.map(Cid::parse).transpose()?,
        region: regiao.map(Region::parse).transpose()?,
    };
    // Validate before paying for the session bootstrap.
    query.validate()?;
    let client = PainelClient::connect_default().await?;
    client.query(&query).await
}
