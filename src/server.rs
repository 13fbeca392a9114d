//! Dashboard HTTP API: JSON endpoints over the query orchestrator plus a
//! metadata endpoint the frontend uses to populate its filter dropdowns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Query as QueryParams, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::client::{ClientOptions, PainelClient};
use crate::error::Error;
use crate::filters::{AGE_GROUPS, CID_CODES, Cid, MAX_YEAR, MIN_YEAR, Region, Sex, age_group};
use crate::query::{DEFAULT_MAX_WORKERS, FanOut, Query};

#[derive(Clone)]
struct AppState {
    client: Arc<PainelClient>,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let client_opts = ClientOptions {
        timeout: Duration::from_secs(opts.timeout_secs),
        max_retries: opts.max_retries,
        ..ClientOptions::default()
    };
    let client = PainelClient::connect(client_opts)
        .await
        .context("connect to portal")?;
    let state = AppState {
        client: Arc::new(client),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/meta", get(api_meta))
        .route("/api/cases", get(api_cases))
        .route("/api/cases/by-age", get(api_cases_by_age))
        .route("/api/cases/by-cid", get(api_cases_by_cid))
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct MetaResponse {
    min_year: u16,
    max_year: u16,
    sexes: Vec<&'static str>,
    regions: Vec<&'static str>,
    age_groups: Vec<&'static str>,
    cid_codes: Vec<&'static str>,
}

async fn api_meta() -> impl IntoResponse {
    Json(MetaResponse {
        min_year: MIN_YEAR,
        max_year: MAX_YEAR,
        sexes: vec!["ALL", "M", "F"],
        regions: Region::ALL.iter().map(|r| r.name()).collect(),
        age_groups: AGE_GROUPS.iter().map(|g| g.label).collect(),
        cid_codes: CID_CODES.to_vec(),
    })
}

#[derive(Debug, Deserialize)]
struct CasesParams {
    year: u16,
    sex: Option<String>,
    age_group: Option<String>,
    cid: Option<String>,
    region: Option<String>,
}

async fn api_cases(
    State(st): State<AppState>,
    QueryParams(p): QueryParams<CasesParams>,
) -> Response {
    let query = match build_query(&p) {
        Ok(query) => query,
        Err(err) => return error_response(err),
    };
    match st.client.query(&query).await {
        Ok(table) => Json(table).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct BreakdownParams {
    year: u16,
    sex: Option<String>,
    parallel: Option<bool>,
    max_workers: Option<usize>,
}

async fn api_cases_by_age(
    State(st): State<AppState>,
    QueryParams(p): QueryParams<BreakdownParams>,
) -> Response {
    let (sex, fan) = match breakdown_knobs(&p) {
        Ok(knobs) => knobs,
        Err(err) => return error_response(err),
    };
    match st.client.breakdown_by_age(p.year, sex, fan, None).await {
        Ok(table) => Json(table).into_response(),
        Err(err) => error_response(err),
    }
}

async fn api_cases_by_cid(
    State(st): State<AppState>,
    QueryParams(p): QueryParams<BreakdownParams>,
) -> Response {
    let (sex, fan) = match breakdown_knobs(&p) {
        Ok(knobs) => knobs,
        Err(err) => return error_response(err),
    };
    match st.client.breakdown_by_cid(p.year, sex, fan, None).await {
        Ok(table) => Json(table).into_response(),
        Err(err) => error_response(err),
    }
}

fn build_query(p: &CasesParams) -> Result<Query, Error> {
    Ok(Query {
        year: p.year,
        sex: p.sex.as_deref().map(Sex::parse).transpose()?.unwrap_or(Sex::All),
        age_group: p.age_group.as_deref().map(age_group).transpose()?,
        cid: p.cid.as_deref().map(Cid::parse).transpose()?,
        region: p.region.as_deref().map(Region::parse).transpose()?,
    })
}

fn breakdown_knobs(p: &BreakdownParams) -> Result<(Sex, FanOut), Error> {
    let sex = p.sex.as_deref().map(Sex::parse).transpose()?.unwrap_or(Sex::All);
    let fan = if p.parallel.unwrap_or(false) {
        FanOut::parallel(p.max_workers.unwrap_or(DEFAULT_MAX_WORKERS))
    } else {
        FanOut::sequential()
    };
    Ok((sex, fan))
}

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::InvalidParameter(_) => StatusCode::BAD_REQUEST,
        Error::NoData { .. } => StatusCode::NOT_FOUND,
        Error::Setup(_)
        | Error::Request { .. }
        | Error::Status { .. }
        | Error::PortalFormatChanged { .. }
        | Error::AllShardsFailed { .. } => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "upstream portal failure");
    }
    (status, err.to_string()).into_response()
}
