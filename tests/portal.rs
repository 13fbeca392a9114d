//! End-to-end tests against an in-process stand-in for the portal.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use painel_onco::{
    ClientOptions, Error, FanOut, PainelClient, Query, Region, ResultTable, Sex, TOTAL_LABEL,
};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn options(base: &str) -> ClientOptions {
    ClientOptions {
        tabulation_url: format!("{base}/tabulate"),
        session_url: format!("{base}/session"),
        timeout: Duration::from_secs(5),
        max_retries: 1,
    }
}

fn addrows_page(values: [u64; 5]) -> String {
    format!(
        concat!(
            "<html><head></head><body><script>\n",
            "var data = new google.visualization.DataTable();\n",
            "data.addRows( [\n",
            "[\"1 Região Norte\", {{v: {}, f: \"\"}}],\n",
            "[\"2 Região Nordeste\", {{v: {}, f: \"\"}}],\n",
            "[\"3 Região Sudeste\", {{v: {}, f: \"\"}}],\n",
            "[\"4 Região Sul\", {{v: {}, f: \"\"}}],\n",
            "[\"5 Região Centro-Oeste\", {{v: {}, f: \"\"}}]\n",
            "] );\n",
            "</script></body></html>"
        ),
        values[0], values[1], values[2], values[3], values[4]
    )
}

/// Deterministic per-payload values so sequential and parallel runs of the
/// same query set must agree.
fn values_for(body: &str) -> [u64; 5] {
    let seed = body.bytes().map(u64::from).sum::<u64>() % 97;
    [seed + 1, seed + 2, seed + 3, seed + 4, seed + 5]
}

fn mock_portal() -> Router {
    Router::new()
        .route("/session", get(|| async { "ok" }))
        .route(
            "/tabulate",
            post(|body: String| async move { addrows_page(values_for(&body)) }),
        )
}

#[tokio::test]
async fn region_totals_carry_a_consistent_total() {
    let base = serve(mock_portal()).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    let table = client.query(&Query::year(2023)).await.unwrap();
    let labels: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(
        labels,
        ["Norte", "Nordeste", "Sudeste", "Sul", "Centro-Oeste", TOTAL_LABEL]
    );

    let sum: u64 = Region::ALL
        .iter()
        .map(|r| table.count_of(r.name()).unwrap())
        .sum();
    assert_eq!(table.count_of(TOTAL_LABEL), Some(sum));
}

#[tokio::test]
async fn region_filter_reduces_to_region_and_total() {
    let base = serve(mock_portal()).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    let mut query = Query::year(2023);
    query.region = Some(Region::Sudeste);
    let table = client.query(&query).await.unwrap();

    let labels: Vec<&str> = table.rows.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, ["Sudeste", TOTAL_LABEL]);
    assert!(table.count_of(TOTAL_LABEL).unwrap() >= table.count_of("Sudeste").unwrap());
}

#[tokio::test]
async fn parallel_and_sequential_age_breakdowns_agree() {
    let base = serve(mock_portal()).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    let sequential = client
        .breakdown_by_age(2021, Sex::Female, FanOut::sequential(), None)
        .await
        .unwrap();
    let parallel = client
        .breakdown_by_age(2021, Sex::Female, FanOut::parallel(8), None)
        .await
        .unwrap();

    assert_eq!(sequential, parallel);
    assert_eq!(
        sequential.count_of(TOTAL_LABEL),
        parallel.count_of(TOTAL_LABEL)
    );
}

#[tokio::test]
async fn parallel_and_sequential_year_aggregates_agree() {
    let base = serve(mock_portal()).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    let sequential = client
        .region_totals_over_years(2013..=2017, Sex::All, FanOut::sequential(), None)
        .await
        .unwrap();
    let parallel = client
        .region_totals_over_years(2013..=2017, Sex::All, FanOut::parallel(32), None)
        .await
        .unwrap();

    assert_eq!(sequential, parallel);
    let sum: u64 = Region::ALL
        .iter()
        .map(|r| sequential.count_of(r.name()).unwrap())
        .sum();
    assert_eq!(sequential.count_of(TOTAL_LABEL), Some(sum));
}

#[tokio::test]
async fn failed_shards_degrade_to_missing_markers() {
    // The "0 a 19 anos" bracket always errors; everything else tabulates.
    let app = Router::new()
        .route("/session", get(|| async { "ok" }))
        .route(
            "/tabulate",
            post(|body: String| async move {
                if body.contains("0+a+19+anos") {
                    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
                } else {
                    addrows_page(values_for(&body)).into_response()
                }
            }),
        );
    let base = serve(app).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    let table = client
        .breakdown_by_age(2021, Sex::All, FanOut::parallel(4), None)
        .await
        .unwrap();

    assert_eq!(table.missing_count(), 1);
    assert!(table.get("0 a 19 anos").is_some());
    assert!(table.count_of("0 a 19 anos").is_none());
    let counted: u64 = table
        .rows
        .iter()
        .filter(|row| row.label != TOTAL_LABEL)
        .filter_map(|row| table.count_of(&row.label))
        .sum();
    assert_eq!(table.count_of(TOTAL_LABEL), Some(counted));
}

#[tokio::test]
async fn all_failed_shards_surface_as_an_error() {
    let app = Router::new()
        .route("/session", get(|| async { "ok" }))
        .route(
            "/tabulate",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down").into_response() }),
        );
    let base = serve(app).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    match client
        .breakdown_by_age(2021, Sex::All, FanOut::parallel(4), None)
        .await
    {
        Err(Error::AllShardsFailed { total, .. }) => assert_eq!(total, 14),
        other => panic!("expected AllShardsFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn no_records_point_query_is_no_data() {
    let app = Router::new()
        .route("/session", get(|| async { "ok" }))
        .route(
            "/tabulate",
            post(|body: String| async move {
                if body.contains("C97%7CC97%7C3") {
                    Response::new("<html>Nenhum registro encontrado</html>".to_string().into())
                } else {
                    addrows_page(values_for(&body)).into_response()
                }
            }),
        );
    let base = serve(app).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    let mut query = Query::year(2013);
    query.cid = Some(painel_onco::Cid::parse("C97").unwrap());
    match client.query(&query).await {
        Err(Error::NoData { filter }) => assert!(filter.contains("cid=C97")),
        other => panic!("expected NoData, got {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_markup_is_a_format_change() {
    let app = Router::new()
        .route("/session", get(|| async { "ok" }))
        .route(
            "/tabulate",
            post(|| async { "<html><h1>Manutenção programada</h1></html>" }),
        );
    let base = serve(app).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    assert!(matches!(
        client.query(&Query::year(2021)).await,
        Err(Error::PortalFormatChanged { .. })
    ));
}

#[tokio::test]
async fn validation_rejects_before_any_tabulation_request() {
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in_handler = hits.clone();
    let app = Router::new()
        .route("/session", get(|| async { "ok" }))
        .route(
            "/tabulate",
            post(move |body: String| {
                let hits = hits_in_handler.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    addrows_page(values_for(&body))
                }
            }),
        );
    let base = serve(app).await;
    let client = PainelClient::connect(options(&base)).await.unwrap();

    assert!(matches!(
        client.query(&Query::year(1999)).await,
        Err(Error::InvalidParameter(_))
    ));
    assert!(matches!(
        client
            .breakdown_by_age(2050, Sex::All, FanOut::sequential(), None)
            .await,
        Err(Error::InvalidParameter(_))
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn transient_statuses_are_retried() {
    // First attempt 503, second succeeds.
    let hits = Arc::new(AtomicUsize::new(0));
    let hits_in_handler = hits.clone();
    let app = Router::new()
        .route("/session", get(|| async { "ok" }))
        .route(
            "/tabulate",
            post(move |body: String| {
                let hits = hits_in_handler.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response()
                    } else {
                        addrows_page(values_for(&body)).into_response()
                    }
                }
            }),
        );
    let base = serve(app).await;
    let opts = ClientOptions {
        max_retries: 2,
        ..options(&base)
    };
    let client = PainelClient::connect(opts).await.unwrap();

    let table: ResultTable = client.query(&Query::year(2021)).await.unwrap();
    assert!(table.count_of(TOTAL_LABEL).is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}
