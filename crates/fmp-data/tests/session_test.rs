//! Integration tests for the endpoint catalogue against an in-memory transport

use async_trait::async_trait;
use fmp_data::company::Report;
use fmp_data::economics::Bucket;
use fmp_data::frequency::{Frequency, Interval, Period};
use fmp_data::{DataError, Session, TableStore};
use fmp_engine::{EngineError, EngineSettings, Request, Symbol, Transport, TransportError};
use serde_json::{Value, json};
use std::sync::Mutex;

/// Transport answering from a routing closure and recording every request.
struct FakeProvider {
    route: Box<dyn Fn(&Request) -> Result<Value, TransportError> + Send + Sync>,
    requests: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new(route: impl Fn(&Request) -> Result<Value, TransportError> + Send + Sync + 'static) -> Self {
        Self {
            route: Box::new(route),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn data_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| !r.contains("symbol-lists") && !r.contains("available-"))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeProvider {
    async fn fetch(&self, request: &Request) -> Result<Value, TransportError> {
        self.requests.lock().unwrap().push(request.to_string());
        (self.route)(request)
    }
}

fn catalogue(request: &Request) -> Option<Value> {
    match request.path.as_str() {
        "financial-statement-symbol-lists" => Some(json!(["AAPL", "MSFT", "NVDA"])),
        "symbol/available-forex-pairs" => Some(json!([
            {"symbol": "EURUSD", "name": "EUR/USD"},
            {"symbol": "GBPUSD", "name": "GBP/USD"}
        ])),
        _ => None,
    }
}

fn statement_rows(request: &Request) -> Value {
    let symbols = request.path.rsplit('/').next().unwrap_or_default();
    let period = request.query_value("period").map_or("FY", |_| "Q3");
    Value::Array(
        symbols
            .split(',')
            .map(|s| json!({"symbol": s, "date": "2024-06-30", "period": period, "revenue": 1.0e9}))
            .collect(),
    )
}

fn provider() -> FakeProvider {
    FakeProvider::new(|request| {
        if let Some(list) = catalogue(request) {
            return Ok(list);
        }
        let path = request.path.as_str();
        if path.starts_with("income-statement/") {
            return Ok(statement_rows(request));
        }
        if path.starts_with("historical-price-full/") {
            return Ok(json!({
                "historicalStockList": [
                    {"symbol": "AAPL", "historical": [{"date": "2024-01-03", "close": 184.2}, {"date": "2024-01-02", "close": 185.6}]},
                    {"symbol": "MSFT", "historical": [{"date": "2024-01-03", "close": 370.6}]}
                ]
            }));
        }
        if path.starts_with("historical-chart/") {
            return Ok(json!([{"date": "2024-01-02 09:30:00", "close": 1.0941}]));
        }
        if path == "stock_peers" {
            return Ok(json!([{"symbol": "AAPL", "peersList": ["MSFT", "GOOGL"]}]));
        }
        if path == "institutional-ownership/institutional-holders/symbol-ownership-percent" {
            let page: u32 = request.query_value("page").and_then(|p| p.parse().ok()).unwrap_or(0);
            let date = request.query_value("date").unwrap_or_default();
            if page >= 3 {
                return Ok(json!([]));
            }
            return Ok(Value::Array(
                (0..2)
                    .map(|i| json!({"symbol": "AAPL", "cik": format!("{page}-{i}"), "date": date}))
                    .collect(),
            ));
        }
        if path == "economic" {
            return Ok(json!([
                {"date": "2024-01-01", "value": 1.0},
                {"date": "2023-10-01", "value": 2.0}
            ]));
        }
        if path == "quotes/forex" {
            return Ok(json!([
                {"symbol": "EURUSD", "bid": 1.09},
                {"symbol": "GBPUSD", "bid": 1.27},
                {"symbol": "USDJPY", "bid": 148.1}
            ]));
        }
        Err(TransportError::Status {
            url: request.to_string(),
            status: 404,
        })
    })
}

fn session(provider: FakeProvider) -> Session<FakeProvider> {
    Session::new(provider, EngineSettings::default()).unwrap()
}

#[tokio::test]
async fn test_unknown_symbol_fails_before_data_requests() {
    let session = session(provider());
    let result = session.company("AAPL, ZZZZ").await;

    assert!(matches!(
        result,
        Err(DataError::Engine(EngineError::InvalidIdentifier(unknown))) if unknown == ["ZZZZ"]
    ));
    assert_eq!(session.transport().requests().len(), 1);
    assert!(session.transport().data_requests().is_empty());
}

#[tokio::test]
async fn test_catalogue_is_downloaded_once() {
    let session = session(provider());
    session.company("AAPL").await.unwrap();
    session.company("MSFT, NVDA").await.unwrap();
    assert_eq!(session.transport().requests().len(), 1);
}

#[tokio::test]
async fn test_quarterly_statements_join_symbols_in_path() {
    let session = session(provider());
    let company = session.company("aapl, msft").await.unwrap();
    let table = company
        .report(Report::IncomeStatement, Period::Quarter, Some(4))
        .await
        .unwrap();

    assert_eq!(
        session.transport().data_requests(),
        ["v3/income-statement/AAPL,MSFT?period=quarter&limit=4"]
    );
    assert_eq!(table.len(), 2);
    assert!(table.lookup(&["MSFT", "2024-06-30", "Q3"]).is_some());
    let columns: Vec<&str> = table
        .frame()
        .get_column_names()
        .into_iter()
        .map(|name| name.as_str())
        .collect();
    assert_eq!(columns[..3], ["symbol", "date", "period"]);
}

#[tokio::test]
async fn test_annual_statements_omit_period() {
    let session = session(provider());
    let company = session.company("NVDA").await.unwrap();
    let table = company
        .report(Report::IncomeStatement, Period::Annual, None)
        .await
        .unwrap();

    assert_eq!(session.transport().data_requests(), ["v3/income-statement/NVDA"]);
    assert!(table.lookup(&["NVDA", "2024-06-30", "FY"]).is_some());
}

#[tokio::test]
async fn test_daily_prices_flatten_batched_response() {
    let session = session(provider());
    let company = session.company("AAPL, MSFT").await.unwrap();
    let table = company
        .historical_prices(Frequency::Daily, None, None)
        .await
        .unwrap();

    assert_eq!(table.len(), 3);
    assert!(table.lookup(&["AAPL", "2024-01-02"]).is_some());
    assert!(table.lookup(&["MSFT", "2024-01-03"]).is_some());
    assert_eq!(table.key().fields(), ["symbol", "date"]);
}

#[tokio::test]
async fn test_forex_intraday_one_pair_per_request() {
    let session = session(provider());
    let table = session
        .forex()
        .historical("EURUSD, GBPUSD", Frequency::Intraday(Interval::FiveMinutes), None, None)
        .await
        .unwrap();

    let mut requests = session.transport().data_requests();
    requests.sort();
    assert_eq!(
        requests,
        ["v3/historical-chart/5min/EURUSD", "v3/historical-chart/5min/GBPUSD"]
    );
    assert_eq!(table.len(), 2);
    assert!(table.lookup(&["GBPUSD", "2024-01-02 09:30:00"]).is_some());
}

#[tokio::test]
async fn test_v4_endpoints_pass_symbol_parameter() {
    let session = session(provider());
    let company = session.company("AAPL").await.unwrap();
    let peers = company.peers().await.unwrap();

    assert_eq!(session.transport().data_requests(), ["v4/stock_peers?symbol=AAPL"]);
    assert_eq!(peers.len(), 1);
}

#[tokio::test]
async fn test_holders_are_paginated_until_empty_page() {
    let session = session(provider());
    let company = session.company("AAPL").await.unwrap();
    let table = company.institutional_holders(Some(2023), Some(3)).await.unwrap();

    assert_eq!(table.len(), 6);
    assert!(table.failed_identifiers().is_empty());
    assert!(table.lookup(&["AAPL", "2-1", "2023-09-30"]).is_some());
    assert!(
        session
            .transport()
            .data_requests()
            .iter()
            .all(|r| r.contains("date=2023-09-30"))
    );
}

#[tokio::test]
async fn test_invalid_quarter_is_rejected() {
    let session = session(provider());
    let company = session.company("AAPL").await.unwrap();

    assert!(matches!(
        company.institutional_holders(Some(2023), Some(5)).await,
        Err(DataError::InvalidQuarter(5))
    ));
    assert!(matches!(
        company.transcripts(2023, Some(0)).await,
        Err(DataError::InvalidQuarter(0))
    ));
    assert!(session.transport().data_requests().is_empty());
}

#[tokio::test]
async fn test_economic_indicators_are_tagged() {
    let session = session(provider());
    let table = session
        .economics()
        .indicators(&["realgdp", "CPI"], None, None, None)
        .await
        .unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(table.key().fields(), ["indicator", "date"]);
    assert!(table.lookup(&["realGDP", "2024-01-01"]).is_some());
    assert!(table.lookup(&["CPI", "2023-10-01"]).is_some());
}

#[tokio::test]
async fn test_economic_indicators_bucketed_by_year() {
    let session = session(provider());
    let table = session
        .economics()
        .indicators(&["GDP"], None, None, Some(Bucket::Year))
        .await
        .unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.lookup(&["GDP", "2024"]).unwrap()["value"], json!(1.0));
    assert_eq!(table.lookup(&["GDP", "2023"]).unwrap()["value"], json!(2.0));

    let table = session
        .economics()
        .indicators(&["GDP"], None, None, Some(Bucket::Quarter))
        .await
        .unwrap();
    assert!(table.lookup(&["GDP", "2024Q1"]).is_some());
    assert!(table.lookup(&["GDP", "2023Q4"]).is_some());
}

#[tokio::test]
async fn test_unknown_indicator_makes_no_requests() {
    let session = session(provider());
    let result = session.economics().indicators(&["moonPhase"], None, None, None).await;

    assert!(matches!(
        result,
        Err(DataError::Engine(EngineError::InvalidIdentifier(_)))
    ));
    assert!(session.transport().requests().is_empty());
}

#[tokio::test]
async fn test_live_forex_quotes_filtered() {
    let session = session(provider());
    let all = session.forex().live_quotes(&[]).await.unwrap();
    assert_eq!(all.len(), 3);

    let filtered = session
        .forex()
        .live_quotes(&[Symbol::new("eurusd")])
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert!(filtered.lookup(&["EURUSD"]).is_some());
}

#[tokio::test]
async fn test_fetched_table_survives_persistence() {
    let session = session(provider());
    let company = session.company("AAPL, MSFT").await.unwrap();
    let table = company
        .historical_prices(Frequency::Daily, None, None)
        .await
        .unwrap();

    let store = TableStore::in_memory().unwrap();
    store.save_table("prices", &table).unwrap();
    let loaded = store.load_table("prices").unwrap().unwrap();

    assert_eq!(loaded.rows(), table.rows());
    assert!(loaded.frame().equals_missing(table.frame()));
}
