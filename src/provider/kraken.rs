//! Kraken OHLC source adapter
//!
//! Fetches public OHLC data for one pair/interval. Kraken's `since`
//! parameter is an inclusive lower bound, so the watermark is passed as
//! `since + 1`. Response rows are
//! `[time, open, high, low, close, vwap, volume, count]` with prices encoded
//! as strings; `vwap` and `count` are not part of the canonical schema and
//! are dropped here.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::KrakenSourceSettings;
use crate::schema::{FetchBatch, GridCell, RawBar, SourceSpec};

use super::{SourceAdapter, SourceError, SourceResult};

/// Kraken OHLC response envelope
#[derive(Debug, Deserialize)]
struct KrakenOhlcResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, Value>,
}

/// Kraken public OHLC adapter
pub struct KrakenAdapter {
    client: Client,
    api_url: String,
}

impl KrakenAdapter {
    /// Create an adapter from source settings.
    pub fn new(settings: &KrakenSourceSettings) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                SourceError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl SourceAdapter for KrakenAdapter {
    fn name(&self) -> &str {
        "kraken"
    }

    async fn fetch(&self, cell: &GridCell, since_unix_time: i64) -> SourceResult<FetchBatch> {
        let (pair, result_key) = match &cell.instrument.source {
            SourceSpec::Kraken { pair, result_key } => (pair, result_key),
            other => {
                return Err(SourceError::NotRoutable {
                    instrument: cell.instrument.id.clone(),
                    kind: other.kind().to_string(),
                })
            }
        };

        // since + 1 turns Kraken's inclusive bound into the engine's
        // exclusive one.
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("pair", pair.as_str()),
                ("interval", &cell.resolution.minutes.to_string()),
                ("since", &(since_unix_time + 1).to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: KrakenOhlcResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("invalid OHLC body: {}", e)))?;

        if !body.error.is_empty() {
            return Err(SourceError::Rejected(body.error.join("; ")));
        }

        let rows = body
            .result
            .get(result_key)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SourceError::Parse(format!("result key {} missing from response", result_key))
            })?;

        let batch = parse_ohlc_rows(rows)?;
        debug!(
            series = %cell.series_key(),
            bars = batch.len(),
            since = since_unix_time,
            "kraken fetch complete"
        );

        Ok(batch)
    }
}

/// Parse Kraken OHLC rows into raw bars.
fn parse_ohlc_rows(rows: &[Value]) -> SourceResult<FetchBatch> {
    rows.iter().map(parse_ohlc_row).collect()
}

fn parse_ohlc_row(row: &Value) -> SourceResult<RawBar> {
    let fields = row
        .as_array()
        .filter(|f| f.len() >= 7)
        .ok_or_else(|| SourceError::Parse(format!("malformed OHLC row: {}", row)))?;

    Ok(RawBar {
        unix_time: fields[0]
            .as_i64()
            .ok_or_else(|| SourceError::Parse(format!("non-integer bar time: {}", fields[0])))?,
        open: field_as_f64(&fields[1])?,
        high: field_as_f64(&fields[2])?,
        low: field_as_f64(&fields[3])?,
        close: field_as_f64(&fields[4])?,
        // fields[5] is vwap, not carried
        volume: field_as_f64(&fields[6])?,
        quote_volume: None,
    })
}

/// Coerce a JSON number or numeric string to f64. Kraken encodes prices as
/// strings, and some sources emit bare integers.
fn field_as_f64(value: &Value) -> SourceResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| SourceError::Parse(format!("non-finite number: {}", n))),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| SourceError::Parse(format!("non-numeric field: {:?}", s))),
        other => Err(SourceError::Parse(format!("unexpected field: {}", other))),
    }
}
