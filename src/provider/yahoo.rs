//! Yahoo Finance chart source adapter
//!
//! Fetches OHLC candles from the chart API. The API is range-based rather
//! than cursor-based: a fresh series (watermark 0) requests the full
//! history, otherwise a short configured lookback window. The window
//! over-fetches, so rows at or before the watermark are filtered out here to
//! honor the exclusive fetch bound. Market-closed slots arrive as null
//! candles and are skipped.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::YahooSourceSettings;
use crate::schema::{FetchBatch, GridCell, RawBar, SourceSpec};

use super::{SourceAdapter, SourceError, SourceResult};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Vec<ChartResult>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Yahoo Finance chart adapter
pub struct YahooAdapter {
    client: Client,
    api_url: String,
    lookback_range: String,
}

impl YahooAdapter {
    /// Create an adapter from source settings.
    pub fn new(settings: &YahooSourceSettings) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| {
                SourceError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            lookback_range: settings.lookback_range.clone(),
        })
    }
}

#[async_trait::async_trait]
impl SourceAdapter for YahooAdapter {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch(&self, cell: &GridCell, since_unix_time: i64) -> SourceResult<FetchBatch> {
        let ticker = match &cell.instrument.source {
            SourceSpec::Yahoo { ticker } => ticker,
            other => {
                return Err(SourceError::NotRoutable {
                    instrument: cell.instrument.id.clone(),
                    kind: other.kind().to_string(),
                })
            }
        };

        let interval = chart_interval(cell.resolution.minutes).ok_or_else(|| {
            SourceError::UnsupportedResolution {
                source_name: "yahoo".to_string(),
                resolution: cell.resolution.name.clone(),
            }
        })?;

        // Full history for a fresh series, short window otherwise.
        let range = if since_unix_time == 0 {
            "max"
        } else {
            self.lookback_range.as_str()
        };

        let url = format!("{}/v8/finance/chart/{}", self.api_url, ticker);
        let response = self
            .client
            .get(&url)
            .query(&[("interval", interval), ("range", range)])
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

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Parse(format!("invalid chart body: {}", e)))?;

        if let Some(error) = body.chart.error {
            if !error.is_null() {
                return Err(SourceError::Rejected(error.to_string()));
            }
        }

        let result = body
            .chart
            .result
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::Parse("chart result empty".to_string()))?;

        let batch = candles_to_bars(&result, since_unix_time);
        debug!(
            series = %cell.series_key(),
            bars = batch.len(),
            since = since_unix_time,
            "yahoo fetch complete"
        );

        Ok(batch)
    }
}

/// Map a resolution in minutes to a chart API interval token.
fn chart_interval(minutes: u32) -> Option<&'static str> {
    match minutes {
        1 => Some("1m"),
        2 => Some("2m"),
        5 => Some("5m"),
        15 => Some("15m"),
        30 => Some("30m"),
        60 => Some("60m"),
        90 => Some("90m"),
        1440 => Some("1d"),
        10080 => Some("1wk"),
        _ => None,
    }
}

/// Assemble parallel candle arrays into raw bars, skipping null candles and
/// rows at or before the watermark.
fn candles_to_bars(result: &ChartResult, since_unix_time: i64) -> FetchBatch {
    let quote = match result.indicators.quote.first() {
        Some(q) => q,
        None => return Vec::new(),
    };

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &unix_time) in result.timestamp.iter().enumerate() {
        if unix_time <= since_unix_time {
            continue;
        }
        let candle = (
            quote.open.get(i).copied().flatten(),
            quote.high.get(i).copied().flatten(),
            quote.low.get(i).copied().flatten(),
            quote.close.get(i).copied().flatten(),
        );
        if let (Some(open), Some(high), Some(low), Some(close)) = candle {
            bars.push(RawBar {
                unix_time,
                open,
                high,
                low,
                close,
                volume: quote.volume.get(i).copied().flatten().unwrap_or(0.0),
                quote_volume: None,
            });
        }
    }
    bars
}
