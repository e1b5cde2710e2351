//! Kind-dispatching source router
//!
//! The grid mixes instruments from different upstreams; the router picks the
//! concrete adapter from each instrument's `SourceSpec` and presents the
//! whole set as one `SourceAdapter` to the collector.

use std::sync::Arc;

use crate::config::SourceSettings;
use crate::schema::{FetchBatch, GridCell, SourceSpec};

use super::{KrakenAdapter, SourceAdapter, SourceResult, YahooAdapter};

/// Routes fetches to the adapter matching each instrument's source kind.
pub struct SourceRouter {
    kraken: Arc<dyn SourceAdapter>,
    yahoo: Arc<dyn SourceAdapter>,
}

impl SourceRouter {
    /// Build a router with the stock HTTP adapters.
    pub fn from_settings(settings: &SourceSettings) -> SourceResult<Self> {
        Ok(Self {
            kraken: Arc::new(KrakenAdapter::new(&settings.kraken)?),
            yahoo: Arc::new(YahooAdapter::new(&settings.yahoo)?),
        })
    }

    /// Build a router over explicit adapters (useful for tests).
    pub fn new(kraken: Arc<dyn SourceAdapter>, yahoo: Arc<dyn SourceAdapter>) -> Self {
        Self { kraken, yahoo }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for SourceRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn fetch(&self, cell: &GridCell, since_unix_time: i64) -> SourceResult<FetchBatch> {
        let adapter = match &cell.instrument.source {
            SourceSpec::Kraken { .. } => &self.kraken,
            SourceSpec::Yahoo { .. } => &self.yahoo,
        };
        adapter.fetch(cell, since_unix_time).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockAdapter;
    use crate::schema::{Instrument, Resolution};

    fn cell(source: SourceSpec) -> GridCell {
        GridCell {
            instrument: Instrument {
                id: "BTCUSD".to_string(),
                source,
            },
            resolution: Resolution::new("1H", 60),
        }
    }

    #[tokio::test]
    async fn test_dispatch_by_source_kind() {
        let kraken = Arc::new(MockAdapter::new());
        let yahoo = Arc::new(MockAdapter::new());
        kraken.script("BTCUSD_1H", vec![]);

        let router = SourceRouter::new(kraken.clone(), yahoo.clone());

        let kraken_cell = cell(SourceSpec::Kraken {
            pair: "XBTUSD".to_string(),
            result_key: "XXBTZUSD".to_string(),
        });
        router.fetch(&kraken_cell, 0).await.unwrap();

        assert_eq!(kraken.calls("BTCUSD_1H"), vec![0]);
        assert!(yahoo.calls("BTCUSD_1H").is_empty());
    }
}
