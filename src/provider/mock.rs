//! Scripted source adapter for tests
//!
//! Batches are queued per series key and handed out one per fetch; a series
//! can also be scripted to fail. Every call's `since` argument is recorded
//! so tests can assert the exclusive-bound contract.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::schema::{FetchBatch, GridCell};

use super::{SourceAdapter, SourceError, SourceResult};

#[derive(Default)]
pub struct MockAdapter {
    batches: Mutex<HashMap<String, VecDeque<FetchBatch>>>,
    calls: Mutex<HashMap<String, Vec<i64>>>,
    failing: Mutex<HashSet<String>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next batch returned for a series key.
    pub fn script(&self, table_name: &str, batch: FetchBatch) {
        self.batches
            .lock()
            .unwrap()
            .entry(table_name.to_string())
            .or_default()
            .push_back(batch);
    }

    /// Make every fetch for a series key fail.
    pub fn fail(&self, table_name: &str) {
        self.failing.lock().unwrap().insert(table_name.to_string());
    }

    /// `since` arguments recorded for a series key, in call order.
    pub fn calls(&self, table_name: &str) -> Vec<i64> {
        self.calls
            .lock()
            .unwrap()
            .get(table_name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch(&self, cell: &GridCell, since_unix_time: i64) -> SourceResult<FetchBatch> {
        let key = cell.series_key().table_name();

        self.calls
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push(since_unix_time);

        if self.failing.lock().unwrap().contains(&key) {
            return Err(SourceError::Request(format!("scripted failure for {}", key)));
        }

        // An unscripted series means no new data upstream.
        Ok(self
            .batches
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }
}
