//! Filesystem CSV sink
//!
//! Bars land under `{root}/{dataset}/{instrument}/{run_bucket}/{resolution}.csv`
//! in the canonical column order. Writes go through a temp file in the target
//! directory and a rename, so readers never observe a half-written partition.
//! The merge policy re-reads an existing partition and appends the new batch
//! after its rows.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::WritePolicy;
use crate::schema::{CanonicalBar, SeriesKey};

/// Bar sink errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SinkError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Destination for normalized bars, partitioned by series and run bucket.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persist a batch for one series under the given run bucket. Returns
    /// the number of rows in the written partition.
    async fn write(
        &self,
        series: &SeriesKey,
        run_bucket: &str,
        bars: &[CanonicalBar],
    ) -> SinkResult<usize>;
}

/// Local-filesystem CSV sink.
pub struct FsSink {
    root: PathBuf,
    dataset: String,
    policy: WritePolicy,
}

impl FsSink {
    pub fn new(root: impl Into<PathBuf>, dataset: impl Into<String>, policy: WritePolicy) -> Self {
        Self {
            root: root.into(),
            dataset: dataset.into(),
            policy,
        }
    }

    /// Partition path for one series under one run bucket.
    pub fn partition_path(&self, series: &SeriesKey, run_bucket: &str) -> PathBuf {
        self.root
            .join(&self.dataset)
            .join(&series.instrument)
            .join(run_bucket)
            .join(format!("{}.csv", series.resolution))
    }

    fn read_existing(path: &Path) -> SinkResult<Vec<CanonicalBar>> {
        let mut reader = csv::Reader::from_path(path).map_err(|source| SinkError::Csv {
            path: path.to_path_buf(),
            source,
        })?;

        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let bar: CanonicalBar = record.map_err(|source| SinkError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            rows.push(bar);
        }
        Ok(rows)
    }

    fn write_partition(path: &Path, rows: &[CanonicalBar]) -> SinkResult<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| SinkError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        // Once the temp file exists, every error path must remove it.
        let tmp = path.with_extension("csv.tmp");
        if let Err(e) = Self::fill_temp(&tmp, rows) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        if let Err(source) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(SinkError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
        Ok(())
    }

    fn fill_temp(tmp: &Path, rows: &[CanonicalBar]) -> SinkResult<()> {
        let mut writer = csv::Writer::from_path(tmp).map_err(|source| SinkError::Csv {
            path: tmp.to_path_buf(),
            source,
        })?;

        for row in rows {
            writer.serialize(row).map_err(|source| SinkError::Csv {
                path: tmp.to_path_buf(),
                source,
            })?;
        }
        writer.flush().map_err(|source| SinkError::Io {
            path: tmp.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl Sink for FsSink {
    async fn write(
        &self,
        series: &SeriesKey,
        run_bucket: &str,
        bars: &[CanonicalBar],
    ) -> SinkResult<usize> {
        let path = self.partition_path(series, run_bucket);

        let rows = match self.policy {
            WritePolicy::Merge if path.exists() => {
                let mut existing = Self::read_existing(&path)?;
                existing.extend_from_slice(bars);
                existing
            }
            _ => bars.to_vec(),
        };

        Self::write_partition(&path, &rows)?;

        debug!(
            series = %series,
            run_bucket,
            rows = rows.len(),
            path = %path.display(),
            "wrote partition"
        );
        Ok(rows.len())
    }
}
