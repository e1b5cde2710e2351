//! Source adapters
//!
//! Each adapter fetches raw incremental data for one grid cell given a
//! watermark, coerces the payload to `RawBar`s, and nothing more. Retries,
//! if any, are an adapter-internal concern; the collector only sees a fetch
//! succeed or fail.

pub mod kraken;
pub mod mock;
pub mod router;
mod traits;
pub mod yahoo;

pub use crate::schema::FetchBatch;
pub use kraken::KrakenAdapter;
pub use mock::MockAdapter;
pub use router::SourceRouter;
pub use traits::{SourceAdapter, SourceError, SourceResult};
pub use yahoo::YahooAdapter;
