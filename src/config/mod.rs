//! Configuration management

pub mod settings;

pub use settings::{
    CollectorSettings, KrakenSourceSettings, ReportSettings, Settings, SinkSettings,
    SourceSettings, StoreSettings, WritePolicy, YahooSourceSettings,
};
