//! Storage module for deduplicated, crash-safe record persistence.
//!
//! Provides:
//! - `RecordStore`: dedup keys, per-source quotas and run totals
//! - Background batched writer for CSV and JSONL output
//! - History loading from earlier runs
//! - CSV schema drift detection with legacy backups

pub mod history;
pub mod schema;
pub mod sink;
pub mod store;
pub mod writer;

pub use history::HistoryCounts;
pub use schema::{DataKind, StoreLayout};
pub use sink::{CommentBuffer, CommentSink, MediaSink};
pub use store::{RecordStore, StoreLimits, StoreTotals};
pub use writer::{BackgroundWriter, SinkWriter, WritePayload};
