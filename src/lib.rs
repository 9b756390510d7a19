// Closure Tracker - Core Library
// Exposes all modules for use in the CLI and tests

pub mod classifier;     // Lexical status rules
pub mod config;
pub mod deduplication;  // Duplicate items / duplicate events
pub mod entities;       // Location records + name directory
pub mod error;
pub mod normalize;
pub mod ordering;       // Total order over feed items
pub mod parser;         // Saved feed files → raw items
pub mod pipeline;
pub mod reconciliation; // Provisional → canonical identities
pub mod report;
pub mod resolver;
pub mod store;
pub mod temporal;       // Closure periods

// Re-export commonly used types
pub use classifier::{ClassificationResult, ClassificationRule, StatusClassifier};
pub use config::Config;
pub use deduplication::{dedup_items, item_fingerprint, DuplicatePolicy};
pub use entities::{
    DirectoryEntry, EntityKey, EntityRecord, NameDirectory, Status, StatusEvent,
};
pub use error::ItemError;
pub use normalize::{normalize_text, slugify};
pub use ordering::OrderingStrategy;
pub use parser::{
    detect_format, get_parser, read_feed_file, FeedFormat, FeedParser, PreparedItem, RawItem,
};
pub use pipeline::{FeedProcessor, RunReport};
pub use reconciliation::{ReconciliationEngine, ReconciliationOutcome};
pub use report::{annotate, render_text, write_periods_csv, EntityView, PeriodView};
pub use resolver::{Candidate, EntityResolver};
pub use store::{EntityMap, HistoryStore};
pub use temporal::{reconstruct_periods, ClosurePeriod, ClosureStats, PeriodEnd};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
