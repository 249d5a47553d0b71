pub mod config;
pub mod delivery;
pub mod error;
pub mod ingest;
pub mod state;
pub mod vcon;
pub mod watch;

pub use config::Config;
pub use delivery::{ConserverClient, Deliver, DeliveryOutcome};
pub use error::{FaxError, Result};
pub use ingest::{FileOutcome, IngestOptions, IngestSummary, Ingestor};
pub use state::{FileIdentity, ProcessingRecord, ProcessingStatus, StateStore};
pub use vcon::{RecordBuilder, Vcon};
pub use watch::WatchSource;
