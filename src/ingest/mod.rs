//! Ingestion pipeline: one fax file in, at most one delivery attempt out.
//!
//! For each offered path the [`Ingestor`] runs
//! admission → parse → build → deliver → record → optional delete, to
//! completion, before looking at the next path. Only attempts that got as
//! far as delivery are written to the State Store; parse and build failures
//! leave no trace so the file stays eligible.

pub mod filename;
pub mod walker;

pub use filename::{FaxIdentity, FilenameParser};
pub use walker::{discover_existing, has_supported_extension};

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, watch};

use crate::delivery::{Deliver, DeliveryOutcome};
use crate::state::{FileIdentity, ProcessingStatus, StateStore};
use crate::vcon::RecordBuilder;

/// Pipeline switches taken from configuration
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Remove the source file after a successful delivery
    pub delete_after_send: bool,
    /// Routing hints forwarded with every delivery
    pub ingress_lists: Vec<String>,
}

/// Terminal state of one offered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Already delivered in an earlier attempt; nothing done
    AlreadyHandled,
    /// Filename did not match the pattern; nothing recorded
    Unparseable,
    /// File could not be read or is not a supported image; nothing recorded
    BuildFailed(String),
    Delivered { record_id: String },
    DeliveryFailed { record_id: String, detail: String },
}

/// Per-outcome counters for a batch or a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub offered: usize,
    pub already_handled: usize,
    pub unparseable: usize,
    pub build_failed: usize,
    pub delivered: usize,
    pub delivery_failed: usize,
}

impl IngestSummary {
    pub fn count(&mut self, outcome: &FileOutcome) {
        self.offered += 1;
        match outcome {
            FileOutcome::AlreadyHandled => self.already_handled += 1,
            FileOutcome::Unparseable => self.unparseable += 1,
            FileOutcome::BuildFailed(_) => self.build_failed += 1,
            FileOutcome::Delivered { .. } => self.delivered += 1,
            FileOutcome::DeliveryFailed { .. } => self.delivery_failed += 1,
        }
    }

    fn log(&self, label: &str) {
        log::info!(
            "{}: offered={}, delivered={}, delivery_failed={}, already_handled={}, unparseable={}, build_failed={}",
            label,
            self.offered,
            self.delivered,
            self.delivery_failed,
            self.already_handled,
            self.unparseable,
            self.build_failed
        );
    }
}

/// Single-writer orchestrator over the State Store
pub struct Ingestor<'a> {
    parser: FilenameParser,
    builder: RecordBuilder,
    delivery: Box<dyn Deliver>,
    state: &'a mut StateStore,
    options: IngestOptions,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        parser: FilenameParser,
        builder: RecordBuilder,
        delivery: Box<dyn Deliver>,
        state: &'a mut StateStore,
        options: IngestOptions,
    ) -> Self {
        Self {
            parser,
            builder,
            delivery,
            state,
            options,
        }
    }

    pub fn state(&self) -> &StateStore {
        self.state
    }

    /// Run one file through the pipeline. Never fails: every error ends in a
    /// logged [`FileOutcome`].
    pub async fn process_file(&mut self, path: &Path) -> FileOutcome {
        let identity = match FileIdentity::resolve(path) {
            Ok(id) => id,
            Err(e) => {
                log::error!("Cannot resolve identity of {}: {}", path.display(), e);
                return FileOutcome::BuildFailed(e.to_string());
            }
        };

        if self.state.is_processed(&identity) {
            log::debug!("Skipping already processed file: {}", identity);
            return FileOutcome::AlreadyHandled;
        }

        let parsed = match self.parser.parse(path) {
            Some(p) => p,
            None => {
                log::warn!("Could not parse filename, skipping: {}", identity);
                return FileOutcome::Unparseable;
            }
        };

        let vcon = match self.builder.build(path, &parsed) {
            Ok(v) => v,
            Err(e) => {
                log::error!("Failed to build vCon from {} (stage: build): {}", identity, e);
                return FileOutcome::BuildFailed(e.to_string());
            }
        };
        let record_id = vcon.uuid.to_string();

        let outcome = self
            .delivery
            .deliver(&vcon, &self.options.ingress_lists)
            .await;

        match outcome {
            DeliveryOutcome::Delivered(ack) => {
                self.persist(&identity, ProcessingStatus::Success, &record_id, None);
                log::info!(
                    "Delivered {} as vCon {} (status: {}, remote id: {})",
                    identity,
                    record_id,
                    ack.status,
                    ack.correlation_id.as_deref().unwrap_or("-")
                );

                if self.options.delete_after_send {
                    match std::fs::remove_file(path) {
                        Ok(()) => log::info!("Deleted file after successful post: {}", identity),
                        Err(e) => log::warn!("Failed to delete file {}: {}", identity, e),
                    }
                }

                FileOutcome::Delivered { record_id }
            }
            failed => {
                let detail = failed
                    .failure_detail()
                    .unwrap_or_else(|| "delivery failed".to_string());
                self.persist(
                    &identity,
                    ProcessingStatus::Failed,
                    &record_id,
                    Some(detail.clone()),
                );
                log::error!(
                    "Failed to post vCon {} for {} (stage: deliver): {}",
                    record_id,
                    identity,
                    detail
                );
                FileOutcome::DeliveryFailed { record_id, detail }
            }
        }
    }

    fn persist(
        &mut self,
        identity: &FileIdentity,
        status: ProcessingStatus,
        record_id: &str,
        detail: Option<String>,
    ) {
        if let Err(e) = self.state.record(identity, status, record_id, detail) {
            log::error!(
                "Could not persist {} outcome for {} (stage: record): {}",
                status,
                identity,
                e
            );
        }
    }

    /// Startup reconciliation over files already in the directory.
    ///
    /// Stops admitting new files once `shutdown` turns true.
    pub async fn process_existing(
        &mut self,
        paths: Vec<PathBuf>,
        shutdown: &watch::Receiver<bool>,
    ) -> IngestSummary {
        log::info!("Processing {} existing files...", paths.len());
        let mut summary = IngestSummary::default();

        for path in paths {
            if *shutdown.borrow() {
                log::info!("Shutdown requested, leaving remaining existing files for next start");
                break;
            }
            let outcome = self.process_file(&path).await;
            summary.count(&outcome);
        }

        summary.log("Finished processing existing files");
        summary
    }

    /// Drain the arrival queue until it closes or `shutdown` turns true (or
    /// its sender goes away). A file already being processed always finishes.
    pub async fn run(
        &mut self,
        mut rx: mpsc::Receiver<PathBuf>,
        mut shutdown: watch::Receiver<bool>,
    ) -> IngestSummary {
        let mut summary = IngestSummary::default();

        loop {
            let path = tokio::select! {
                biased;
                _ = shutdown.wait_for(|stop| *stop) => {
                    log::info!("Shutdown requested, no longer admitting files");
                    break;
                }
                next = rx.recv() => match next {
                    Some(p) => p,
                    None => {
                        log::info!("Watch source closed");
                        break;
                    }
                },
            };

            let outcome = self.process_file(&path).await;
            summary.count(&outcome);
        }

        summary.log("Ingest loop stopped");
        summary
    }
}
