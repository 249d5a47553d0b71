//! Watch Source: live arrivals of fax images in the watched directory.
//!
//! A dedicated thread runs the notify watcher, debounces events until a file
//! has stopped changing, and pushes absolute paths into a bounded queue that
//! the ingest loop drains one file at a time.

mod watcher;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::Sender;

use crate::error::{FaxError, Result};

/// Handle to the running watcher thread
pub struct WatchSource {
    root: PathBuf,
    handle: JoinHandle<()>,
}

impl WatchSource {
    /// Start watching `root`. Returns once the OS watch is established, or
    /// with the error that prevented it.
    pub fn spawn(
        root: &Path,
        formats: Vec<String>,
        settle: Duration,
        tx: Sender<PathBuf>,
    ) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            FaxError::Watch(format!("cannot resolve watch directory {}: {}", root.display(), e))
        })?;
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_root = root.clone();
        let handle = std::thread::Builder::new()
            .name("faxvcon-watch".to_string())
            .spawn(move || {
                if let Err(e) =
                    watcher::run_watcher_thread(&thread_root, &formats, settle, tx, ready_tx)
                {
                    log::error!("watcher thread error: {}", e);
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                log::info!("Started monitoring directory: {}", root.display());
                Ok(Self { root, handle })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(FaxError::Watch("watcher thread exited during startup".to_string())),
        }
    }

    /// Canonical path being watched
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Wait for the thread to finish. It exits shortly after the queue
    /// receiver is dropped.
    pub fn join(self) {
        if self.handle.join().is_err() {
            log::error!("watcher thread panicked");
        }
        log::info!("Stopped monitoring directory: {}", self.root.display());
    }
}
