//! Watcher thread: notify + debounce, push settled arrivals onto the ingest queue.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc::Sender;

use crate::error::{FaxError, Result};
use crate::ingest::walker::has_supported_extension;

/// How an event affects the pending set
enum Arrival {
    /// A file appeared (created or moved in)
    New,
    /// Content of a file changed; only refreshes files already pending
    Write,
    Ignore,
}

fn classify(kind: &EventKind) -> Arrival {
    match kind {
        EventKind::Create(_) => Arrival::New,
        EventKind::Modify(ModifyKind::Name(
            RenameMode::To | RenameMode::Both | RenameMode::Any,
        )) => Arrival::New,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => Arrival::Write,
        _ => Arrival::Ignore,
    }
}

/// Watch `root` (non-recursively) and send each newly arrived image file over
/// `tx` once it has been quiet for `settle`.
///
/// `ready` receives the result of starting the watcher before the loop begins.
/// Returns when `tx`'s receiver is dropped or the notify channel disconnects.
pub fn run_watcher_thread(
    root: &Path,
    formats: &[String],
    settle: Duration,
    tx: Sender<PathBuf>,
    ready: mpsc::Sender<Result<()>>,
) -> Result<()> {
    let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();

    let started = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = event_tx.send(res);
    })
    .and_then(|mut watcher| {
        watcher.watch(root, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    })
    .map_err(|e| FaxError::Watch(format!("cannot watch {}: {}", root.display(), e)));

    // Keep the watcher alive for the rest of the loop
    let _watcher = match started {
        Ok(w) => {
            let _ = ready.send(Ok(()));
            w
        }
        Err(e) => {
            let message = e.to_string();
            let _ = ready.send(Err(e));
            return Err(FaxError::Watch(message));
        }
    };

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        match event_rx.recv_timeout(settle) {
            Ok(Ok(event)) => {
                let now = Instant::now();
                match classify(&event.kind) {
                    Arrival::New => {
                        // A rename reports [from, to]; the destination is last
                        let paths: Vec<PathBuf> = match event.kind {
                            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                                event.paths.last().cloned().into_iter().collect()
                            }
                            _ => event.paths,
                        };
                        for p in paths {
                            pending.insert(p, now);
                        }
                    }
                    Arrival::Write => {
                        for p in event.paths {
                            if let Some(seen) = pending.get_mut(&p) {
                                *seen = now;
                            }
                        }
                    }
                    Arrival::Ignore => {}
                }
            }
            Ok(Err(e)) => log::warn!("watch error on {}: {}", root.display(), e),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if tx.is_closed() {
                    return Ok(());
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let now = Instant::now();
        let ready_paths: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, t)| now.duration_since(**t) >= settle)
            .map(|(p, _)| p.clone())
            .collect();

        for p in ready_paths {
            pending.remove(&p);
            if !p.is_file() || !has_supported_extension(&p, formats) {
                continue;
            }
            log::info!("New image file detected: {}", p.display());
            if tx.blocking_send(p).is_err() {
                return Ok(());
            }
        }
    }
    Ok(())
}
