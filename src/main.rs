use anyhow::Result;
use faxvcon::delivery::ConserverClient;
use faxvcon::ingest::{discover_existing, FilenameParser, IngestOptions, Ingestor};
use faxvcon::{Config, RecordBuilder, StateStore, WatchSource};
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", &config.adapter.log_level),
    )
    .init();

    log::info!("Starting faxvcon v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Watch directory: {}", config.watch_directory().display());
    log::info!("State file: {}", config.state_file().display());
    log::info!("Conserver URL: {}", config.conserver.url);
    if !config.conserver.ingress_lists.is_empty() {
        log::info!("Ingress lists: {}", config.conserver.ingress_lists.join(", "));
    }

    let parser = FilenameParser::new(&config.filename.pattern)?;
    let delivery = ConserverClient::from_config(&config)?;
    let formats = config.filename.supported_formats.clone();

    // Watch before enumerating so nothing arriving in between is missed
    let (tx, rx) = mpsc::channel(config.adapter.queue_capacity);
    let source = WatchSource::spawn(
        config.watch_directory(),
        formats.clone(),
        config.poll_interval(),
        tx,
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut state = StateStore::open(config.state_file());
    log::info!("Loaded {} processing records", state.len());

    let mut ingestor = Ingestor::new(
        parser,
        RecordBuilder::new(),
        Box::new(delivery),
        &mut state,
        IngestOptions {
            delete_after_send: config.adapter.delete_after_send,
            ingress_lists: config.conserver.ingress_lists.clone(),
        },
    );

    if config.adapter.process_existing {
        match discover_existing(source.root(), &formats) {
            Ok(paths) => {
                ingestor.process_existing(paths, &shutdown_rx).await;
            }
            Err(e) => log::error!("Failed to enumerate existing files: {}", e),
        }
    }

    log::info!("Fax adapter running (Ctrl+C to stop)");
    ingestor.run(rx, shutdown_rx).await;

    // The queue receiver is gone now, so the watcher thread winds down
    tokio::task::spawn_blocking(move || source.join()).await?;
    log::info!("Fax adapter stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Received SIGINT, shutting down");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => log::info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => log::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Received Ctrl+C, shutting down");
}
