//! Inspect and edit the fax adapter's processing state.

use anyhow::Result;
use clap::{Parser, Subcommand};
use faxvcon::{Config, FileIdentity, ProcessingRecord, StateStore};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "faxvcon-state")]
#[command(about = "Inspect or edit the record of processed fax files")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List processing records
    List {
        /// Only show files whose last delivery attempt failed
        #[arg(long)]
        failed: bool,
    },
    /// Show the record for one file
    Show { path: PathBuf },
    /// Drop the record for one file so the adapter will process it again
    Forget { path: PathBuf },
}

fn print_record(identity: &FileIdentity, record: &ProcessingRecord) {
    println!(
        "{}  {:<7}  {}  {}",
        record.processed_at.to_rfc3339(),
        record.status,
        record.record_id,
        identity
    );
    if let Some(detail) = &record.detail {
        println!("    {}", detail);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = Config::load()?;
    let mut state = StateStore::open(config.state_file());

    match args.command {
        Command::List { failed } => {
            let records: Vec<_> = if failed {
                state.failed_records()
            } else {
                state.all_records().iter().collect()
            };
            for (identity, record) in &records {
                print_record(identity, record);
            }
            println!("\n{} of {} records", records.len(), state.len());
        }
        Command::Show { path } => {
            let identity = FileIdentity::resolve(&path)?;
            match state.get(&identity) {
                Some(record) => print_record(&identity, record),
                None => {
                    println!("No record for {}", identity);
                    std::process::exit(1);
                }
            }
        }
        Command::Forget { path } => {
            let identity = FileIdentity::resolve(&path)?;
            if state.forget(&identity)? {
                println!("Forgot {}; it will be processed again on next sight", identity);
            } else {
                println!("No record for {}", identity);
            }
        }
    }

    Ok(())
}
