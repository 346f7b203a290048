use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use rights_ledger::db_connect::{self, DbSettings};
use rights_ledger::env_loader;
use rights_ledger::legacy_sync::sync_legacy;
use rights_ledger::pipeline::MigrationManager;
use rights_ledger::reports::{analyze_rights, export_refunded_rights};
use rights_ledger::roster::import_roster;
use rights_ledger::store::{PgStore, TableStore};

#[derive(Parser)]
#[command(name = "rights-ledger")]
#[command(about = "Legacy rights certificate migration and reporting")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge the rights workbooks, match against members, upload legacy records
    Migrate {
        /// Write to the database (default is a dry run)
        #[arg(long)]
        run: bool,
        #[arg(long, default_value = "data/권리증_최종정리_완전판(이름순).xlsx")]
        main_file: PathBuf,
        #[arg(long, default_value = "data/권리증현황(보관및호환용).xls")]
        raw_file: PathBuf,
    },
    /// Import the registered member roster and proxies
    ImportRoster {
        #[arg(long)]
        run: bool,
        #[arg(long, default_value = "data/current.xlsx")]
        file: PathBuf,
    },
    /// Export refunded rights holders to a workbook
    ExportRefunded {
        #[arg(long, default_value = "data/권리증보유_환불자명단.xlsx")]
        output: PathBuf,
    },
    /// Print rights distribution among refunded records
    Stats,
    /// Copy address and memo hints from linked legacy records onto members
    SyncLegacy {
        #[arg(long)]
        run: bool,
    },
}

async fn open_store() -> Result<PgStore> {
    let settings = DbSettings::from_env().context("Database configuration incomplete")?;
    let pool = db_connect::connect(&settings).await?;
    info!("Database connection pool established.");
    Ok(PgStore::new(pool))
}

fn mode_label(live: bool) -> &'static str {
    if live {
        "LIVE"
    } else {
        "DRY-RUN"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Migrate {
            run,
            main_file,
            raw_file,
        } => {
            println!("Legacy rights migration ({})", mode_label(run));
            let store = if run { Some(open_store().await?) } else { None };
            let manager = MigrationManager::new(store.as_ref().map(|s| s as &dyn TableStore));
            let report = manager.run(&main_file, &raw_file).await?;
            println!(
                "\nDone: {} records ({} primary rows, {} sheets merged, {} skipped)",
                report.records, report.primary_rows, report.sheets_merged, report.sheets_skipped
            );
            println!(
                "Matched {}, ambiguous {}, refunded {}; uploaded {}/{}",
                report.matches.matched,
                report.matches.ambiguous,
                report.matches.unmatched,
                report.upload.uploaded,
                report.upload.total
            );
            if !report.upload.failed_batches.is_empty() {
                println!("Failed batch offsets: {:?}", report.upload.failed_batches);
            }
        }
        Command::ImportRoster { run, file } => {
            println!("Roster import ({})", mode_label(run));
            let store = open_store().await?;
            let summary = import_roster(&store, &file, run).await?;
            println!(
                "\nProcessed {} members ({} updated, {} new, {} proxies, {} failed)",
                summary.processed,
                summary.updated,
                summary.inserted,
                summary.proxies_added,
                summary.failed
            );
        }
        Command::ExportRefunded { output } => {
            let store = open_store().await?;
            export_refunded_rights(&store, &output).await?;
        }
        Command::Stats => {
            let store = open_store().await?;
            analyze_rights(&store).await?;
        }
        Command::SyncLegacy { run } => {
            let store = open_store().await?;
            sync_legacy(&store, run).await?;
        }
    }
    Ok(())
}
