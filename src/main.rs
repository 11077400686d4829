use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use log::{error, info, warn};

use sesame::configuration::config::Config;
use sesame::history::archiver::retention_cutoff;
use sesame::storage::{DatabaseStore, Store};
use sesame::web_interface::WebServer;

#[derive(Parser)]
#[command(name = "sesame")]
#[command(version = "0.1.0")]
#[command(about = "Logistics accreditation service for venue zone access")]
struct Args {
    config_file: String,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
███████╗███████╗███████╗ █████╗ ███╗   ███╗███████╗
██╔════╝██╔════╝██╔════╝██╔══██╗████╗ ████║██╔════╝
███████╗█████╗  ███████╗███████║██╔████╔██║█████╗
╚════██║██╔══╝  ╚════██║██╔══██║██║╚██╔╝██║██╔══╝
███████║███████╗███████║██║  ██║██║ ╚═╝ ██║███████╗
╚══════╝╚══════╝╚══════╝╚═╝  ╚═╝╚═╝     ╚═╝╚══════╝
====================================================
   Logistics accreditation service v0.1.0
====================================================
"
    );

    info!("Importing configuration");

    let args = Args::parse();

    if args.config_file.is_empty() {
        error!("No configuration file found");
        std::process::exit(1);
    }

    let config = match Config::from_file(Path::new(args.config_file.as_str())) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration from file: {:?}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration imported successfully");

    let store = match DatabaseStore::open_file(&config.database_path).await {
        Ok(store) => Arc::new(store) as Arc<dyn Store>,
        Err(e) => {
            error!("Unable to open database: {:?}, exiting...", e);
            std::process::exit(1);
        }
    };

    // Background archival: move history rows past the retention window
    // into the archive table, in batches, forever.
    let archive_store = store.clone();
    let retention_months = config.retention_months;
    let batch_size = config.archive_batch_size;
    let interval_secs = config.archive_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            let cutoff = retention_cutoff(Utc::now(), retention_months);
            match archive_store.archive_history(cutoff, batch_size).await {
                Ok(report) if report.archived > 0 => {
                    info!(
                        "history archival: {} rows in {} batches",
                        report.archived, report.batches
                    );
                }
                Ok(_) => {}
                Err(e) => warn!("history archival failed: {}", e),
            }
        }
    });

    let addr: SocketAddr = match format!("{}:{}", config.bind_address, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address: {:?}, exiting...", e);
            std::process::exit(1);
        }
    };

    let server = WebServer::new(store, config.changes_limit);
    if let Err(e) = server.start(addr).await {
        error!("Error occured in the web server: {:?}, exiting...", e);
        std::process::exit(1);
    }
}
