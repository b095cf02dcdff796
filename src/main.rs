//! Scoped Database Restore Tool
//!
//! Replays a logical PostgreSQL backup into a live, possibly
//! less-privileged target database (e.g. a preview branch), restricted to
//! the tables the connecting role may actually write to.

// restoretool/src/main.rs
mod config;
mod errors;
mod restore;
mod utils;

use anyhow::{Context, Result};
use config::RestoreConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    match run_app().await {
        Ok(_) => {
            println!("✅ Restore completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    // Config path may be given as the first argument; defaults to
    // config.json next to the executable / project root.
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 1 {
        PathBuf::from(args[1].trim())
    } else {
        PathBuf::from("config.json")
    };

    let restore_config = RestoreConfig::load_from_json(&config_path).with_context(|| {
        format!(
            "Failed to load restore configuration from {}",
            config_path.display()
        )
    })?;

    println!(
        "🔄 Starting scoped restore of {} into {}",
        restore_config.backup_file_path,
        utils::redact_url(&restore_config.target_db_url)
    );
    restore::run_restore_flow(&restore_config)
        .await
        .context("Restore process failed")?;
    Ok(())
}
