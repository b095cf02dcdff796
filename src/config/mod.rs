// restoretool/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRestoreOptions {
    pub use_all_insertable_scope: Option<bool>,
    pub table_scope_override: Option<Vec<String>>,
    pub clean_first: Option<bool>,
    pub no_owner: Option<bool>,
    pub single_transaction: Option<bool>,
    pub parallel_jobs: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub target_database_url: Option<String>,
    pub backup_file_path: Option<String>,
    pub restore_options: Option<JsonRestoreOptions>,
}

/// One restore request: target connection, input file, scope mode and
/// restore behavior flags. Built once per invocation and immutable after.
#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub target_db_url: String,
    pub backup_file_path: String,
    pub use_all_insertable_scope: bool,
    pub table_scope_override: Option<Vec<String>>,
    pub clean_first: bool,
    pub no_owner: bool,
    pub single_transaction: bool,
    pub parallel_jobs: u32,
}

impl RestoreConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;
        load_restore_config_from_json(&raw_json_config)
    }
}

pub fn load_restore_config_from_json(raw_config: &RawJsonConfig) -> Result<RestoreConfig> {
    // The environment wins over config.json, so one config file can serve
    // several preview branches.
    let target_db_url = match env::var("TARGET_DATABASE_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => raw_config
            .target_database_url
            .as_ref()
            .filter(|url| !url.trim().is_empty())
            .context("target_database_url must be set in config.json (or via TARGET_DATABASE_URL)")?
            .clone(),
    };

    let backup_file_path = raw_config
        .backup_file_path
        .as_ref()
        .context("backup_file_path must be set in config.json for restore")?
        .clone();
    if backup_file_path.trim().is_empty() {
        anyhow::bail!("backup_file_path cannot be empty in config.json.");
    }

    let options = raw_config.restore_options.as_ref();

    let table_scope_override = match options.and_then(|o| o.table_scope_override.clone()) {
        Some(entries) => {
            let entries: Vec<String> = entries
                .into_iter()
                .filter(|e| !e.trim().is_empty())
                .collect();
            if entries.is_empty() {
                anyhow::bail!(
                    "table_scope_override was provided in config.json but contains no table names"
                );
            }
            Some(entries)
        }
        None => None,
    };

    let parallel_jobs = options.and_then(|o| o.parallel_jobs).unwrap_or(1);
    if parallel_jobs == 0 {
        anyhow::bail!("parallel_jobs must be at least 1 in config.json");
    }

    Ok(RestoreConfig {
        target_db_url,
        backup_file_path,
        use_all_insertable_scope: options
            .and_then(|o| o.use_all_insertable_scope)
            .unwrap_or(false),
        table_scope_override,
        clean_first: options.and_then(|o| o.clean_first).unwrap_or(false),
        no_owner: options.and_then(|o| o.no_owner).unwrap_or(true),
        single_transaction: options.and_then(|o| o.single_transaction).unwrap_or(false),
        parallel_jobs,
    })
}
