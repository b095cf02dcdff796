pub(crate) mod executor;
pub(crate) mod format;
pub(crate) mod preprocess;
pub(crate) mod scope;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::RestoreConfig;
use crate::errors::RestoreError;
use format::BackupFormat;
use scope::ScopeResolution;

/// Public entry point for one scoped restore. Detects the backup format
/// and dispatches to the matching path.
pub async fn run_restore_flow(config: &RestoreConfig) -> Result<()> {
    let backup_path = Path::new(&config.backup_file_path);
    if !backup_path.exists() {
        return Err(RestoreError::Input(format!(
            "Backup file not found: {}",
            backup_path.display()
        ))
        .into());
    }

    match format::detect_backup_format(backup_path)? {
        BackupFormat::Custom => {
            println!("📦 Detected custom-format archive; delegating to pg_restore.");
            executor::restore_custom_format(config)
        }
        BackupFormat::PlainSql => {
            println!("📜 Detected plain-text SQL dump; preprocessing before replay.");
            restore_plain_sql(config, backup_path).await
        }
    }
}

/// Plain-text path: resolve the writable table scope, rewrite the dump
/// into a scoped temporary script, replay it with psql. The temp script
/// is removed when it goes out of scope, on success and failure alike.
async fn restore_plain_sql(config: &RestoreConfig, backup_path: &Path) -> Result<()> {
    let resolution = scope::resolve_table_scope(config)
        .await
        .context("Failed to resolve table scope for plain-text restore")?;
    if let ScopeResolution::Degraded { reason, .. } = &resolution {
        println!(
            "⚠️ Auth scope resolution degraded to the {} fallback: {}",
            scope::AUTH_FALLBACK_TABLE,
            reason
        );
    }

    let script = preprocess::preprocess_backup(backup_path, resolution.scope())?;
    executor::run_sql_script(config, script.path())
}
