// restoretool/src/restore/executor.rs
//! External tool invocation for the two restore paths.
//!
//! Custom archives go through pg_restore, preprocessed plain-text scripts
//! through psql. The password travels only via PGPASSWORD in the child
//! environment; it never appears on a command line or in output.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

use crate::config::RestoreConfig;
use crate::errors::RestoreError;
use crate::utils::{find_pg_restore_executable, find_psql_executable, TargetConnection};

/// Restores a custom-format archive with pg_restore.
///
/// pg_restore returns a non-zero status even for fully successful runs
/// (benign "already exists" notices), so failure is reported only when the
/// exit status is non-zero AND stderr carries output.
pub fn restore_custom_format(config: &RestoreConfig) -> Result<()> {
    let pg_restore_path = find_pg_restore_executable()?;
    let conn = TargetConnection::parse(&config.target_db_url)?;

    let mut cmd = Command::new(pg_restore_path);
    if config.clean_first {
        cmd.arg("--clean").arg("--if-exists");
    }
    if config.no_owner {
        cmd.arg("--no-owner");
    }
    if config.single_transaction {
        cmd.arg("--single-transaction");
    }
    if config.parallel_jobs > 1 {
        cmd.arg("-j").arg(config.parallel_jobs.to_string());
    }
    cmd.arg("-h").arg(&conn.host);
    cmd.arg("-p").arg(conn.port.to_string());
    if !conn.user.is_empty() {
        cmd.arg("-U").arg(&conn.user);
    }
    cmd.arg("-d").arg(&conn.database);
    cmd.arg(&config.backup_file_path);
    if let Some(password) = &conn.password {
        cmd.env("PGPASSWORD", password);
    }

    println!(
        "Restoring custom-format archive {} into database '{}' with pg_restore...",
        config.backup_file_path, conn.database
    );
    let output = cmd.output().with_context(|| {
        format!(
            "Failed to execute pg_restore for backup file: {}",
            config.backup_file_path
        )
    })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() && !stderr.trim().is_empty() {
        return Err(RestoreError::Command {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: stderr.to_string(),
        }
        .into());
    }
    if !output.status.success() {
        println!(
            "⚠️ pg_restore exited with {} but reported nothing on stderr; treating as success.",
            output.status
        );
    }
    println!("✓ pg_restore finished for database '{}'.", conn.database);
    Ok(())
}

/// Replays a preprocessed script with psql under strict stop-on-error
/// semantics. Any non-zero exit is fatal and the tool's stderr is surfaced
/// verbatim; this path never tolerates partial failure.
pub fn run_sql_script(config: &RestoreConfig, script_path: &Path) -> Result<()> {
    let psql_path = find_psql_executable()?;
    let conn = TargetConnection::parse(&config.target_db_url)?;

    let mut cmd = Command::new(psql_path);
    cmd.arg("-X") // Do not read psqlrc
        .arg("-q") // Quiet mode
        .arg("-v")
        .arg("ON_ERROR_STOP=1") // Exit on first error
        .arg("-h")
        .arg(&conn.host)
        .arg("-p")
        .arg(conn.port.to_string())
        .arg("-d")
        .arg(&conn.database)
        .arg("-f")
        .arg(script_path);
    if !conn.user.is_empty() {
        cmd.arg("-U").arg(&conn.user);
    }
    if let Some(password) = &conn.password {
        cmd.env("PGPASSWORD", password);
    }

    println!(
        "Replaying preprocessed script into database '{}' with psql...",
        conn.database
    );
    let output = cmd.output().with_context(|| {
        format!(
            "Failed to execute psql for preprocessed script: {}",
            script_path.display()
        )
    })?;

    if !output.status.success() {
        return Err(RestoreError::Command {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
        .into());
    }
    println!("✓ psql finished replaying script into database '{}'.", conn.database);
    Ok(())
}
