// restoretool/src/restore/format.rs
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::RestoreError;

/// Magic marker at the start of a pg_dump custom-format archive.
const CUSTOM_FORMAT_MAGIC: &[u8] = b"PGDMP";

/// First bytes typical of a plain SQL dump (comment dash, `SET`/`SELECT`,
/// leading blank line or indentation).
const PLAIN_SQL_LEAD_BYTES: &[u8] = &[b'-', b'S', b'\n', b' '];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupFormat {
    /// pg_dump custom/binary archive, restored via pg_restore.
    Custom,
    /// Plain-text SQL script, preprocessed and replayed via psql.
    PlainSql,
}

/// Classifies a backup file by inspecting at most its first five bytes.
/// Unknown content defaults to `Custom`: pg_restore fails loudly on a
/// malformed file, which is safer than mis-processing it as SQL.
pub fn detect_backup_format(path: &Path) -> Result<BackupFormat> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open backup file for format detection: {}", path.display()))?;

    let mut magic = [0u8; 5];
    let mut read = 0;
    while read < magic.len() {
        let n = file
            .read(&mut magic[read..])
            .with_context(|| format!("Failed to read backup file header: {}", path.display()))?;
        if n == 0 {
            break;
        }
        read += n;
    }

    if read == 0 {
        return Err(RestoreError::Input(format!("Backup file is empty: {}", path.display())).into());
    }

    if &magic[..read] == CUSTOM_FORMAT_MAGIC {
        return Ok(BackupFormat::Custom);
    }
    if PLAIN_SQL_LEAD_BYTES.contains(&magic[0]) {
        return Ok(BackupFormat::PlainSql);
    }
    Ok(BackupFormat::Custom)
}
