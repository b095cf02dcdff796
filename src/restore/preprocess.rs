// restoretool/src/restore/preprocess.rs
//! Single-purpose transform of a plain-text SQL dump into a scoped,
//! replay-safe script.
//!
//! The output keeps only the data-carrying statements the resolved scope
//! allows (`COPY ... FROM stdin` blocks and `pg_catalog.setval` calls),
//! drops everything else, and injects one `TRUNCATE ... CASCADE` per kept
//! table. All truncations are emitted together, before the first COPY:
//! truncating at each COPY site can cascade backward through a foreign key
//! and wipe rows a previous block already loaded.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::errors::RestoreError;
use crate::restore::scope::ScopeMode;
use crate::utils::names::{copy_target_table, is_guard_metacommand, setval_sequence_target};

/// Upper bound for a single dump line. COPY payload rows can be very large
/// (bytea columns, JSON blobs) but are still line-delimited; this caps the
/// buffer per line, not the file size.
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Disables user triggers and FK enforcement for the duration of the load.
const SCRIPT_HEADER: &str = "SET session_replication_role = replica;\n";
const SCRIPT_FOOTER: &str = "SET session_replication_role = DEFAULT;\n";

/// Transforms the dump at `input_path` into a temporary script filtered to
/// `scope`. The returned temp file is deleted when dropped, on every path.
pub fn preprocess_backup(input_path: &Path, scope: &ScopeMode) -> Result<NamedTempFile> {
    let kept_tables = collect_kept_copy_targets(input_path, scope)?;

    let mut output = tempfile::Builder::new()
        .prefix("restoretool-")
        .suffix(".sql")
        .tempfile()
        .context("Failed to create temporary file for preprocessed script")?;

    write_transformed_script(input_path, scope, &kept_tables, output.as_file_mut())
        .with_context(|| {
            format!(
                "Failed to preprocess backup file: {}",
                input_path.display()
            )
        })?;
    Ok(output)
}

/// First pass: the deduplicated COPY targets that pass the scope policy,
/// in order of first appearance. COPY block state is tracked so payload
/// rows that happen to start with `COPY ` are never misread as statements.
fn collect_kept_copy_targets(input_path: &Path, scope: &ScopeMode) -> Result<Vec<String>> {
    let file = File::open(input_path)
        .with_context(|| format!("Failed to open backup file: {}", input_path.display()))?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();

    let mut in_copy_block = false;
    let mut kept = Vec::new();
    let mut seen = BTreeSet::new();

    while read_line_capped(&mut reader, &mut line)? {
        if in_copy_block {
            if is_copy_terminator(&line) {
                in_copy_block = false;
            }
            continue;
        }
        let text = String::from_utf8_lossy(&line);
        if let Some(table) = copy_target_table(&text) {
            if scope.allows_copy_target(&table) && seen.insert(table.clone()) {
                kept.push(table);
            }
            in_copy_block = true;
        }
    }
    Ok(kept)
}

/// Second pass: header, all truncations, then the filtered statement
/// stream, then the footer. Kept payload rows are copied byte-for-byte.
fn write_transformed_script(
    input_path: &Path,
    scope: &ScopeMode,
    kept_tables: &[String],
    output: &mut File,
) -> Result<()> {
    let file = File::open(input_path)
        .with_context(|| format!("Failed to open backup file: {}", input_path.display()))?;
    let mut reader = BufReader::new(file);
    let mut writer = BufWriter::new(output);
    let mut line = Vec::new();

    writer.write_all(SCRIPT_HEADER.as_bytes())?;
    for table in kept_tables {
        writeln!(writer, "TRUNCATE TABLE {} CASCADE;", table)?;
    }

    let mut in_copy_block = false;
    let mut keeping_block = false;

    while read_line_capped(&mut reader, &mut line)? {
        let text = String::from_utf8_lossy(&line);

        // Dump-tool guard metacommands would block every later statement
        // when replayed through psql; they go unconditionally.
        if is_guard_metacommand(&text) {
            continue;
        }

        if in_copy_block {
            if keeping_block {
                writer.write_all(&line)?;
            }
            if is_copy_terminator(&line) {
                in_copy_block = false;
                keeping_block = false;
            }
            continue;
        }

        if let Some(table) = copy_target_table(&text) {
            in_copy_block = true;
            keeping_block = scope.allows_copy_target(&table);
            if keeping_block {
                writer.write_all(&line)?;
            }
            continue;
        }

        if let Some(sequence) = setval_sequence_target(&text) {
            if scope.allows_setval_target(&sequence) {
                writer.write_all(&line)?;
            }
            continue;
        }

        // Everything else is DDL, comments, grants, ownership changes or
        // other noise the target role must not replay.
    }

    writer.write_all(SCRIPT_FOOTER.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Reads one line (including its newline) into `buf`, erroring out instead
/// of growing past `MAX_LINE_BYTES`. Returns false at end of input.
fn read_line_capped<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool> {
    buf.clear();
    let n = reader
        .by_ref()
        .take(MAX_LINE_BYTES as u64 + 1)
        .read_until(b'\n', buf)?;
    if n == 0 {
        return Ok(false);
    }
    if buf.len() > MAX_LINE_BYTES {
        return Err(RestoreError::Preprocess(format!(
            "input line exceeds the {} byte limit",
            MAX_LINE_BYTES
        ))
        .into());
    }
    Ok(true)
}

/// End-of-COPY sentinel: a line that is exactly `\.`. Escaped
/// backslash-dot sequences inside payload data are not special-cased;
/// that ambiguity is inherited from the dump format itself.
fn is_copy_terminator(line: &[u8]) -> bool {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end] == b"\\."
}
