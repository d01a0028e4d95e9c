//! JSONL snapshots of the record store, one [`VectorRecord`] per line.
//!
//! Only records are written. Clustered indexes are derived state and are
//! rebuilt after a load.

use simstore_core::{SimstoreError, SimstoreResult, VectorRecord};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Write `records` to `path`, replacing it atomically.
///
/// Data goes to a sibling temp file first and is renamed over `path` once
/// fully flushed, so readers never see a half-written snapshot.
pub async fn write_snapshot(path: &Path, records: &[VectorRecord]) -> SimstoreResult<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            SimstoreError::Snapshot(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }

    let mut data = String::new();
    for record in records {
        data.push_str(&serde_json::to_string(record)?);
        data.push('\n');
    }

    let tmp = temp_path(path);
    let mut file = tokio::fs::File::create(&tmp).await.map_err(|e| {
        SimstoreError::Snapshot(format!("Failed to create {}: {}", tmp.display(), e))
    })?;
    file.write_all(data.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        SimstoreError::Snapshot(format!("Failed to move snapshot into place: {}", e))
    })?;
    Ok(records.len())
}

/// Read every record from `path`. Blank lines are skipped; a malformed line
/// fails the whole read with its line number.
pub async fn read_snapshot(path: &Path) -> SimstoreResult<Vec<VectorRecord>> {
    let data = tokio::fs::read_to_string(path).await.map_err(|e| {
        SimstoreError::Snapshot(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let mut records = Vec::new();
    for (lineno, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: VectorRecord = serde_json::from_str(line).map_err(|e| {
            SimstoreError::Snapshot(format!("Invalid record on line {}: {}", lineno + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "snapshot".into());
    name.push(".tmp");
    path.with_file_name(name)
}
