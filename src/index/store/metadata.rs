use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::index::ChunkRecord;
use crate::{DocsError, Result};

pub(super) fn write_metadata(path: &Path, records: &[ChunkRecord]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record).map_err(|e| {
            DocsError::Serialization(format!(
                "Failed to serialize chunk {}: {}",
                record.chunk_id, e
            ))
        })?;
        writer.write_all(b"\n")?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Read one record per line. Blank lines are ignored; anything else that
/// fails to parse is corruption.
pub(super) fn read_metadata(path: &Path) -> Result<Vec<ChunkRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            DocsError::StorageCorruption(format!(
                "{} line {}: {}",
                path.display(),
                line_number + 1,
                e
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}
