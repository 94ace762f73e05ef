use super::*;
use crate::index::ChunkRecord;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

fn record(chunk_id: u64, document_id: &str) -> ChunkRecord {
    ChunkRecord {
        chunk_id,
        text: format!("text of chunk {chunk_id}"),
        document_id: document_id.to_string(),
        ingested_at: DateTime::<Utc>::default(),
    }
}

fn snapshot(rows: &[([f32; 2], &str)]) -> IndexSnapshot {
    let vectors: Vec<f32> = rows.iter().flat_map(|(v, _)| *v).collect();
    let metadata = rows
        .iter()
        .enumerate()
        .map(|(i, (_, doc))| record(i as u64, doc))
        .collect();
    let index = FlatIndex::from_vectors(2, vectors.clone()).expect("rows are well formed");
    IndexSnapshot::from_parts(index, metadata, vectors).expect("parts are aligned")
}

fn store_in(temp_dir: &TempDir) -> RecordStore {
    RecordStore::new(temp_dir.path().join("index"), 2).expect("dimension is valid")
}

#[test]
fn zero_dimension_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    assert!(matches!(
        RecordStore::new(temp_dir.path(), 0),
        Err(DocsError::Config(_))
    ));
}

#[test]
fn load_without_artifacts_is_empty() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);

    assert!(!store.exists());
    let loaded = store.load().expect("missing store loads as empty");
    assert!(loaded.is_empty());
    assert_eq!(loaded.dimension(), 2);

    fs::create_dir_all(store.dir()).expect("Failed to create dir");
    assert!(store.load().expect("empty dir loads").is_empty());
}

#[test]
fn save_then_load_preserves_every_artifact() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    let original = snapshot(&[([1.0, 0.0], "a.pdf"), ([0.6, 0.8], "b.pdf")]);

    store.save(&original).expect("save succeeds");
    assert!(store.exists());
    assert!(store.dir().join(INDEX_FILE).is_file());
    assert!(store.dir().join(EMBEDDINGS_FILE).is_file());
    assert!(store.dir().join(METADATA_FILE).is_file());

    let loaded = store.load().expect("load succeeds");
    assert_eq!(loaded, original);
}

#[test]
fn empty_snapshot_round_trips() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);

    store
        .save(&IndexSnapshot::empty(2))
        .expect("saving an empty index succeeds");
    let loaded = store.load().expect("load succeeds");
    assert!(loaded.is_empty());
    assert!(loaded.index().is_empty());
}

#[test]
fn save_leaves_no_staging_or_backup_behind() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);

    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf")]))
        .expect("first save succeeds");
    store
        .save(&snapshot(&[([0.0, 1.0], "b.pdf")]))
        .expect("second save succeeds");

    assert!(!store.staging_dir().exists());
    assert!(!store.backup_dir().exists());
    let loaded = store.load().expect("load succeeds");
    assert_eq!(loaded.metadata()[0].document_id, "b.pdf");
}

#[test]
fn metadata_is_one_json_object_per_line() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf"), ([0.0, 1.0], "a.pdf")]))
        .expect("save succeeds");

    let raw = fs::read_to_string(store.dir().join(METADATA_FILE)).expect("metadata is readable");
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 2);
    let value: serde_json::Value = serde_json::from_str(lines[1]).expect("line is JSON");
    assert_eq!(value["chunk_id"], 1);
    assert_eq!(value["document_id"], "a.pdf");
}

#[test]
fn save_rejects_snapshot_of_other_dimension() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    let result = store.save(&IndexSnapshot::empty(3));
    assert!(matches!(
        result,
        Err(DocsError::DimensionMismatch {
            expected: 2,
            found: 3
        })
    ));
}

#[test]
fn load_rejects_persisted_dimension_mismatch() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf")]))
        .expect("save succeeds");

    let wider = RecordStore::new(store.dir(), 4).expect("dimension is valid");
    assert!(matches!(
        wider.load(),
        Err(DocsError::DimensionMismatch {
            expected: 4,
            found: 2
        })
    ));
}

#[test]
fn missing_index_file_is_corruption() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf")]))
        .expect("save succeeds");

    fs::remove_file(store.dir().join(INDEX_FILE)).expect("Failed to remove index");
    assert!(matches!(store.load(), Err(DocsError::StorageCorruption(_))));
}

#[test]
fn missing_companion_file_is_corruption() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf")]))
        .expect("save succeeds");

    fs::remove_file(store.dir().join(METADATA_FILE)).expect("Failed to remove metadata");
    assert!(matches!(store.load(), Err(DocsError::StorageCorruption(_))));
}

#[test]
fn count_mismatch_is_corruption() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf"), ([0.0, 1.0], "b.pdf")]))
        .expect("save succeeds");

    let path = store.dir().join(METADATA_FILE);
    let raw = fs::read_to_string(&path).expect("metadata is readable");
    let first_line = raw.lines().next().expect("metadata has lines");
    fs::write(&path, format!("{first_line}\n")).expect("Failed to truncate metadata");

    assert!(matches!(store.load(), Err(DocsError::StorageCorruption(_))));
}

#[test]
fn unparsable_metadata_is_corruption() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf")]))
        .expect("save succeeds");

    fs::write(store.dir().join(METADATA_FILE), "{not json\n").expect("Failed to write");
    assert!(matches!(store.load(), Err(DocsError::StorageCorruption(_))));
}

#[test]
fn truncated_tensor_file_is_corruption() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf")]))
        .expect("save succeeds");

    fs::write(store.dir().join(EMBEDDINGS_FILE), b"garbage").expect("Failed to write");
    assert!(matches!(store.load(), Err(DocsError::StorageCorruption(_))));
}

#[test]
fn interrupted_swap_falls_back_to_backup() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    let saved = snapshot(&[([1.0, 0.0], "a.pdf")]);
    store.save(&saved).expect("save succeeds");

    // Live moved aside, staging never renamed into place
    fs::rename(store.dir(), store.backup_dir()).expect("Failed to move live dir");
    fs::create_dir_all(store.staging_dir()).expect("Failed to create staging");
    fs::write(store.staging_dir().join(INDEX_FILE), b"partial").expect("Failed to write");

    assert!(store.exists());
    assert_eq!(store.load().expect("backup is readable"), saved);

    let next = snapshot(&[([1.0, 0.0], "a.pdf"), ([0.0, 1.0], "b.pdf")]);
    store.save(&next).expect("save recovers and succeeds");
    assert!(!store.staging_dir().exists());
    assert!(!store.backup_dir().exists());
    assert_eq!(store.load().expect("load succeeds"), next);
}

#[test]
fn vanished_directory_marks_the_read_for_retry() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = store_in(&temp_dir);
    store
        .save(&snapshot(&[([1.0, 0.0], "a.pdf")]))
        .expect("save succeeds");

    let loaded = store.load();
    assert!(!moved_during_read(store.dir(), &loaded));

    let gone = temp_dir.path().join("renamed-away");
    assert!(moved_during_read(&gone, &Ok(IndexSnapshot::empty(2))));

    let not_found = Err(DocsError::Io(std::io::Error::from(ErrorKind::NotFound)));
    assert!(moved_during_read(store.dir(), &not_found));

    let corrupt = Err(DocsError::StorageCorruption("bad".to_string()));
    assert!(!moved_during_read(store.dir(), &corrupt));
}
