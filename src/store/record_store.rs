//! In-memory record store backed by a JSONL file.
//!
//! Records keep their file order; a key index gives O(1) updates. Writes go to a
//! temporary sibling first and are renamed into place, so an interrupted write
//! never leaves a truncated store behind for the next run to resume from.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::Record;
use crate::error::{LinkerError, Result};

/// The full collection of records for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: Vec<Record>,
    index: HashMap<String, usize>,
}

impl RecordStore {
    /// Build a store from records, rejecting duplicate keys.
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if index.insert(record.key.clone(), pos).is_some() {
                return Err(LinkerError::Store(format!("duplicate record key: {}", record.key)));
            }
        }
        Ok(Self { records, index })
    }

    /// Load a store from a JSONL file. Blank lines are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line).map_err(|e| {
                LinkerError::Store(format!("{}:{}: {}", path.display(), lineno + 1, e))
            })?;
            records.push(record);
        }

        log::info!("Loaded {} records from {}", records.len(), path.display());
        Self::from_records(records)
    }

    /// Write the whole store to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let temp_path = temp_sibling(path);
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            for record in &self.records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        if let Err(e) = fs::rename(&temp_path, path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }

        log::info!("Wrote {} records to {}", self.records.len(), path.display());
        Ok(())
    }

    /// Attach an external identifier to the record with the given key.
    pub fn set_external_id(&mut self, key: &str, external_id: &str) -> Result<()> {
        let pos = *self
            .index
            .get(key)
            .ok_or_else(|| LinkerError::RecordNotFound(key.to_string()))?;
        self.records[pos].same_as = Some(external_id.to_string());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.index.get(key).map(|&pos| &self.records[pos])
    }

    /// Iterate records in store order
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records already carrying an external identifier
    pub fn enriched_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_enriched()).count()
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "store".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_records() -> Vec<Record> {
        vec![
            Record::new("vg:1", "Tetris").with_sales(30.26),
            Record::new("vg:2", "Doom")
                .with_platform("PC")
                .with_year(1993)
                .with_same_as("http://www.wikidata.org/entity/Q513867"),
            Record::new("vg:3", "Myst").with_year(1993),
        ]
    }

    #[test]
    fn test_from_records_rejects_duplicate_keys() {
        let records = vec![Record::new("vg:1", "A"), Record::new("vg:1", "B")];
        let err = RecordStore::from_records(records).unwrap_err();
        assert!(matches!(err, LinkerError::Store(_)));
        assert!(err.to_string().contains("vg:1"));
    }

    #[test]
    fn test_set_external_id() {
        let mut store = RecordStore::from_records(sample_records()).unwrap();
        assert_eq!(store.enriched_count(), 1);

        store.set_external_id("vg:3", "http://www.wikidata.org/entity/Q1060578").unwrap();

        assert!(store.get("vg:3").unwrap().is_enriched());
        assert_eq!(store.enriched_count(), 2);
    }

    #[test]
    fn test_set_external_id_unknown_key() {
        let mut store = RecordStore::from_records(sample_records()).unwrap();
        let err = store.set_external_id("vg:99", "x").unwrap_err();
        assert!(matches!(err, LinkerError::RecordNotFound(_)));
    }

    #[test]
    fn test_save_and_load_preserves_order_and_fields() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("games.jsonl");

        let mut records = sample_records();
        records[0]
            .extra
            .insert("genre".to_string(), serde_json::json!("Puzzle"));
        let store = RecordStore::from_records(records).unwrap();
        store.save(&path).unwrap();

        let loaded = RecordStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        let keys: Vec<&str> = loaded.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["vg:1", "vg:2", "vg:3"]);
        assert!(!temp.path().join("games.jsonl.tmp").exists());
    }

    #[test]
    fn test_save_overwrites_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("games.jsonl");
        fs::write(&path, "stale contents that are not json\n").unwrap();

        let store = RecordStore::from_records(sample_records()).unwrap();
        store.save(&path).unwrap();

        assert_eq!(RecordStore::load(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_load_skips_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("games.jsonl");
        fs::write(
            &path,
            "{\"key\":\"vg:1\",\"name\":\"Tetris\"}\n\n{\"key\":\"vg:2\",\"name\":\"Doom\"}\n",
        )
        .unwrap();

        let store = RecordStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_load_reports_bad_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("games.jsonl");
        fs::write(&path, "{\"key\":\"vg:1\",\"name\":\"Tetris\"}\n{broken\n").unwrap();

        let err = RecordStore::load(&path).unwrap_err();
        assert!(matches!(err, LinkerError::Store(_)));
        assert!(err.to_string().contains(":2:"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = RecordStore::load(&temp.path().join("missing.jsonl")).unwrap_err();
        assert!(matches!(err, LinkerError::Io(_)));
    }
}
