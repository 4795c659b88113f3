//! Whole-document JSON persistence for vector indexes

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::Result;

/// On-disk layout: a flat mapping from identifier to vector.
pub type VectorDocument = BTreeMap<String, Vec<f32>>;

/// Load an index document. A missing file is an empty index.
pub fn load_document(path: &Path) -> Result<VectorDocument> {
    if !path.exists() {
        return Ok(VectorDocument::new());
    }

    let file = fs::File::open(path)?;
    let document = serde_json::from_reader(BufReader::new(file))?;
    Ok(document)
}

/// Write the whole document, replacing the previous file atomically.
pub fn write_document(path: &Path, document: &VectorDocument) -> Result<()> {
    write_json_atomic(path, document)
}

/// Serialize `value` to `path` through a sibling temp file and a rename.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    {
        let file = fs::File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let doc = load_document(&dir.path().join("absent.json")).unwrap();
        assert!(doc.is_empty());
    }

    #[test]
    fn write_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("entity_vdb.json");

        let mut doc = VectorDocument::new();
        doc.insert("a".into(), vec![1.0, 0.5]);
        write_document(&path, &doc).unwrap();

        let loaded = load_document(&path).unwrap();
        assert_eq!(loaded.get("a"), Some(&vec![1.0, 0.5]));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupted_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(load_document(&path).is_err());
    }
}
