//! Bundle - the set of documents read from disk
//!
//! A source path is either a single JSON file or a directory of them.
//! Each file holds one of:
//! ```text
//! { "type": "bundle", "objects": [ {...}, {...} ] }   bundle envelope
//! [ {...}, {...} ]                                     bare array
//! { "type": "indicator", ... }                         single document
//! ```
//! Documents keep file order; directories are read in file-name order.

use super::document::Document;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// A readable source of documents
#[derive(Debug)]
pub struct Bundle {
    /// File or directory the documents are read from
    pub path: PathBuf,
}

impl Bundle {
    /// Open a bundle at the given path
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Files this bundle reads, in order
    pub fn files(&self) -> Vec<PathBuf> {
        if self.path.is_file() {
            return vec![self.path.clone()];
        }

        WalkDir::new(&self.path)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
            .collect()
    }

    /// Read every document in the bundle
    pub async fn read(&self) -> Result<Vec<Document>> {
        if !self.path.exists() {
            return Err(Error::FileReadError {
                path: self.path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
            });
        }

        let mut documents = Vec::new();
        for file in self.files() {
            let mut docs = read_file(&file).await?;
            tracing::debug!(file = %file.display(), count = docs.len(), "read bundle file");
            documents.append(&mut docs);
        }
        Ok(documents)
    }
}

/// Read the documents held by one JSON file
pub async fn read_file(path: &Path) -> Result<Vec<Document>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| Error::FileReadError {
            path: path.to_path_buf(),
            source,
        })?;
    parse(&content).map_err(|e| match e {
        Error::JsonParseError { message } => Error::JsonParseError {
            message: format!("{}: {}", path.display(), message),
        },
        other => other,
    })
}

/// Parse bundle text into documents
pub fn parse(content: &str) -> Result<Vec<Document>> {
    let json: serde_json::Value = serde_json::from_str(content)?;

    let items = match json {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("objects") {
            Some(serde_json::Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::JsonParseError {
                    message: format!("'objects' must be an array, found {}", json_kind(&other)),
                })
            }
            None => vec![serde_json::Value::Object(map)],
        },
        other => {
            return Err(Error::JsonParseError {
                message: format!("expected an object or array, found {}", json_kind(&other)),
            })
        }
    };

    let mut documents = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match Document::from_json(item) {
            Some(doc) => documents.push(doc),
            None => tracing::warn!(index, "skipping bundle entry that is not an object"),
        }
    }
    Ok(documents)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_envelope() {
        let docs = parse(
            r#"{"type":"bundle","id":"bundle--1","objects":[
                {"type":"identity","id":"identity--1"},
                {"type":"indicator","id":"indicator--1"}]}"#,
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].id(), Some("indicator--1"));
    }

    #[test]
    fn test_parse_array_and_single() {
        assert_eq!(parse(r#"[{"type":"a"},{"type":"b"},3]"#).unwrap().len(), 2);

        let single = parse(r#"{"type":"person","id":"p1"}"#).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].type_name(), Some("person"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("not json"), Err(Error::JsonParseError { .. })));
        assert!(matches!(parse("42"), Err(Error::JsonParseError { .. })));
        assert!(matches!(
            parse(r#"{"objects": "nope"}"#),
            Err(Error::JsonParseError { .. })
        ));
    }

    #[tokio::test]
    async fn test_read_directory_in_name_order() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.json"), r#"[{"type":"x","id":"second"}]"#).unwrap();
        std::fs::write(tmp.path().join("a.json"), r#"{"type":"x","id":"first"}"#).unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let docs = Bundle::open(tmp.path()).read().await.unwrap();
        let ids: Vec<_> = docs.iter().filter_map(|d| d.id()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_read_missing_path() {
        let tmp = TempDir::new().unwrap();
        let result = Bundle::open(tmp.path().join("missing.json")).read().await;
        assert!(matches!(result, Err(Error::FileReadError { .. })));
    }
}
