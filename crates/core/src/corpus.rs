use crate::error::BuildError;
use crate::models::Document;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Recursively finds contract files (`.txt` and `.md`) under `folder`,
/// sorted for reproducible ordering.
pub fn discover_contract_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_contract = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md"));

        if is_contract {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct CorpusReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Loads every contract file under `folder` into a [`Document`],
/// best-effort: unreadable files are reported as skipped rather than
/// failing the whole load. An empty folder is an error.
pub fn load_corpus(folder: &Path) -> Result<CorpusReport, BuildError> {
    let files = discover_contract_files(folder);

    if files.is_empty() {
        return Err(BuildError::InvalidArgument(format!(
            "no contract files found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_document(&path) {
            Ok(document) => documents.push(document),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped contract file");
                skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(CorpusReport {
        documents,
        skipped_files,
    })
}

fn load_document(path: &Path) -> Result<Document, BuildError> {
    let text = fs::read_to_string(path)?;
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            BuildError::InvalidArgument(format!("path missing filename: {}", path.display()))
        })?;

    let mut metadata = BTreeMap::new();
    metadata.insert("source".to_string(), path.to_string_lossy().to_string());

    Ok(Document {
        document_id: digest_text(&path.to_string_lossy()),
        title: title.to_string(),
        source_path: path.to_string_lossy().to_string(),
        checksum: digest_text(&text),
        text,
        metadata,
        loaded_at: Utc::now(),
    })
}
