//! File artifacts exchanged with the workflow engine: the work-unit chunks
//! emitted by the partitioner, the uid lists consumed by each recompute
//! invocation, and the failed-uid log.

use fs2::FileExt;
use serde::Deserialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const UIDS_CHUNKS_FILE: &str = "uids_chunks";
pub const UIDS_CHUNKS_COUNT_FILE: &str = "uids_chunks_count";
pub const FAILED_UIDS_FILE: &str = "failed_uids";

const S3_SCHEME: &str = "s3://";
const FILE_SCHEME: &str = "file://";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed uid list: {0}")]
    MalformedUidList(String),
    #[error("unsupported artifact location {0}: only local paths are supported")]
    UnsupportedScheme(String),
}

impl ArtifactError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnitPaths {
    pub chunks_path: PathBuf,
    pub count_path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UidListDocument {
    Flat(Vec<String>),
    Nested(Vec<Vec<String>>),
}

pub fn is_s3_path(path: &str) -> bool {
    path.starts_with(S3_SCHEME)
}

/// Resolves an artifact location to a local path. `file://` prefixes are
/// stripped; object-storage locations are rejected.
pub fn local_path(location: &str) -> Result<PathBuf, ArtifactError> {
    if is_s3_path(location) {
        return Err(ArtifactError::UnsupportedScheme(location.to_string()));
    }
    let trimmed = location.strip_prefix(FILE_SCHEME).unwrap_or(location);
    Ok(PathBuf::from(trimmed))
}

pub fn file_exists(path: &Path) -> bool {
    path.is_file()
}

pub fn directory_exists(path: &Path) -> bool {
    path.is_dir()
}

/// Creates `dir` (and parents) when missing. Returns whether it was created.
pub fn ensure_directory(dir: &Path) -> Result<bool, ArtifactError> {
    if directory_exists(dir) {
        return Ok(false);
    }
    fs::create_dir_all(dir).map_err(|err| ArtifactError::io(dir, err))?;
    Ok(true)
}

/// Parses a uid list document. A list of lists is flattened one level, in
/// order.
pub fn parse_uid_list(content: &str) -> Result<Vec<String>, ArtifactError> {
    let value: Value = serde_json::from_str(content)?;
    let document = UidListDocument::deserialize(value).map_err(|_| {
        ArtifactError::MalformedUidList(
            "expected an array of uids or an array of uid arrays".to_string(),
        )
    })?;

    Ok(match document {
        UidListDocument::Flat(uids) => uids,
        UidListDocument::Nested(chunks) => chunks.into_iter().flatten().collect(),
    })
}

pub fn read_uid_list(location: &str) -> Result<Vec<String>, ArtifactError> {
    let path = local_path(location)?;
    let content = fs::read_to_string(&path).map_err(|err| ArtifactError::io(&path, err))?;
    parse_uid_list(&content)
}

/// Writes the chunk array and its count into `dir`, replacing earlier runs.
pub fn write_work_units(
    dir: &Path,
    chunks: &[Vec<String>],
) -> Result<WorkUnitPaths, ArtifactError> {
    ensure_directory(dir)?;

    let chunks_path = dir.join(UIDS_CHUNKS_FILE);
    let chunks_json = serde_json::to_string(chunks)?;
    fs::write(&chunks_path, chunks_json).map_err(|err| ArtifactError::io(&chunks_path, err))?;

    let count_path = dir.join(UIDS_CHUNKS_COUNT_FILE);
    fs::write(&count_path, chunks.len().to_string())
        .map_err(|err| ArtifactError::io(&count_path, err))?;

    Ok(WorkUnitPaths {
        chunks_path,
        count_path,
    })
}

/// Appends one JSON array line to the failed-uid log in `dir`. The write
/// holds an exclusive lock so concurrent invocations never interleave.
pub fn append_failed_uids(dir: &Path, uids: &[String]) -> Result<PathBuf, ArtifactError> {
    ensure_directory(dir)?;

    let path = dir.join(FAILED_UIDS_FILE);
    let mut line = serde_json::to_string(uids)?;
    line.push('\n');

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|err| ArtifactError::io(&path, err))?;
    file.lock_exclusive()
        .map_err(|err| ArtifactError::io(&path, err))?;
    // The lock is released when `file` is dropped.
    file.write_all(line.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|err| ArtifactError::io(&path, err))?;

    Ok(path)
}
