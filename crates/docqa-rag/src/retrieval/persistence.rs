//! On-disk layout of the index directory
//!
//! `vectors.bin` holds the slot table and raw vectors (bincode), and
//! `metadata.json` holds the document registry and chunk records. Both
//! carry the same revision counter. Every write goes through a temp file in
//! the same directory followed by fsync, rename and a directory fsync.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ChunkMetadata, DocumentInfo};

pub const INDEX_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";
pub const FORMAT_VERSION: u32 = 1;

/// Contents of `vectors.bin`
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexFile<'a> {
    pub version: u32,
    pub dimension: usize,
    pub revision: u64,
    pub slots: Cow<'a, [Option<Uuid>]>,
    pub vectors: Cow<'a, [f32]>,
}

/// Contents of `metadata.json`
#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataFile<'a> {
    pub version: u32,
    pub dimension: usize,
    pub revision: u64,
    pub documents: Vec<Cow<'a, DocumentInfo>>,
    pub chunks: Vec<Cow<'a, ChunkMetadata>>,
}

fn check_version(name: &str, version: u32) -> Result<()> {
    if version > FORMAT_VERSION {
        return Err(Error::persistence(format!(
            "{} has format version {}, this build reads up to {}",
            name, version, FORMAT_VERSION
        )));
    }
    Ok(())
}

/// Read bytes, treating a missing file as absent
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::persistence(format!("read {}: {}", path.display(), e))),
    }
}

pub fn read_index(dir: &Path) -> Result<Option<IndexFile<'static>>> {
    let Some(bytes) = read_optional(&dir.join(INDEX_FILE))? else {
        return Ok(None);
    };

    let (file, _): (IndexFile<'static>, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
            .map_err(|e| Error::persistence(format!("decode {}: {}", INDEX_FILE, e)))?;
    check_version(INDEX_FILE, file.version)?;
    Ok(Some(file))
}

pub fn read_metadata(dir: &Path) -> Result<Option<MetadataFile<'static>>> {
    let Some(bytes) = read_optional(&dir.join(METADATA_FILE))? else {
        return Ok(None);
    };

    let file: MetadataFile<'static> = serde_json::from_slice(&bytes)
        .map_err(|e| Error::persistence(format!("decode {}: {}", METADATA_FILE, e)))?;
    check_version(METADATA_FILE, file.version)?;
    Ok(Some(file))
}

pub fn write_index(dir: &Path, file: &IndexFile<'_>) -> Result<()> {
    let bytes = bincode::serde::encode_to_vec(file, bincode::config::standard())
        .map_err(|e| Error::persistence(format!("encode {}: {}", INDEX_FILE, e)))?;
    write_atomic(dir, INDEX_FILE, &bytes)
}

pub fn write_metadata(dir: &Path, file: &MetadataFile<'_>) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(file)?;
    write_atomic(dir, METADATA_FILE, &bytes)
}

/// Replace `dir/name` with `bytes` atomically.
///
/// The temp file is deleted on drop if anything before the rename fails.
pub fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let failed = |e: std::io::Error| Error::persistence(format!("write {}: {}", name, e));

    let mut tmp = NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(bytes).map_err(failed)?;
    tmp.as_file().sync_all().map_err(failed)?;
    tmp.persist(dir.join(name)).map_err(|e| failed(e.error))?;
    sync_dir(dir).map_err(failed)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_files_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_index(dir.path()).unwrap().is_none());
        assert!(read_metadata(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_index_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let slots = [Some(id), None];
        let vectors = [1.0, 2.0, 3.0, 4.0];

        write_index(
            dir.path(),
            &IndexFile {
                version: FORMAT_VERSION,
                dimension: 2,
                revision: 7,
                slots: Cow::Borrowed(&slots),
                vectors: Cow::Borrowed(&vectors),
            },
        )
        .unwrap();

        let read = read_index(dir.path()).unwrap().unwrap();
        assert_eq!(read.revision, 7);
        assert_eq!(&*read.slots, &slots[..]);
        assert_eq!(&*read.vectors, &vectors[..]);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = MetadataFile {
            version: FORMAT_VERSION + 1,
            dimension: 2,
            revision: 1,
            documents: Vec::new(),
            chunks: Vec::new(),
        };
        write_metadata(dir.path(), &file).unwrap();

        assert!(matches!(read_metadata(dir.path()), Err(Error::Persistence(_))));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        write_atomic(dir.path(), "a.json", b"one").unwrap();
        write_atomic(dir.path(), "a.json", b"two").unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("a.json")]);
        assert_eq!(std::fs::read(dir.path().join("a.json")).unwrap(), b"two");
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        assert!(matches!(
            write_atomic(&gone, "a.json", b"x"),
            Err(Error::Persistence(_))
        ));
    }
}
