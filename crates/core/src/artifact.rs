//! On-disk index artifact.
//!
//! An index directory holds `manifest.json` and one `vectors-<generation>.f32`
//! file. The manifest names the vectors file it belongs to and records its
//! checksum, so a reader can never pair metadata with vectors from another
//! build. Writing the manifest (temp file + rename) is the commit point:
//! until it lands, readers keep seeing the previous generation. The vectors
//! file of the generation just replaced is kept until the next build, so a
//! reader holding the old manifest can still open it.

use crate::index::FlatL2Index;
use crate::models::ChunkMetadata;
use crate::IndexError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const FORMAT_VERSION: u32 = 1;
const VECTORS_PREFIX: &str = "vectors-";
const VECTORS_SUFFIX: &str = ".f32";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub generation: String,
    pub model_id: String,
    pub dimensions: usize,
    pub count: usize,
    pub vectors_file: String,
    pub vectors_sha256: String,
    pub built_at: DateTime<Utc>,
    /// Positionally aligned with the rows of the vectors file.
    pub entries: Vec<ChunkMetadata>,
}

/// A fully validated artifact held in memory.
#[derive(Debug, Clone)]
pub struct IndexArtifact {
    pub manifest: IndexManifest,
    pub index: FlatL2Index,
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

pub fn artifact_exists(dir: &Path) -> bool {
    manifest_path(dir).is_file()
}

fn encode_vectors(vectors: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vectors.len() * 4);
    for value in vectors {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_vectors(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect()
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    if let Some(parent) = path.parent() {
        sync_dir(parent);
    }
    Ok(())
}

/// Flushes the directory entry so a committed rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(error) = File::open(dir).and_then(|handle| handle.sync_all()) {
        tracing::warn!(dir = %dir.display(), %error, "could not sync index directory");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

/// Writes a new generation and commits it. On error the previously committed
/// artifact, if any, is still the one readers load.
pub fn write_artifact(
    dir: &Path,
    model_id: &str,
    index: &FlatL2Index,
    entries: Vec<ChunkMetadata>,
) -> Result<IndexManifest, IndexError> {
    if entries.len() != index.len() {
        return Err(IndexError::MisalignedArtifact(format!(
            "{} metadata entries for {} vectors",
            entries.len(),
            index.len()
        )));
    }

    fs::create_dir_all(dir)?;
    let previous = read_manifest(dir).ok().map(|manifest| manifest.vectors_file);
    let generation = Uuid::new_v4().to_string();
    let vectors_file = format!("{VECTORS_PREFIX}{generation}{VECTORS_SUFFIX}");
    let bytes = encode_vectors(index.as_flat());

    write_atomically(&dir.join(&vectors_file), &bytes)?;

    let manifest = IndexManifest {
        format_version: FORMAT_VERSION,
        generation,
        model_id: model_id.to_string(),
        dimensions: index.dimensions(),
        count: index.len(),
        vectors_file,
        vectors_sha256: sha256_hex(&bytes),
        built_at: Utc::now(),
        entries,
    };
    write_atomically(&manifest_path(dir), &serde_json::to_vec(&manifest)?)?;
    tracing::info!(
        dir = %dir.display(),
        generation = %manifest.generation,
        count = manifest.count,
        "index artifact committed"
    );

    let mut keep = vec![manifest.vectors_file.as_str()];
    keep.extend(previous.as_deref());
    remove_stale_generations(dir, &keep);
    Ok(manifest)
}

fn remove_stale_generations(dir: &Path, keep: &[&str]) {
    let Ok(listing) = fs::read_dir(dir) else {
        return;
    };

    for entry in listing.filter_map(|item| item.ok()) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !keep.contains(&name) && name.starts_with(VECTORS_PREFIX) && name.ends_with(VECTORS_SUFFIX) {
            if let Err(error) = fs::remove_file(entry.path()) {
                tracing::warn!(file = name, %error, "could not remove superseded vectors file");
            }
        }
    }
}

pub fn read_manifest(dir: &Path) -> Result<IndexManifest, IndexError> {
    let path = manifest_path(dir);
    if !path.is_file() {
        return Err(IndexError::IndexNotFound(dir.display().to_string()));
    }

    let raw = fs::read(&path)
        .map_err(|error| IndexError::IndexLoad(format!("{}: {error}", path.display())))?;
    let manifest: IndexManifest = serde_json::from_slice(&raw)
        .map_err(|error| IndexError::IndexLoad(format!("{}: {error}", path.display())))?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(IndexError::IndexLoad(format!(
            "unsupported artifact format version {}",
            manifest.format_version
        )));
    }
    Ok(manifest)
}

/// Loads and validates the committed artifact.
pub fn read_artifact(dir: &Path) -> Result<IndexArtifact, IndexError> {
    let manifest = read_manifest(dir)?;

    if manifest.entries.len() != manifest.count {
        return Err(IndexError::MisalignedArtifact(format!(
            "manifest lists {} entries but declares {}",
            manifest.entries.len(),
            manifest.count
        )));
    }

    let vectors_path = dir.join(&manifest.vectors_file);
    let bytes = fs::read(&vectors_path)
        .map_err(|error| IndexError::IndexLoad(format!("{}: {error}", vectors_path.display())))?;

    let expected_len = manifest.count * manifest.dimensions * 4;
    if bytes.len() != expected_len {
        return Err(IndexError::MisalignedArtifact(format!(
            "vectors file has {} bytes, expected {expected_len}",
            bytes.len()
        )));
    }
    if sha256_hex(&bytes) != manifest.vectors_sha256 {
        return Err(IndexError::IndexLoad(format!(
            "checksum mismatch for {}",
            vectors_path.display()
        )));
    }

    let index = FlatL2Index::from_flat(manifest.dimensions, decode_vectors(&bytes))?;
    Ok(IndexArtifact { manifest, index })
}
