//! Brute-force cosine index over the chunks of a single document.
//!
//! Scores are cosine similarity in `[-1, 1]`; a zero-norm vector on either side scores `0`.
//! The same scoring is used for every index built or loaded by this module, so scores are
//! comparable across a save/load round trip.
//!
//! The persisted artifact is one JSON file carrying a format marker and version, the
//! embedder id and dimensionality, document metadata, and every chunk with its vector.
//! Vectors are stored as base64 of their little-endian `f32` bytes so they reload bit-exact.

use crate::error::EngineError;
use crate::models::{Chunk, DocumentFingerprint, RetrievalResult, ScoredChunk};
use crate::traits::VectorSearch;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

pub const INDEX_FORMAT: &str = "docqa-flat-index";
pub const INDEX_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub document: DocumentFingerprint,
    pub embedder_id: String,
    pub dimensions: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
    norm: f32,
}

impl IndexEntry {
    fn new(chunk: Chunk, vector: Vec<f32>) -> Self {
        let norm = l2_norm(&vector);
        Self {
            chunk,
            vector,
            norm,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    metadata: IndexMetadata,
    entries: Vec<IndexEntry>,
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    format: String,
    version: u32,
    dimensions: usize,
    embedder_id: String,
    document: DocumentFingerprint,
    entries: Vec<PersistedEntry>,
}

#[derive(Serialize, Deserialize)]
struct PersistedEntry {
    chunk: Chunk,
    vector: String,
}

impl FlatIndex {
    pub fn build(
        metadata: IndexMetadata,
        chunks: Vec<Chunk>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, EngineError> {
        if metadata.dimensions == 0 {
            return Err(EngineError::InvalidParameter(
                "index dimensions must be greater than zero".to_string(),
            ));
        }

        if chunks.len() != embeddings.len() {
            return Err(EngineError::InvalidParameter(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| {
                if vector.len() != metadata.dimensions {
                    return Err(EngineError::DimensionMismatch {
                        expected: metadata.dimensions,
                        actual: vector.len(),
                    });
                }
                Ok(IndexEntry::new(chunk, vector))
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        Ok(Self { metadata, entries })
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    pub fn document(&self) -> &DocumentFingerprint {
        &self.metadata.document
    }

    pub fn embedder_id(&self) -> &str {
        &self.metadata.embedder_id
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|entry| &entry.chunk)
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.entries.iter().map(|entry| entry.vector.as_slice())
    }

    /// Writes to a sibling temp file and renames it over `path`, so readers of `path`
    /// only ever see a complete artifact.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let persisted = PersistedIndex {
            format: INDEX_FORMAT.to_string(),
            version: INDEX_VERSION,
            dimensions: self.metadata.dimensions,
            embedder_id: self.metadata.embedder_id.clone(),
            document: self.metadata.document.clone(),
            entries: self
                .entries
                .iter()
                .map(|entry| PersistedEntry {
                    chunk: entry.chunk.clone(),
                    vector: encode_vector(&entry.vector),
                })
                .collect(),
        };
        let bytes = serde_json::to_vec(&persisted)?;

        let parent = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let temp_path = temp_sibling(parent, path);
        let written = (|| {
            let mut file = File::create(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, path)
        })();

        if let Err(error) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(EngineError::Io(error));
        }

        debug!(path = %path.display(), entries = self.entries.len(), "index artifact written");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let bytes = fs::read(path).map_err(|error| {
            EngineError::IndexUnavailable(format!("cannot read {}: {error}", path.display()))
        })?;

        let persisted: PersistedIndex = serde_json::from_slice(&bytes).map_err(|error| {
            EngineError::IndexUnavailable(format!("corrupt index {}: {error}", path.display()))
        })?;

        if persisted.format != INDEX_FORMAT || persisted.version != INDEX_VERSION {
            return Err(EngineError::IndexUnavailable(format!(
                "unsupported index format {} v{} in {}",
                persisted.format,
                persisted.version,
                path.display()
            )));
        }

        let metadata = IndexMetadata {
            document: persisted.document,
            embedder_id: persisted.embedder_id,
            dimensions: persisted.dimensions,
        };

        let mut chunks = Vec::with_capacity(persisted.entries.len());
        let mut vectors = Vec::with_capacity(persisted.entries.len());
        for entry in persisted.entries {
            vectors.push(decode_vector(&entry.vector).ok_or_else(|| {
                EngineError::IndexUnavailable(format!(
                    "corrupt vector for chunk {} in {}",
                    entry.chunk.index,
                    path.display()
                ))
            })?);
            chunks.push(entry.chunk);
        }

        Self::build(metadata, chunks, vectors).map_err(|error| {
            EngineError::IndexUnavailable(format!("invalid index {}: {error}", path.display()))
        })
    }
}

impl VectorSearch for FlatIndex {
    fn dimensions(&self) -> usize {
        self.metadata.dimensions
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search_where(
        &self,
        query_vector: &[f32],
        k: usize,
        keep: &dyn Fn(&Chunk) -> bool,
    ) -> Result<RetrievalResult, EngineError> {
        if k == 0 {
            return Err(EngineError::InvalidParameter(
                "k must be greater than zero".to_string(),
            ));
        }
        if query_vector.len() != self.metadata.dimensions {
            return Err(EngineError::DimensionMismatch {
                expected: self.metadata.dimensions,
                actual: query_vector.len(),
            });
        }

        let query_norm = l2_norm(query_vector);
        let mut hits: Vec<ScoredChunk> = self
            .entries
            .iter()
            .filter(|entry| keep(&entry.chunk))
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine(query_vector, query_norm, &entry.vector, entry.norm),
            })
            .collect();

        hits.sort_by(|left, right| {
            right
                .score
                .total_cmp(&left.score)
                .then_with(|| left.chunk.index.cmp(&right.chunk.index))
        });
        hits.truncate(k);

        Ok(RetrievalResult { hits })
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, stored: &[f32], stored_norm: f32) -> f32 {
    if query_norm == 0.0 || stored_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(stored).map(|(a, b)| a * b).sum();
    dot / (query_norm * stored_norm)
}

fn encode_vector(vector: &[f32]) -> String {
    let bytes: Vec<u8> = vector.iter().flat_map(|value| value.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

fn decode_vector(encoded: &str) -> Option<Vec<f32>> {
    let bytes = STANDARD.decode(encoded).ok()?;
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|raw| f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
            .collect(),
    )
}

fn temp_sibling(parent: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    parent.join(format!(".{name}.{}.tmp", Uuid::new_v4()))
}
