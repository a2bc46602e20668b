use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provenance of one chunk. Carries the chunk text so search hits are
/// self-contained for prompt building.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: u32,
    pub chunk_id: String,
    pub text: String,
}

impl ChunkMetadata {
    pub fn new(source: &str, page: u32, ordinal: usize, text: String) -> Self {
        Self {
            source: source.to_string(),
            page,
            chunk_id: make_chunk_id(source, page, ordinal),
            text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

pub fn make_chunk_id(source: &str, page: u32, ordinal: usize) -> String {
    format!("{source}-p{page}-c{ordinal}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub metadata: ChunkMetadata,
    /// Squared euclidean distance to the query vector.
    pub distance: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSummary {
    pub chunk_count: usize,
    pub dimensions: usize,
    pub model_id: String,
    pub generation: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AnswerMode {
    #[default]
    Doctor,
    Patient,
}

impl AnswerMode {
    /// Lenient parse used at the HTTP boundary: anything that is not
    /// "patient" answers in doctor mode. Case and surrounding whitespace are
    /// ignored, so "patient" also selects patient mode, not only "Patient".
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }
}

impl FromStr for AnswerMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "doctor" => Ok(Self::Doctor),
            "patient" => Ok(Self::Patient),
            other => Err(format!("unknown answer mode: {other}")),
        }
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Doctor => f.write_str("Doctor"),
            Self::Patient => f.write_str("Patient"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedAnswer {
    pub answer: String,
    pub sources: String,
}
