pub mod artifact;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod index;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod store;
pub mod traits;

pub use artifact::{read_artifact, write_artifact, IndexArtifact, IndexManifest};
pub use chunking::{chunk_spans, chunk_text, ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use config::{EmbeddingBackend, GeminiConfig, GenerationSettings};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, HttpEmbedderConfig, LocalModelSpec,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_FASTEMBED_MODEL,
};
#[cfg(feature = "semantic-search")]
pub use embeddings::FastEmbedder;
pub use error::{GenerationError, IndexError, IngestError, PipelineError};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use generator::{build_rag_prompt, format_sources, AnswerGenerator, RagPrompt};
pub use index::FlatL2Index;
pub use ingest::{
    chunks_for_pages, discover_pdf_files, extract_and_chunk, extract_and_chunk_with,
    ExtractionReport, SkippedPdf, SourceDocument,
};
pub use models::{AnswerMode, BuildSummary, Chunk, ChunkMetadata, GeneratedAnswer, ScoredChunk};
pub use pipeline::RagPipeline;
pub use providers::GeminiClient;
pub use store::{LoadedIndex, SharedEmbedder, VectorIndexStore, DEFAULT_TOP_K};
pub use traits::AnswerModel;
