use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("input path is not a directory: {0}")]
    InvalidInputPath(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("refusing to build an index from zero chunks")]
    EmptyInput,

    #[error("no index artifact at {0}; build it first")]
    IndexNotFound(String),

    #[error("failed to load index artifact: {0}")]
    IndexLoad(String),

    #[error("index artifact is misaligned: {0}")]
    MisalignedArtifact(String),

    #[error("index was built with {built_with} but the active embedder is {active}")]
    ModelMismatch { built_with: String, active: String },

    #[error("vectors must have at least one dimension")]
    ZeroDimensions,

    #[error("embedding dimension {actual} != {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("answer model credential is not configured")]
    MissingCredential,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("could not parse model response: {0}")]
    ResponseParse(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("retrieval task failed: {0}")]
    Blocking(String),
}
