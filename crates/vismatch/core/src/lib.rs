//! Core types and traits for vismatch.

/// Errors shared across the vismatch crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Startup-time configuration problem. The service must not begin
    /// serving requests when construction fails with this variant.
    #[error("configuration error: {0}")]
    Config(String),

    /// A query embedding with zero L2 norm. Client-input problem, not a
    /// corpus bug; surfaced to the caller as a rejected request.
    #[error("degenerate embedding: zero L2 norm")]
    DegenerateEmbedding,

    /// Embeddings of different dimensionality were compared.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The external encoder failed to produce an embedding.
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A fixed-length embedding vector for one image or one label.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    #[must_use]
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Dimensionality of the vector.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// L2 norm of the vector.
    #[must_use]
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Return a new unit-norm copy of this vector.
    ///
    /// Pure: the receiver is never mutated, so callers can safely reuse
    /// their original embedding after prediction and ranking. Idempotent
    /// within floating-point tolerance.
    ///
    /// # Errors
    ///
    /// [`Error::DegenerateEmbedding`] if the norm is zero.
    pub fn normalized(&self) -> Result<Self> {
        let norm = self.norm();
        if norm == 0.0 {
            return Err(Error::DegenerateEmbedding);
        }
        Ok(Self(self.0.iter().map(|x| x / norm).collect()))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Compute the dot product between two vectors.
///
/// For unit-norm inputs this is the cosine similarity, in [-1, 1].
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// One catalog image matched against a query, with its similarity score.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MatchResult {
    /// Display filename of the catalog image.
    pub image: String,
    /// Cosine similarity to the query.
    pub score: f32,
    /// Category label of the catalog item.
    pub category: String,
}

/// An external encoder turning images and label text into embeddings.
///
/// Implementations may be expensive (model inference) but must be
/// deterministic for a fixed input and model version. The engine never
/// retries or caches through this trait.
pub trait EmbeddingProvider: Send + Sync {
    /// Dimensionality of the embeddings this provider produces.
    fn dim(&self) -> usize;

    /// Encode raw image bytes into an embedding.
    fn encode_image(&self, bytes: &[u8]) -> Result<Embedding>;

    /// Encode category labels into embeddings, one per label, same order.
    fn encode_labels(&self, labels: &[String]) -> Result<Vec<Embedding>>;
}
