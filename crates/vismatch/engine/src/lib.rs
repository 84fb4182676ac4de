//! Match orchestration: zero-shot category prediction composed with
//! similarity ranking.
//!
//! The engine always predicts a category first and then ranks the catalog
//! filtered by that predicted label. There is no mode returning unfiltered
//! matches across categories.

use vismatch_core::{Embedding, EmbeddingProvider, MatchResult, Result};
use vismatch_classify::CategoryVocabulary;
use vismatch_corpus::CorpusStore;

/// Combined result of one match operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MatchResponse {
    pub predicted_category: String,
    pub matches: Vec<MatchResult>,
}

/// The externally consumed retrieval engine: corpus + vocabulary.
///
/// Built once at startup, read-only afterward; concurrent requests share it
/// without locking. The embedding provider is only used during construction
/// (to encode the category labels), never per request.
#[derive(Debug)]
pub struct MatchEngine {
    corpus: CorpusStore,
    vocabulary: CategoryVocabulary,
}

impl MatchEngine {
    /// Build an engine from a loaded corpus, encoding its category labels
    /// through `provider`.
    ///
    /// # Errors
    ///
    /// [`vismatch_core::Error::Config`] on an empty corpus, an empty
    /// vocabulary, or a corpus/vocabulary dimensionality mismatch. The
    /// service must not start serving when this fails.
    pub fn new(corpus: CorpusStore, provider: &dyn EmbeddingProvider) -> Result<Self> {
        let vocabulary = CategoryVocabulary::build(&corpus.categories(), corpus.dim(), provider)?;
        Ok(Self { corpus, vocabulary })
    }

    /// Predict the query's category, then rank catalog items of that
    /// category scoring at least `min_score`.
    ///
    /// Pure function of the corpus, vocabulary, and query: no side effects,
    /// no shared mutable state. The returned matches are sorted descending
    /// by score and every element carries the predicted category.
    ///
    /// # Errors
    ///
    /// [`vismatch_core::Error::DegenerateEmbedding`] on a zero-norm query;
    /// [`vismatch_core::Error::DimensionMismatch`] if the query does not
    /// match the corpus dimensionality. No partial result is ever returned.
    pub fn matches(&self, query: &Embedding, min_score: f32) -> Result<MatchResponse> {
        let predicted_category = self.vocabulary.predict(query)?.to_string();
        let matches =
            vismatch_rank::top_matches(&self.corpus, query, Some(&predicted_category), min_score)?;

        tracing::debug!(
            category = %predicted_category,
            matches = matches.len(),
            min_score,
            "ranked query"
        );

        Ok(MatchResponse {
            predicted_category,
            matches,
        })
    }

    #[must_use]
    pub fn corpus(&self) -> &CorpusStore {
        &self.corpus
    }

    #[must_use]
    pub fn vocabulary(&self) -> &CategoryVocabulary {
        &self.vocabulary
    }
}
