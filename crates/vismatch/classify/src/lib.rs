//! Zero-shot category classification against a fixed label vocabulary.
//!
//! The vocabulary pairs each distinct catalog category with a text embedding
//! computed once at startup. Prediction is a stable argmax of dot products:
//! no threshold, no filtering, always exactly one label.

use vismatch_core::{dot, Embedding, EmbeddingProvider, Error, Result};

/// Fixed set of category labels with one normalized text embedding each.
///
/// Label order is first-occurrence order of the source labels and is stable
/// for the lifetime of the process; it is also the argmax tie-break order.
#[derive(Debug)]
pub struct CategoryVocabulary {
    labels: Vec<String>,
    embeddings: Vec<Embedding>,
    dim: usize,
}

impl CategoryVocabulary {
    /// Build the vocabulary by encoding `labels` through the provider.
    ///
    /// Each text embedding is L2-normalized exactly once, here.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if `labels` is empty, the provider returns the
    /// wrong number of embeddings, or any embedding's dimensionality
    /// differs from `expected_dim`.
    pub fn build(
        labels: &[String],
        expected_dim: usize,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        if labels.is_empty() {
            return Err(Error::Config("category vocabulary is empty".to_string()));
        }

        let encoded = provider.encode_labels(labels)?;
        if encoded.len() != labels.len() {
            return Err(Error::Config(format!(
                "encoder returned {} embeddings for {} labels",
                encoded.len(),
                labels.len()
            )));
        }

        let mut embeddings = Vec::with_capacity(encoded.len());
        for (label, embedding) in labels.iter().zip(encoded) {
            if embedding.dim() != expected_dim {
                return Err(Error::Config(format!(
                    "text embedding for {label:?} has dim {}, expected {expected_dim}",
                    embedding.dim()
                )));
            }
            let embedding = embedding
                .normalized()
                .map_err(|_| Error::Config(format!("text embedding for {label:?} has zero norm")))?;
            embeddings.push(embedding);
        }

        tracing::info!(labels = labels.len(), dim = expected_dim, "built category vocabulary");

        Ok(Self {
            labels: labels.to_vec(),
            embeddings,
            dim: expected_dim,
        })
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Predict the single closest category label for a query embedding.
    ///
    /// The query is normalized here through the pure normalization function;
    /// the caller's vector is untouched. Ties keep the earliest label
    /// (strict `>` comparison), so prediction is deterministic.
    ///
    /// # Errors
    ///
    /// [`Error::DegenerateEmbedding`] on a zero-norm query,
    /// [`Error::DimensionMismatch`] if the query dimensionality differs
    /// from the vocabulary's.
    pub fn predict(&self, query: &Embedding) -> Result<&str> {
        if query.dim() != self.dim {
            return Err(Error::DimensionMismatch {
                expected: self.dim,
                actual: query.dim(),
            });
        }

        let query = query.normalized()?;

        let mut best_index = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (index, embedding) in self.embeddings.iter().enumerate() {
            let score = dot(query.as_slice(), embedding.as_slice());
            if score > best_score {
                best_score = score;
                best_index = index;
            }
        }

        Ok(&self.labels[best_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Provider returning canned label embeddings, keyed by label.
    struct StaticProvider {
        dim: usize,
        by_label: std::collections::HashMap<String, Vec<f32>>,
    }

    impl StaticProvider {
        fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            let dim = entries.first().map_or(0, |(_, v)| v.len());
            Self {
                dim,
                by_label: entries
                    .iter()
                    .map(|(label, values)| ((*label).to_string(), values.clone()))
                    .collect(),
            }
        }
    }

    impl EmbeddingProvider for StaticProvider {
        fn dim(&self) -> usize {
            self.dim
        }

        fn encode_image(&self, _bytes: &[u8]) -> vismatch_core::Result<Embedding> {
            Err(Error::Embedding("static provider has no image encoder".to_string()))
        }

        fn encode_labels(&self, labels: &[String]) -> vismatch_core::Result<Vec<Embedding>> {
            labels
                .iter()
                .map(|label| {
                    self.by_label
                        .get(label)
                        .cloned()
                        .map(Embedding::new)
                        .ok_or_else(|| Error::Embedding(format!("unknown label {label:?}")))
                })
                .collect()
        }
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_predict_picks_closest_label() {
        let provider = StaticProvider::new(&[
            ("Shoes", vec![1.0, 0.0]),
            ("Bags", vec![0.0, 1.0]),
        ]);
        let vocab = CategoryVocabulary::build(&labels(&["Shoes", "Bags"]), 2, &provider).unwrap();

        let query = Embedding::new(vec![0.9, 0.1]);
        assert_eq!(vocab.predict(&query).unwrap(), "Shoes");

        let query = Embedding::new(vec![0.1, 0.9]);
        assert_eq!(vocab.predict(&query).unwrap(), "Bags");
    }

    #[test]
    fn test_predict_is_deterministic() {
        let provider = StaticProvider::new(&[
            ("Shoes", vec![1.0, 0.0]),
            ("Bags", vec![0.0, 1.0]),
        ]);
        let vocab = CategoryVocabulary::build(&labels(&["Shoes", "Bags"]), 2, &provider).unwrap();

        let query = Embedding::new(vec![0.3, 0.7]);
        let first = vocab.predict(&query).unwrap().to_string();
        for _ in 0..10 {
            assert_eq!(vocab.predict(&query).unwrap(), first);
        }
    }

    #[test]
    fn test_tie_keeps_first_occurrence() {
        // Both labels embed identically, so every query ties.
        let provider = StaticProvider::new(&[
            ("Shoes", vec![1.0, 0.0]),
            ("Bags", vec![1.0, 0.0]),
        ]);
        let vocab = CategoryVocabulary::build(&labels(&["Shoes", "Bags"]), 2, &provider).unwrap();

        let query = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(vocab.predict(&query).unwrap(), "Shoes");
    }

    #[test]
    fn test_empty_vocabulary_is_config_error() {
        let provider = StaticProvider::new(&[("Shoes", vec![1.0, 0.0])]);
        let result = CategoryVocabulary::build(&[], 2, &provider);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_dim_mismatch_at_build_is_config_error() {
        let provider = StaticProvider::new(&[("Shoes", vec![1.0, 0.0, 0.0])]);
        let result = CategoryVocabulary::build(&labels(&["Shoes"]), 2, &provider);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_norm_query_is_rejected() {
        let provider = StaticProvider::new(&[("Shoes", vec![1.0, 0.0])]);
        let vocab = CategoryVocabulary::build(&labels(&["Shoes"]), 2, &provider).unwrap();

        let query = Embedding::new(vec![0.0, 0.0]);
        assert!(matches!(
            vocab.predict(&query),
            Err(Error::DegenerateEmbedding)
        ));
    }

    #[test]
    fn test_query_dim_mismatch_is_rejected() {
        let provider = StaticProvider::new(&[("Shoes", vec![1.0, 0.0])]);
        let vocab = CategoryVocabulary::build(&labels(&["Shoes"]), 2, &provider).unwrap();

        let query = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!(matches!(
            vocab.predict(&query),
            Err(Error::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }
}
