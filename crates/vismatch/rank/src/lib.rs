//! Similarity ranking: exhaustive scored scan of the catalog.
//!
//! A linear scan over every catalog item, appropriate at catalog sizes in
//! the hundreds. Catalog embeddings are unit-norm at rest (established at
//! corpus ingestion), so each score is a single dot product against the
//! normalized query.

use vismatch_core::{dot, Embedding, Error, MatchResult, Result};
use vismatch_corpus::CorpusStore;

/// Score every catalog item against a query and return the filtered,
/// descending-sorted matches.
///
/// An item is kept when its score is `>= min_score` (non-strict: a score
/// exactly equal to the threshold is included) and, if `category` is
/// supplied, when its label matches case-insensitively. The sort is stable,
/// so equal scores keep corpus iteration order (sorted by identifier).
///
/// An empty result is well-formed, never an error.
///
/// # Errors
///
/// [`Error::DegenerateEmbedding`] on a zero-norm query,
/// [`Error::DimensionMismatch`] if the query dimensionality differs from
/// the corpus's.
pub fn top_matches(
    corpus: &CorpusStore,
    query: &Embedding,
    category: Option<&str>,
    min_score: f32,
) -> Result<Vec<MatchResult>> {
    if query.dim() != corpus.dim() {
        return Err(Error::DimensionMismatch {
            expected: corpus.dim(),
            actual: query.dim(),
        });
    }

    let query = query.normalized()?;

    let mut matches: Vec<MatchResult> = corpus
        .items()
        .iter()
        .filter_map(|item| {
            let score = dot(item.embedding.as_slice(), query.as_slice());
            if score < min_score {
                return None;
            }
            if let Some(wanted) = category {
                if !item.category.eq_ignore_ascii_case(wanted) {
                    return None;
                }
            }
            Some(MatchResult {
                image: item.image.clone(),
                score,
                category: item.category.clone(),
            })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vismatch_corpus::ItemMetadata;

    fn corpus(items: &[(&str, Vec<f32>, &str)]) -> CorpusStore {
        let embeddings: BTreeMap<String, Vec<f32>> = items
            .iter()
            .map(|(id, values, _)| ((*id).to_string(), values.clone()))
            .collect();
        let metadata: BTreeMap<String, ItemMetadata> = items
            .iter()
            .map(|(id, _, category)| {
                (
                    (*id).to_string(),
                    ItemMetadata {
                        category: (*category).to_string(),
                        name: (*id).to_string(),
                    },
                )
            })
            .collect();
        CorpusStore::from_tables(embeddings, metadata).unwrap()
    }

    #[test]
    fn test_matches_sorted_descending() {
        let corpus = corpus(&[
            ("a", vec![1.0, 0.0], "Shoes"),
            ("b", vec![0.0, 1.0], "Shoes"),
            ("c", vec![1.0, 1.0], "Shoes"),
        ]);
        let query = Embedding::new(vec![1.0, 0.0]);

        let matches = top_matches(&corpus, &query, None, 0.0).unwrap();
        assert_eq!(matches.len(), 3);
        for pair in matches.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(matches[0].image, "a.jpg");
    }

    #[test]
    fn test_scores_are_cosine_bounded() {
        let corpus = corpus(&[
            ("a", vec![2.0, 3.0, -1.0], "Shoes"),
            ("b", vec![-4.0, 0.5, 9.0], "Shoes"),
        ]);
        let query = Embedding::new(vec![7.0, -2.0, 0.3]);

        let matches = top_matches(&corpus, &query, None, -1.0).unwrap();
        assert_eq!(matches.len(), 2);
        for m in &matches {
            assert!((-1.0..=1.0).contains(&m.score), "score was {}", m.score);
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // b is orthogonal to the query, so its score is exactly 0.0.
        let corpus = corpus(&[
            ("a", vec![1.0, 0.0], "Shoes"),
            ("b", vec![0.0, 1.0], "Shoes"),
        ]);
        let query = Embedding::new(vec![1.0, 0.0]);

        let matches = top_matches(&corpus, &query, None, 0.0).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].image, "b.jpg");
        assert!((matches[1].score - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_excludes_below() {
        let corpus = corpus(&[
            ("a", vec![1.0, 0.0], "Shoes"),
            ("b", vec![0.0, 1.0], "Shoes"),
        ]);
        let query = Embedding::new(vec![1.0, 0.0]);

        let matches = top_matches(&corpus, &query, None, 0.5).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].image, "a.jpg");
    }

    #[test]
    fn test_category_filter_is_case_insensitive() {
        let corpus = corpus(&[
            ("a", vec![1.0, 0.0], "Shoes"),
            ("b", vec![0.9, 0.1], "Bags"),
        ]);
        let query = Embedding::new(vec![1.0, 0.0]);

        let matches = top_matches(&corpus, &query, Some("shoes"), 0.0).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].category, "Shoes");
    }

    #[test]
    fn test_empty_result_is_well_formed() {
        let corpus = corpus(&[("a", vec![1.0, 0.0], "Shoes")]);
        let query = Embedding::new(vec![1.0, 0.0]);

        // Threshold above any possible cosine score.
        let matches = top_matches(&corpus, &query, None, 2.0).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_zero_norm_query_is_rejected() {
        let corpus = corpus(&[("a", vec![1.0, 0.0], "Shoes")]);
        let query = Embedding::new(vec![0.0, 0.0]);

        assert!(matches!(
            top_matches(&corpus, &query, None, 0.0),
            Err(Error::DegenerateEmbedding)
        ));
    }

    #[test]
    fn test_unnormalized_query_scores_like_unit_query() {
        let corpus = corpus(&[("a", vec![1.0, 0.0], "Shoes")]);

        let unit = top_matches(&corpus, &Embedding::new(vec![1.0, 0.0]), None, 0.0).unwrap();
        let scaled = top_matches(&corpus, &Embedding::new(vec![42.0, 0.0]), None, 0.0).unwrap();
        assert!((unit[0].score - scaled[0].score).abs() < 1e-6);
    }

    #[test]
    fn test_equal_scores_keep_corpus_order() {
        // Identical embeddings, identical scores: identifier order wins.
        let corpus = corpus(&[
            ("b", vec![1.0, 0.0], "Shoes"),
            ("a", vec![1.0, 0.0], "Shoes"),
        ]);
        let query = Embedding::new(vec![1.0, 0.0]);

        let matches = top_matches(&corpus, &query, None, 0.0).unwrap();
        assert_eq!(matches[0].image, "a.jpg");
        assert_eq!(matches[1].image, "b.jpg");
    }
}
