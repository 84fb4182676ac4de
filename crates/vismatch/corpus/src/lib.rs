//! Immutable catalog store built from precomputed embedding and metadata tables.
//!
//! The store is loaded once at startup from two JSON tables keyed by the same
//! base identifier and never mutated afterward, so concurrent requests read it
//! without locking. Catalog embeddings are L2-normalized here, once, at
//! ingestion; the ranker dots raw stored vectors against a normalized query
//! without re-normalizing the corpus per request.

use std::collections::BTreeMap;

use vismatch_core::{Embedding, Error, Result};

/// Extension appended to a base identifier to form the display filename.
pub const IMAGE_EXT: &str = ".jpg";

/// Category assigned to items whose identifier has no metadata entry.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Per-item entry in the metadata table.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ItemMetadata {
    pub category: String,
    pub name: String,
}

/// One cataloged image: display filename, normalized embedding, metadata.
#[derive(Debug, Clone)]
pub struct CatalogItem {
    /// Display filename (base identifier + [`IMAGE_EXT`]), unique.
    pub image: String,
    /// Unit-norm embedding, fixed at ingestion.
    pub embedding: Embedding,
    pub category: String,
    pub name: String,
}

/// The fixed catalog of items available for matching.
///
/// Iteration order is deterministic: items are sorted by base identifier
/// (the tables deserialize into `BTreeMap`s). Ties in ranking fall back to
/// this order.
#[derive(Debug)]
pub struct CorpusStore {
    items: Vec<CatalogItem>,
    dim: usize,
}

impl CorpusStore {
    /// Build a store from an embedding table and a metadata table.
    ///
    /// Identifiers present in the embedding table but absent from the
    /// metadata table degrade to category [`UNKNOWN_CATEGORY`] with the
    /// identifier as display name; this is defined behavior, not an error.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the embedding table is empty, dimensionalities
    /// disagree, or any catalog vector has zero norm.
    pub fn from_tables(
        embeddings: BTreeMap<String, Vec<f32>>,
        metadata: BTreeMap<String, ItemMetadata>,
    ) -> Result<Self> {
        let dim = embeddings
            .values()
            .next()
            .map(Vec::len)
            .ok_or_else(|| Error::Config("embedding table is empty".to_string()))?;

        let mut items = Vec::with_capacity(embeddings.len());
        for (id, values) in embeddings {
            if values.len() != dim {
                return Err(Error::Config(format!(
                    "embedding for {id:?} has dim {}, expected {dim}",
                    values.len()
                )));
            }

            let embedding = Embedding::new(values)
                .normalized()
                .map_err(|_| Error::Config(format!("embedding for {id:?} has zero norm")))?;

            let (category, name) = match metadata.get(&id) {
                Some(meta) => (meta.category.clone(), meta.name.clone()),
                None => (UNKNOWN_CATEGORY.to_string(), id.clone()),
            };

            items.push(CatalogItem {
                image: format!("{id}{IMAGE_EXT}"),
                embedding,
                category,
                name,
            });
        }

        tracing::info!(items = items.len(), dim, "built corpus store");

        Ok(Self { items, dim })
    }

    /// Load a store from `embeddings.json` and `metadata.json` files.
    pub fn load(
        embeddings_path: impl AsRef<std::path::Path>,
        metadata_path: impl AsRef<std::path::Path>,
    ) -> Result<Self> {
        let embeddings = read_json::<BTreeMap<String, Vec<f32>>>(embeddings_path.as_ref())?;
        let metadata = read_json::<BTreeMap<String, ItemMetadata>>(metadata_path.as_ref())?;
        Self::from_tables(embeddings, metadata)
    }

    /// Items in deterministic (identifier-sorted) order.
    #[must_use]
    pub fn items(&self) -> &[CatalogItem] {
        &self.items
    }

    /// Dimensionality shared by all catalog embeddings.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct category labels in first-occurrence order of corpus iteration.
    ///
    /// This is the category vocabulary source: every label here has at least
    /// one catalog item, and every item's label appears here.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut labels = Vec::new();
        for item in &self.items {
            if seen.insert(item.category.as_str()) {
                labels.push(item.category.clone());
            }
        }
        labels
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}
