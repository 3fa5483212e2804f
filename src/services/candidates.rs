//! Category-scoped candidate retrieval.
//!
//! Categories are fetched concurrently and joined before prompt construction.
//! Within a category, candidates keep the index's natural order and are capped.

use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::vendors::{Candidate, Category, Constraints};
use crate::error::{ApiError, ApiResult};
use crate::store::{CandidateFilters, ResourceIndex};

/// Per-category cap when combining several categories into one plan.
pub const COMBINATION_LIMIT: usize = 10;

/// Per-category cap for regeneration and similar-vendor lookup.
pub const SINGLE_CATEGORY_LIMIT: usize = 15;

pub type CandidateSets = BTreeMap<Category, Vec<Candidate>>;

#[derive(Clone)]
pub struct CandidateRetriever {
    index: Arc<dyn ResourceIndex>,
}

impl CandidateRetriever {
    pub fn new(index: Arc<dyn ResourceIndex>) -> Self {
        Self { index }
    }

    /// Candidates for every requested category under the user's constraints.
    pub async fn for_combination(
        &self,
        categories: &[Category],
        constraints: &Constraints,
    ) -> ApiResult<CandidateSets> {
        let filters = CandidateFilters::from_constraints(constraints);
        self.retrieve(categories, &filters, COMBINATION_LIMIT).await
    }

    /// Candidates for a single category, e.g. when replacing one plan item.
    pub async fn for_single_category(
        &self,
        category: Category,
        filters: &CandidateFilters,
    ) -> ApiResult<Vec<Candidate>> {
        let mut sets = self
            .retrieve(&[category], filters, SINGLE_CATEGORY_LIMIT)
            .await?;
        Ok(sets.remove(&category).unwrap_or_default())
    }

    #[instrument(skip(self, filters))]
    pub async fn retrieve(
        &self,
        categories: &[Category],
        filters: &CandidateFilters,
        limit: usize,
    ) -> ApiResult<CandidateSets> {
        let mut unique: Vec<Category> = categories.to_vec();
        unique.sort();
        unique.dedup();

        let lookups = unique.iter().map(|&category| async move {
            let found = self.index.find_candidates(category, filters, limit).await?;
            // Stores may be looser than the filter contract; never let a
            // non-matching or excluded vendor through.
            let admitted: Vec<Candidate> = found
                .into_iter()
                .filter(|c| c.category == category && filters.admits(c))
                .take(limit)
                .collect();
            Ok::<_, ApiError>((category, admitted))
        });

        let sets: CandidateSets = try_join_all(lookups).await?.into_iter().collect();

        for (category, candidates) in &sets {
            debug!(category = %category, count = candidates.len(), "Retrieved candidates");
        }

        Ok(sets)
    }
}

/// True when no category has a single candidate.
pub fn is_empty(sets: &CandidateSets) -> bool {
    sets.values().all(Vec::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn retriever(store: Arc<MemoryStore>) -> CandidateRetriever {
        CandidateRetriever::new(store)
    }

    #[tokio::test]
    async fn filters_each_category_independently() {
        let store = Arc::new(MemoryStore::new());
        let venue = store.add_candidate(Category::Venue, "Hall", Some("Gangnam"), Some(20_000_000));
        store.add_candidate(Category::Venue, "Far Hall", Some("Busan"), None);
        let studio = store.add_candidate(Category::Studio, "Studio", None, None);
        store.add_candidate(Category::Studio, "Pricey", None, Some(90_000_000));

        let constraints = Constraints {
            preferred_region: Some("Gangnam".into()),
            budget_limit: Some(50_000_000),
            ..Default::default()
        };
        let sets = retriever(store)
            .for_combination(&[Category::Venue, Category::Studio, Category::Dress], &constraints)
            .await
            .unwrap();

        assert_eq!(sets[&Category::Venue], vec![venue]);
        assert_eq!(sets[&Category::Studio], vec![studio]);
        assert!(sets[&Category::Dress].is_empty());
        assert!(!is_empty(&sets));
    }

    #[tokio::test]
    async fn caps_keep_natural_order() {
        let store = Arc::new(MemoryStore::new());
        let all: Vec<Candidate> = (0..20)
            .map(|i| store.add_candidate(Category::Dress, &format!("Dress {}", i), None, None))
            .collect();

        let combo = retriever(store.clone())
            .for_combination(&[Category::Dress], &Constraints::default())
            .await
            .unwrap();
        assert_eq!(combo[&Category::Dress], all[..COMBINATION_LIMIT].to_vec());

        let single = retriever(store)
            .for_single_category(Category::Dress, &CandidateFilters::default())
            .await
            .unwrap();
        assert_eq!(single, all[..SINGLE_CATEGORY_LIMIT].to_vec());
    }

    #[tokio::test]
    async fn exclusions_are_respected() {
        let store = Arc::new(MemoryStore::new());
        let a = store.add_candidate(Category::Makeup, "A", None, None);
        let b = store.add_candidate(Category::Makeup, "B", None, None);

        let filters = CandidateFilters {
            exclude_vendor_ids: vec![a.vendor_id],
            ..Default::default()
        };
        let found = retriever(store)
            .for_single_category(Category::Makeup, &filters)
            .await
            .unwrap();
        assert_eq!(found, vec![b]);
    }
}
