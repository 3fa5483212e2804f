//! Recommendation entry points: ad-hoc recommendations, AI plan generation
//! from a stored wedding profile, and similar-vendor lookup.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::plans::PlanDetail;
use crate::domain::recommendation::RecommendationView;
use crate::domain::vendors::{Candidate, Category, Constraints, SimilarVendorsQuery};
use crate::error::{ApiError, ApiResult};
use crate::services::ai_client::RecommendationClient;
use crate::services::assembler::{PlanAssembler, PlanOwner};
use crate::services::candidates::{self, CandidateRetriever, CandidateSets};
use crate::services::prompt::PromptBuilder;
use crate::services::validator::{validate, PickVerdict, Validation};
use crate::store::{CandidateFilters, PlanStore, ResourceIndex};

#[derive(Clone)]
pub struct RecommendationService {
    plans: Arc<dyn PlanStore>,
    index: Arc<dyn ResourceIndex>,
    retriever: CandidateRetriever,
    client: RecommendationClient,
    assembler: PlanAssembler,
}

impl RecommendationService {
    pub fn new(
        plans: Arc<dyn PlanStore>,
        index: Arc<dyn ResourceIndex>,
        client: RecommendationClient,
    ) -> Self {
        Self {
            retriever: CandidateRetriever::new(Arc::clone(&index)),
            assembler: PlanAssembler::new(Arc::clone(&plans)),
            plans,
            index,
            client,
        }
    }

    pub fn client(&self) -> &RecommendationClient {
        &self.client
    }

    /// Validated recommendation for `categories` without persisting anything.
    #[instrument(skip(self, constraints))]
    pub async fn recommend(
        &self,
        user_id: Uuid,
        constraints: &Constraints,
        categories: Option<&[Category]>,
    ) -> ApiResult<RecommendationView> {
        let categories = categories.unwrap_or(&Category::ALL[..]);
        if categories.is_empty() {
            return Err(ApiError::BadRequest(
                "At least one category is required".to_string(),
            ));
        }

        let sets = self.retriever.for_combination(categories, constraints).await?;
        if candidates::is_empty(&sets) {
            return Err(ApiError::BadRequest(
                "No candidates for any category".to_string(),
            ));
        }

        let validation = self.run(user_id, constraints, &sets).await?;
        if let Some(rec) = validation.recommendation() {
            for category in sets.keys() {
                if let Some(PickVerdict::Rejected(reason)) = rec.verdict(*category) {
                    debug!(category = %category, reason = %reason, "Category left empty");
                }
            }
        }
        Ok(view_of(&validation, &sets))
    }

    /// Generate and persist a plan from the user's wedding profile.
    ///
    /// Returns `None` when the provider fails or nothing could be picked;
    /// the profile stays valid and the caller simply has no plan yet.
    #[instrument(skip(self))]
    pub async fn generate_plan(
        &self,
        user_id: Uuid,
        users_info_id: Uuid,
    ) -> ApiResult<Option<PlanDetail>> {
        let profile = self
            .plans
            .find_users_info(users_info_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Wedding profile not found".to_string()))?;
        if profile.user_id != user_id {
            return Err(ApiError::Forbidden(
                "You do not have access to this profile".to_string(),
            ));
        }

        let constraints = profile.constraints();
        let sets = self
            .retriever
            .for_combination(&Category::ALL, &constraints)
            .await?;

        if candidates::is_empty(&sets) {
            warn!(users_info_id = %users_info_id, "No candidates for any category");
            return Ok(None);
        }

        let validation = match self.run(user_id, &constraints, &sets).await {
            Ok(validation) => validation,
            Err(e) if e.is_provider_failure() => {
                error!(users_info_id = %users_info_id, error = %e, "AI plan generation degraded");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let Some(recommendation) = validation.into_recommendation() else {
            info!(users_info_id = %users_info_id, "Nothing to recommend, no plan created");
            return Ok(None);
        };

        let owner = PlanOwner {
            user_id,
            users_info_id,
        };
        let plan = self
            .assembler
            .assemble(&recommendation, owner, &constraints)
            .await?;
        Ok(Some(plan))
    }

    /// Up to 15 vendors of the same category as `vendor_id`, without a model call.
    #[instrument(skip(self))]
    pub async fn similar_vendors(
        &self,
        vendor_id: Uuid,
        query: SimilarVendorsQuery,
    ) -> ApiResult<Vec<Candidate>> {
        // Only indexed vendors have anything to be similar to
        let source = self
            .index
            .find_by_ids(&[vendor_id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound("Vendor not found".to_string()))?;

        let filters = CandidateFilters {
            region: query.region,
            budget_limit: query.budget_limit,
            exclude_vendor_ids: vec![source.vendor_id],
        };
        self.retriever
            .for_single_category(source.category, &filters)
            .await
    }

    async fn run(
        &self,
        user_id: Uuid,
        constraints: &Constraints,
        sets: &CandidateSets,
    ) -> ApiResult<Validation> {
        let prompt = PromptBuilder::new(constraints, sets).build();
        let completion = self.client.recommend(user_id, prompt).await?;
        validate(&completion.raw_json_text, sets)
    }
}

fn view_of(validation: &Validation, sets: &CandidateSets) -> RecommendationView {
    match validation {
        Validation::Recommended(rec) => rec.to_view(),
        Validation::NothingPossible {
            summary,
            overall_reason,
        } => RecommendationView {
            picks: sets.keys().map(|c| (*c, None)).collect(),
            overall_reason: overall_reason.to_string(),
            summary: Some(summary.to_string()),
        },
    }
}
