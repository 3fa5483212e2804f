//! Single-category vendor regeneration for an existing plan.
//!
//! The replacement is searched among vendors the plan does not already hold,
//! under the budget left after every other item, and the existing item is
//! updated in place. Provider failures are hard errors here.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::plans::{PlanDetail, PlanItemPatch, PlanItemSource, RegenerationResponse};
use crate::domain::vendors::{Category, Constraints};
use crate::error::{ApiError, ApiResult};
use crate::services::ai_client::RecommendationClient;
use crate::services::budget::{committed_budget, remaining_budget};
use crate::services::candidates::CandidateRetriever;
use crate::services::plan_lock::{with_plan_lock, PlanLock};
use crate::services::prompt::{PromptBuilder, PromptPurpose};
use crate::services::validator::validate;
use crate::store::{CandidateFilters, PlanStore, ReservationStore, ResourceIndex};

pub const NO_VENDOR_WITHIN_BUDGET: &str = "No vendor available within the remaining budget";
pub const RESERVED_VENDOR_LOCKED: &str = "Cannot change a vendor with an active reservation";

#[derive(Clone)]
pub struct RegenerationOrchestrator {
    plans: Arc<dyn PlanStore>,
    reservations: Arc<dyn ReservationStore>,
    index: Arc<dyn ResourceIndex>,
    retriever: CandidateRetriever,
    client: RecommendationClient,
    lock: Arc<dyn PlanLock>,
}

impl RegenerationOrchestrator {
    pub fn new(
        plans: Arc<dyn PlanStore>,
        reservations: Arc<dyn ReservationStore>,
        index: Arc<dyn ResourceIndex>,
        client: RecommendationClient,
        lock: Arc<dyn PlanLock>,
    ) -> Self {
        Self {
            plans,
            reservations,
            retriever: CandidateRetriever::new(Arc::clone(&index)),
            index,
            client,
            lock,
        }
    }

    /// Replace `target_vendor_id` in the plan with a freshly recommended vendor.
    #[instrument(skip(self))]
    pub async fn regenerate(
        &self,
        plan_id: Uuid,
        target_vendor_id: Uuid,
        user_id: Uuid,
    ) -> ApiResult<RegenerationResponse> {
        with_plan_lock(self.lock.as_ref(), plan_id, || {
            self.regenerate_locked(plan_id, target_vendor_id, user_id)
        })
        .await
    }

    async fn regenerate_locked(
        &self,
        plan_id: Uuid,
        target_vendor_id: Uuid,
        user_id: Uuid,
    ) -> ApiResult<RegenerationResponse> {
        let plan = load_owned_plan(self.plans.as_ref(), plan_id, user_id).await?;

        let target = self
            .index
            .find_vendor(target_vendor_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Vendor not found".to_string()))?;

        let item = plan
            .item_for_vendor(target.id)
            .ok_or_else(|| ApiError::BadRequest("Vendor is not part of this plan".to_string()))?;
        let item_id = item.item.id;
        let category: Category = item.category();

        if self
            .reservations
            .find_reservation(plan_id, target.id)
            .await?
            .is_some()
        {
            return Err(ApiError::BadRequest(RESERVED_VENDOR_LOCKED.to_string()));
        }

        let profile = self.plans.find_users_info(plan.plan.users_info_id).await?;
        let budget_limit = profile
            .as_ref()
            .and_then(|p| p.budget_limit)
            .or(plan.plan.total_budget);
        let committed = committed_budget(&plan.items, Some(target.id));
        let remaining = remaining_budget(budget_limit, committed);

        let constraints = Constraints {
            wedding_date: profile.as_ref().and_then(|p| p.wedding_date),
            preferred_region: profile.as_ref().and_then(|p| p.preferred_region.clone()),
            budget_limit: remaining,
        };
        let filters = CandidateFilters {
            exclude_vendor_ids: plan.vendor_ids(),
            ..CandidateFilters::from_constraints(&constraints)
        };

        info!(
            plan_id = %plan_id,
            category = %category,
            committed,
            remaining_budget = ?remaining,
            "Regenerating plan item"
        );

        let candidates = self.retriever.for_single_category(category, &filters).await?;
        if candidates.is_empty() {
            warn!(plan_id = %plan_id, category = %category, "No replacement candidates");
            return Err(ApiError::BadRequest(NO_VENDOR_WITHIN_BUDGET.to_string()));
        }

        let sets = BTreeMap::from([(category, candidates)]);
        let prompt = PromptBuilder::new(&constraints, &sets)
            .purpose(PromptPurpose::Replacement {
                replaced_vendor_name: target.name.clone(),
            })
            .build();

        let completion = self.client.recommend(user_id, prompt).await?;
        let validation = validate(&completion.raw_json_text, &sets)?;
        let recommendation = validation
            .recommendation()
            .ok_or_else(|| ApiError::BadRequest(NO_VENDOR_WITHIN_BUDGET.to_string()))?;
        let pick = recommendation
            .pick(category)
            .ok_or_else(|| ApiError::BadRequest(NO_VENDOR_WITHIN_BUDGET.to_string()))?;

        let vendor = self
            .index
            .find_vendor(pick.vendor_id())
            .await?
            .ok_or_else(|| {
                ApiError::internal(format!("Candidate vendor {} has no record", pick.vendor_id()))
            })?;

        let plan_item = self
            .plans
            .update_plan_item(
                item_id,
                PlanItemPatch {
                    vendor_id: vendor.id,
                    service_item_id: None,
                    source: PlanItemSource::AiRecommend,
                    selection_reason: Some(pick.selection_reason().to_string()),
                },
            )
            .await?;

        info!(
            plan_id = %plan_id,
            category = %category,
            replaced_vendor_id = %target.id,
            vendor_id = %vendor.id,
            vendor_name = %pick.name(),
            "Plan item regenerated"
        );

        Ok(RegenerationResponse {
            plan_item,
            vendor,
            replaced_vendor_id: target.id,
            remaining_budget: remaining,
            overall_reason: recommendation.overall_reason().to_string(),
        })
    }
}

/// Plan with items, if it exists and belongs to `user_id`.
pub async fn load_owned_plan(
    plans: &dyn PlanStore,
    plan_id: Uuid,
    user_id: Uuid,
) -> ApiResult<PlanDetail> {
    let plan = plans
        .find_plan_with_items(plan_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Plan not found".to_string()))?;

    if plan.plan.user_id != user_id {
        return Err(ApiError::Forbidden(
            "You do not have access to this plan".to_string(),
        ));
    }
    Ok(plan)
}
