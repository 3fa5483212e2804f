//! Turns a validated recommendation into a persisted plan.

use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::plans::{NewPlan, NewPlanItem, PlanDetail, PlanItemSource};
use crate::domain::vendors::Constraints;
use crate::error::{ApiError, ApiResult};
use crate::services::validator::ValidatedRecommendation;
use crate::store::PlanStore;

pub const AI_PLAN_TITLE: &str = "AI wedding plan";

/// Owner of a plan being assembled.
#[derive(Debug, Clone, Copy)]
pub struct PlanOwner {
    pub user_id: Uuid,
    pub users_info_id: Uuid,
}

#[derive(Clone)]
pub struct PlanAssembler {
    plans: Arc<dyn PlanStore>,
}

impl PlanAssembler {
    pub fn new(plans: Arc<dyn PlanStore>) -> Self {
        Self { plans }
    }

    #[instrument(skip(self, recommendation, constraints))]
    pub async fn assemble(
        &self,
        recommendation: &ValidatedRecommendation,
        owner: PlanOwner,
        constraints: &Constraints,
    ) -> ApiResult<PlanDetail> {
        let plan = self
            .plans
            .create_plan(NewPlan {
                user_id: owner.user_id,
                users_info_id: owner.users_info_id,
                title: plan_title(constraints),
                total_budget: constraints.budget_limit,
                is_ai_generated: true,
            })
            .await?;

        let items = plan_items(recommendation);
        let item_count = items.len();
        if !items.is_empty() {
            self.plans.create_plan_items(plan.id, items).await?;
        }

        info!(plan_id = %plan.id, items = item_count, "AI plan assembled");

        self.plans
            .find_plan_with_items(plan.id)
            .await?
            .ok_or_else(|| ApiError::internal(format!("Plan {} missing after creation", plan.id)))
    }
}

/// One item per valid pick, in category order, indexed from 0 without gaps.
pub fn plan_items(recommendation: &ValidatedRecommendation) -> Vec<NewPlanItem> {
    recommendation
        .picks()
        .enumerate()
        .map(|(index, pick)| {
            debug!(category = %pick.category(), vendor_id = %pick.vendor_id(), order_index = index, "Plan item");
            NewPlanItem {
                vendor_id: pick.vendor_id(),
                service_item_id: None,
                source: PlanItemSource::AiRecommend,
                selection_reason: Some(pick.selection_reason().to_string()),
                order_index: index as i32,
            }
        })
        .collect()
}

fn plan_title(constraints: &Constraints) -> String {
    match constraints.wedding_date {
        Some(date) => format!("{} ({})", AI_PLAN_TITLE, date.format("%Y-%m-%d")),
        None => AI_PLAN_TITLE.to_string(),
    }
}
