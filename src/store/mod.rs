//! Persistence seams consumed by the recommendation pipeline.
//!
//! PostgreSQL implementations live in [`postgres`]; tests run against the
//! in-memory store.

pub mod postgres;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::plans::{
    NewPlan, NewPlanItem, NewReservation, Plan, PlanDetail, PlanItem, PlanItemPatch, Reservation,
    UsersInfo,
};
use crate::domain::recommendation::TokenUsage;
use crate::domain::vendors::{Candidate, Category, Constraints, ServiceItem, Vendor};
use crate::error::ApiResult;

pub use postgres::PgStore;

/// Region/budget/exclusion filters for candidate retrieval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateFilters {
    pub region: Option<String>,
    pub budget_limit: Option<i64>,
    pub exclude_vendor_ids: Vec<Uuid>,
}

impl CandidateFilters {
    pub fn from_constraints(constraints: &Constraints) -> Self {
        Self {
            region: constraints.preferred_region.clone(),
            budget_limit: constraints.budget_limit,
            exclude_vendor_ids: Vec::new(),
        }
    }

    /// Region and price act as wildcards when the candidate has no value.
    pub fn admits(&self, candidate: &Candidate) -> bool {
        let region_ok = match (&self.region, &candidate.metadata.region) {
            (Some(wanted), Some(region)) => wanted == region,
            _ => true,
        };
        let budget_ok = match (self.budget_limit, candidate.metadata.price_min) {
            (Some(limit), Some(price)) => price <= limit,
            _ => true,
        };
        region_ok && budget_ok && !self.exclude_vendor_ids.contains(&candidate.vendor_id)
    }
}

/// Read-only vendor catalogue and resource index.
#[async_trait]
pub trait ResourceIndex: Send + Sync {
    /// Candidates of one category in natural index order, at most `limit`.
    async fn find_candidates(
        &self,
        category: Category,
        filters: &CandidateFilters,
        limit: usize,
    ) -> ApiResult<Vec<Candidate>>;

    async fn find_by_ids(&self, ids: &[Uuid]) -> ApiResult<Vec<Candidate>>;

    async fn find_vendor(&self, vendor_id: Uuid) -> ApiResult<Option<Vendor>>;

    async fn find_service_item(&self, service_item_id: Uuid) -> ApiResult<Option<ServiceItem>>;
}

#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn find_users_info(&self, users_info_id: Uuid) -> ApiResult<Option<UsersInfo>>;

    async fn create_plan(&self, plan: NewPlan) -> ApiResult<Plan>;

    async fn create_plan_items(
        &self,
        plan_id: Uuid,
        items: Vec<NewPlanItem>,
    ) -> ApiResult<Vec<PlanItem>>;

    async fn find_plan_with_items(&self, plan_id: Uuid) -> ApiResult<Option<PlanDetail>>;

    async fn update_plan_item(&self, item_id: Uuid, patch: PlanItemPatch) -> ApiResult<PlanItem>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn find_reservation(
        &self,
        plan_id: Uuid,
        vendor_id: Uuid,
    ) -> ApiResult<Option<Reservation>>;

    /// Inserts the reservation and confirms the matching plan item atomically.
    async fn create_reservation(&self, reservation: NewReservation) -> ApiResult<Reservation>;
}

/// One audited generative model call.
#[derive(Debug, Clone)]
pub struct RecommendationLogEntry {
    pub user_id: Uuid,
    pub model: String,
    pub system_prompt: String,
    pub prompt: String,
    pub raw_response: String,
    pub usage: TokenUsage,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit log of model calls.
#[async_trait]
pub trait RecommendationLogSink: Send + Sync {
    async fn append(&self, entry: RecommendationLogEntry) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vendors::CandidateMetadata;

    fn candidate(region: Option<&str>, price_min: Option<i64>) -> Candidate {
        Candidate {
            vendor_id: Uuid::new_v4(),
            category: Category::Studio,
            name: "Studio".to_string(),
            content: String::new(),
            metadata: CandidateMetadata {
                region: region.map(str::to_string),
                price_min,
            },
        }
    }

    #[test]
    fn missing_region_and_price_are_wildcards() {
        let filters = CandidateFilters {
            region: Some("Gangnam".into()),
            budget_limit: Some(1_000_000),
            exclude_vendor_ids: vec![],
        };
        assert!(filters.admits(&candidate(None, None)));
        assert!(filters.admits(&candidate(Some("Gangnam"), Some(1_000_000))));
        assert!(!filters.admits(&candidate(Some("Mapo"), None)));
        assert!(!filters.admits(&candidate(None, Some(1_000_001))));
    }

    #[test]
    fn excluded_vendors_are_never_admitted() {
        let c = candidate(None, None);
        let filters = CandidateFilters {
            exclude_vendor_ids: vec![c.vendor_id],
            ..Default::default()
        };
        assert!(!filters.admits(&c));
    }
}
