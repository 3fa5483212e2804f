//! Plan domain types
//!
//! A plan item never stores its category; it is always derived from the
//! vendor the item points at.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::vendors::{Category, Constraints, ServiceItem, Vendor};

/// Provenance of a plan item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanItemSource {
    AiRecommend,
    UserSelect,
}

impl PlanItemSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiRecommend => "AI_RECOMMEND",
            Self::UserSelect => "USER_SELECT",
        }
    }
}

impl From<String> for PlanItemSource {
    fn from(s: String) -> Self {
        match s.as_str() {
            "AI_RECOMMEND" => Self::AiRecommend,
            _ => Self::UserSelect,
        }
    }
}

/// Wedding profile captured at onboarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub wedding_date: Option<NaiveDate>,
    pub preferred_region: Option<String>,
    pub budget_limit: Option<i64>,
}

impl UsersInfo {
    pub fn constraints(&self) -> Constraints {
        Constraints {
            wedding_date: self.wedding_date,
            preferred_region: self.preferred_region.clone(),
            budget_limit: self.budget_limit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub users_info_id: Uuid,
    pub title: String,
    pub total_budget: Option<i64>,
    pub is_ai_generated: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanItem {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub vendor_id: Uuid,
    pub service_item_id: Option<Uuid>,
    pub source: PlanItemSource,
    pub selection_reason: Option<String>,
    pub order_index: i32,
    pub is_confirmed: bool,
}

#[derive(Debug, Clone)]
pub struct NewPlan {
    pub user_id: Uuid,
    pub users_info_id: Uuid,
    pub title: String,
    pub total_budget: Option<i64>,
    pub is_ai_generated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPlanItem {
    pub vendor_id: Uuid,
    pub service_item_id: Option<Uuid>,
    pub source: PlanItemSource,
    pub selection_reason: Option<String>,
    pub order_index: i32,
}

/// Vendor swap applied to an existing plan item.
///
/// Every field is written; a swap always replaces the service item choice.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanItemPatch {
    pub vendor_id: Uuid,
    pub service_item_id: Option<Uuid>,
    pub source: PlanItemSource,
    pub selection_reason: Option<String>,
}

/// Plan item joined with its vendor relations.
#[derive(Debug, Clone, Serialize)]
pub struct PlanItemDetail {
    #[serde(flatten)]
    pub item: PlanItem,
    pub vendor: Vendor,
    pub service_item: Option<ServiceItem>,
    /// `price_min` values of the vendor's resource records, in index order.
    #[serde(skip)]
    pub resource_prices: Vec<i64>,
}

impl PlanItemDetail {
    pub fn category(&self) -> Category {
        self.vendor.category
    }
}

/// Plan with its items ordered by `order_index`.
#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: Plan,
    pub items: Vec<PlanItemDetail>,
}

impl PlanDetail {
    pub fn vendor_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|i| i.item.vendor_id).collect()
    }

    pub fn item_for_vendor(&self, vendor_id: Uuid) -> Option<&PlanItemDetail> {
        self.items.iter().find(|i| i.item.vendor_id == vendor_id)
    }

    pub fn item_for_category(&self, category: Category) -> Option<&PlanItemDetail> {
        self.items.iter().find(|i| i.category() == category)
    }

    pub fn next_order_index(&self) -> i32 {
        self.items
            .iter()
            .map(|i| i.item.order_index + 1)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub vendor_id: Uuid,
    pub user_id: Uuid,
    pub reserved_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub plan_id: Uuid,
    pub vendor_id: Uuid,
    pub user_id: Uuid,
    pub reserved_date: Option<NaiveDate>,
}

// =============================================================================
// Request/Response DTOs for API endpoints
// =============================================================================

/// Request for AI plan generation from a stored wedding profile.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratePlanRequest {
    pub users_info_id: Uuid,
}

/// Request to add or replace a vendor manually.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectVendorRequest {
    pub vendor_id: Uuid,
    #[serde(default)]
    pub service_item_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReservationRequest {
    pub vendor_id: Uuid,
    #[serde(default)]
    pub reserved_date: Option<NaiveDate>,
}

/// Result of a single-category regeneration.
#[derive(Debug, Clone, Serialize)]
pub struct RegenerationResponse {
    pub plan_item: PlanItem,
    pub vendor: Vendor,
    pub replaced_vendor_id: Uuid,
    pub remaining_budget: Option<i64>,
    pub overall_reason: String,
}
