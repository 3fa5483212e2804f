//! In-memory stores for tests.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    CandidateFilters, PlanStore, RecommendationLogEntry, RecommendationLogSink, ReservationStore,
    ResourceIndex,
};
use crate::domain::plans::{
    NewPlan, NewPlanItem, NewReservation, Plan, PlanDetail, PlanItem, PlanItemDetail,
    PlanItemPatch, PlanItemSource, Reservation, UsersInfo,
};
use crate::domain::vendors::{Candidate, CandidateMetadata, Category, ServiceItem, Vendor};
use crate::error::{ApiError, ApiResult};

#[derive(Default)]
struct State {
    vendors: HashMap<Uuid, Vendor>,
    /// Resource index entries in insertion order.
    resources: Vec<Candidate>,
    service_items: HashMap<Uuid, ServiceItem>,
    users_info: HashMap<Uuid, UsersInfo>,
    plans: HashMap<Uuid, Plan>,
    items: Vec<PlanItem>,
    reservations: Vec<Reservation>,
    logs: Vec<RecommendationLogEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    fail_log_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_log() -> Self {
        Self {
            fail_log_writes: true,
            ..Self::default()
        }
    }

    pub fn add_vendor(&self, category: Category, name: &str) -> Vendor {
        let vendor = Vendor {
            id: Uuid::new_v4(),
            category,
            name: name.to_string(),
            region: None,
        };
        self.state.lock().vendors.insert(vendor.id, vendor.clone());
        vendor
    }

    /// Adds a vendor together with one resource index entry.
    pub fn add_candidate(
        &self,
        category: Category,
        name: &str,
        region: Option<&str>,
        price_min: Option<i64>,
    ) -> Candidate {
        let vendor = self.add_vendor(category, name);
        self.add_resource(vendor.id, region, price_min)
    }

    pub fn add_resource(&self, vendor_id: Uuid, region: Option<&str>, price_min: Option<i64>) -> Candidate {
        let mut state = self.state.lock();
        let vendor = state.vendors[&vendor_id].clone();
        let candidate = Candidate {
            vendor_id,
            category: vendor.category,
            name: vendor.name.clone(),
            content: format!("{} portfolio", vendor.name),
            metadata: CandidateMetadata {
                region: region.map(str::to_string),
                price_min,
            },
        };
        state.resources.push(candidate.clone());
        candidate
    }

    pub fn add_service_item(&self, vendor_id: Uuid, price: i64) -> ServiceItem {
        let item = ServiceItem {
            id: Uuid::new_v4(),
            vendor_id,
            name: "Standard package".to_string(),
            price,
        };
        self.state.lock().service_items.insert(item.id, item.clone());
        item
    }

    pub fn add_users_info(&self, user_id: Uuid, budget_limit: Option<i64>, region: Option<&str>) -> UsersInfo {
        let info = UsersInfo {
            id: Uuid::new_v4(),
            user_id,
            wedding_date: None,
            preferred_region: region.map(str::to_string),
            budget_limit,
        };
        self.state.lock().users_info.insert(info.id, info.clone());
        info
    }

    pub fn add_reservation(&self, plan_id: Uuid, vendor_id: Uuid, user_id: Uuid) {
        self.state.lock().reservations.push(Reservation {
            id: Uuid::new_v4(),
            plan_id,
            vendor_id,
            user_id,
            reserved_date: None,
            created_at: Utc::now(),
        });
    }

    /// Plan owned by `info.user_id` holding `(vendor_id, service_item_id)` items in order.
    pub fn seed_plan(&self, info: &UsersInfo, items: &[(Uuid, Option<Uuid>)]) -> Plan {
        let plan = Plan {
            id: Uuid::new_v4(),
            user_id: info.user_id,
            users_info_id: info.id,
            title: "Our wedding".to_string(),
            total_budget: info.budget_limit,
            is_ai_generated: true,
            created_at: Utc::now(),
        };
        let mut state = self.state.lock();
        state.plans.insert(plan.id, plan.clone());
        for (index, (vendor_id, service_item_id)) in items.iter().enumerate() {
            state.items.push(PlanItem {
                id: Uuid::new_v4(),
                plan_id: plan.id,
                vendor_id: *vendor_id,
                service_item_id: *service_item_id,
                source: PlanItemSource::AiRecommend,
                selection_reason: Some("seeded".to_string()),
                order_index: index as i32,
                is_confirmed: false,
            });
        }
        plan
    }

    pub fn items(&self, plan_id: Uuid) -> Vec<PlanItem> {
        self.state
            .lock()
            .items
            .iter()
            .filter(|i| i.plan_id == plan_id)
            .cloned()
            .collect()
    }

    pub fn plan_count(&self) -> usize {
        self.state.lock().plans.len()
    }

    pub fn logs(&self) -> Vec<RecommendationLogEntry> {
        self.state.lock().logs.clone()
    }
}

#[async_trait]
impl ResourceIndex for MemoryStore {
    async fn find_candidates(
        &self,
        category: Category,
        filters: &CandidateFilters,
        limit: usize,
    ) -> ApiResult<Vec<Candidate>> {
        let state = self.state.lock();
        let mut seen = Vec::new();
        let mut out = Vec::new();
        for c in state.resources.iter() {
            if c.category != category || !filters.admits(c) || seen.contains(&c.vendor_id) {
                continue;
            }
            seen.push(c.vendor_id);
            out.push(c.clone());
            if out.len() == limit {
                break;
            }
        }
        Ok(out)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> ApiResult<Vec<Candidate>> {
        let state = self.state.lock();
        Ok(state
            .resources
            .iter()
            .filter(|c| ids.contains(&c.vendor_id))
            .cloned()
            .collect())
    }

    async fn find_vendor(&self, vendor_id: Uuid) -> ApiResult<Option<Vendor>> {
        Ok(self.state.lock().vendors.get(&vendor_id).cloned())
    }

    async fn find_service_item(&self, service_item_id: Uuid) -> ApiResult<Option<ServiceItem>> {
        Ok(self.state.lock().service_items.get(&service_item_id).cloned())
    }
}

#[async_trait]
impl PlanStore for MemoryStore {
    async fn find_users_info(&self, users_info_id: Uuid) -> ApiResult<Option<UsersInfo>> {
        Ok(self.state.lock().users_info.get(&users_info_id).cloned())
    }

    async fn create_plan(&self, plan: NewPlan) -> ApiResult<Plan> {
        let plan = Plan {
            id: Uuid::new_v4(),
            user_id: plan.user_id,
            users_info_id: plan.users_info_id,
            title: plan.title,
            total_budget: plan.total_budget,
            is_ai_generated: plan.is_ai_generated,
            created_at: Utc::now(),
        };
        self.state.lock().plans.insert(plan.id, plan.clone());
        Ok(plan)
    }

    async fn create_plan_items(
        &self,
        plan_id: Uuid,
        items: Vec<NewPlanItem>,
    ) -> ApiResult<Vec<PlanItem>> {
        let created: Vec<PlanItem> = items
            .into_iter()
            .map(|i| PlanItem {
                id: Uuid::new_v4(),
                plan_id,
                vendor_id: i.vendor_id,
                service_item_id: i.service_item_id,
                source: i.source,
                selection_reason: i.selection_reason,
                order_index: i.order_index,
                is_confirmed: false,
            })
            .collect();
        self.state.lock().items.extend(created.iter().cloned());
        Ok(created)
    }

    async fn find_plan_with_items(&self, plan_id: Uuid) -> ApiResult<Option<PlanDetail>> {
        let state = self.state.lock();
        let Some(plan) = state.plans.get(&plan_id).cloned() else {
            return Ok(None);
        };

        let mut items: Vec<PlanItemDetail> = state
            .items
            .iter()
            .filter(|i| i.plan_id == plan_id)
            .map(|i| PlanItemDetail {
                item: i.clone(),
                vendor: state.vendors[&i.vendor_id].clone(),
                service_item: i
                    .service_item_id
                    .and_then(|id| state.service_items.get(&id).cloned()),
                resource_prices: state
                    .resources
                    .iter()
                    .filter(|c| c.vendor_id == i.vendor_id)
                    .filter_map(|c| c.metadata.price_min)
                    .collect(),
            })
            .collect();
        items.sort_by_key(|i| i.item.order_index);

        Ok(Some(PlanDetail { plan, items }))
    }

    async fn update_plan_item(&self, item_id: Uuid, patch: PlanItemPatch) -> ApiResult<PlanItem> {
        let mut state = self.state.lock();
        let item = state
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| ApiError::NotFound("Plan item not found".to_string()))?;
        item.vendor_id = patch.vendor_id;
        item.service_item_id = patch.service_item_id;
        item.source = patch.source;
        item.selection_reason = patch.selection_reason;
        Ok(item.clone())
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn find_reservation(
        &self,
        plan_id: Uuid,
        vendor_id: Uuid,
    ) -> ApiResult<Option<Reservation>> {
        Ok(self
            .state
            .lock()
            .reservations
            .iter()
            .find(|r| r.plan_id == plan_id && r.vendor_id == vendor_id)
            .cloned())
    }

    async fn create_reservation(&self, reservation: NewReservation) -> ApiResult<Reservation> {
        let mut state = self.state.lock();
        if state
            .reservations
            .iter()
            .any(|r| r.plan_id == reservation.plan_id && r.vendor_id == reservation.vendor_id)
        {
            return Err(ApiError::Conflict(
                "A reservation already exists for this vendor".to_string(),
            ));
        }

        let created = Reservation {
            id: Uuid::new_v4(),
            plan_id: reservation.plan_id,
            vendor_id: reservation.vendor_id,
            user_id: reservation.user_id,
            reserved_date: reservation.reserved_date,
            created_at: Utc::now(),
        };
        state.reservations.push(created.clone());
        for item in state
            .items
            .iter_mut()
            .filter(|i| i.plan_id == reservation.plan_id && i.vendor_id == reservation.vendor_id)
        {
            item.is_confirmed = true;
        }
        Ok(created)
    }
}

#[async_trait]
impl RecommendationLogSink for MemoryStore {
    async fn append(&self, entry: RecommendationLogEntry) -> anyhow::Result<()> {
        if self.fail_log_writes {
            anyhow::bail!("log store offline");
        }
        self.state.lock().logs.push(entry);
        Ok(())
    }
}
