//! User-driven plan edits: reading a plan, manual vendor selection and
//! reservation confirmation.

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::plans::{
    NewPlanItem, NewReservation, PlanDetail, PlanItemPatch, PlanItemSource, Reservation,
};
use crate::error::{ApiError, ApiResult};
use crate::services::plan_lock::{with_plan_lock, PlanLock};
use crate::services::regeneration::{load_owned_plan, RESERVED_VENDOR_LOCKED};
use crate::store::{PlanStore, ReservationStore, ResourceIndex};

#[derive(Clone)]
pub struct PlanEditor {
    plans: Arc<dyn PlanStore>,
    reservations: Arc<dyn ReservationStore>,
    index: Arc<dyn ResourceIndex>,
    lock: Arc<dyn PlanLock>,
}

impl PlanEditor {
    pub fn new(
        plans: Arc<dyn PlanStore>,
        reservations: Arc<dyn ReservationStore>,
        index: Arc<dyn ResourceIndex>,
        lock: Arc<dyn PlanLock>,
    ) -> Self {
        Self {
            plans,
            reservations,
            index,
            lock,
        }
    }

    pub async fn get_plan(&self, plan_id: Uuid, user_id: Uuid) -> ApiResult<PlanDetail> {
        load_owned_plan(self.plans.as_ref(), plan_id, user_id).await
    }

    /// Add a vendor to the plan, or swap it into the slot of its category.
    #[instrument(skip(self))]
    pub async fn select_vendor(
        &self,
        plan_id: Uuid,
        user_id: Uuid,
        vendor_id: Uuid,
        service_item_id: Option<Uuid>,
    ) -> ApiResult<PlanDetail> {
        with_plan_lock(self.lock.as_ref(), plan_id, || async move {
            let plan = load_owned_plan(self.plans.as_ref(), plan_id, user_id).await?;

            let vendor = self
                .index
                .find_vendor(vendor_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Vendor not found".to_string()))?;

            if plan.item_for_vendor(vendor.id).is_some() {
                return Err(ApiError::BadRequest(
                    "Vendor is already in this plan".to_string(),
                ));
            }

            if let Some(id) = service_item_id {
                let service_item = self
                    .index
                    .find_service_item(id)
                    .await?
                    .ok_or_else(|| ApiError::NotFound("Service item not found".to_string()))?;
                if service_item.vendor_id != vendor.id {
                    return Err(ApiError::BadRequest(
                        "Service item does not belong to this vendor".to_string(),
                    ));
                }
            }

            match plan.item_for_category(vendor.category) {
                Some(existing) => {
                    let replaced = existing.item.vendor_id;
                    if self
                        .reservations
                        .find_reservation(plan_id, replaced)
                        .await?
                        .is_some()
                    {
                        return Err(ApiError::BadRequest(RESERVED_VENDOR_LOCKED.to_string()));
                    }

                    self.plans
                        .update_plan_item(
                            existing.item.id,
                            PlanItemPatch {
                                vendor_id: vendor.id,
                                service_item_id,
                                source: PlanItemSource::UserSelect,
                                selection_reason: None,
                            },
                        )
                        .await?;

                    info!(
                        plan_id = %plan_id,
                        category = %vendor.category,
                        replaced_vendor_id = %replaced,
                        vendor_id = %vendor.id,
                        "Plan item replaced by user"
                    );
                }
                None => {
                    self.plans
                        .create_plan_items(
                            plan_id,
                            vec![NewPlanItem {
                                vendor_id: vendor.id,
                                service_item_id,
                                source: PlanItemSource::UserSelect,
                                selection_reason: None,
                                order_index: plan.next_order_index(),
                            }],
                        )
                        .await?;

                    info!(
                        plan_id = %plan_id,
                        category = %vendor.category,
                        vendor_id = %vendor.id,
                        "Plan item added by user"
                    );
                }
            }

            load_owned_plan(self.plans.as_ref(), plan_id, user_id).await
        })
        .await
    }

    /// Reserve a vendor of the plan, confirming its item.
    #[instrument(skip(self))]
    pub async fn create_reservation(
        &self,
        plan_id: Uuid,
        user_id: Uuid,
        vendor_id: Uuid,
        reserved_date: Option<NaiveDate>,
    ) -> ApiResult<Reservation> {
        with_plan_lock(self.lock.as_ref(), plan_id, || async move {
            let plan = load_owned_plan(self.plans.as_ref(), plan_id, user_id).await?;
            if plan.item_for_vendor(vendor_id).is_none() {
                return Err(ApiError::BadRequest(
                    "Vendor is not part of this plan".to_string(),
                ));
            }

            let reservation = self
                .reservations
                .create_reservation(NewReservation {
                    plan_id,
                    vendor_id,
                    user_id,
                    reserved_date,
                })
                .await?;

            info!(plan_id = %plan_id, vendor_id = %vendor_id, "Reservation created");
            Ok(reservation)
        })
        .await
    }
}
