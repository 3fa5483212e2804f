//! PostgreSQL-backed stores.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{types::Json, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    CandidateFilters, PlanStore, RecommendationLogEntry, RecommendationLogSink, ReservationStore,
    ResourceIndex,
};
use crate::domain::plans::{
    NewPlan, NewPlanItem, NewReservation, Plan, PlanDetail, PlanItem, PlanItemDetail,
    PlanItemPatch, Reservation, UsersInfo,
};
use crate::domain::vendors::{Candidate, CandidateMetadata, Category, ServiceItem, Vendor};
use crate::error::{ApiError, ApiResult};

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CandidateRow {
    vendor_id: Uuid,
    category: String,
    name: String,
    content: String,
    metadata: Json<CandidateMetadata>,
}

#[derive(Debug, sqlx::FromRow)]
struct VendorRow {
    id: Uuid,
    category: String,
    name: String,
    region: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct ServiceItemRow {
    id: Uuid,
    vendor_id: Uuid,
    name: String,
    price: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct UsersInfoRow {
    id: Uuid,
    user_id: Uuid,
    wedding_date: Option<NaiveDate>,
    preferred_region: Option<String>,
    budget_limit: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    user_id: Uuid,
    users_info_id: Uuid,
    title: String,
    total_budget: Option<i64>,
    is_ai_generated: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct PlanItemRow {
    id: Uuid,
    plan_id: Uuid,
    vendor_id: Uuid,
    service_item_id: Option<Uuid>,
    source: String,
    selection_reason: Option<String>,
    order_index: i32,
    is_confirmed: bool,
}

#[derive(Debug, sqlx::FromRow)]
struct PlanItemDetailRow {
    #[sqlx(flatten)]
    item: PlanItemRow,
    vendor_category: String,
    vendor_name: String,
    vendor_region: Option<String>,
    service_item_name: Option<String>,
    service_item_price: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    plan_id: Uuid,
    vendor_id: Uuid,
    user_id: Uuid,
    reserved_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
}

// ============================================================================
// Row Conversions
// ============================================================================

fn parse_category(raw: &str) -> ApiResult<Category> {
    raw.parse()
        .map_err(|e: String| ApiError::internal(format!("Corrupt vendor row: {}", e)))
}

impl TryFrom<CandidateRow> for Candidate {
    type Error = ApiError;

    fn try_from(row: CandidateRow) -> ApiResult<Self> {
        Ok(Self {
            vendor_id: row.vendor_id,
            category: parse_category(&row.category)?,
            name: row.name,
            content: row.content,
            metadata: row.metadata.0,
        })
    }
}

impl TryFrom<VendorRow> for Vendor {
    type Error = ApiError;

    fn try_from(row: VendorRow) -> ApiResult<Self> {
        Ok(Self {
            id: row.id,
            category: parse_category(&row.category)?,
            name: row.name,
            region: row.region,
        })
    }
}

impl From<ServiceItemRow> for ServiceItem {
    fn from(row: ServiceItemRow) -> Self {
        Self {
            id: row.id,
            vendor_id: row.vendor_id,
            name: row.name,
            price: row.price,
        }
    }
}

impl From<UsersInfoRow> for UsersInfo {
    fn from(row: UsersInfoRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            wedding_date: row.wedding_date,
            preferred_region: row.preferred_region,
            budget_limit: row.budget_limit,
        }
    }
}

impl From<PlanRow> for Plan {
    fn from(row: PlanRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            users_info_id: row.users_info_id,
            title: row.title,
            total_budget: row.total_budget,
            is_ai_generated: row.is_ai_generated,
            created_at: row.created_at,
        }
    }
}

impl From<PlanItemRow> for PlanItem {
    fn from(row: PlanItemRow) -> Self {
        Self {
            id: row.id,
            plan_id: row.plan_id,
            vendor_id: row.vendor_id,
            service_item_id: row.service_item_id,
            source: row.source.into(),
            selection_reason: row.selection_reason,
            order_index: row.order_index,
            is_confirmed: row.is_confirmed,
        }
    }
}

impl From<ReservationRow> for Reservation {
    fn from(row: ReservationRow) -> Self {
        Self {
            id: row.id,
            plan_id: row.plan_id,
            vendor_id: row.vendor_id,
            user_id: row.user_id,
            reserved_date: row.reserved_date,
            created_at: row.created_at,
        }
    }
}

const PLAN_ITEM_COLUMNS: &str =
    "id, plan_id, vendor_id, service_item_id, source, selection_reason, order_index, is_confirmed";

// ============================================================================
// Store
// ============================================================================

/// All stores over one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `price_min` estimates per vendor, in resource index order.
    async fn resource_prices(&self, vendor_ids: &[Uuid]) -> ApiResult<HashMap<Uuid, Vec<i64>>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT vendor_id, (metadata->>'price_min')::numeric::bigint AS price_min
            FROM vendor_resources
            WHERE vendor_id = ANY($1)
              AND metadata->>'price_min' IS NOT NULL
            ORDER BY created_at, id
            "#,
        )
        .bind(vendor_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut prices: HashMap<Uuid, Vec<i64>> = HashMap::new();
        for (vendor_id, price) in rows {
            prices.entry(vendor_id).or_default().push(price);
        }
        Ok(prices)
    }
}

#[async_trait]
impl ResourceIndex for PgStore {
    async fn find_candidates(
        &self,
        category: Category,
        filters: &CandidateFilters,
        limit: usize,
    ) -> ApiResult<Vec<Candidate>> {
        // One candidate per vendor (its earliest resource), then natural index order
        let rows: Vec<CandidateRow> = sqlx::query_as(
            r#"
            SELECT vendor_id, category, name, content, metadata FROM (
                SELECT DISTINCT ON (r.vendor_id)
                       r.vendor_id, v.category, v.name, r.content, r.metadata,
                       r.created_at, r.id
                FROM vendor_resources r
                JOIN vendors v ON v.id = r.vendor_id
                WHERE v.category = $1
                  AND ($2::text IS NULL OR r.metadata->>'region' IS NULL
                       OR r.metadata->>'region' = $2)
                  AND ($3::bigint IS NULL OR r.metadata->>'price_min' IS NULL
                       OR (r.metadata->>'price_min')::numeric <= $3)
                  AND NOT (r.vendor_id = ANY($4))
                ORDER BY r.vendor_id, r.created_at, r.id
            ) c
            ORDER BY c.created_at, c.id
            LIMIT $5
            "#,
        )
        .bind(category.as_str())
        .bind(&filters.region)
        .bind(filters.budget_limit)
        .bind(&filters.exclude_vendor_ids)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Candidate::try_from).collect()
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> ApiResult<Vec<Candidate>> {
        let rows: Vec<CandidateRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT ON (r.vendor_id)
                   r.vendor_id, v.category, v.name, r.content, r.metadata
            FROM vendor_resources r
            JOIN vendors v ON v.id = r.vendor_id
            WHERE r.vendor_id = ANY($1)
            ORDER BY r.vendor_id, r.created_at, r.id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Candidate::try_from).collect()
    }

    async fn find_vendor(&self, vendor_id: Uuid) -> ApiResult<Option<Vendor>> {
        let row: Option<VendorRow> =
            sqlx::query_as("SELECT id, category, name, region FROM vendors WHERE id = $1")
                .bind(vendor_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Vendor::try_from).transpose()
    }

    async fn find_service_item(&self, service_item_id: Uuid) -> ApiResult<Option<ServiceItem>> {
        let row: Option<ServiceItemRow> =
            sqlx::query_as("SELECT id, vendor_id, name, price FROM service_items WHERE id = $1")
                .bind(service_item_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(ServiceItem::from))
    }
}

#[async_trait]
impl PlanStore for PgStore {
    async fn find_users_info(&self, users_info_id: Uuid) -> ApiResult<Option<UsersInfo>> {
        let row: Option<UsersInfoRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, wedding_date, preferred_region, budget_limit
            FROM users_info WHERE id = $1
            "#,
        )
        .bind(users_info_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UsersInfo::from))
    }

    async fn create_plan(&self, plan: NewPlan) -> ApiResult<Plan> {
        let row: PlanRow = sqlx::query_as(
            r#"
            INSERT INTO plans (id, user_id, users_info_id, title, total_budget, is_ai_generated)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, users_info_id, title, total_budget, is_ai_generated, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(plan.user_id)
        .bind(plan.users_info_id)
        .bind(&plan.title)
        .bind(plan.total_budget)
        .bind(plan.is_ai_generated)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn create_plan_items(
        &self,
        plan_id: Uuid,
        items: Vec<NewPlanItem>,
    ) -> ApiResult<Vec<PlanItem>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(items.len());

        let sql = format!(
            r#"
            INSERT INTO plan_items
                (id, plan_id, vendor_id, service_item_id, source, selection_reason, order_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PLAN_ITEM_COLUMNS
        );

        for item in items {
            let row: PlanItemRow = sqlx::query_as(&sql)
                .bind(Uuid::new_v4())
                .bind(plan_id)
                .bind(item.vendor_id)
                .bind(item.service_item_id)
                .bind(item.source.as_str())
                .bind(&item.selection_reason)
                .bind(item.order_index)
                .fetch_one(&mut *tx)
                .await?;
            created.push(row.into());
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn find_plan_with_items(&self, plan_id: Uuid) -> ApiResult<Option<PlanDetail>> {
        let plan: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, users_info_id, title, total_budget, is_ai_generated, created_at
            FROM plans WHERE id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(plan) = plan else {
            return Ok(None);
        };

        let rows: Vec<PlanItemDetailRow> = sqlx::query_as(
            r#"
            SELECT pi.id, pi.plan_id, pi.vendor_id, pi.service_item_id, pi.source,
                   pi.selection_reason, pi.order_index, pi.is_confirmed,
                   v.category AS vendor_category, v.name AS vendor_name,
                   v.region AS vendor_region,
                   si.name AS service_item_name, si.price AS service_item_price
            FROM plan_items pi
            JOIN vendors v ON v.id = pi.vendor_id
            LEFT JOIN service_items si ON si.id = pi.service_item_id
            WHERE pi.plan_id = $1
            ORDER BY pi.order_index, pi.created_at
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;

        let vendor_ids: Vec<Uuid> = rows.iter().map(|r| r.item.vendor_id).collect();
        let mut prices = self.resource_prices(&vendor_ids).await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let vendor = Vendor {
                id: row.item.vendor_id,
                category: parse_category(&row.vendor_category)?,
                name: row.vendor_name,
                region: row.vendor_region,
            };
            let service_item = match (
                row.item.service_item_id,
                row.service_item_name,
                row.service_item_price,
            ) {
                (Some(id), Some(name), Some(price)) => Some(ServiceItem {
                    id,
                    vendor_id: vendor.id,
                    name,
                    price,
                }),
                _ => None,
            };
            let resource_prices = prices.remove(&vendor.id).unwrap_or_default();

            items.push(PlanItemDetail {
                item: row.item.into(),
                vendor,
                service_item,
                resource_prices,
            });
        }

        Ok(Some(PlanDetail {
            plan: plan.into(),
            items,
        }))
    }

    async fn update_plan_item(&self, item_id: Uuid, patch: PlanItemPatch) -> ApiResult<PlanItem> {
        let sql = format!(
            r#"
            UPDATE plan_items
            SET vendor_id = $2, service_item_id = $3, source = $4,
                selection_reason = $5, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            PLAN_ITEM_COLUMNS
        );

        let row: Option<PlanItemRow> = sqlx::query_as(&sql)
            .bind(item_id)
            .bind(patch.vendor_id)
            .bind(patch.service_item_id)
            .bind(patch.source.as_str())
            .bind(&patch.selection_reason)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PlanItem::from)
            .ok_or_else(|| ApiError::NotFound("Plan item not found".to_string()))
    }
}

#[async_trait]
impl ReservationStore for PgStore {
    async fn find_reservation(
        &self,
        plan_id: Uuid,
        vendor_id: Uuid,
    ) -> ApiResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            SELECT id, plan_id, vendor_id, user_id, reserved_date, created_at
            FROM reservations WHERE plan_id = $1 AND vendor_id = $2
            "#,
        )
        .bind(plan_id)
        .bind(vendor_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Reservation::from))
    }

    async fn create_reservation(&self, reservation: NewReservation) -> ApiResult<Reservation> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
            INSERT INTO reservations (id, plan_id, vendor_id, user_id, reserved_date)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (plan_id, vendor_id) DO NOTHING
            RETURNING id, plan_id, vendor_id, user_id, reserved_date, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(reservation.plan_id)
        .bind(reservation.vendor_id)
        .bind(reservation.user_id)
        .bind(reservation.reserved_date)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(ApiError::Conflict(
                "A reservation already exists for this vendor".to_string(),
            ));
        };

        sqlx::query(
            r#"
            UPDATE plan_items SET is_confirmed = true, updated_at = now()
            WHERE plan_id = $1 AND vendor_id = $2
            "#,
        )
        .bind(reservation.plan_id)
        .bind(reservation.vendor_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }
}

#[async_trait]
impl RecommendationLogSink for PgStore {
    async fn append(&self, entry: RecommendationLogEntry) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendation_logs
                (id, user_id, model, system_prompt, prompt, raw_response,
                 prompt_tokens, completion_tokens, total_tokens, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(&entry.model)
        .bind(&entry.system_prompt)
        .bind(&entry.prompt)
        .bind(&entry.raw_response)
        .bind(entry.usage.prompt_tokens as i32)
        .bind(entry.usage.completion_tokens as i32)
        .bind(entry.usage.total_tokens as i32)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to append recommendation log")?;

        Ok(())
    }
}
