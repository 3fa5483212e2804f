//! Budget reconciliation for existing plans.
//!
//! Price precedence per item: selected service item, then the first
//! `price_min` estimate of the vendor's resources, then zero.

use uuid::Uuid;

use crate::domain::plans::PlanItemDetail;

/// Money committed by `items`, skipping the item for `exclude_vendor_id`.
pub fn committed_budget(items: &[PlanItemDetail], exclude_vendor_id: Option<Uuid>) -> i64 {
    items
        .iter()
        .filter(|i| Some(i.item.vendor_id) != exclude_vendor_id)
        .map(item_contribution)
        .sum()
}

pub fn item_contribution(item: &PlanItemDetail) -> i64 {
    if let Some(service_item) = &item.service_item {
        return service_item.price;
    }
    item.resource_prices.first().copied().unwrap_or(0)
}

/// Budget left for one slot; never negative. `None` means no limit.
pub fn remaining_budget(budget_limit: Option<i64>, committed: i64) -> Option<i64> {
    budget_limit.map(|limit| (limit - committed).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::plans::{PlanItem, PlanItemSource};
    use crate::domain::vendors::{Category, ServiceItem, Vendor};

    fn item(category: Category, service_price: Option<i64>, resource_prices: Vec<i64>) -> PlanItemDetail {
        let vendor = Vendor {
            id: Uuid::new_v4(),
            category,
            name: category.label().to_string(),
            region: None,
        };
        let service_item = service_price.map(|price| ServiceItem {
            id: Uuid::new_v4(),
            vendor_id: vendor.id,
            name: "Package".to_string(),
            price,
        });
        PlanItemDetail {
            item: PlanItem {
                id: Uuid::new_v4(),
                plan_id: Uuid::nil(),
                vendor_id: vendor.id,
                service_item_id: service_item.as_ref().map(|s| s.id),
                source: PlanItemSource::AiRecommend,
                selection_reason: None,
                order_index: 0,
                is_confirmed: false,
            },
            vendor,
            service_item,
            resource_prices,
        }
    }

    #[test]
    fn service_item_price_beats_resource_estimate() {
        let both = item(Category::Dress, Some(3_000_000), vec![1_000_000]);
        assert_eq!(item_contribution(&both), 3_000_000);
    }

    #[test]
    fn first_resource_estimate_is_used_without_service_item() {
        let estimate = item(Category::Dress, None, vec![5_000_000, 7_000_000]);
        assert_eq!(item_contribution(&estimate), 5_000_000);
        assert_eq!(item_contribution(&item(Category::Makeup, None, vec![])), 0);
    }

    #[test]
    fn excluded_vendor_contributes_nothing() {
        let studio = item(Category::Studio, Some(10_000_000), vec![]);
        let dress = item(Category::Dress, None, vec![5_000_000]);
        let makeup = item(Category::Makeup, None, vec![]);
        let target = studio.item.vendor_id;
        let items = vec![studio, dress, makeup];

        let committed = committed_budget(&items, Some(target));
        assert_eq!(committed, 5_000_000);
        assert_eq!(remaining_budget(Some(50_000_000), committed), Some(45_000_000));
        assert_eq!(committed_budget(&items, None), 15_000_000);
    }

    #[test]
    fn remaining_budget_saturates_and_respects_no_limit() {
        assert_eq!(remaining_budget(Some(1_000), 5_000), Some(0));
        assert_eq!(remaining_budget(None, 5_000), None);
    }
}
