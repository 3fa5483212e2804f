//! Vendor catalogue types
//!
//! Vendors belong to exactly one category. Candidates are the read-only view
//! of the resource index that the recommendation pipeline works with.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Vendor category.
///
/// The declaration order is the fixed order plan items are assembled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Venue,
    Studio,
    Dress,
    Makeup,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Venue,
        Category::Studio,
        Category::Dress,
        Category::Makeup,
    ];

    /// Key used in storage and in the model's JSON response.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Venue => "venue",
            Self::Studio => "studio",
            Self::Dress => "dress",
            Self::Makeup => "makeup",
        }
    }

    /// Human-readable label for prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Venue => "wedding venue",
            Self::Studio => "photo studio",
            Self::Dress => "dress shop",
            Self::Makeup => "hair and makeup",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "venue" | "wedding_hall" => Ok(Self::Venue),
            "studio" => Ok(Self::Studio),
            "dress" => Ok(Self::Dress),
            "makeup" => Ok(Self::Makeup),
            other => Err(format!("unknown vendor category: {}", other)),
        }
    }
}

/// Vendor record, the single source of truth for a vendor's category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vendor {
    pub id: Uuid,
    pub category: Category,
    pub name: String,
    pub region: Option<String>,
}

/// Selectable service tier offered by a vendor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceItem {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    /// Price in KRW.
    pub price: i64,
}

/// Metadata stored alongside a resource index entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CandidateMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_min: Option<i64>,
}

/// A vendor eligible for recommendation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub vendor_id: Uuid,
    pub category: Category,
    pub name: String,
    pub content: String,
    pub metadata: CandidateMetadata,
}

/// User constraints for a single recommendation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Constraints {
    #[serde(default)]
    pub wedding_date: Option<NaiveDate>,
    #[serde(default)]
    pub preferred_region: Option<String>,
    /// Budget in KRW.
    #[serde(default)]
    pub budget_limit: Option<i64>,
}

/// Query params for similar-vendor lookup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimilarVendorsQuery {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub budget_limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_order_is_venue_studio_dress_makeup() {
        let mut shuffled = vec![Category::Makeup, Category::Venue, Category::Dress, Category::Studio];
        shuffled.sort();
        assert_eq!(shuffled, Category::ALL.to_vec());
    }

    #[test]
    fn category_parses_storage_keys() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert_eq!("WEDDING_HALL".parse::<Category>(), Ok(Category::Venue));
        assert!("florist".parse::<Category>().is_err());
    }

    #[test]
    fn metadata_tolerates_missing_fields() {
        let meta: CandidateMetadata = serde_json::from_str(r#"{"region":"Seoul"}"#).unwrap();
        assert_eq!(meta.region.as_deref(), Some("Seoul"));
        assert_eq!(meta.price_min, None);
    }
}
