//! Recommendation types shared by the generation pipeline and the API.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::vendors::{Category, Constraints};

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw output of one recommendation call.
#[derive(Debug, Clone)]
pub struct Completion {
    pub raw_json_text: String,
    pub usage: TokenUsage,
}

/// Request for a recommendation that is not persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    #[serde(flatten)]
    pub constraints: Constraints,
    /// Defaults to every category.
    #[serde(default)]
    pub categories: Option<Vec<Category>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PickView {
    pub vendor_id: Uuid,
    pub name: String,
    pub selection_reason: String,
}

/// API shape of a validated recommendation: one key per requested category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationView {
    pub picks: BTreeMap<Category, Option<PickView>>,
    pub overall_reason: String,
    /// Set when nothing could be recommended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}
