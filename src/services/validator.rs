//! Validation of generative model output against the real candidate set.
//!
//! Parsing and validation are separate phases. A [`ValidatedPick`] can only be
//! produced here, after its vendor id was found in the candidate set that was
//! sent to the model for that category and request.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::domain::recommendation::{PickView, RecommendationView};
use crate::domain::vendors::{Candidate, Category};
use crate::error::{ApiError, ApiResult};
use crate::services::candidates::{self, CandidateSets};
use crate::services::prompt::OVERALL_REASON_KEY;

pub const DEFAULT_OVERALL_REASON: &str =
    "These vendors fit your wedding date, region and budget best among the available options.";

pub const NO_RECOMMENDATION_SUMMARY: &str = "No vendors match your current conditions.";

pub const NO_RECOMMENDATION_REASON: &str =
    "Try widening the preferred region or raising the budget to see recommendations.";

/// A vendor pick whose id is known to be in the supplied candidate set.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPick {
    vendor_id: Uuid,
    category: Category,
    name: String,
    selection_reason: String,
}

impl ValidatedPick {
    pub fn vendor_id(&self) -> Uuid {
        self.vendor_id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn selection_reason(&self) -> &str {
        &self.selection_reason
    }
}

/// Why a category has no usable pick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The category had no candidates, or the model returned null.
    #[error("not recommended")]
    NotRecommended,
    /// The model named a vendor outside the candidate set.
    #[error("unknown vendor {0}")]
    UnknownVendor(String),
    /// The entry was not an object with a `vendor_id`.
    #[error("malformed entry: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickVerdict {
    Valid(ValidatedPick),
    Rejected(RejectReason),
}

/// Per-category verdicts for one model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecommendation {
    verdicts: BTreeMap<Category, PickVerdict>,
    overall_reason: String,
}

impl ValidatedRecommendation {
    pub fn pick(&self, category: Category) -> Option<&ValidatedPick> {
        match self.verdicts.get(&category) {
            Some(PickVerdict::Valid(pick)) => Some(pick),
            _ => None,
        }
    }

    pub fn verdict(&self, category: Category) -> Option<&PickVerdict> {
        self.verdicts.get(&category)
    }

    /// Valid picks in the fixed category order.
    pub fn picks(&self) -> impl Iterator<Item = &ValidatedPick> {
        Category::ALL.into_iter().filter_map(move |c| self.pick(c))
    }

    pub fn overall_reason(&self) -> &str {
        &self.overall_reason
    }

    pub fn to_view(&self) -> RecommendationView {
        let picks = self
            .verdicts
            .iter()
            .map(|(category, verdict)| {
                let view = match verdict {
                    PickVerdict::Valid(pick) => Some(PickView {
                        vendor_id: pick.vendor_id,
                        name: pick.name.clone(),
                        selection_reason: pick.selection_reason.clone(),
                    }),
                    PickVerdict::Rejected(_) => None,
                };
                (*category, view)
            })
            .collect();

        RecommendationView {
            picks,
            overall_reason: self.overall_reason.clone(),
            summary: None,
        }
    }
}

/// Outcome of validating one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    Recommended(ValidatedRecommendation),
    /// Every category resolved to null.
    NothingPossible {
        summary: &'static str,
        overall_reason: &'static str,
    },
}

impl Validation {
    fn nothing_possible() -> Self {
        Self::NothingPossible {
            summary: NO_RECOMMENDATION_SUMMARY,
            overall_reason: NO_RECOMMENDATION_REASON,
        }
    }

    pub fn recommendation(&self) -> Option<&ValidatedRecommendation> {
        match self {
            Self::Recommended(rec) => Some(rec),
            Self::NothingPossible { .. } => None,
        }
    }

    pub fn into_recommendation(self) -> Option<ValidatedRecommendation> {
        match self {
            Self::Recommended(rec) => Some(rec),
            Self::NothingPossible { .. } => None,
        }
    }
}

/// Outcome used when no category had any candidate, so the model is skipped.
pub fn no_candidates() -> Validation {
    Validation::nothing_possible()
}

#[derive(Debug, Deserialize)]
struct RawPick {
    #[serde(default)]
    vendor_id: Option<serde_json::Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    selection_reason: Option<String>,
}

/// Parse `raw_json` and check every category of `candidates` against it.
///
/// Malformed JSON is a provider failure. Unknown vendor ids only drop their
/// own category.
pub fn validate(raw_json: &str, candidates: &CandidateSets) -> ApiResult<Validation> {
    if candidates::is_empty(candidates) {
        return Ok(Validation::nothing_possible());
    }

    let parsed: serde_json::Value = serde_json::from_str(raw_json.trim())
        .map_err(|e| ApiError::Provider(format!("Malformed recommendation JSON: {}", e)))?;
    let object = parsed
        .as_object()
        .ok_or_else(|| ApiError::Provider("Recommendation is not a JSON object".to_string()))?;

    let mut verdicts = BTreeMap::new();
    for (category, pool) in candidates {
        let verdict = match object.get(category.as_str()) {
            None | Some(serde_json::Value::Null) => PickVerdict::Rejected(RejectReason::NotRecommended),
            Some(entry) => check_entry(*category, entry, pool),
        };
        verdicts.insert(*category, verdict);
    }

    if !verdicts.values().any(|v| matches!(v, PickVerdict::Valid(_))) {
        return Ok(Validation::nothing_possible());
    }

    let overall_reason = object
        .get(OVERALL_REASON_KEY)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_OVERALL_REASON)
        .to_string();

    Ok(Validation::Recommended(ValidatedRecommendation {
        verdicts,
        overall_reason,
    }))
}

fn check_entry(category: Category, entry: &serde_json::Value, pool: &[Candidate]) -> PickVerdict {
    let raw: RawPick = match serde_json::from_value(entry.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(category = %category, error = %e, "Malformed recommendation entry");
            return PickVerdict::Rejected(RejectReason::Malformed(e.to_string()));
        }
    };

    let vendor_id = match raw.vendor_id {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => {
            warn!(category = %category, "Recommendation entry has no vendor_id");
            return PickVerdict::Rejected(RejectReason::Malformed("missing vendor_id".to_string()));
        }
    };

    let matched = Uuid::parse_str(&vendor_id)
        .ok()
        .and_then(|id| pool.iter().find(|c| c.vendor_id == id));

    match matched {
        Some(candidate) => PickVerdict::Valid(ValidatedPick {
            vendor_id: candidate.vendor_id,
            category,
            name: raw
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| candidate.name.clone()),
            selection_reason: raw.selection_reason.unwrap_or_default(),
        }),
        None => {
            warn!(
                category = %category,
                vendor_id = %vendor_id,
                "Model recommended a vendor outside the candidate set; dropping"
            );
            PickVerdict::Rejected(RejectReason::UnknownVendor(vendor_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vendors::CandidateMetadata;

    fn candidate(category: Category, name: &str) -> Candidate {
        Candidate {
            vendor_id: Uuid::new_v4(),
            category,
            name: name.to_string(),
            content: String::new(),
            metadata: CandidateMetadata::default(),
        }
    }

    /// studio=[A], dress=[], makeup=[B]
    fn scenario() -> (CandidateSets, Candidate, Candidate) {
        let a = candidate(Category::Studio, "A Studio");
        let b = candidate(Category::Makeup, "B Makeup");
        let mut sets = CandidateSets::new();
        sets.insert(Category::Studio, vec![a.clone()]);
        sets.insert(Category::Dress, vec![]);
        sets.insert(Category::Makeup, vec![b.clone()]);
        (sets, a, b)
    }

    #[test]
    fn hallucinated_vendor_drops_only_its_category() {
        let (sets, a, _) = scenario();
        let c = Uuid::new_v4();
        let raw = format!(
            r#"{{"studio": {{"vendor_id": "{}", "selection_reason": "bright sets"}},
                "dress": null,
                "makeup": {{"vendor_id": "{}", "name": "Ghost"}},
                "overall_reason": "balanced"}}"#,
            a.vendor_id, c
        );

        let validation = validate(&raw, &sets).unwrap();
        let rec = validation.recommendation().unwrap();

        let studio = rec.pick(Category::Studio).unwrap();
        assert_eq!(studio.vendor_id(), a.vendor_id);
        assert_eq!(studio.name(), "A Studio");
        assert_eq!(studio.selection_reason(), "bright sets");
        assert_eq!(rec.pick(Category::Dress), None);
        assert_eq!(
            rec.verdict(Category::Makeup),
            Some(&PickVerdict::Rejected(RejectReason::UnknownVendor(c.to_string())))
        );
        assert_eq!(rec.overall_reason(), "balanced");
        assert_eq!(rec.picks().count(), 1);
    }

    #[test]
    fn every_valid_pick_is_in_its_category_candidates() {
        let (sets, a, b) = scenario();
        // Cross-category id: A is a studio, so it cannot satisfy makeup
        let raw = format!(
            r#"{{"studio": {{"vendor_id": "{}"}}, "makeup": {{"vendor_id": "{}"}}}}"#,
            b.vendor_id, a.vendor_id
        );
        let validation = validate(&raw, &sets).unwrap();
        assert_eq!(validation, expected_nothing_possible());

        let raw = format!(r#"{{"makeup": {{"vendor_id": "{}"}}}}"#, b.vendor_id);
        let rec = validate(&raw, &sets).unwrap().into_recommendation().unwrap();
        for pick in rec.picks() {
            assert!(sets[&pick.category()].iter().any(|c| c.vendor_id == pick.vendor_id()));
        }
    }

    fn expected_nothing_possible() -> Validation {
        Validation::NothingPossible {
            summary: NO_RECOMMENDATION_SUMMARY,
            overall_reason: NO_RECOMMENDATION_REASON,
        }
    }

    #[test]
    fn missing_overall_reason_gets_default() {
        let (sets, a, _) = scenario();
        let raw = format!(r#"{{"studio": {{"vendor_id": "{}"}}}}"#, a.vendor_id);
        let rec = validate(&raw, &sets).unwrap().into_recommendation().unwrap();
        assert_eq!(rec.overall_reason(), DEFAULT_OVERALL_REASON);
    }

    #[test]
    fn malformed_json_is_a_provider_failure() {
        let (sets, _, _) = scenario();
        let err = validate("{not json", &sets).unwrap_err();
        assert!(matches!(err, ApiError::Provider(_)));

        let err = validate("[1, 2]", &sets).unwrap_err();
        assert!(matches!(err, ApiError::Provider(_)));
    }

    #[test]
    fn malformed_entries_are_rejected_locally() {
        let (sets, a, _) = scenario();
        let raw = format!(
            r#"{{"studio": {{"vendor_id": "{}"}}, "makeup": "B Makeup"}}"#,
            a.vendor_id
        );
        let rec = validate(&raw, &sets).unwrap().into_recommendation().unwrap();
        assert!(matches!(
            rec.verdict(Category::Makeup),
            Some(PickVerdict::Rejected(RejectReason::Malformed(_)))
        ));
    }

    #[test]
    fn no_candidates_anywhere_short_circuits() {
        let mut sets = CandidateSets::new();
        sets.insert(Category::Venue, vec![]);
        sets.insert(Category::Dress, vec![]);
        // Raw text is not even parsed
        assert_eq!(validate("garbage", &sets).unwrap(), expected_nothing_possible());
        assert_eq!(no_candidates(), expected_nothing_possible());
    }

    #[test]
    fn view_has_a_key_for_every_requested_category() {
        let (sets, a, _) = scenario();
        let raw = format!(r#"{{"studio": {{"vendor_id": "{}"}}}}"#, a.vendor_id);
        let view = validate(&raw, &sets).unwrap().into_recommendation().unwrap().to_view();

        assert_eq!(view.picks.len(), 3);
        assert_eq!(view.picks[&Category::Studio].as_ref().unwrap().vendor_id, a.vendor_id);
        assert!(view.picks[&Category::Makeup].is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert!(json["picks"]["dress"].is_null());
    }
}
