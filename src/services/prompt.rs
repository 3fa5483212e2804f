//! Prompt construction for vendor recommendations.
//!
//! The response format section is consumed mechanically by the validator, so
//! its keys must stay in sync with [`Category::as_str`] and
//! [`OVERALL_REASON_KEY`].
//!
//! [`Category::as_str`]: crate::domain::vendors::Category::as_str

use std::fmt::Write;

use crate::domain::vendors::{Candidate, Constraints};
use crate::services::candidates::CandidateSets;

pub const OVERALL_REASON_KEY: &str = "overall_reason";

pub const SYSTEM_PROMPT: &str = "You are a wedding-planning assistant. Recommend vendors strictly \
from the candidates you are given, never invent vendors or ids, and answer with a single JSON \
object in the requested format.";

/// Longest candidate description passed to the model, in characters.
const MAX_CONTENT_CHARS: usize = 300;

/// What the prompt asks the model to do.
#[derive(Debug, Clone)]
pub enum PromptPurpose {
    /// Pick one vendor per category for a new plan.
    Combination,
    /// Pick one replacement vendor for a single plan slot.
    Replacement { replaced_vendor_name: String },
}

pub struct PromptBuilder<'a> {
    constraints: &'a Constraints,
    candidates: &'a CandidateSets,
    purpose: PromptPurpose,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(constraints: &'a Constraints, candidates: &'a CandidateSets) -> Self {
        Self {
            constraints,
            candidates,
            purpose: PromptPurpose::Combination,
        }
    }

    pub fn purpose(mut self, purpose: PromptPurpose) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn build(&self) -> String {
        let mut out = String::new();

        match &self.purpose {
            PromptPurpose::Combination => {
                out.push_str("Recommend one vendor per category for the couple below.\n\n");
            }
            PromptPurpose::Replacement { replaced_vendor_name } => {
                let _ = writeln!(
                    out,
                    "The couple wants to replace \"{}\". Recommend one different vendor for the \
                     category below. The budget shown is what remains after their other choices.\n",
                    replaced_vendor_name
                );
            }
        }

        self.write_constraints(&mut out);
        self.write_candidates(&mut out);
        self.write_rules(&mut out);
        self.write_response_format(&mut out);
        out
    }

    fn write_constraints(&self, out: &mut String) {
        let c = self.constraints;
        out.push_str("## Wedding conditions\n");
        let _ = writeln!(
            out,
            "- Wedding date: {}",
            c.wedding_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "not decided".to_string())
        );
        let _ = writeln!(
            out,
            "- Preferred region: {}",
            c.preferred_region.as_deref().unwrap_or("no preference")
        );
        let _ = writeln!(
            out,
            "- Budget limit: {}",
            c.budget_limit
                .map(|b| format!("{} KRW", format_krw(b)))
                .unwrap_or_else(|| "no limit".to_string())
        );
        out.push('\n');
    }

    fn write_candidates(&self, out: &mut String) {
        out.push_str("## Candidates\n");
        for (category, candidates) in self.candidates {
            let _ = writeln!(out, "### {} ({})", category.as_str(), category.label());
            if candidates.is_empty() {
                let _ = writeln!(
                    out,
                    "No candidates. \"{}\" must be null.",
                    category.as_str()
                );
            }
            for (i, candidate) in candidates.iter().enumerate() {
                write_candidate(out, i + 1, candidate);
            }
            out.push('\n');
        }
    }

    fn write_rules(&self, out: &mut String) {
        out.push_str("## Rules\n");
        out.push_str("- Choose only from the candidates listed above and copy their id exactly.\n");
        out.push_str("- A category with no candidates must be returned as null.\n");
        out.push_str("- Keep the total within the budget limit when prices are known.\n");
        out.push_str("- Write every reason in one or two sentences.\n\n");
    }

    fn write_response_format(&self, out: &mut String) {
        out.push_str("## Response format\nRespond with JSON only, exactly in this shape:\n");
        out.push_str(&self.response_example());
    }

    /// Literal example of the expected JSON object.
    pub fn response_example(&self) -> String {
        let mut lines: Vec<String> = self
            .candidates
            .iter()
            .map(|(category, candidates)| {
                if candidates.is_empty() {
                    format!("  \"{}\": null", category.as_str())
                } else {
                    format!(
                        "  \"{}\": {{\"vendor_id\": \"<candidate id>\", \"name\": \"<vendor name>\", \"selection_reason\": \"<why this vendor>\"}}",
                        category.as_str()
                    )
                }
            })
            .collect();
        lines.push(format!(
            "  \"{}\": \"<why this combination suits the couple>\"",
            OVERALL_REASON_KEY
        ));
        format!("{{\n{}\n}}\n", lines.join(",\n"))
    }
}

fn write_candidate(out: &mut String, number: usize, candidate: &Candidate) {
    let _ = writeln!(out, "{}. [id: {}] {}", number, candidate.vendor_id, candidate.name);
    let description = truncate_chars(candidate.content.trim(), MAX_CONTENT_CHARS);
    if !description.is_empty() {
        let _ = writeln!(out, "   - description: {}", description);
    }
    if let Some(region) = &candidate.metadata.region {
        let _ = writeln!(out, "   - region: {}", region);
    }
    if let Some(price) = candidate.metadata.price_min {
        let _ = writeln!(out, "   - estimated minimum price: {} KRW", format_krw(price));
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// 50000000 -> "50,000,000"
pub fn format_krw(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
