//! Prompt templates for the model-backed steps

use crate::llm::Prompt;

use super::models::{AnalysisContext, EnrichmentKind, FaultLabel};
use super::validator::AnalysisRequest;

/// Upper bound on raw file text sent for classification
pub const MAX_CONTENT_CHARS: usize = 24_000;

const SYSTEM_PREAMBLE: &str = "You are a power transformer diagnostics engineer specialising in \
Frequency Response Analysis (FRA). Answer with a single JSON object and nothing else.";

fn taxonomy() -> String {
    FaultLabel::ALL
        .iter()
        .map(|label| format!("\"{}\"", label))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn context_block(ctx: &AnalysisContext) -> String {
    format!(
        "Asset: {}\nCriticality: {}\nFault classification: {}\nConfidence: {:.2}\nFRA data summary: {}",
        ctx.asset_id,
        ctx.criticality,
        ctx.classification.fault_label,
        ctx.classification.confidence,
        ctx.classification.data_summary
    )
}

pub fn classification(request: &AnalysisRequest) -> Prompt {
    let content = truncate_chars(request.content(), MAX_CONTENT_CHARS);
    let truncated = if content.len() < request.content().len() {
        "\n(File truncated.)"
    } else {
        ""
    };

    let system = format!(
        "{} Classify the fault shown by the FRA measurement into exactly one of: {}. \
Respond with {{\"faultClassification\": string, \"confidenceScore\": number between 0 and 1, \
\"rawFraDataSummary\": string}}.",
        SYSTEM_PREAMBLE,
        taxonomy()
    );

    let user = format!(
        "Asset: {}\nCriticality: {}\nFile: {}\n\nFRA data:\n{}{}",
        request.asset_id(),
        request.criticality(),
        request.file_name(),
        content,
        truncated
    );

    Prompt::new("classify", system, user)
}

pub fn enrichment(kind: EnrichmentKind, ctx: &AnalysisContext) -> Prompt {
    let (operation, instruction) = match kind {
        EnrichmentKind::Explanation => (
            "explanation",
            "Explain in plain language what this fault means for the transformer, \
how it shows up in the FRA trace and what happens if it is left untreated. \
Respond with {\"explanation\": string}.",
        ),
        EnrichmentKind::Insights => (
            "insights",
            "Give actionable maintenance recommendations, most urgent first. \
Respond with {\"recommendedActions\": [string], \"summary\": string}.",
        ),
        EnrichmentKind::Factors => (
            "factors",
            "Break the fault down into 3 to 5 contributing factors with their influence in \
percent. The influences must sum to exactly 100. \
Respond with {\"factors\": [{\"name\": string, \"influencePercent\": number}]}.",
        ),
        EnrichmentKind::CompassAngle => (
            "compass",
            "Place the fault on a 0-360 degree diagnostic compass with anchors \
Mechanical=0, Core=90, Winding=180, Thermal=270. Faults spanning two categories \
sit between their anchors; No Fault is 0. \
Respond with {\"angleDegrees\": number, \"rationale\": string}.",
        ),
        EnrichmentKind::Rules => (
            "rules",
            "Suggest expert-system rules for monitoring this asset going forward. \
Respond with {\"rules\": [{\"condition\": string, \"action\": string, \
\"priority\": \"High\" | \"Medium\" | \"Low\"}]}.",
        ),
        EnrichmentKind::Costs => (
            "costs",
            "Estimate repair and replacement costs and expected downtime. \
Respond with {\"currency\": string, \"repairMin\": number, \"repairMax\": number, \
\"replacementCost\": number, \"downtimeDays\": number, \
\"lineItems\": [{\"description\": string, \"amount\": number}]}.",
        ),
    };

    Prompt::new(
        operation,
        format!("{} {}", SYSTEM_PREAMBLE, instruction),
        context_block(ctx),
    )
}

pub fn assistant(question: &str, ctx: Option<&AnalysisContext>) -> Prompt {
    let system = format!(
        "{} You are the assistant of a transformer fleet operations dashboard. \
Respond with {{\"answer\": string}}.",
        SYSTEM_PREAMBLE
    );

    let user = match ctx {
        Some(ctx) => format!("Current analysis:\n{}\n\nQuestion: {}", context_block(ctx), question),
        None => format!("Question: {}", question),
    };

    Prompt::new("assistant", system, user)
}
