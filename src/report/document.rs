//! Report document model and styled HTML snapshot

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::analysis::{AnalysisContext, Criticality, EnrichmentOutputs};

/// Shown in place of an enrichment that has not resolved
pub const NOT_GENERATED: &str = "Not generated";

/// Body sections in their fixed order
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SectionKind {
    AssetBanner,
    FaultSummary,
    ConfidenceScore,
    RawDataSummary,
    AiExplanation,
    RecommendedActions,
    ContributingFactors,
    ExpertRulesAppendix,
}

impl SectionKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::AssetBanner => "Asset",
            Self::FaultSummary => "Fault Summary",
            Self::ConfidenceScore => "Confidence Score",
            Self::RawDataSummary => "Raw FRA Data Summary",
            Self::AiExplanation => "AI Explanation",
            Self::RecommendedActions => "Recommended Actions",
            Self::ContributingFactors => "Contributing Factors",
            Self::ExpertRulesAppendix => "Appendix: Expert System Rules",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Block {
    Paragraph { text: String },
    Field { label: String, value: String },
    Bullets { items: Vec<String> },
    /// Horizontal bar; `percent` is the value as given, clamped only when drawn
    Bar { label: String, percent: f64 },
    Placeholder,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub title: String,
    pub blocks: Vec<Block>,
    pub starts_new_page: bool,
}

impl Section {
    fn new(kind: SectionKind, blocks: Vec<Block>) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            blocks,
            starts_new_page: kind == SectionKind::ExpertRulesAppendix,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.blocks.as_slice(), [Block::Placeholder])
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportHeader {
    pub product: String,
    pub title: String,
    pub asset_id: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportDocument {
    pub header: ReportHeader,
    pub sections: Vec<Section>,
}

impl ReportDocument {
    pub fn build(
        product: &str,
        context: &AnalysisContext,
        outputs: &EnrichmentOutputs,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let classification = &context.classification;

        let header = ReportHeader {
            product: product.to_string(),
            title: "Transformer FRA Analysis Report".to_string(),
            asset_id: context.asset_id.clone(),
            date: generated_at.date_naive(),
        };

        let mut fault_blocks = vec![Block::Field {
            label: "Fault classification".to_string(),
            value: classification.fault_label.to_string(),
        }];
        if let Some(compass) = outputs.compass() {
            fault_blocks.push(Block::Field {
                label: "Diagnostic compass".to_string(),
                value: format!("{:.0}°", compass.angle_degrees),
            });
        }

        let confidence_pct = classification.confidence * 100.0;

        let mut sections = vec![
            Section::new(
                SectionKind::AssetBanner,
                vec![
                    Block::Field {
                        label: "Asset".to_string(),
                        value: context.asset_id.clone(),
                    },
                    Block::Field {
                        label: "Criticality".to_string(),
                        value: context.criticality.to_string(),
                    },
                ],
            ),
            Section::new(SectionKind::FaultSummary, fault_blocks),
            Section::new(
                SectionKind::ConfidenceScore,
                vec![Block::Bar {
                    label: format!("{:.1}%", confidence_pct),
                    percent: confidence_pct,
                }],
            ),
            Section::new(
                SectionKind::RawDataSummary,
                vec![Block::Paragraph {
                    text: classification.data_summary.clone(),
                }],
            ),
            Section::new(
                SectionKind::AiExplanation,
                or_placeholder(outputs.explanation().map(|e| {
                    vec![Block::Paragraph {
                        text: e.explanation.clone(),
                    }]
                })),
            ),
            Section::new(
                SectionKind::RecommendedActions,
                or_placeholder(outputs.insights().map(|insights| {
                    let mut blocks = Vec::new();
                    if let Some(summary) = &insights.summary {
                        blocks.push(Block::Paragraph {
                            text: summary.clone(),
                        });
                    }
                    blocks.push(Block::Bullets {
                        items: insights.recommended_actions.clone(),
                    });
                    blocks
                })),
            ),
            Section::new(
                SectionKind::ContributingFactors,
                or_placeholder(outputs.factors().map(|breakdown| {
                    breakdown
                        .factors
                        .iter()
                        .map(|f| Block::Bar {
                            label: f.name.clone(),
                            percent: f.influence_percent,
                        })
                        .collect()
                })),
            ),
        ];

        if context.criticality == Criticality::High {
            sections.push(Section::new(
                SectionKind::ExpertRulesAppendix,
                or_placeholder(outputs.rules().map(|set| {
                    vec![Block::Bullets {
                        items: set
                            .rules
                            .iter()
                            .map(|r| {
                                format!("[{}] If {}, then {}", r.priority, r.condition, r.action)
                            })
                            .collect(),
                    }]
                })),
            ));
        }

        Self { header, sections }
    }

    pub fn section_kinds(&self) -> Vec<SectionKind> {
        self.sections.iter().map(|s| s.kind).collect()
    }

    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Single-flow styled snapshot of the whole document
    pub fn to_html(&self) -> String {
        let mut body = String::new();
        for section in &self.sections {
            body.push_str(&section_html(section));
        }

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>{css}</style>
</head>
<body>
<div class="report">
{header}
{body}
</div>
</body>
</html>
"#,
            title = escape_html(&format!("{} - {}", self.header.title, self.header.asset_id)),
            css = BASE_CSS,
            header = header_html(&self.header),
            body = body
        )
    }
}

fn or_placeholder(blocks: Option<Vec<Block>>) -> Vec<Block> {
    match blocks {
        Some(blocks) if !blocks.is_empty() => blocks,
        _ => vec![Block::Placeholder],
    }
}

pub(crate) const BASE_CSS: &str = "\
body { font-family: 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; color: #1f2937; margin: 0; }\n\
.report-header { border-bottom: 3px solid #0f766e; margin-bottom: 12px; }\n\
.report-header .product { color: #0f766e; font-weight: 700; letter-spacing: 0.05em; }\n\
.report-header h1 { margin: 4px 0; font-size: 1.5em; }\n\
.report-header .meta { color: #6b7280; }\n\
section.body { margin: 10px 0; }\n\
section.body h2 { font-size: 1.1em; border-left: 4px solid #0f766e; padding-left: 6px; }\n\
.field .label { color: #6b7280; margin-right: 6px; }\n\
.placeholder { color: #9ca3af; font-style: italic; }\n\
.bar { margin: 4px 0; }\n\
.bar .track { background: #e5e7eb; height: 10px; border-radius: 5px; }\n\
.bar .fill { background: #0f766e; height: 10px; border-radius: 5px; }\n\
.new-page { page-break-before: always; }\n";

pub(crate) fn header_html(header: &ReportHeader) -> String {
    format!(
        r#"<header class="report-header"><div class="product">{}</div><h1>{}</h1><div class="meta">Asset {} &middot; {}</div></header>"#,
        escape_html(&header.product),
        escape_html(&header.title),
        escape_html(&header.asset_id),
        header.date.format("%Y-%m-%d")
    )
}

fn section_html(section: &Section) -> String {
    let class = if section.starts_new_page {
        "body new-page"
    } else {
        "body"
    };

    let mut html = format!(
        r#"<section class="{}" data-section="{:?}"><h2>{}</h2>"#,
        class,
        section.kind,
        escape_html(&section.title)
    );
    for block in &section.blocks {
        html.push_str(&block_html(block));
    }
    html.push_str("</section>\n");
    html
}

pub(crate) fn block_html(block: &Block) -> String {
    match block {
        Block::Paragraph { text } => format!("<p>{}</p>", escape_html(text)),
        Block::Field { label, value } => format!(
            r#"<div class="field"><span class="label">{}</span><span class="value">{}</span></div>"#,
            escape_html(label),
            escape_html(value)
        ),
        Block::Bullets { items } => {
            let items: String = items
                .iter()
                .map(|item| format!("<li>{}</li>", escape_html(item)))
                .collect();
            format!("<ul>{}</ul>", items)
        }
        Block::Bar { label, percent } => format!(
            r#"<div class="bar"><div class="bar-label">{} ({:.1}%)</div><div class="track"><div class="fill" style="width: {:.1}%"></div></div></div>"#,
            escape_html(label),
            percent,
            percent.clamp(0.0, 100.0)
        ),
        Block::Placeholder => format!(r#"<p class="placeholder">{}</p>"#, NOT_GENERATED),
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
