//! Fixed-format page layout
//!
//! Lays a [`ReportDocument`] out on A4 portrait pages. Text is measured in
//! lines and characters per line derived from the page size, margins, font
//! size and line height, then wrapped and split across pages.

use serde::Serialize;

use crate::config::ReportConfig;

use super::document::{
    escape_html, header_html, Block, ReportDocument, BASE_CSS, NOT_GENERATED,
};
use super::ReportError;

const MM_PER_PT: f32 = 0.3528;
/// Average glyph width as a fraction of the font size
const AVG_CHAR_WIDTH_EM: f32 = 0.5;
/// Lines reserved at the bottom of each page for the footer
const FOOTER_LINES: usize = 2;
const BAR_CELLS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFormat {
    pub width_mm: f32,
    pub height_mm: f32,
    pub margin_mm: f32,
    pub font_size_pt: f32,
    pub line_height: f32,
}

impl PageFormat {
    pub const A4_WIDTH_MM: f32 = 210.0;
    pub const A4_HEIGHT_MM: f32 = 297.0;

    pub fn a4(config: &ReportConfig) -> Self {
        Self {
            width_mm: Self::A4_WIDTH_MM,
            height_mm: Self::A4_HEIGHT_MM,
            margin_mm: config.margin_mm,
            font_size_pt: config.font_size_pt,
            line_height: config.line_height,
        }
    }

    fn line_height_mm(&self) -> f32 {
        self.font_size_pt * MM_PER_PT * self.line_height
    }

    pub fn lines_per_page(&self) -> usize {
        let printable = self.height_mm - 2.0 * self.margin_mm;
        let lines = (printable / self.line_height_mm()).floor();
        if lines.is_finite() && lines > 0.0 {
            (lines as usize).saturating_sub(FOOTER_LINES)
        } else {
            0
        }
    }

    pub fn chars_per_line(&self) -> usize {
        let printable = self.width_mm - 2.0 * self.margin_mm;
        let chars = (printable / (self.font_size_pt * MM_PER_PT * AVG_CHAR_WIDTH_EM)).floor();
        if chars.is_finite() && chars > 0.0 {
            chars as usize
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "style", rename_all = "camelCase")]
pub enum LineStyle {
    Title,
    Heading,
    Body,
    Bullet,
    Bar { percent: f64 },
    Placeholder,
    Blank,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Line {
    pub text: String,
    #[serde(flatten)]
    pub style: LineStyle,
}

impl Line {
    fn new(text: impl Into<String>, style: LineStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }

    fn blank() -> Self {
        Self::new("", LineStyle::Blank)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Page {
    pub number: usize,
    pub lines: Vec<Line>,
}

/// Lays documents out on a fixed page format
#[derive(Debug, Clone)]
pub struct Paginator {
    format: PageFormat,
    lines_per_page: usize,
    chars_per_line: usize,
}

impl Paginator {
    pub fn new(format: PageFormat) -> Result<Self, ReportError> {
        let lines_per_page = format.lines_per_page();
        let chars_per_line = format.chars_per_line();

        // Heading plus one line must fit, and a bar needs its cells
        if lines_per_page < 2 || chars_per_line < BAR_CELLS / 2 {
            return Err(ReportError::Layout(format!(
                "page format holds {} lines of {} characters",
                lines_per_page, chars_per_line
            )));
        }

        Ok(Self {
            format,
            lines_per_page,
            chars_per_line,
        })
    }

    pub fn format(&self) -> &PageFormat {
        &self.format
    }

    pub fn layout(&self, doc: &ReportDocument) -> Vec<Page> {
        let mut pages = PageBuilder::new(self.lines_per_page);

        for text in wrap(&doc.header.title, self.chars_per_line) {
            pages.push(Line::new(text, LineStyle::Title));
        }
        pages.push(Line::new(
            format!(
                "{} | Asset {} | {}",
                doc.header.product,
                doc.header.asset_id,
                doc.header.date.format("%Y-%m-%d")
            ),
            LineStyle::Body,
        ));
        pages.push(Line::blank());

        for section in &doc.sections {
            if section.starts_new_page {
                pages.break_page();
            }

            // Keep a heading together with its first line
            if pages.remaining() < 2 {
                pages.break_page();
            }
            pages.push(Line::new(section.title.clone(), LineStyle::Heading));

            for block in &section.blocks {
                for line in self.block_lines(block) {
                    pages.push(line);
                }
            }
            pages.push(Line::blank());
        }

        pages.finish()
    }

    fn block_lines(&self, block: &Block) -> Vec<Line> {
        let width = self.chars_per_line;
        match block {
            Block::Paragraph { text } => wrap(text, width)
                .into_iter()
                .map(|l| Line::new(l, LineStyle::Body))
                .collect(),
            Block::Field { label, value } => wrap(&format!("{}: {}", label, value), width)
                .into_iter()
                .map(|l| Line::new(l, LineStyle::Body))
                .collect(),
            Block::Bullets { items } => items
                .iter()
                .flat_map(|item| {
                    wrap(item, width.saturating_sub(2))
                        .into_iter()
                        .enumerate()
                        .map(|(i, l)| {
                            let prefix = if i == 0 { "- " } else { "  " };
                            Line::new(format!("{}{}", prefix, l), LineStyle::Bullet)
                        })
                        .collect::<Vec<_>>()
                })
                .collect(),
            Block::Bar { label, percent } => {
                let mut lines: Vec<Line> = wrap(&format!("{} ({:.1}%)", label, percent), width)
                    .into_iter()
                    .map(|l| Line::new(l, LineStyle::Body))
                    .collect();
                lines.push(Line::new(
                    bar_cells(*percent),
                    LineStyle::Bar { percent: *percent },
                ));
                lines
            }
            Block::Placeholder => vec![Line::new(NOT_GENERATED, LineStyle::Placeholder)],
        }
    }

    /// Paginated HTML, one `.page` element per page
    pub fn render_html(&self, doc: &ReportDocument, pages: &[Page]) -> String {
        let total = pages.len();
        let mut body = String::new();

        for page in pages {
            body.push_str(r#"<div class="page">"#);
            if page.number == 1 {
                body.push_str(&header_html(&doc.header));
            }
            for line in &page.lines {
                if page.number == 1 && line.style == LineStyle::Title {
                    continue;
                }
                body.push_str(&line_html(line));
            }
            body.push_str(&format!(
                r#"<div class="footer">{} &middot; Page {} of {}</div></div>"#,
                escape_html(&doc.header.product),
                page.number,
                total
            ));
            body.push('\n');
        }

        let f = &self.format;
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
{base}
@page {{ size: {w}mm {h}mm; margin: 0; }}
.page {{ box-sizing: border-box; width: {w}mm; height: {h}mm; padding: {m}mm; position: relative; overflow: hidden; page-break-after: always; font-size: {fs}pt; line-height: {lh}; }}
.page .line {{ white-space: pre-wrap; min-height: {lh}em; }}
.page .heading {{ font-weight: 700; color: #0f766e; }}
.page .footer {{ position: absolute; bottom: {m}mm; left: {m}mm; right: {m}mm; text-align: right; color: #6b7280; font-size: 0.8em; }}
</style>
</head>
<body>
{body}</body>
</html>
"#,
            title = escape_html(&format!("{} - {}", doc.header.title, doc.header.asset_id)),
            base = BASE_CSS,
            w = f.width_mm,
            h = f.height_mm,
            m = f.margin_mm,
            fs = f.font_size_pt,
            lh = f.line_height,
            body = body
        )
    }
}

fn line_html(line: &Line) -> String {
    match &line.style {
        LineStyle::Blank => r#"<div class="line">&nbsp;</div>"#.to_string(),
        LineStyle::Title => format!(r#"<div class="line heading">{}</div>"#, escape_html(&line.text)),
        LineStyle::Heading => format!(r#"<div class="line heading">{}</div>"#, escape_html(&line.text)),
        LineStyle::Placeholder => {
            format!(r#"<div class="line placeholder">{}</div>"#, escape_html(&line.text))
        }
        LineStyle::Bar { percent } => format!(
            r#"<div class="line bar"><div class="track"><div class="fill" style="width: {:.1}%"></div></div></div>"#,
            percent.clamp(0.0, 100.0)
        ),
        LineStyle::Body | LineStyle::Bullet => {
            format!(r#"<div class="line">{}</div>"#, escape_html(&line.text))
        }
    }
}

fn bar_cells(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_CELLS as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_CELLS - filled))
}

/// Word wrap to `width` characters, splitting words that do not fit
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current));
                    current_len = 0;
                }
                let rest = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
            if needed > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(word.iter());
            current_len += word.len();
        }

        if current_len > 0 || lines.is_empty() {
            lines.push(current);
        }
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

struct PageBuilder {
    capacity: usize,
    pages: Vec<Page>,
    current: Vec<Line>,
}

impl PageBuilder {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pages: Vec::new(),
            current: Vec::new(),
        }
    }

    fn remaining(&self) -> usize {
        self.capacity - self.current.len()
    }

    fn push(&mut self, line: Line) {
        // No blank lines at the top of a page
        if self.current.is_empty() && line.style == LineStyle::Blank {
            return;
        }
        if self.current.len() >= self.capacity {
            self.break_page();
        }
        self.current.push(line);
    }

    fn break_page(&mut self) {
        if self.current.is_empty() {
            return;
        }
        let number = self.pages.len() + 1;
        self.pages.push(Page {
            number,
            lines: std::mem::take(&mut self.current),
        });
    }

    fn finish(mut self) -> Vec<Page> {
        self.break_page();
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::models::{ClassificationResult, FaultLabel};
    use crate::analysis::{AnalysisContext, Criticality, EnrichmentOutputs};
    use crate::report::document::SectionKind;
    use chrono::{TimeZone, Utc};

    fn doc(criticality: Criticality, summary: &str) -> ReportDocument {
        ReportDocument::build(
            "FRAInsight",
            &AnalysisContext {
                asset_id: "TX-1".to_string(),
                criticality,
                classification: ClassificationResult {
                    fault_label: FaultLabel::ThermalDegradation,
                    confidence: 0.7,
                    data_summary: summary.to_string(),
                },
            },
            &EnrichmentOutputs::default(),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_a4_defaults_fit_text() {
        let format = PageFormat::a4(&ReportConfig::default());
        assert!(format.lines_per_page() > 40);
        assert!(format.chars_per_line() > 80);
    }

    #[test]
    fn test_tiny_page_rejected() {
        let format = PageFormat {
            width_mm: 210.0,
            height_mm: 297.0,
            margin_mm: 140.0,
            font_size_pt: 10.0,
            line_height: 1.4,
        };
        assert!(matches!(Paginator::new(format), Err(ReportError::Layout(_))));
    }

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");

        let long = wrap("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(long, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn test_appendix_starts_new_page() {
        let paginator = Paginator::new(PageFormat::a4(&ReportConfig::default())).unwrap();
        let pages = paginator.layout(&doc(Criticality::High, "short"));

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].lines[0].text, SectionKind::ExpertRulesAppendix.title());
    }

    #[test]
    fn test_long_sections_split_across_pages() {
        let paginator = Paginator::new(PageFormat::a4(&ReportConfig::default())).unwrap();
        let summary = "resonance ".repeat(2_000);
        let pages = paginator.layout(&doc(Criticality::Low, &summary));

        assert!(pages.len() > 2);
        for page in &pages {
            assert!(page.lines.len() <= paginator.lines_per_page);
        }
        let numbers: Vec<usize> = pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, (1..=pages.len()).collect::<Vec<_>>());

        let html = paginator.render_html(&doc(Criticality::Low, &summary), &pages);
        assert_eq!(html.matches(r#"<div class="page">"#).count(), pages.len());
        assert!(html.contains(&format!("Page {} of {}", pages.len(), pages.len())));
    }
}
