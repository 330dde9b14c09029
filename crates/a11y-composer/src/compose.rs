//! Report content: cover, legend and one block per violation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use a11y_types::{EvidenceKey, EvidenceLayout, EvidenceRole, Impact, ScanResult, Violation};

use crate::error::ComposeError;
use crate::layout::{Align, PageLayout, RasterImage, TextStyle};
use crate::render::render_pdf;
use crate::style::{
    impact_color, Color, Font, FONT_SIZE_LARGE, FONT_SIZE_MEDIUM, FONT_SIZE_SMALL, FONT_SIZE_TITLE,
    INDENT, LEGEND_SQUARE, LINE_SPACING, MARGIN, MAX_Y, PAGE_HEIGHT, WORK_WIDTH,
};

const WCAG_URL: &str = "https://www.w3.org/TR/WCAG22/";

const INTRODUCTION: &str = "This report compares the given web page against the WCAG standard for \
accessibility. If the given web page was not compliant to the criteria, you will find the violations \
and their descriptions on the following pages of this report.";

const TERMINOLOGY: [(&str, &str); 3] = [
    (
        "What are violations?",
        "Violations are collections of failing elements that were not compliant to a specific WCAG \
         success criterion.",
    ),
    (
        "What are failing elements?",
        "A web page is composed of many HTML elements. Failing elements are particular HTML elements \
         that were not compliant to WCAG success criteria within a given violation.",
    ),
    (
        "What are impact levels?",
        "Impact levels describe how severe the violation of a criterion is. It is recommended to \
         prioritize fixing violations with high severity. Here are the available levels of impact \
         and their color codes:",
    ),
];

/// Squares, labels and a three-line note
const LEGEND_BLOCK_HEIGHT: f64 = (FONT_SIZE_SMALL + LINE_SPACING) * 5.75;

const DISCLAIMER: &str = "Note: this report does not show the 'passed' and 'incomplete' categories \
of elements. Additionally, some WCAG criteria cannot be tested for using an algorithm, and need to \
be examined manually.";

/// Cover page text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default = "default_title")]
    pub title: String,
    /// Footer lines at the bottom of the cover page, top to bottom
    #[serde(default = "default_attribution")]
    pub attribution: Vec<String>,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            title: default_title(),
            attribution: default_attribution(),
        }
    }
}

fn default_title() -> String {
    "Accessibility Report".to_string()
}

fn default_attribution() -> Vec<String> {
    vec![
        "Generated by the automated accessibility scanner".to_string(),
        "Report format 0.1.0".to_string(),
    ]
}

/// Looks up the crop image of a node
pub trait EvidenceSource {
    /// PNG bytes of the crop, or `None` when there is none
    fn crop(&self, key: EvidenceKey) -> Option<Vec<u8>>;
}

/// Crops read from a job's evidence directory
#[derive(Debug, Clone)]
pub struct CropDirectory {
    layout: EvidenceLayout,
}

impl CropDirectory {
    pub fn new(layout: EvidenceLayout) -> Self {
        Self { layout }
    }
}

impl EvidenceSource for CropDirectory {
    fn crop(&self, key: EvidenceKey) -> Option<Vec<u8>> {
        let path = self.layout.path(EvidenceRole::Crop, key);
        match std::fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("No crop for {} at {}: {}", key.ordinal(), path.display(), e);
                None
            }
        }
    }
}

impl EvidenceSource for BTreeMap<EvidenceKey, Vec<u8>> {
    fn crop(&self, key: EvidenceKey) -> Option<Vec<u8>> {
        self.get(&key).cloned()
    }
}

/// Where each violation and node landed in the document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportOutline {
    pub violations: Vec<ViolationOutline>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViolationOutline {
    /// One-based
    pub ordinal: usize,
    pub impact: Impact,
    /// Background of the impact label
    pub highlight: Color,
    pub page: usize,
    pub nodes: Vec<NodeOutline>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutline {
    pub key: EvidenceKey,
    pub impact: Impact,
    pub highlight: Color,
    /// Whether a crop thumbnail was embedded
    pub thumbnail: bool,
    pub page: usize,
}

/// A laid-out report
#[derive(Debug, Clone)]
pub struct ComposedReport {
    pub layout: PageLayout,
    pub outline: ReportOutline,
    pub title: String,
}

impl ComposedReport {
    pub fn page_count(&self) -> usize {
        self.layout.pages().len()
    }

    pub fn to_pdf(&self) -> Result<Vec<u8>, ComposeError> {
        render_pdf(&self.layout, &self.title)
    }
}

/// Builds report documents from scan results
#[derive(Debug, Clone, Default)]
pub struct ReportComposer {
    branding: Branding,
}

impl ReportComposer {
    pub fn new(branding: Branding) -> Self {
        Self { branding }
    }

    /// Lay out the full report. Missing or unreadable crops only drop their
    /// thumbnail.
    pub fn compose(&self, scan: &ScanResult, evidence: &dyn EvidenceSource) -> ComposedReport {
        let mut layout = PageLayout::new();

        self.cover_page(&mut layout, scan);
        layout.new_page();
        legend_page(&mut layout);
        layout.new_page();
        let outline = violation_pages(&mut layout, scan, evidence);

        info!(
            "Composed report for {}: {} violations on {} pages",
            scan.url,
            outline.violations.len(),
            layout.pages().len()
        );
        ComposedReport {
            layout,
            outline,
            title: self.branding.title.clone(),
        }
    }

    /// Compose and render to PDF bytes
    pub fn render(&self, scan: &ScanResult, evidence: &dyn EvidenceSource) -> Result<Vec<u8>, ComposeError> {
        self.compose(scan, evidence).to_pdf()
    }

    fn cover_page(&self, layout: &mut PageLayout, scan: &ScanResult) {
        let center = MARGIN + WORK_WIDTH / 2.0;
        let title = TextStyle::new(Font::Bold, FONT_SIZE_TITLE);
        layout.text_at(&self.branding.title, center, MARGIN + FONT_SIZE_TITLE, Align::Center, &title);

        layout.new_line(3.0);
        layout.text_block(&scan.url, &TextStyle::new(Font::Regular, FONT_SIZE_MEDIUM).indent(INDENT));

        let footer = TextStyle::new(Font::Regular, FONT_SIZE_SMALL);
        let count = self.branding.attribution.len();
        for (i, line) in self.branding.attribution.iter().enumerate() {
            let lines_below = (count - 1 - i) as f64;
            let baseline = PAGE_HEIGHT - MARGIN - lines_below * (FONT_SIZE_SMALL + LINE_SPACING);
            layout.text_at(line, center, baseline, Align::Center, &footer);
        }
    }
}

fn legend_page(layout: &mut PageLayout) {
    let heading = TextStyle::new(Font::Bold, FONT_SIZE_MEDIUM);
    let body = TextStyle::new(Font::Regular, FONT_SIZE_MEDIUM).indent(INDENT);

    layout.text_block(
        "Description & Terminology",
        &TextStyle::new(Font::Bold, FONT_SIZE_LARGE),
    );
    layout.new_line(1.0);
    layout.text_block(INTRODUCTION, &body);
    layout.new_line(0.6);
    layout.text_block(
        &format!("More information about WCAG: {}", WCAG_URL),
        &TextStyle::new(Font::Bold, FONT_SIZE_SMALL)
            .indent(INDENT)
            .highlight(Color::LIGHT_GREY)
            .link(WCAG_URL),
    );
    layout.new_line(1.0);

    for (i, (question, answer)) in TERMINOLOGY.iter().enumerate() {
        if i > 0 {
            layout.new_line(0.8);
        }
        layout.text_block(question, &heading);
        layout.text_block(answer, &body);
    }

    // Legend and note sit at the bottom of the page unless the text above
    // already reaches that far
    let small_line = FONT_SIZE_SMALL + LINE_SPACING;
    let anchored = PAGE_HEIGHT - MARGIN - small_line * 7.75;
    let mut square_top = anchored.max(layout.cursor() + LINE_SPACING);
    if square_top + LEGEND_BLOCK_HEIGHT > MAX_Y {
        layout.new_page();
        square_top = MARGIN;
    }

    let label_baseline = square_top + small_line * 2.25;
    let label = TextStyle::new(Font::Bold, FONT_SIZE_MEDIUM);
    for (i, impact) in Impact::LEGEND.iter().enumerate() {
        let center = MARGIN + WORK_WIDTH * 0.2 * (i + 1) as f64;
        layout.fill_at(
            center - LEGEND_SQUARE / 2.0,
            square_top,
            LEGEND_SQUARE,
            LEGEND_SQUARE,
            impact_color(*impact),
        );
        layout.text_at(impact.label(), center, label_baseline, Align::Center, &label);
    }

    layout.move_to(square_top + small_line * 2.75);
    layout.text_block(
        DISCLAIMER,
        &TextStyle::new(Font::Bold, FONT_SIZE_SMALL).highlight(Color::LIGHT_GREY),
    );
}

fn violation_pages(
    layout: &mut PageLayout,
    scan: &ScanResult,
    evidence: &dyn EvidenceSource,
) -> ReportOutline {
    layout.text_block(
        &format!("Total violations: {}", scan.violations.len()),
        &TextStyle::new(Font::Bold, FONT_SIZE_MEDIUM),
    );

    let mut outline = ReportOutline::default();
    let last = scan.violations.len().saturating_sub(1);
    for (vi, violation) in scan.violations.iter().enumerate() {
        outline
            .violations
            .push(violation_block(layout, vi, violation, evidence));
        if vi < last {
            layout.new_line(1.0);
            layout.new_line(1.0);
        }
    }
    outline
}

fn violation_block(
    layout: &mut PageLayout,
    vi: usize,
    violation: &Violation,
    evidence: &dyn EvidenceSource,
) -> ViolationOutline {
    let body = TextStyle::new(Font::Regular, FONT_SIZE_MEDIUM).indent(INDENT);
    let highlight = impact_color(violation.impact);

    let first = layout.text_block(&format!("{}. {}", vi + 1, violation.help), &body);
    layout.text_block(&format!("Suggestion: {}", violation.description), &body);
    layout.text_block(
        &format!("Overall impact level: {}", violation.impact.label()),
        &body.clone().highlight(highlight),
    );

    let mut reference = TextStyle::new(Font::Regular, FONT_SIZE_SMALL).indent(INDENT * 2.0);
    if !violation.help_url.is_empty() {
        reference = reference.link(violation.help_url.clone());
    }
    layout.text_block(&format!("Additional information: {}", violation.help_url), &reference);

    layout.new_line(1.0);
    layout.text_block(
        "Failing elements:",
        &TextStyle::new(Font::Bold, FONT_SIZE_MEDIUM).indent(INDENT * 2.0),
    );

    let nodes = violation
        .nodes
        .iter()
        .enumerate()
        .map(|(ni, node)| {
            let key = EvidenceKey::new(vi, ni);
            let node_highlight = impact_color(node.impact);
            let header = layout.text_block(
                &format!("{}. Element impact: {}", key.ordinal(), node.impact.label()),
                &TextStyle::new(Font::Regular, FONT_SIZE_SMALL)
                    .indent(INDENT * 2.0)
                    .highlight(node_highlight),
            );

            let thumbnail = load_thumbnail(evidence, key).map(|image| layout.add_image(image));
            layout.text_with_thumbnail(
                &node.html,
                &TextStyle::new(Font::Oblique, FONT_SIZE_SMALL)
                    .indent(INDENT * 12.0)
                    .highlight(Color::LIGHT_GREY),
                thumbnail,
                INDENT * 4.0,
            );

            let summary = node
                .failure_summary
                .as_deref()
                .map(single_line)
                .unwrap_or_else(|| "not specified".to_string());
            layout.text_block(
                &format!("Suggestion: {}", summary),
                &TextStyle::new(Font::Bold, FONT_SIZE_SMALL).indent(INDENT * 2.0),
            );
            layout.new_line(0.5);

            NodeOutline {
                key,
                impact: node.impact,
                highlight: node_highlight,
                thumbnail: thumbnail.is_some(),
                page: header.page,
            }
        })
        .collect();

    ViolationOutline {
        ordinal: vi + 1,
        impact: violation.impact,
        highlight,
        page: first.page,
        nodes,
    }
}

fn load_thumbnail(evidence: &dyn EvidenceSource, key: EvidenceKey) -> Option<RasterImage> {
    let bytes = evidence.crop(key)?;
    match RasterImage::from_png(&bytes) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!("Omitting unreadable crop for {}: {}", key.ordinal(), e);
            None
        }
    }
}

/// Drop line breaks, keeping the text otherwise untouched
fn single_line(text: &str) -> String {
    text.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}
