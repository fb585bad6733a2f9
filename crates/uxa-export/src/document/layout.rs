//! Page layout for the document export, independent of the PDF backend.
//!
//! Coordinates are millimetres on an A4 page measured from the top edge.

use image::{DynamicImage, RgbImage};
use uxa_core::{AuditCategory, Impact, ImpactCounts, ScanReport};

pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;
pub const MARGIN_MM: f32 = 20.0;
pub const CONTENT_WIDTH_MM: f32 = PAGE_WIDTH_MM - 2.0 * MARGIN_MM;

/// Largest screenshot edge kept in the document, in pixels.
const MAX_SCREENSHOT_WIDTH_PX: u32 = 1200;
const MAX_SCREENSHOT_HEIGHT_PX: u32 = 6000;

const BODY_WRAP: usize = 95;
const TITLE_WRAP: usize = 75;
const DETAIL_WRAP: usize = 105;

/// Vertical space on an empty page between the margins.
const PAGE_BODY_MM: f32 = PAGE_HEIGHT_MM - 2.0 * MARGIN_MM;

const CARD_FRAME_MM: f32 = 14.0;
const CARD_TITLE_LINE_MM: f32 = 5.0;
const CARD_BODY_LINE_MM: f32 = 4.0;
const CARD_DETAIL_LINE_MM: f32 = 3.5;
const CARD_MAX_TITLE_LINES: usize = 4;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn hex(value: u32) -> Self {
        Self {
            r: ((value >> 16) & 0xff) as u8,
            g: ((value >> 8) & 0xff) as u8,
            b: (value & 0xff) as u8,
        }
    }

    /// Blend towards white; `amount` 0.0 keeps the colour, 1.0 is white.
    pub fn tint(self, amount: f32) -> Self {
        let mix = |c: u8| (f32::from(c) + (255.0 - f32::from(c)) * amount.clamp(0.0, 1.0)).round() as u8;
        Self {
            r: mix(self.r),
            g: mix(self.g),
            b: mix(self.b),
        }
    }
}

pub const BRAND: RgbColor = RgbColor::hex(0x2563eb);
pub const TEXT: RgbColor = RgbColor::hex(0x1f2937);
pub const MUTED: RgbColor = RgbColor::hex(0x6b7280);
pub const SUCCESS: RgbColor = RgbColor::hex(0x10b981);

pub fn impact_color(impact: Impact) -> RgbColor {
    match impact {
        Impact::Critical => RgbColor::hex(0xdc2626),
        Impact::Serious => RgbColor::hex(0xf59e0b),
        Impact::Moderate => RgbColor::hex(0x3498db),
        Impact::Minor => RgbColor::hex(0x64748b),
    }
}

pub fn category_color(category: AuditCategory) -> RgbColor {
    match category {
        AuditCategory::Performance => RgbColor::hex(0x2563eb),
        AuditCategory::Accessibility => RgbColor::hex(0x10b981),
        AuditCategory::BestPractices => RgbColor::hex(0xf59e0b),
        AuditCategory::Seo => RgbColor::hex(0x6366f1),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreDial {
    pub label: &'static str,
    /// Absent when the secondary audit degraded.
    pub score: Option<u8>,
    pub color: RgbColor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title { title: String, subtitle: String },
    Metadata { url: String, generated: String },
    Separator,
    ScoreDials(Vec<ScoreDial>),
    /// Secondary audit degraded; explains the empty dials.
    SecondaryNotice { lines: Vec<String> },
    Summary { counts: ImpactCounts, nodes: usize },
    SectionHeading(String),
    ViolationCard {
        ordinal: usize,
        impact: Impact,
        title: Vec<String>,
        description: Vec<String>,
        detail: Vec<String>,
        nodes: usize,
    },
    NoViolations,
    Screenshot(RgbImage),
    ScreenshotUnavailable { reason: String },
    Closing { lines: Vec<String> },
}

impl Block {
    /// Vertical space the block occupies, including spacing below it.
    pub fn height_mm(&self) -> f32 {
        match self {
            Block::Title { .. } => 24.0,
            Block::Metadata { .. } => 14.0,
            Block::Separator => 6.0,
            Block::ScoreDials(_) => 44.0,
            Block::SecondaryNotice { lines } => 4.0 + 4.0 * lines.len() as f32,
            Block::Summary { .. } => 14.0,
            Block::SectionHeading(_) => 10.0,
            Block::ViolationCard {
                title,
                description,
                detail,
                ..
            } => {
                CARD_FRAME_MM
                    + CARD_TITLE_LINE_MM * title.len() as f32
                    + CARD_BODY_LINE_MM * description.len() as f32
                    + CARD_DETAIL_LINE_MM * detail.len() as f32
            }
            Block::NoViolations => 20.0,
            Block::Screenshot(_) => PAGE_HEIGHT_MM - 2.0 * MARGIN_MM - 12.0,
            Block::ScreenshotUnavailable { .. } => 30.0,
            Block::Closing { lines } => 12.0 + 6.0 * lines.len() as f32,
        }
    }
}

/// A block and its top edge on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Placed {
    pub top_mm: f32,
    pub block: Block,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutPage {
    pub blocks: Vec<Placed>,
}

/// All pages of the document in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentLayout {
    pub pages: Vec<LayoutPage>,
}

struct Paginator {
    pages: Vec<LayoutPage>,
    current: LayoutPage,
    cursor: f32,
}

impl Paginator {
    fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: LayoutPage::default(),
            cursor: MARGIN_MM,
        }
    }

    fn push(&mut self, block: Block) {
        let height = block.height_mm();
        if self.cursor + height > PAGE_HEIGHT_MM - MARGIN_MM && !self.current.blocks.is_empty() {
            self.break_page();
        }
        self.current.blocks.push(Placed {
            top_mm: self.cursor,
            block,
        });
        self.cursor += height;
    }

    fn break_page(&mut self) {
        if !self.current.blocks.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
        }
        self.cursor = MARGIN_MM;
    }

    fn finish(mut self) -> Vec<LayoutPage> {
        self.break_page();
        self.pages
    }
}

/// Greedy word wrap at `width` characters; long words are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        while word.chars().count() > width {
            if !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            lines.push(head);
        }
        if line.is_empty() {
            line = word;
        } else if line.chars().count() + 1 + word.chars().count() <= width {
            line.push(' ');
            line.push_str(&word);
        } else {
            lines.push(std::mem::replace(&mut line, word));
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Keep at most `max` lines; a cut is marked on the last kept line.
fn truncate_lines(lines: &mut Vec<String>, max: usize, width: usize) {
    if lines.len() <= max {
        return;
    }
    lines.truncate(max);
    if let Some(last) = lines.last_mut() {
        let kept: String = last.chars().take(width.saturating_sub(ELLIPSIS.len())).collect();
        *last = format!("{}{ELLIPSIS}", kept.trim_end());
    }
}

/// Shrink card text so the card fits on one empty page. Title first, then
/// description, then the failure detail get what is left.
fn fit_card(title: &mut Vec<String>, description: &mut Vec<String>, detail: &mut Vec<String>) {
    let mut budget = PAGE_BODY_MM - CARD_FRAME_MM;

    truncate_lines(title, CARD_MAX_TITLE_LINES, TITLE_WRAP);
    budget -= CARD_TITLE_LINE_MM * title.len() as f32;

    truncate_lines(description, (budget / CARD_BODY_LINE_MM).floor() as usize, BODY_WRAP);
    budget -= CARD_BODY_LINE_MM * description.len() as f32;

    truncate_lines(detail, (budget / CARD_DETAIL_LINE_MM).floor().max(0.0) as usize, DETAIL_WRAP);
}

fn screenshot_block(report: &ScanReport) -> Block {
    let shot = report.screenshot();
    if shot.is_empty() {
        return Block::ScreenshotUnavailable {
            reason: "No screenshot was captured for this page.".to_string(),
        };
    }
    match image::load_from_memory(shot.as_bytes()) {
        Ok(img) => {
            let img = if img.width() > MAX_SCREENSHOT_WIDTH_PX || img.height() > MAX_SCREENSHOT_HEIGHT_PX {
                img.thumbnail(MAX_SCREENSHOT_WIDTH_PX, MAX_SCREENSHOT_HEIGHT_PX)
            } else {
                img
            };
            Block::Screenshot(DynamicImage::into_rgb8(img))
        }
        Err(e) => {
            tracing::warn!(scan_id = %report.scan_id(), error = %e, "stored screenshot is unusable");
            Block::ScreenshotUnavailable {
                reason: format!("The captured screenshot could not be decoded ({e})."),
            }
        }
    }
}

impl DocumentLayout {
    pub fn build(report: &ScanReport) -> Self {
        let mut p = Paginator::new();

        p.push(Block::Title {
            title: "UXABILITY".to_string(),
            subtitle: "Accessibility, performance and SEO report".to_string(),
        });
        p.push(Block::Metadata {
            url: report.url().to_string(),
            generated: report.timestamp().format("%Y-%m-%d %H:%M UTC").to_string(),
        });
        p.push(Block::Separator);

        let secondary = report.secondary_audit();
        p.push(Block::ScoreDials(
            AuditCategory::ALL
                .iter()
                .map(|c| ScoreDial {
                    label: c.label(),
                    score: secondary.score(*c),
                    color: category_color(*c),
                })
                .collect(),
        ));
        if secondary.is_degraded() {
            let mut text = secondary
                .error
                .clone()
                .unwrap_or_else(|| "secondary audit unavailable".to_string());
            if let Some(details) = &secondary.details {
                text.push_str(": ");
                text.push_str(details);
            }
            if let Some(hint) = &secondary.hint {
                text.push_str(&format!(" ({hint})"));
            }
            p.push(Block::SecondaryNotice {
                lines: wrap(&text, DETAIL_WRAP),
            });
        }

        let audit = report.audit();
        p.push(Block::Summary {
            counts: audit.impact_counts(),
            nodes: audit.node_count(),
        });
        p.push(Block::SectionHeading("Accessibility violations".to_string()));

        if audit.is_clean() {
            p.push(Block::NoViolations);
        } else {
            for (i, v) in audit.violations.iter().enumerate() {
                let mut title = wrap(
                    &format!("[{}] {}", v.impact.as_str().to_uppercase(), v.headline()),
                    TITLE_WRAP,
                );
                let mut description = wrap(&v.description, BODY_WRAP);
                let mut detail = v
                    .nodes
                    .first()
                    .and_then(|n| n.failure_summary.as_deref())
                    .map(|s| wrap(s, DETAIL_WRAP))
                    .unwrap_or_default();
                fit_card(&mut title, &mut description, &mut detail);
                p.push(Block::ViolationCard {
                    ordinal: i + 1,
                    impact: v.impact,
                    title,
                    description,
                    detail,
                    nodes: v.nodes.len(),
                });
            }
        }

        p.break_page();
        p.push(Block::SectionHeading("Page screenshot".to_string()));
        p.push(screenshot_block(report));

        p.break_page();
        p.push(Block::Closing {
            lines: vec![
                "Thank you for using UXability.".to_string(),
                format!("Scan {}", report.scan_id()),
                format!("Generated by uxa {}", uxa_core::VERSION),
            ],
        });

        Self { pages: p.finish() }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.pages.iter().flat_map(|p| p.blocks.iter().map(|b| &b.block))
    }
}
