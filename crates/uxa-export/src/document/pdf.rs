//! printpdf backend for [`DocumentLayout`].

use image::DynamicImage;
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::utils::calculate_points_for_circle;
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument,
    PdfLayerReference, Point, Polygon, Pt, Rgb,
};
use uxa_core::{Impact, ScanReport};

use super::layout::{
    impact_color, Block, DocumentLayout, RgbColor, ScoreDial, BRAND, CONTENT_WIDTH_MM, MARGIN_MM,
    MUTED, PAGE_HEIGHT_MM, PAGE_WIDTH_MM, SUCCESS, TEXT,
};
use crate::error::{ExportError, ExportResult};

const SCREENSHOT_DPI: f32 = 300.0;
const MM_PER_INCH: f32 = 25.4;
const PT_TO_MM: f32 = 0.3528;

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Converts a top-down layout offset to printpdf's bottom-up y axis.
fn y(top_mm: f32) -> Mm {
    Mm(PAGE_HEIGHT_MM - top_mm)
}

fn color(c: RgbColor) -> Color {
    Color::Rgb(Rgb::new(
        f32::from(c.r) / 255.0,
        f32::from(c.g) / 255.0,
        f32::from(c.b) / 255.0,
        None,
    ))
}

/// Rough Helvetica advance width, good enough for centering short labels.
fn text_width_mm(text: &str, size_pt: f32) -> f32 {
    text.chars().count() as f32 * size_pt * 0.5 * PT_TO_MM
}

fn fill_rect(layer: &PdfLayerReference, left: f32, top: f32, width: f32, height: f32, c: RgbColor) {
    layer.set_fill_color(color(c));
    let ring = vec![
        (Point::new(Mm(left), y(top)), false),
        (Point::new(Mm(left + width), y(top)), false),
        (Point::new(Mm(left + width), y(top + height)), false),
        (Point::new(Mm(left), y(top + height)), false),
    ];
    layer.add_polygon(Polygon {
        rings: vec![ring],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });
}

fn fill_circle(layer: &PdfLayerReference, cx: f32, cy_top: f32, radius: f32, c: RgbColor) {
    layer.set_fill_color(color(c));
    let points = calculate_points_for_circle(
        Pt::from(Mm(radius)),
        Pt::from(Mm(cx)),
        Pt::from(y(cy_top)),
    );
    layer.add_polygon(Polygon {
        rings: vec![points],
        mode: PaintMode::Fill,
        winding_order: WindingOrder::NonZero,
    });
}

fn rule(layer: &PdfLayerReference, top: f32, c: RgbColor) {
    layer.set_outline_color(color(c));
    layer.set_outline_thickness(0.5);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(MARGIN_MM), y(top)), false),
            (Point::new(Mm(PAGE_WIDTH_MM - MARGIN_MM), y(top)), false),
        ],
        is_closed: false,
    });
}

fn text(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    size_pt: f32,
    left: f32,
    baseline_top: f32,
    c: RgbColor,
    value: &str,
) {
    layer.set_fill_color(color(c));
    layer.use_text(value, size_pt, Mm(left), y(baseline_top), font);
}

fn centered(
    layer: &PdfLayerReference,
    font: &IndirectFontRef,
    size_pt: f32,
    center_x: f32,
    baseline_top: f32,
    c: RgbColor,
    value: &str,
) {
    let left = center_x - text_width_mm(value, size_pt) / 2.0;
    text(layer, font, size_pt, left, baseline_top, c, value);
}

fn paint_dials(layer: &PdfLayerReference, fonts: &Fonts, top: f32, dials: &[ScoreDial]) {
    let slot = CONTENT_WIDTH_MM / dials.len().max(1) as f32;
    let radius = 13.0;
    let cy = top + 4.0 + radius;
    for (i, dial) in dials.iter().enumerate() {
        let cx = MARGIN_MM + slot * (i as f32 + 0.5);
        let ring = if dial.score.is_some() { dial.color } else { MUTED.tint(0.5) };
        fill_circle(layer, cx, cy, radius, ring);
        fill_circle(layer, cx, cy, radius - 2.5, ring.tint(0.9));
        let label = dial
            .score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        centered(layer, &fonts.bold, 18.0, cx, cy + 2.5, TEXT, &label);
        centered(layer, &fonts.regular, 9.0, cx, cy + radius + 7.0, MUTED, dial.label);
    }
}

#[allow(clippy::too_many_arguments)]
fn paint_card(
    layer: &PdfLayerReference,
    fonts: &Fonts,
    top: f32,
    height: f32,
    ordinal: usize,
    impact: Impact,
    title: &[String],
    description: &[String],
    detail: &[String],
    nodes: usize,
) {
    let accent = impact_color(impact);
    let body = height - 4.0;
    fill_rect(layer, MARGIN_MM, top, CONTENT_WIDTH_MM, body, accent.tint(0.9));
    fill_rect(layer, MARGIN_MM, top, 1.5, body, accent);

    let left = MARGIN_MM + 5.0;
    let mut cursor = top + 6.0;
    for (i, line) in title.iter().enumerate() {
        let line = if i == 0 {
            format!("{ordinal}. {line}")
        } else {
            line.clone()
        };
        text(layer, &fonts.bold, 11.0, left, cursor, accent, &line);
        cursor += 5.0;
    }
    for line in description {
        text(layer, &fonts.regular, 9.5, left, cursor, TEXT, line);
        cursor += 4.0;
    }
    for line in detail {
        text(layer, &fonts.regular, 8.5, left, cursor, MUTED, line);
        cursor += 3.5;
    }
    let affected = if nodes == 1 {
        "1 affected element".to_string()
    } else {
        format!("{nodes} affected elements")
    };
    text(layer, &fonts.regular, 8.5, left, cursor + 1.0, MUTED, &affected);
}

fn paint_screenshot(layer: &PdfLayerReference, top: f32, height: f32, shot: &image::RgbImage) {
    let natural_w = shot.width() as f32 / SCREENSHOT_DPI * MM_PER_INCH;
    let natural_h = shot.height() as f32 / SCREENSHOT_DPI * MM_PER_INCH;
    if natural_w <= 0.0 || natural_h <= 0.0 {
        return;
    }
    let scale = (CONTENT_WIDTH_MM / natural_w).min(height / natural_h);
    let drawn_w = natural_w * scale;
    let drawn_h = natural_h * scale;
    let left = MARGIN_MM + (CONTENT_WIDTH_MM - drawn_w) / 2.0;

    let image = Image::from_dynamic_image(&DynamicImage::ImageRgb8(shot.clone()));
    image.add_to_layer(
        layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(left)),
            translate_y: Some(y(top + drawn_h)),
            scale_x: Some(scale),
            scale_y: Some(scale),
            dpi: Some(SCREENSHOT_DPI),
            ..Default::default()
        },
    );
}

fn paint_block(layer: &PdfLayerReference, fonts: &Fonts, top: f32, block: &Block) {
    let height = block.height_mm();
    match block {
        Block::Title { title, subtitle } => {
            text(layer, &fonts.bold, 26.0, MARGIN_MM, top + 10.0, BRAND, title);
            text(layer, &fonts.regular, 12.0, MARGIN_MM, top + 18.0, MUTED, subtitle);
        }
        Block::Metadata { url, generated } => {
            text(layer, &fonts.bold, 10.0, MARGIN_MM, top + 4.0, TEXT, "Page");
            text(layer, &fonts.regular, 10.0, MARGIN_MM + 22.0, top + 4.0, TEXT, url);
            text(layer, &fonts.bold, 10.0, MARGIN_MM, top + 9.0, TEXT, "Generated");
            text(layer, &fonts.regular, 10.0, MARGIN_MM + 22.0, top + 9.0, TEXT, generated);
        }
        Block::Separator => rule(layer, top + 3.0, MUTED.tint(0.6)),
        Block::ScoreDials(dials) => paint_dials(layer, fonts, top, dials),
        Block::SecondaryNotice { lines } => {
            for (i, line) in lines.iter().enumerate() {
                text(layer, &fonts.regular, 8.5, MARGIN_MM, top + 3.0 + 4.0 * i as f32, MUTED, line);
            }
        }
        Block::Summary { counts, nodes } => {
            let mut left = MARGIN_MM;
            for impact in Impact::DESCENDING {
                let label = format!("{} {}", counts.get(impact), impact.as_str());
                fill_circle(layer, left + 2.0, top + 3.0, 1.8, impact_color(impact));
                text(layer, &fonts.regular, 10.0, left + 5.5, top + 4.2, TEXT, &label);
                left += 8.0 + text_width_mm(&label, 10.0);
            }
            let total = format!("{} violations, {} elements", counts.total(), nodes);
            text(layer, &fonts.regular, 9.0, MARGIN_MM, top + 10.0, MUTED, &total);
        }
        Block::SectionHeading(heading) => {
            text(layer, &fonts.bold, 15.0, MARGIN_MM, top + 6.0, TEXT, heading);
        }
        Block::ViolationCard {
            ordinal,
            impact,
            title,
            description,
            detail,
            nodes,
        } => paint_card(
            layer,
            fonts,
            top,
            height,
            *ordinal,
            *impact,
            title,
            description,
            detail,
            *nodes,
        ),
        Block::NoViolations => {
            fill_rect(layer, MARGIN_MM, top, CONTENT_WIDTH_MM, height - 4.0, SUCCESS.tint(0.88));
            text(
                layer,
                &fonts.bold,
                12.0,
                MARGIN_MM + 5.0,
                top + 10.0,
                SUCCESS,
                "No accessibility violations were found on this page.",
            );
        }
        Block::Screenshot(shot) => paint_screenshot(layer, top, height, shot),
        Block::ScreenshotUnavailable { reason } => {
            fill_rect(layer, MARGIN_MM, top, CONTENT_WIDTH_MM, height - 4.0, MUTED.tint(0.9));
            centered(
                layer,
                &fonts.bold,
                12.0,
                PAGE_WIDTH_MM / 2.0,
                top + 12.0,
                MUTED,
                "Screenshot unavailable",
            );
            centered(layer, &fonts.regular, 9.0, PAGE_WIDTH_MM / 2.0, top + 19.0, MUTED, reason);
        }
        Block::Closing { lines } => {
            for (i, line) in lines.iter().enumerate() {
                let (font, size, c) = if i == 0 {
                    (&fonts.bold, 16.0, BRAND)
                } else {
                    (&fonts.regular, 9.0, MUTED)
                };
                centered(layer, font, size, PAGE_WIDTH_MM / 2.0, top + 12.0 + 6.0 * i as f32, c, line);
            }
        }
    }
}

pub(crate) fn paint(layout: &DocumentLayout, report: &ScanReport) -> ExportResult<Vec<u8>> {
    let title = format!("UXability report - {}", report.url());
    let (doc, first_page, first_layer) =
        PdfDocument::new(title, Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");

    let fonts = Fonts {
        regular: doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| ExportError::Pdf(e.to_string()))?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| ExportError::Pdf(e.to_string()))?,
    };

    for (i, page) in layout.pages.iter().enumerate() {
        let (page_index, layer_index) = if i == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1")
        };
        let layer = doc.get_page(page_index).get_layer(layer_index);
        for placed in &page.blocks {
            paint_block(&layer, &fonts, placed.top_mm, &placed.block);
        }
        let footer = format!("{} / {}", i + 1, layout.pages.len());
        centered(&layer, &fonts.regular, 8.0, PAGE_WIDTH_MM / 2.0, PAGE_HEIGHT_MM - 10.0, MUTED, &footer);
    }

    doc.save_to_bytes().map_err(|e| ExportError::Pdf(e.to_string()))
}
