use std::io::Cursor;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use image::{DynamicImage, ImageOutputFormat, Luma};
use printpdf::{
    Color, ImageTransform, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point, Rgb,
};
use qrcode::{EcLevel, QrCode};

/// Turns text into a PNG QR code.
pub trait QrRenderer: Send + Sync {
    fn render_qr_png(&self, text: &str) -> Result<Vec<u8>>;
}

/// Lays out the printable access card.
pub trait CardRenderer: Send + Sync {
    fn render_card_pdf(&self, fields: &CardFields) -> Result<Vec<u8>>;
}

/// Everything printed on an access card.
#[derive(Debug, Clone)]
pub struct CardFields {
    pub title: String,
    pub event_date: NaiveDateTime,
    pub access_url: String,
    pub qr_png: Vec<u8>,
}

/// `qrcode` at error correction level Q, 20px modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrCodePng;

impl QrRenderer for QrCodePng {
    fn render_qr_png(&self, text: &str) -> Result<Vec<u8>> {
        let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::Q)
            .map_err(|e| anyhow!("QR encoding failed: {:?}", e))?;
        let pixels = code.render::<Luma<u8>>().module_dimensions(20, 20).build();

        let mut png = Vec::new();
        DynamicImage::ImageLuma8(pixels)
            .write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)
            .context("QR PNG encoding failed")?;
        Ok(png)
    }
}

const PAGE_W: f32 = 148.0;
const PAGE_H: f32 = 210.0;
const QR_SIZE_MM: f32 = 70.0;
const PT_TO_MM: f32 = 0.3528;

const ROSE: (f32, f32, f32) = (183.0 / 255.0, 110.0 / 255.0, 121.0 / 255.0);
const CORAL: (f32, f32, f32) = (224.0 / 255.0, 129.0 / 255.0, 117.0 / 255.0);
const INK: (f32, f32, f32) = (44.0 / 255.0, 44.0 / 255.0, 44.0 / 255.0);
const MUTED: (f32, f32, f32) = (0.45, 0.45, 0.45);

static SERIF: &[u8] = include_bytes!("../../assets/fonts/DejaVuSerif.ttf");
static SERIF_BOLD: &[u8] = include_bytes!("../../assets/fonts/DejaVuSerif-Bold.ttf");
static SERIF_ITALIC: &[u8] = include_bytes!("../../assets/fonts/DejaVuSerif-Italic.ttf");

/// Drawn in place of characters no embedded face has a glyph for.
const MISSING_GLYPH: char = '?';

/// A TrueType face embedded into the card.
#[derive(Clone)]
pub struct CardFont {
    data: Arc<[u8]>,
}

impl CardFont {
    /// Rejects bytes that do not parse as a TrueType/OpenType face.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        ttf_parser::Face::parse(&bytes, 0).map_err(|e| anyhow!("unusable card font: {}", e))?;
        Ok(Self { data: bytes.into() })
    }

    fn bundled(bytes: &'static [u8]) -> Self {
        Self { data: Arc::from(bytes) }
    }

    fn missing(&self, text: &str) -> usize {
        match ttf_parser::Face::parse(&self.data, 0) {
            Ok(face) => text.chars().filter(|c| face.glyph_index(*c).is_none()).count(),
            Err(_) => text.chars().count(),
        }
    }

    /// `text` with every character this face cannot draw replaced.
    fn drawable(&self, text: &str) -> String {
        let Ok(face) = ttf_parser::Face::parse(&self.data, 0) else {
            return text.to_string();
        };
        text.chars()
            .map(|c| if face.glyph_index(c).is_some() { c } else { MISSING_GLYPH })
            .collect()
    }

    fn embed(&self, doc: &PdfDocumentReference) -> Result<IndirectFontRef> {
        doc.add_external_font(&self.data[..])
            .map_err(|e| anyhow!("PDF font: {:?}", e))
    }
}

impl std::fmt::Debug for CardFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardFont").field("bytes", &self.data.len()).finish()
    }
}

/// Which face a line of text is set in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pick {
    Styled,
    Fallback,
}

/// Keep the styled face when it covers the whole line, otherwise switch to
/// the fallback if that covers more of it.
fn choose_face(styled: &CardFont, fallback: Option<&CardFont>, text: &str) -> (Pick, String) {
    let missing = styled.missing(text);
    if missing == 0 {
        return (Pick::Styled, text.to_string());
    }
    match fallback {
        Some(font) if font.missing(text) < missing => (Pick::Fallback, font.drawable(text)),
        _ => (Pick::Styled, styled.drawable(text)),
    }
}

/// A5 portrait card set in the bundled DejaVu Serif faces.
///
/// DejaVu covers Latin, Greek and Cyrillic scripts. Titles in other scripts
/// need a fallback face (for example a Noto CJK TTF); characters no face can
/// draw are printed as `?`.
#[derive(Debug, Clone)]
pub struct PdfCardRenderer {
    regular: CardFont,
    bold: CardFont,
    italic: CardFont,
    fallback: Option<CardFont>,
}

impl Default for PdfCardRenderer {
    fn default() -> Self {
        Self {
            regular: CardFont::bundled(SERIF),
            bold: CardFont::bundled(SERIF_BOLD),
            italic: CardFont::bundled(SERIF_ITALIC),
            fallback: None,
        }
    }
}

impl PdfCardRenderer {
    pub fn with_fallback(fallback: CardFont) -> Self {
        Self {
            fallback: Some(fallback),
            ..Self::default()
        }
    }
}

impl CardRenderer for PdfCardRenderer {
    fn render_card_pdf(&self, fields: &CardFields) -> Result<Vec<u8>> {
        let qr = image::load_from_memory(&fields.qr_png).context("QR image is not a valid PNG")?;

        let (doc, page, layer) = PdfDocument::new(&fields.title, Mm(PAGE_W), Mm(PAGE_H), "Card");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = Typeface::embed(&self.regular, &doc)?;
        let bold = Typeface::embed(&self.bold, &doc)?;
        let italic = Typeface::embed(&self.italic, &doc)?;
        let mut text = CardText {
            doc: &doc,
            layer: &layer,
            fallback: self.fallback.as_ref(),
            fallback_ref: None,
        };

        // Double frame
        stroke_rect(&layer, 10.0, 10.0, PAGE_W - 10.0, PAGE_H - 10.0, ROSE, 3.0);
        stroke_rect(&layer, 14.0, 14.0, PAGE_W - 14.0, PAGE_H - 14.0, CORAL, 1.0);
        rule(&layer, 186.0);

        text.centered(&bold, &fields.title, 22.0, 172.0, INK)?;

        let qr_px = qr.width().max(1) as f32;
        let qr_x = (PAGE_W - QR_SIZE_MM) / 2.0;
        let qr_y = 92.0;
        stroke_rect(&layer, qr_x - 3.0, qr_y - 3.0, qr_x + QR_SIZE_MM + 3.0, qr_y + QR_SIZE_MM + 3.0, ROSE, 2.0);
        printpdf::Image::from_dynamic_image(&DynamicImage::ImageRgb8(qr.to_rgb8())).add_to_layer(
            layer.clone(),
            ImageTransform {
                translate_x: Some(Mm(qr_x)),
                translate_y: Some(Mm(qr_y)),
                dpi: Some(qr_px * 25.4 / QR_SIZE_MM),
                ..Default::default()
            },
        );

        text.centered(&regular, "Scan the QR code to share your photos and videos", 13.0, 76.0, MUTED)?;
        text.centered(&regular, "and leave us a voice note!", 13.0, 69.0, MUTED)?;

        let date = fields.event_date.format("%d %B %Y").to_string();
        text.centered(&italic, &date, 10.0, 54.0, MUTED)?;
        text.centered(&regular, &fields.access_url, 8.0, 46.0, MUTED)?;
        text.centered(&italic, "- Jointly -", 10.0, 34.0, ROSE)?;
        rule(&layer, 26.0);

        doc.save_to_bytes().map_err(|e| anyhow!("PDF serialization failed: {:?}", e))
    }
}

/// A face together with its handle in the document being built.
struct Typeface<'a> {
    font: &'a CardFont,
    font_ref: IndirectFontRef,
}

impl<'a> Typeface<'a> {
    fn embed(font: &'a CardFont, doc: &PdfDocumentReference) -> Result<Self> {
        Ok(Self { font, font_ref: font.embed(doc)? })
    }
}

/// Sets centered lines. The fallback face is embedded only once a line needs it.
struct CardText<'a> {
    doc: &'a PdfDocumentReference,
    layer: &'a PdfLayerReference,
    fallback: Option<&'a CardFont>,
    fallback_ref: Option<IndirectFontRef>,
}

impl CardText<'_> {
    fn centered(&mut self, styled: &Typeface<'_>, text: &str, size_pt: f32, y: f32, color: (f32, f32, f32)) -> Result<()> {
        let (pick, line) = choose_face(styled.font, self.fallback, text);
        let font_ref = match (pick, self.fallback) {
            (Pick::Fallback, Some(fallback)) => match self.fallback_ref.clone() {
                Some(font_ref) => font_ref,
                None => {
                    let font_ref = fallback.embed(self.doc)?;
                    self.fallback_ref = Some(font_ref.clone());
                    font_ref
                }
            },
            _ => styled.font_ref.clone(),
        };
        centered_text(self.layer, &line, size_pt, y, &font_ref, color);
        Ok(())
    }
}

fn rgb((r, g, b): (f32, f32, f32)) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

fn stroke_rect(
    layer: &PdfLayerReference,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    color: (f32, f32, f32),
    thickness: f32,
) {
    layer.set_outline_color(rgb(color));
    layer.set_outline_thickness(thickness);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(x0), Mm(y0)), false),
            (Point::new(Mm(x1), Mm(y0)), false),
            (Point::new(Mm(x1), Mm(y1)), false),
            (Point::new(Mm(x0), Mm(y1)), false),
        ],
        is_closed: true,
    });
}

fn rule(layer: &PdfLayerReference, y: f32) {
    let half = 13.0;
    layer.set_outline_color(rgb(ROSE));
    layer.set_outline_thickness(1.5);
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(PAGE_W / 2.0 - half), Mm(y)), false),
            (Point::new(Mm(PAGE_W / 2.0 + half), Mm(y)), false),
        ],
        is_closed: false,
    });
}

/// Half an em per glyph is close enough to center a line.
fn centered_text(
    layer: &PdfLayerReference,
    text: &str,
    size_pt: f32,
    y: f32,
    font: &IndirectFontRef,
    color: (f32, f32, f32),
) {
    let width = text.chars().count() as f32 * size_pt * 0.5 * PT_TO_MM;
    let x = ((PAGE_W - width) / 2.0).max(16.0);
    layer.set_fill_color(rgb(color));
    layer.use_text(text, size_pt, Mm(x), Mm(y), font);
}
