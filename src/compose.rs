use crate::content::luma_of;
use crate::page::Page;
use tiny_skia::{Pixmap, PixmapPaint, Transform};

/// Marker color painted onto authoritative content before compositing. Its
/// surviving pixel count after the candidate is flattened on top is the
/// regression signal.
pub const MARKER_RED: [u8; 3] = [255, 0, 0];
/// Marker for historical content in the three-way compare overlay.
pub const MARKER_BLUE: [u8; 3] = [0, 0, 255];

/// Similarity tolerance for recoloring authoritative ink to the marker,
/// proportional to the channel range. Wide on purpose: anything that is not
/// near-background counts as ink.
pub const MARKER_FUZZ: f32 = 0.92;
/// Tolerance for knocking out a candidate page's own background.
pub const BACKGROUND_FUZZ: f32 = 0.075;

/// How marker pixels are located in the flattened composite. The exact
/// histogram lookup is the current behavior; the nearest-channel scan is the
/// detection strategy of an earlier revision, kept selectable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerDetection {
    #[default]
    ExactHistogram,
    NearestChannel,
}

/// A flattened overlay image plus its extracted marker signal. Transient:
/// composites are persisted as PNG artifacts or dropped, never fed back in
/// as pages.
pub struct Composite {
    pub pixmap: Pixmap,
    pub marker_count: u64,
    /// False when the marker color had no histogram bucket at all. The count
    /// is 0 in that case and processing continues; the pipeline decides
    /// whether the miss is anomaly-worthy.
    pub marker_found: bool,
}

/// Normalized euclidean RGB distance, 0.0 (equal) to 1.0 (opposite corners).
fn color_distance(a: [u8; 3], b: [u8; 3]) -> f32 {
    let dr = a[0] as f32 - b[0] as f32;
    let dg = a[1] as f32 - b[1] as f32;
    let db = a[2] as f32 - b[2] as f32;
    ((dr * dr + dg * dg + db * db) / 3.0).sqrt() / 255.0
}

/// Grayscale copy with the alpha channel removed against a white background.
fn grayscale_opaque(page: &Page) -> Pixmap {
    let mut out = page.pixmap().clone();
    for pixel in out.pixels_mut() {
        let c = pixel.demultiply();
        let gray = if c.alpha() == 255 {
            luma_of(c.red(), c.green(), c.blue(), 255)
        } else {
            let a = c.alpha() as u32;
            let blend = |v: u8| ((v as u32 * a + 255 * (255 - a)) / 255) as u8;
            luma_of(blend(c.red()), blend(c.green()), blend(c.blue()), 255)
        };
        *pixel = tiny_skia::ColorU8::from_rgba(gray, gray, gray, 255).premultiply();
    }
    out
}

/// Recolors every opaque pixel within `fuzz` of `target` to `marker`.
fn recolor_within(pixmap: &mut Pixmap, target: [u8; 3], fuzz: f32, marker: [u8; 3]) {
    for pixel in pixmap.pixels_mut() {
        let c = pixel.demultiply();
        if c.alpha() == 0 {
            continue;
        }
        if color_distance([c.red(), c.green(), c.blue()], target) <= fuzz {
            *pixel =
                tiny_skia::ColorU8::from_rgba(marker[0], marker[1], marker[2], 255).premultiply();
        }
    }
}

/// The page's own background value: the most populated luma bin.
fn dominant_luma(pixmap: &Pixmap) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        histogram[luma_of(c.red(), c.green(), c.blue(), c.alpha()) as usize] += 1;
    }
    let mut best = 0usize;
    for (luma, &count) in histogram.iter().enumerate() {
        if count > histogram[best] {
            best = luma;
        }
    }
    best as u8
}

/// Makes pixels within `fuzz` of the gray `background` value transparent.
fn knock_out_background(pixmap: &mut Pixmap, background: u8, fuzz: f32) {
    let target = [background, background, background];
    for pixel in pixmap.pixels_mut() {
        let c = pixel.demultiply();
        if color_distance([c.red(), c.green(), c.blue()], target) <= fuzz {
            *pixel = tiny_skia::PremultipliedColorU8::TRANSPARENT;
        }
    }
}

fn marker_pixels(pixmap: &Pixmap, marker: [u8; 3], detection: MarkerDetection) -> Option<u64> {
    let mut count = 0u64;
    for pixel in pixmap.pixels() {
        let c = pixel.demultiply();
        let rgb = [c.red(), c.green(), c.blue()];
        let hit = match detection {
            MarkerDetection::ExactHistogram => c.alpha() == 255 && rgb == marker,
            MarkerDetection::NearestChannel => {
                // Earlier revision: accept the reddest (or bluest) colors
                // rather than the exact marker bucket.
                let dominant = marker.iter().position(|&v| v == 255).unwrap_or(0);
                rgb[dominant] >= 200 && rgb.iter().enumerate().all(|(i, &v)| i == dominant || v <= 55)
            }
        };
        if hit {
            count += 1;
        }
    }
    match detection {
        MarkerDetection::ExactHistogram if count == 0 => None,
        _ => Some(count),
    }
}

/// Grayscale candidate with its own background made transparent.
fn candidate_layer(page: &Page) -> Pixmap {
    let mut layer = grayscale_opaque(page);
    let background = dominant_luma(&layer);
    knock_out_background(&mut layer, background, BACKGROUND_FUZZ);
    layer
}

/// Candidate content recolored to `marker` with its background transparent,
/// for the three-way compare overlay.
fn marked_layer(page: &Page, marker: [u8; 3]) -> Pixmap {
    let mut layer = candidate_layer(page);
    recolor_within(&mut layer, [0, 0, 0], MARKER_FUZZ, marker);
    layer
}

/// Direct overlay of one candidate rendering over the authoritative page.
/// Authoritative ink is recolored to marker red; the candidate's
/// non-background content is flattened on top. Surviving red pixels are
/// authoritative ink the candidate failed to reproduce.
pub fn direct_overlay(authoritative: &Page, candidate: &Page, detection: MarkerDetection) -> Composite {
    let mut base = grayscale_opaque(authoritative);
    recolor_within(&mut base, [0, 0, 0], MARKER_FUZZ, MARKER_RED);

    let layer = candidate_layer(candidate);
    base.draw_pixmap(
        0,
        0,
        layer.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    let looked_up = marker_pixels(&base, MARKER_RED, detection);
    Composite {
        marker_count: looked_up.unwrap_or(0),
        marker_found: looked_up.is_some(),
        pixmap: base,
    }
}

/// Three-way compare overlay for human review: candidate content in red,
/// historical content in blue, both over a grayscale authoritative page.
/// Its marker count is never used for save decisions.
pub fn compare_overlay(
    authoritative: &Page,
    candidate: &Page,
    historical: &Page,
    detection: MarkerDetection,
) -> Composite {
    let mut base = grayscale_opaque(authoritative);

    let history = marked_layer(historical, MARKER_BLUE);
    base.draw_pixmap(
        0,
        0,
        history.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    let current = marked_layer(candidate, MARKER_RED);
    base.draw_pixmap(
        0,
        0,
        current.as_ref(),
        &PixmapPaint::default(),
        Transform::identity(),
        None,
    );

    let looked_up = marker_pixels(&base, MARKER_RED, detection);
    Composite {
        marker_count: looked_up.unwrap_or(0),
        marker_found: looked_up.is_some(),
        pixmap: base,
    }
}
