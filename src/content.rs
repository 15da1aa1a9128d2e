use crate::page::Page;

/// Per-page content measurement. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentStat {
    pub size: u64,
    pub content: u64,
}

impl ContentStat {
    pub fn ratio(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            self.content as f64 / self.size as f64
        }
    }

    /// A page whose "content" covers every pixel is not a real page (solid
    /// fill or backend failure) and is excluded from red-color-mismatch
    /// anomaly reporting.
    pub fn is_degenerate(&self) -> bool {
        self.size > 0 && self.content == self.size
    }
}

/// Estimates the non-background pixel count of a page by quantizing its
/// luma values into exactly two buckets and taking the smaller bucket as
/// content. Assumes background is the majority color; misfires on
/// content-majority pages (solid dark backgrounds) and that behavior is
/// deliberate.
pub fn measure(page: &Page) -> ContentStat {
    let size = page.pixel_area();
    let histogram = luma_histogram(page);
    let Some(threshold) = two_means_threshold(&histogram) else {
        // Single quantization bucket: a solid page. The bucket holds every
        // pixel, so the content count equals the page size.
        return ContentStat { size, content: size };
    };

    let mut below: u64 = 0;
    let mut above: u64 = 0;
    for (luma, count) in histogram.iter().enumerate() {
        if luma <= threshold {
            below += count;
        } else {
            above += count;
        }
    }
    if below == 0 || above == 0 {
        return ContentStat { size, content: size };
    }
    ContentStat {
        size,
        content: below.min(above),
    }
}

pub(crate) fn luma_of(r: u8, g: u8, b: u8, a: u8) -> u8 {
    if a == 0 {
        return 255;
    }
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

fn luma_histogram(page: &Page) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in page.pixmap().pixels() {
        let c = pixel.demultiply();
        histogram[luma_of(c.red(), c.green(), c.blue(), c.alpha()) as usize] += 1;
    }
    histogram
}

/// Deterministic 2-means split of a luma histogram: means seeded at the
/// darkest and lightest occupied bins, iterated until stable. Returns the
/// bucket boundary, or None when only one bin is occupied.
fn two_means_threshold(histogram: &[u64; 256]) -> Option<usize> {
    let lowest = histogram.iter().position(|&c| c > 0)?;
    let highest = histogram.iter().rposition(|&c| c > 0)?;
    if lowest == highest {
        return None;
    }

    let mut dark_mean = lowest as f64;
    let mut light_mean = highest as f64;
    let mut threshold = ((dark_mean + light_mean) / 2.0) as usize;
    for _ in 0..32 {
        let mut dark_sum = 0u64;
        let mut dark_count = 0u64;
        let mut light_sum = 0u64;
        let mut light_count = 0u64;
        for (luma, &count) in histogram.iter().enumerate() {
            if luma <= threshold {
                dark_sum += luma as u64 * count;
                dark_count += count;
            } else {
                light_sum += luma as u64 * count;
                light_count += count;
            }
        }
        if dark_count == 0 || light_count == 0 {
            break;
        }
        dark_mean = dark_sum as f64 / dark_count as f64;
        light_mean = light_sum as f64 / light_count as f64;
        let next = ((dark_mean + light_mean) / 2.0) as usize;
        if next == threshold {
            break;
        }
        threshold = next;
    }
    Some(threshold)
}
