use crate::error::PageDiffError;
use crate::page::{Page, PageSet, Variant};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tiny_skia::Pixmap;

/// Loads a document variant as rasterized pages at the given DPI by driving
/// the external rasterizer. Fails fast on configuration problems (missing
/// file, backend policy, backend cache limits); there is nothing transient
/// here worth retrying.
pub fn load(
    variant: Variant,
    pdf_path: &Path,
    resolution: u32,
    max_pages: usize,
) -> Result<PageSet, PageDiffError> {
    if !pdf_path.is_file() {
        return Err(PageDiffError::MissingInput(pdf_path.to_path_buf()));
    }

    let total_pages = probe_page_count(pdf_path)?;
    let limit = total_pages.min(max_pages);
    if limit == 0 {
        return Ok(PageSet::new(variant, Vec::new()));
    }

    let work_dir = scratch_dir(variant);
    fs::create_dir_all(&work_dir)?;
    let result = rasterize_into(pdf_path, resolution, limit, &work_dir)
        .and_then(|_| collect_pages(variant, &work_dir));
    let _ = fs::remove_dir_all(&work_dir);
    result
}

/// Page count straight from the PDF catalog, so the backend is only asked
/// for pages that will actually be compared.
pub fn probe_page_count(pdf_path: &Path) -> Result<usize, PageDiffError> {
    let document = lopdf::Document::load(pdf_path)
        .map_err(|e| PageDiffError::Backend(format!("cannot read [{}]: {}", pdf_path.display(), e)))?;
    Ok(document.get_pages().len())
}

fn scratch_dir(variant: Variant) -> PathBuf {
    std::env::temp_dir().join(format!(
        "pagediff_raster_{}_{}_{}",
        variant.label(),
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
    ))
}

fn rasterize_into(
    pdf_path: &Path,
    resolution: u32,
    limit: usize,
    work_dir: &Path,
) -> Result<(), PageDiffError> {
    let input = format!("{}[0-{}]", pdf_path.display(), limit - 1);
    let pattern = work_dir.join("page-%04d.png");
    let args = [
        "-density".to_string(),
        resolution.to_string(),
        input,
        "-background".to_string(),
        "white".to_string(),
        "-alpha".to_string(),
        "remove".to_string(),
        "-alpha".to_string(),
        "off".to_string(),
        pattern.display().to_string(),
    ];

    let output = match Command::new("magick").args(&args).output() {
        Ok(output) => output,
        // Older ImageMagick installs only ship the convert entry point.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Command::new("convert").args(&args).output().map_err(|e| {
                PageDiffError::Backend(format!("neither magick nor convert is available: {}", e))
            })?
        }
        Err(err) => return Err(PageDiffError::Io(err)),
    };

    if output.status.success() {
        Ok(())
    } else {
        Err(classify_backend_failure(&String::from_utf8_lossy(
            &output.stderr,
        )))
    }
}

/// Maps rasterizer stderr onto the error taxonomy. Policy refusals and cache
/// exhaustion carry remediation text naming the exact configuration fix.
fn classify_backend_failure(stderr: &str) -> PageDiffError {
    let lowered = stderr.to_ascii_lowercase();
    let detail = stderr.trim().to_string();
    if lowered.contains("policy") {
        PageDiffError::BackendPolicyDenied(detail)
    } else if lowered.contains("cache resources exhausted") || lowered.contains("resource limit") {
        PageDiffError::BackendResourceExhausted(detail)
    } else {
        PageDiffError::Backend(detail)
    }
}

fn collect_pages(variant: Variant, work_dir: &Path) -> Result<PageSet, PageDiffError> {
    let mut files: Vec<PathBuf> = fs::read_dir(work_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension().and_then(|e| e.to_str()) == Some("png")
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("page-"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(PageDiffError::Backend(format!(
            "rasterizer produced no pages in [{}]",
            work_dir.display()
        )));
    }

    let mut pages = Vec::with_capacity(files.len());
    for file in files {
        let decoded = image::open(&file)
            .map_err(|e| PageDiffError::Image(format!("decode [{}]: {}", file.display(), e)))?
            .to_rgba8();
        pages.push(Page::new(rgba_to_pixmap(&decoded)?));
    }
    Ok(PageSet::new(variant, pages))
}

fn rgba_to_pixmap(image: &image::RgbaImage) -> Result<Pixmap, PageDiffError> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        PageDiffError::Image(format!("invalid raster size {}x{}", width, height))
    })?;
    for (pixel, out) in image.pixels().zip(pixmap.pixels_mut()) {
        let [r, g, b, a] = pixel.0;
        *out = tiny_skia::ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Ok(pixmap)
}
