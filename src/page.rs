use tiny_skia::Pixmap;

/// Which rendering a page set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Authoritative,
    Import,
    Export,
    HistoryImport,
    HistoryExport,
}

impl Variant {
    pub fn label(self) -> &'static str {
        match self {
            Variant::Authoritative => "authoritative",
            Variant::Import => "import",
            Variant::Export => "export",
            Variant::HistoryImport => "history-import",
            Variant::HistoryExport => "history-export",
        }
    }
}

/// One rasterized page. Owns its pixels; all pages of a set share the
/// resolution the whole document was rendered at.
#[derive(Debug, Clone)]
pub struct Page {
    pixmap: Pixmap,
}

impl Page {
    pub fn new(pixmap: Pixmap) -> Self {
        Self { pixmap }
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixel_area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

/// Ordered pages of one rendered document variant. The length is the true
/// page count of that rendering; a missing variant (no historical run yet)
/// is represented by `Option<PageSet>` at the call site, never by an empty
/// set standing in for one.
#[derive(Debug)]
pub struct PageSet {
    pub variant: Variant,
    pub pages: Vec<Page>,
}

impl PageSet {
    pub fn new(variant: Variant, pages: Vec<Page>) -> Self {
        Self { variant, pages }
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }
}

/// Number of pages actually compared: the configured cap, further truncated
/// by every page set that is present. A short variant truncates the whole
/// comparison; it never raises an error by itself.
pub fn comparison_limit(max_pages: usize, sets: &[Option<&PageSet>]) -> usize {
    let mut limit = max_pages;
    for set in sets.iter().flatten() {
        limit = limit.min(set.len());
    }
    limit
}
