use crate::compose::MarkerDetection;
use crate::error::PageDiffError;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Behavior toggles that historically varied between revisions of the diff
/// tooling, expressed as flags instead of duplicated pipelines.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Page numbers in reports and artifact names start at 1.
    pub one_based_pages: bool,
    /// Produce the three-way compare overlays when history exists.
    pub compare_overlays: bool,
    pub marker_detection: MarkerDetection,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            one_based_pages: true,
            compare_overlays: true,
            marker_detection: MarkerDetection::ExactHistogram,
        }
    }
}

/// Configuration of one invocation: one document, one history tree.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Document name including extension, e.g. "lorem ipsum.docx".
    pub base_file: String,
    /// Root of the previous run's converted tree.
    pub history_dir: PathBuf,
    pub max_pages: usize,
    /// When set, only force-saved regression pages are persisted.
    pub no_save_overlay: bool,
    /// Raster DPI handed to the backend.
    pub resolution: u32,
    pub debug: bool,
    pub report: ReportOptions,
}

impl RunConfig {
    pub fn new(base_file: impl Into<String>) -> Self {
        Self {
            base_file: base_file.into(),
            history_dir: PathBuf::from("."),
            max_pages: 10,
            no_save_overlay: false,
            resolution: 75,
            debug: false,
            report: ReportOptions::default(),
        }
    }
}

/// Every path one invocation touches, resolved once up front.
#[derive(Debug, Clone)]
pub struct DocumentPaths {
    pub base_dir: PathBuf,
    pub ext: String,
    pub stem: String,
    pub authoritative_pdf: PathBuf,
    pub import_pdf: PathBuf,
    pub export_pdf: PathBuf,
    pub history_import_pdf: PathBuf,
    pub history_export_pdf: PathBuf,
    pub import_overlay_dir: PathBuf,
    pub export_overlay_dir: PathBuf,
    pub import_compare_dir: PathBuf,
    pub export_compare_dir: PathBuf,
}

impl DocumentPaths {
    pub fn resolve(config: &RunConfig) -> Result<Self, PageDiffError> {
        Self::resolve_under(config, Path::new("."))
    }

    /// Resolution with an explicit working directory, so tests do not have
    /// to chdir. The `..` fallback mirrors running the tool from inside the
    /// history folder: inputs live one level up.
    pub fn resolve_under(config: &RunConfig, cwd: &Path) -> Result<Self, PageDiffError> {
        let name = Path::new(&config.base_file);
        let ext = name
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                PageDiffError::InvalidConfiguration(format!(
                    "base_file [{}] has no extension",
                    config.base_file
                ))
            })?;
        let stem = name
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .ok_or_else(|| {
                PageDiffError::InvalidConfiguration(format!(
                    "base_file [{}] has no stem",
                    config.base_file
                ))
            })?;

        let mut base_dir = cwd.to_path_buf();
        if config.history_dir == Path::new(".")
            && !base_dir.join("download").is_dir()
            && base_dir.join("..").join("download").is_dir()
        {
            base_dir = base_dir.join("..");
        }

        let history_root = if config.history_dir.is_absolute() {
            config.history_dir.clone()
        } else {
            cwd.join(&config.history_dir)
        };

        let mso_name = format!("{}_mso.pdf", config.base_file);
        let converted = base_dir.join("converted").join(&ext);
        Ok(Self {
            authoritative_pdf: base_dir.join("download").join(&ext).join(&mso_name),
            import_pdf: converted.join(format!("{}.pdf", stem)),
            export_pdf: converted.join(&mso_name),
            history_import_pdf: history_root.join(&ext).join(format!("{}.pdf", stem)),
            history_export_pdf: history_root.join(&ext).join(&mso_name),
            import_overlay_dir: base_dir.join("converted").join("import").join(&ext),
            export_overlay_dir: base_dir.join("converted").join("export").join(&ext),
            import_compare_dir: base_dir.join("converted").join("import-compare").join(&ext),
            export_compare_dir: base_dir.join("converted").join("export-compare").join(&ext),
            base_dir,
            ext,
            stem,
        })
    }

    /// Export renders land in the history tree under the modern extension
    /// and are renamed by hand for legacy formats. The unrenamed sibling
    /// that would satisfy this document, for documents that have one.
    pub fn unrenamed_history_export(&self) -> Option<(PathBuf, &'static str)> {
        let modern = match self.ext.as_str() {
            "doc" => "docx",
            "xls" => "xlsx",
            "ppt" => "pptx",
            _ => return None,
        };
        let name = format!("{}.{}_mso.pdf", self.stem, modern);
        let path = self.history_export_pdf.parent()?.join(name);
        Some((path, modern))
    }

    pub fn report_file(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("diff-pdf-{}-{}", self.ext, name))
    }

    pub fn overlay_file(&self, base_file: &str, direction: &str, page_number: usize) -> String {
        format!("{}_{}-{}.png", base_file, direction, page_number)
    }
}

/// Externally supplied per-document exclusion set: known false positives that
/// waste QA attention. One entry per line, `filename # reason`; lines
/// starting with `#` and blank lines are ignored. Filenames may contain
/// spaces, so only a ` #` suffix is treated as the reason.
#[derive(Debug, Default)]
pub struct Denylist {
    entries: HashMap<String, String>,
}

impl Denylist {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A missing file is an empty denylist, not an error.
    pub fn load(path: &Path) -> io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::empty()),
            Err(err) => Err(err),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, reason) = match line.split_once(" #") {
                Some((name, reason)) => (name.trim(), reason.trim()),
                None => (line, ""),
            };
            if !name.is_empty() {
                entries.insert(name.to_string(), reason.to_string());
            }
        }
        Self { entries }
    }

    pub fn reason(&self, base_file: &str) -> Option<&str> {
        self.entries.get(base_file).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_layout_conventions() {
        let config = RunConfig::new("report final.docx");
        let paths = DocumentPaths::resolve_under(&config, Path::new("/qa/run")).expect("paths");
        assert_eq!(paths.ext, "docx");
        assert_eq!(paths.stem, "report final");
        assert_eq!(
            paths.authoritative_pdf,
            Path::new("/qa/run/download/docx/report final.docx_mso.pdf")
        );
        assert_eq!(
            paths.import_pdf,
            Path::new("/qa/run/converted/docx/report final.pdf")
        );
        assert_eq!(
            paths.export_pdf,
            Path::new("/qa/run/converted/docx/report final.docx_mso.pdf")
        );
        assert_eq!(
            paths.import_overlay_dir,
            Path::new("/qa/run/converted/import/docx")
        );
        assert_eq!(
            paths.report_file("import-statistics.csv"),
            Path::new("/qa/run/diff-pdf-docx-import-statistics.csv")
        );
        assert_eq!(
            paths.overlay_file("report final.docx", "import", 3),
            "report final.docx_import-3.png"
        );
    }

    #[test]
    fn history_paths_use_history_dir() {
        let mut config = RunConfig::new("slide.pptx");
        config.history_dir = PathBuf::from("/qa/history");
        let paths = DocumentPaths::resolve_under(&config, Path::new("/qa/run")).expect("paths");
        assert_eq!(
            paths.history_import_pdf,
            Path::new("/qa/history/pptx/slide.pdf")
        );
        assert_eq!(
            paths.history_export_pdf,
            Path::new("/qa/history/pptx/slide.pptx_mso.pdf")
        );
    }

    #[test]
    fn legacy_formats_know_their_unrenamed_history_sibling() {
        let mut config = RunConfig::new("budget.xls");
        config.history_dir = PathBuf::from("/qa/history");
        let paths = DocumentPaths::resolve_under(&config, Path::new("/qa/run")).expect("paths");
        let (path, modern) = paths.unrenamed_history_export().expect("legacy format");
        assert_eq!(path, Path::new("/qa/history/xls/budget.xlsx_mso.pdf"));
        assert_eq!(modern, "xlsx");

        let config = RunConfig::new("budget.xlsx");
        let paths = DocumentPaths::resolve_under(&config, Path::new("/qa/run")).expect("paths");
        assert!(paths.unrenamed_history_export().is_none());
    }

    #[test]
    fn extensionless_base_file_is_rejected() {
        let config = RunConfig::new("README");
        let err = DocumentPaths::resolve_under(&config, Path::new(".")).unwrap_err();
        assert!(matches!(err, PageDiffError::InvalidConfiguration(_)));
    }

    #[test]
    fn denylist_parses_names_reasons_and_comments() {
        let list = Denylist::parse(
            "# excluded corpus files\n\
             forum-de-108371.xlsx # =rand()\n\
             lorem ipsum.docx # date field\n\
             \n\
             plain-entry.doc\n",
        );
        assert_eq!(list.len(), 3);
        assert_eq!(list.reason("forum-de-108371.xlsx"), Some("=rand()"));
        assert_eq!(list.reason("lorem ipsum.docx"), Some("date field"));
        assert_eq!(list.reason("plain-entry.doc"), Some(""));
        assert_eq!(list.reason("other.docx"), None);
    }

    #[test]
    fn missing_denylist_file_is_empty() {
        let list = Denylist::load(Path::new("/nonexistent/excluded-files.txt")).expect("load");
        assert!(list.is_empty());
    }
}
